//! Prohibitions: named deny rules
//!
//! A prohibition denies a set of operations to a subject (a user, a user
//! attribute or a process) on targets selected by container conditions:
//! - a plain condition holds when the target is contained in the container
//! - a complement condition holds when the target is *not* contained in it
//!
//! An intersection prohibition needs every condition to hold; otherwise any
//! single condition is enough. Denials always override grants.

mod evaluate;
mod store;

pub use evaluate::applies;
pub use store::{MemProhibitions, ProhibitionReader};

use crate::core::graph::{Graph, NodeType};
use crate::core::operations::OperationSet;
use crate::error::{NgacError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a prohibition applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ProhibitionSubject {
    /// A user or user attribute node
    Node(String),
    /// A process identifier; not a graph node
    Process(String),
}

impl ProhibitionSubject {
    pub fn name(&self) -> &str {
        match self {
            ProhibitionSubject::Node(name) | ProhibitionSubject::Process(name) => name,
        }
    }
}

impl fmt::Display for ProhibitionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProhibitionSubject::Node(name) => write!(f, "node {}", name),
            ProhibitionSubject::Process(id) => write!(f, "process {}", id),
        }
    }
}

/// A named deny rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prohibition {
    pub name: String,
    pub subject: ProhibitionSubject,
    /// Operations denied when the prohibition applies
    pub operations: OperationSet,
    /// Container name -> is this a complement condition
    pub containers: IndexMap<String, bool>,
    /// All conditions must hold (true) or any one of them (false)
    pub intersection: bool,
}

impl Prohibition {
    /// Start building a prohibition
    ///
    /// ```
    /// use ngac::{ops, Prohibition, ProhibitionSubject};
    ///
    /// let p = Prohibition::builder("no-secrets", ProhibitionSubject::Node("interns".into()))
    ///     .operations(ops!["read"])
    ///     .container("secrets", false)
    ///     .container("public", true)
    ///     .intersection(true)
    ///     .build();
    ///
    /// assert_eq!(p.containers.len(), 2);
    /// assert!(p.intersection);
    /// ```
    pub fn builder<S: Into<String>>(name: S, subject: ProhibitionSubject) -> ProhibitionBuilder {
        ProhibitionBuilder {
            prohibition: Prohibition {
                name: name.into(),
                subject,
                operations: OperationSet::new(),
                containers: IndexMap::new(),
                intersection: false,
            },
        }
    }

    /// Check the definition against a graph
    ///
    /// # Errors
    ///
    /// Returns `InvalidProhibition` if the name is empty, no operation is
    /// denied, a node subject is missing or is not a user/user attribute, a
    /// process subject is empty, or a container does not exist.
    pub fn validate<G: Graph + ?Sized>(&self, graph: &G) -> Result<()> {
        let invalid = |reason: String| Err(NgacError::InvalidProhibition(reason));

        if self.name.is_empty() {
            return invalid("name cannot be empty".to_string());
        }
        if self.operations.is_empty() {
            return invalid(format!("{} denies no operations", self.name));
        }

        match &self.subject {
            ProhibitionSubject::Node(subject) => match graph.node(subject) {
                Ok(node)
                    if matches!(node.node_type, NodeType::User | NodeType::UserAttribute) => {}
                Ok(node) => {
                    return invalid(format!(
                        "subject {} of {} is a {} node",
                        subject, self.name, node.node_type
                    ))
                }
                Err(_) => {
                    return invalid(format!("subject {} of {} does not exist", subject, self.name))
                }
            },
            ProhibitionSubject::Process(id) if id.is_empty() => {
                return invalid(format!("{} has an empty process subject", self.name));
            }
            ProhibitionSubject::Process(_) => {}
        }

        for container in self.containers.keys() {
            if !graph.exists(container) {
                return invalid(format!(
                    "container {} of {} does not exist",
                    container, self.name
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`Prohibition`]
#[derive(Debug, Clone)]
pub struct ProhibitionBuilder {
    prohibition: Prohibition,
}

impl ProhibitionBuilder {
    pub fn operations(mut self, operations: OperationSet) -> Self {
        self.prohibition.operations.add_all(&operations);
        self
    }

    pub fn operation<S: Into<String>>(mut self, op: S) -> Self {
        self.prohibition.operations.insert(op);
        self
    }

    /// Add a container condition; `complement` selects targets outside it
    pub fn container<S: Into<String>>(mut self, name: S, complement: bool) -> Self {
        self.prohibition.containers.insert(name.into(), complement);
        self
    }

    pub fn intersection(mut self, intersection: bool) -> Self {
        self.prohibition.intersection = intersection;
        self
    }

    pub fn build(self) -> Prohibition {
        self.prohibition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{GraphMut, MemGraph, Properties};
    use crate::ops;

    fn graph() -> MemGraph {
        let mut graph = MemGraph::new();
        graph.create_policy_class("pc1", Properties::new()).unwrap();
        graph
            .create_node("oa1", NodeType::ObjectAttribute, Properties::new(), "pc1", &[])
            .unwrap();
        graph
            .create_node("ua1", NodeType::UserAttribute, Properties::new(), "pc1", &[])
            .unwrap();
        graph
            .create_node("u1", NodeType::User, Properties::new(), "ua1", &[])
            .unwrap();
        graph
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let graph = graph();
        let p = Prohibition::builder("deny", ProhibitionSubject::Node("u1".into()))
            .operation("read")
            .container("oa1", false)
            .build();
        assert!(p.validate(&graph).is_ok());

        let p = Prohibition::builder("deny-proc", ProhibitionSubject::Process("1234".into()))
            .operation("read")
            .build();
        assert!(p.validate(&graph).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let graph = graph();
        let cases = [
            Prohibition::builder("", ProhibitionSubject::Node("u1".into()))
                .operation("read")
                .build(),
            Prohibition::builder("no-ops", ProhibitionSubject::Node("u1".into())).build(),
            Prohibition::builder("ghost", ProhibitionSubject::Node("nobody".into()))
                .operation("read")
                .build(),
            Prohibition::builder("object-subject", ProhibitionSubject::Node("oa1".into()))
                .operation("read")
                .build(),
            Prohibition::builder("empty-proc", ProhibitionSubject::Process(String::new()))
                .operation("read")
                .build(),
            Prohibition::builder("bad-container", ProhibitionSubject::Node("ua1".into()))
                .operation("read")
                .container("missing", false)
                .build(),
        ];
        for p in cases {
            assert!(
                matches!(p.validate(&graph), Err(NgacError::InvalidProhibition(_))),
                "{:?}",
                p
            );
        }
    }

    #[test]
    fn test_serde_shape() {
        let p = Prohibition::builder("p", ProhibitionSubject::Process("42".into()))
            .operations(ops!["write"])
            .container("oa1", true)
            .build();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["subject"]["kind"], "process");
        assert_eq!(json["subject"]["name"], "42");
        assert_eq!(json["containers"]["oa1"], true);

        let back: Prohibition = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
