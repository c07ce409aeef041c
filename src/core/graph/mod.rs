//! Authorization graph model
//!
//! The graph holds five kinds of nodes connected by two independent edge kinds:
//! - **Assignments** (child -> parent) model containment
//! - **Associations** (user attribute -> attribute) grant an operation set
//!
//! Policy classes are the roots. Which assignments and associations are legal
//! is decided by [`NodeType::can_assign_to`] and [`NodeType::can_associate_with`].

mod memory;


pub use memory::{Assignment, Association, GraphSnapshot, MemGraph};

use crate::core::operations::OperationSet;
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property key on a policy class naming its representative object attribute
pub const REP_PROPERTY: &str = "rep";

/// Property key on a representative naming the policy class it stands for
pub const PC_PROPERTY: &str = "pc";

/// Search value matching any value of the property key
pub const WILDCARD_PROPERTY: &str = "*";

/// Insertion-ordered node properties
pub type Properties = IndexMap<String, String>;

/// Node kinds of the authorization graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "PC")]
    PolicyClass,
    #[serde(rename = "OA")]
    ObjectAttribute,
    #[serde(rename = "UA")]
    UserAttribute,
    #[serde(rename = "O")]
    Object,
    #[serde(rename = "U")]
    User,
}

impl NodeType {
    /// Whether a node of this type may be assigned to a parent of type `parent`
    pub fn can_assign_to(self, parent: NodeType) -> bool {
        match self {
            NodeType::User => matches!(parent, NodeType::UserAttribute),
            NodeType::UserAttribute => {
                matches!(parent, NodeType::UserAttribute | NodeType::PolicyClass)
            }
            NodeType::Object => matches!(parent, NodeType::ObjectAttribute),
            NodeType::ObjectAttribute => {
                matches!(parent, NodeType::ObjectAttribute | NodeType::PolicyClass)
            }
            NodeType::PolicyClass => false,
        }
    }

    /// Whether a node of this type may be the source of an association to `target`
    pub fn can_associate_with(self, target: NodeType) -> bool {
        match self {
            NodeType::UserAttribute => {
                matches!(target, NodeType::UserAttribute | NodeType::ObjectAttribute)
            }
            NodeType::PolicyClass
            | NodeType::ObjectAttribute
            | NodeType::Object
            | NodeType::User => false,
        }
    }

    /// Short code used in serialized graphs
    pub fn code(self) -> &'static str {
        match self {
            NodeType::PolicyClass => "PC",
            NodeType::ObjectAttribute => "OA",
            NodeType::UserAttribute => "UA",
            NodeType::Object => "O",
            NodeType::User => "U",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A named, typed node with ordered properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: Properties,
}

impl Node {
    pub fn new<S: Into<String>>(name: S, node_type: NodeType, properties: Properties) -> Self {
        Node {
            name: name.into(),
            node_type,
            properties,
        }
    }

    /// True if every query property is present on this node
    ///
    /// A query value of [`WILDCARD_PROPERTY`] only requires the key to exist.
    pub fn matches_properties(&self, query: &Properties) -> bool {
        query.iter().all(|(key, value)| match self.properties.get(key) {
            Some(actual) => value == WILDCARD_PROPERTY || actual == value,
            None => false,
        })
    }
}

/// Read access to an authorization graph
///
/// This is everything the decider needs. Implementations must present a single
/// consistent state for the lifetime of the borrow.
pub trait Graph {
    /// Whether a node with this name exists
    fn exists(&self, name: &str) -> bool;

    /// Look up a node by name
    fn node(&self, name: &str) -> Result<&Node>;

    /// All nodes in the graph
    fn nodes(&self) -> Vec<&Node>;

    /// Names of every policy class
    fn policy_classes(&self) -> Vec<String>;

    /// Names of the nodes `name` is assigned to
    fn parents(&self, name: &str) -> Result<Vec<String>>;

    /// Names of the nodes assigned to `name`
    fn children(&self, name: &str) -> Result<Vec<String>>;

    /// Associations with `name` as the source, keyed by target
    fn source_associations(&self, name: &str) -> Result<BTreeMap<String, OperationSet>>;

    /// Associations with `name` as the target, keyed by source
    fn target_associations(&self, name: &str) -> Result<BTreeMap<String, OperationSet>>;

    /// Nodes of `node_type` (any type if `None`) whose properties contain `properties`
    fn search(&self, node_type: Option<NodeType>, properties: &Properties) -> Vec<&Node>;

    /// Whether the assignment `child -> parent` exists
    fn is_assigned(&self, child: &str, parent: &str) -> Result<bool>;
}

/// Validated mutation of an authorization graph
///
/// Every call either applies fully or fails and leaves the graph unchanged.
pub trait GraphMut: Graph {
    /// Create a policy class together with its representative object attribute
    fn create_policy_class(&mut self, name: &str, properties: Properties) -> Result<Node>;

    /// Create a non policy class node assigned to `parent` and `additional_parents`
    fn create_node(
        &mut self,
        name: &str,
        node_type: NodeType,
        properties: Properties,
        parent: &str,
        additional_parents: &[&str],
    ) -> Result<Node>;

    /// Replace the properties of a node
    fn update_node(&mut self, name: &str, properties: Properties) -> Result<()>;

    /// Delete a node and every edge touching it
    fn remove_node(&mut self, name: &str) -> Result<()>;

    fn assign(&mut self, child: &str, parent: &str) -> Result<()>;

    fn deassign(&mut self, child: &str, parent: &str) -> Result<()>;

    /// Create or replace the association `ua -> target`
    fn associate(&mut self, ua: &str, target: &str, operations: OperationSet) -> Result<()>;

    fn dissociate(&mut self, ua: &str, target: &str) -> Result<()>;
}
