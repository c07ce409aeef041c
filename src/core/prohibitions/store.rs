//! In-memory prohibition store

use super::{Prohibition, ProhibitionSubject};
use crate::error::{NgacError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Read access to prohibitions, as needed by the decider
pub trait ProhibitionReader {
    /// Prohibitions whose subject (node or process) is named `subject`
    fn prohibitions_for(&self, subject: &str) -> Vec<&Prohibition>;
}

/// Prohibitions indexed by name and by subject
#[derive(Debug, Clone, Default)]
pub struct MemProhibitions {
    by_name: IndexMap<String, Prohibition>,
    by_subject: HashMap<String, BTreeSet<String>>,
}

#[derive(Serialize, Deserialize)]
struct ProhibitionsDocument {
    prohibitions: Vec<Prohibition>,
}

impl MemProhibitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn index(&mut self, prohibition: &Prohibition) {
        self.by_subject
            .entry(prohibition.subject.name().to_string())
            .or_default()
            .insert(prohibition.name.clone());
    }

    fn unindex(&mut self, prohibition: &Prohibition) {
        let subject = prohibition.subject.name();
        if let Some(names) = self.by_subject.get_mut(subject) {
            names.remove(&prohibition.name);
            if names.is_empty() {
                self.by_subject.remove(subject);
            }
        }
    }

    /// Add a new prohibition
    ///
    /// Graph references are not checked here; see [`Prohibition::validate`].
    pub fn create(&mut self, prohibition: Prohibition) -> Result<()> {
        if prohibition.name.is_empty() {
            return Err(NgacError::InvalidProhibition(
                "name cannot be empty".to_string(),
            ));
        }
        if self.by_name.contains_key(&prohibition.name) {
            return Err(NgacError::DuplicateName(prohibition.name));
        }
        debug!(
            "Created prohibition {} for {}",
            prohibition.name, prohibition.subject
        );
        self.index(&prohibition);
        self.by_name.insert(prohibition.name.clone(), prohibition);
        Ok(())
    }

    /// Replace the prohibition called `name`, possibly renaming it
    ///
    /// The replacement keeps the original's position in creation order.
    pub fn update(&mut self, name: &str, prohibition: Prohibition) -> Result<()> {
        if prohibition.name.is_empty() {
            return Err(NgacError::InvalidProhibition(
                "name cannot be empty".to_string(),
            ));
        }
        if prohibition.name != name && self.by_name.contains_key(&prohibition.name) {
            return Err(NgacError::DuplicateName(prohibition.name));
        }
        let (position, _, old) = self
            .by_name
            .shift_remove_full(name)
            .ok_or_else(|| NgacError::ProhibitionNotFound(name.to_string()))?;
        self.unindex(&old);

        debug!("Updated prohibition {}", name);
        self.index(&prohibition);
        self.by_name
            .shift_insert(position, prohibition.name.clone(), prohibition);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Prohibition> {
        let removed = self
            .by_name
            .shift_remove(name)
            .ok_or_else(|| NgacError::ProhibitionNotFound(name.to_string()))?;
        self.unindex(&removed);
        debug!("Removed prohibition {}", name);
        Ok(removed)
    }

    /// Remove every prohibition held against `subject`; returns how many
    ///
    /// Only prohibitions of the same subject kind are removed: dropping node
    /// `x` leaves the prohibitions of process `x` in place.
    pub fn remove_for_subject(&mut self, subject: &ProhibitionSubject) -> usize {
        let matching: Vec<String> = self
            .prohibitions_for(subject.name())
            .into_iter()
            .filter(|p| p.subject == *subject)
            .map(|p| p.name.clone())
            .collect();
        for name in &matching {
            if let Some(removed) = self.by_name.shift_remove(name) {
                self.unindex(&removed);
            }
        }
        matching.len()
    }

    pub fn get(&self, name: &str) -> Result<&Prohibition> {
        self.by_name
            .get(name)
            .ok_or_else(|| NgacError::ProhibitionNotFound(name.to_string()))
    }

    /// All prohibitions in creation order
    pub fn all(&self) -> Vec<&Prohibition> {
        self.by_name.values().collect()
    }

    pub fn to_json(&self) -> Result<String> {
        let doc = ProhibitionsDocument {
            prohibitions: self.by_name.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ProhibitionsDocument = serde_json::from_str(json)?;
        Self::from_prohibitions(doc.prohibitions)
    }

    pub fn from_prohibitions<I>(prohibitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Prohibition>,
    {
        let mut store = MemProhibitions::new();
        for prohibition in prohibitions {
            store.create(prohibition)?;
        }
        Ok(store)
    }
}

impl ProhibitionReader for MemProhibitions {
    fn prohibitions_for(&self, subject: &str) -> Vec<&Prohibition> {
        self.by_subject
            .get(subject)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.by_name.get(name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny(name: &str, subject: ProhibitionSubject) -> Prohibition {
        Prohibition::builder(name, subject)
            .operation("read")
            .container("oa1", false)
            .build()
    }

    #[test]
    fn test_create_and_lookup() {
        let mut store = MemProhibitions::new();
        store
            .create(deny("p1", ProhibitionSubject::Node("u1".into())))
            .unwrap();
        store
            .create(deny("p2", ProhibitionSubject::Process("u1".into())))
            .unwrap();
        store
            .create(deny("p3", ProhibitionSubject::Node("ua1".into())))
            .unwrap();

        // process and node subjects share the name space of the lookup
        let names: Vec<_> = store
            .prohibitions_for("u1")
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["p1", "p2"]);
        assert!(store.prohibitions_for("nobody").is_empty());
        assert_eq!(store.get("p3").unwrap().subject.name(), "ua1");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_create_rejects_duplicates_and_empty_names() {
        let mut store = MemProhibitions::new();
        store
            .create(deny("p1", ProhibitionSubject::Node("u1".into())))
            .unwrap();
        assert!(matches!(
            store.create(deny("p1", ProhibitionSubject::Node("u2".into()))),
            Err(NgacError::DuplicateName(_))
        ));
        assert!(matches!(
            store.create(deny("", ProhibitionSubject::Node("u2".into()))),
            Err(NgacError::InvalidProhibition(_))
        ));
        assert!(store.prohibitions_for("u2").is_empty());
    }

    #[test]
    fn test_update_moves_subject_index() {
        let mut store = MemProhibitions::new();
        store
            .create(deny("p1", ProhibitionSubject::Node("u1".into())))
            .unwrap();
        store
            .create(deny("p2", ProhibitionSubject::Node("u1".into())))
            .unwrap();

        store
            .update("p1", deny("p1-renamed", ProhibitionSubject::Node("u2".into())))
            .unwrap();
        assert_eq!(store.prohibitions_for("u1").len(), 1);
        assert_eq!(store.prohibitions_for("u2")[0].name, "p1-renamed");
        assert!(store.get("p1").is_err());

        assert!(matches!(
            store.update("p2", deny("p1-renamed", ProhibitionSubject::Node("u1".into()))),
            Err(NgacError::DuplicateName(_))
        ));
        assert!(matches!(
            store.update("missing", deny("missing", ProhibitionSubject::Node("u1".into()))),
            Err(NgacError::ProhibitionNotFound(_))
        ));
    }

    #[test]
    fn test_remove() {
        let mut store = MemProhibitions::new();
        store
            .create(deny("p1", ProhibitionSubject::Node("u1".into())))
            .unwrap();
        store
            .create(deny("p2", ProhibitionSubject::Node("u1".into())))
            .unwrap();

        assert_eq!(store.remove("p1").unwrap().name, "p1");
        assert!(matches!(
            store.remove("p1"),
            Err(NgacError::ProhibitionNotFound(_))
        ));
        assert_eq!(store.remove_for_subject(&ProhibitionSubject::Node("u1".into())), 1);
        assert!(store.is_empty());
        assert_eq!(store.remove_for_subject(&ProhibitionSubject::Node("u1".into())), 0);
    }

    #[test]
    fn test_remove_for_subject_respects_kind() {
        let mut store = MemProhibitions::new();
        store
            .create(deny("node-x", ProhibitionSubject::Node("x".into())))
            .unwrap();
        store
            .create(deny("process-x", ProhibitionSubject::Process("x".into())))
            .unwrap();

        assert_eq!(store.remove_for_subject(&ProhibitionSubject::Node("x".into())), 1);
        assert!(store.get("node-x").is_err());
        assert_eq!(store.prohibitions_for("x")[0].name, "process-x");
    }

    #[test]
    fn test_update_keeps_creation_order() {
        let mut store = MemProhibitions::new();
        for name in ["a", "b", "c"] {
            store
                .create(deny(name, ProhibitionSubject::Node("u1".into())))
                .unwrap();
        }

        store
            .update("b", deny("b", ProhibitionSubject::Node("u2".into())))
            .unwrap();
        store
            .update("a", deny("a2", ProhibitionSubject::Node("u1".into())))
            .unwrap();

        let names: Vec<_> = store.all().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a2", "b", "c"]);
        assert_eq!(store.get("b").unwrap().subject.name(), "u2");
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let mut store = MemProhibitions::new();
        for name in ["b", "a", "c"] {
            store
                .create(deny(name, ProhibitionSubject::Node("u1".into())))
                .unwrap();
        }
        let restored = MemProhibitions::from_json(&store.to_json().unwrap()).unwrap();
        let names: Vec<_> = restored.all().into_iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
