//! # NGAC - Next Generation Access Control
//!
//! `ngac-rs` is an attribute-based access control engine built on a policy
//! graph. Users and objects are contained in attributes, attributes are
//! contained in policy classes, and associations between user attributes and
//! object attributes grant operations:
//!
//! - **Policy graph** with validated assignments and associations
//! - **Policy-review decider**: union within a policy class, intersection across
//!   policy classes
//! - **Prohibitions**: deny rules that always override grants
//! - **Concurrent facade** serving many readers against one consistent snapshot
//!
//! ## Quick Start
//!
//! ```rust
//! use ngac::{ops, NodeType, PolicyBuilder, Properties, Result};
//!
//! # fn main() -> Result<()> {
//! let policy = PolicyBuilder::new()
//!     .resource_operations(["read", "write"])
//!     .build()?;
//!
//! policy.create_policy_class("rbac", Properties::new())?;
//! policy.create_node("staff", NodeType::UserAttribute, Properties::new(), "rbac", &[])?;
//! policy.create_node("alice", NodeType::User, Properties::new(), "staff", &[])?;
//! policy.create_node("docs", NodeType::ObjectAttribute, Properties::new(), "rbac", &[])?;
//! policy.create_node("report", NodeType::Object, Properties::new(), "docs", &[])?;
//! policy.associate("staff", "docs", ops!["read"])?;
//!
//! assert!(policy.check("alice", "", "report", &["read"])?);
//! assert!(!policy.check("alice", "", "report", &["write"])?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistent batches
//!
//! ```rust
//! use ngac::{Decider, PolicyStore};
//!
//! let policy = PolicyStore::default();
//! let snapshot = policy.read();
//! let decider = snapshot.decider();
//! // several queries against one unchanging graph
//! assert!(decider.generate_acl("missing", "").is_err());
//! ```

pub mod core;
pub mod error;

mod config;

pub use crate::config::{EngineConfig, DEFAULT_CACHE_CAPACITY};
pub use crate::core::{
    decider::{Decider, DecisionCache, PReviewDecider, PermissionMap},
    graph::{
        Graph, GraphMut, GraphSnapshot, MemGraph, Node, NodeType, Properties, PC_PROPERTY,
        REP_PROPERTY, WILDCARD_PROPERTY,
    },
    operations::{
        OperationSet, OperationVocabulary, ADMIN_OPERATIONS, ALL_ADMIN_OPERATIONS,
        ALL_OPERATIONS, ALL_RESOURCE_OPERATIONS,
    },
    prohibitions::{
        applies, MemProhibitions, Prohibition, ProhibitionBuilder, ProhibitionReader,
        ProhibitionSubject,
    },
};
pub use crate::error::{NgacError, Result};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Graph and prohibitions serialized together
#[derive(Serialize, Deserialize)]
struct PolicyDocument {
    graph: GraphSnapshot,
    #[serde(default)]
    prohibitions: Vec<Prohibition>,
}

/// Thread-safe policy store
///
/// Owns the policy graph, the prohibitions and an optional decision cache.
/// Every query holds read locks for its whole duration, graph before
/// prohibitions, so it observes a single consistent state. Every mutation
/// takes the write locks in the same order and clears the decision cache
/// before releasing them.
///
/// # Examples
///
/// ```rust
/// use ngac::{ops, NodeType, PolicyStore, Properties};
/// use std::sync::Arc;
/// use std::thread;
///
/// let policy = Arc::new(PolicyStore::default());
/// policy.create_policy_class("pc", Properties::new()).unwrap();
/// policy.create_node("ua", NodeType::UserAttribute, Properties::new(), "pc", &[]).unwrap();
/// policy.create_node("u", NodeType::User, Properties::new(), "ua", &[]).unwrap();
/// policy.associate("ua", "pc_rep", ops!["assign"]).unwrap();
///
/// let reader = Arc::clone(&policy);
/// let handle = thread::spawn(move || reader.list("u", "", "pc_rep").unwrap());
/// assert!(handle.join().unwrap().contains("assign"));
/// ```
pub struct PolicyStore {
    graph: RwLock<MemGraph>,
    prohibitions: RwLock<MemProhibitions>,
    vocabulary: OperationVocabulary,
    cache: Option<Mutex<DecisionCache>>,
}

impl PolicyStore {
    /// Create an empty store
    ///
    /// # Arguments
    ///
    /// * `vocabulary` - Operations used to expand wildcards
    /// * `cache_capacity` - Number of cached decisions; 0 disables caching
    pub fn new(vocabulary: OperationVocabulary, cache_capacity: usize) -> Self {
        let cache = DecisionCache::new(cache_capacity);
        PolicyStore {
            graph: RwLock::new(MemGraph::new()),
            prohibitions: RwLock::new(MemProhibitions::new()),
            vocabulary,
            cache: cache.is_enabled().then(|| Mutex::new(cache)),
        }
    }

    pub fn vocabulary(&self) -> &OperationVocabulary {
        &self.vocabulary
    }

    /// Whether decisions are cached
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Number of decisions currently cached
    pub fn cached_decisions(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    /// Run a graph mutation under the write lock
    ///
    /// The cache is cleared while the lock is still held, so no query can cache
    /// a decision computed against the old graph after this returns.
    fn mutate_graph<T>(&self, f: impl FnOnce(&mut MemGraph) -> Result<T>) -> Result<T> {
        let mut graph = self.graph.write();
        let result = f(&mut *graph)?;
        self.invalidate();
        Ok(result)
    }

    /// Lock the graph and prohibitions for a batch of consistent queries
    pub fn read(&self) -> PolicySnapshot<'_> {
        let graph = self.graph.read();
        let prohibitions = self.prohibitions.read();
        PolicySnapshot {
            graph,
            prohibitions,
            vocabulary: &self.vocabulary,
        }
    }

    // ---- Graph ----

    /// Create a policy class and its representative object attribute
    pub fn create_policy_class(&self, name: &str, properties: Properties) -> Result<Node> {
        self.mutate_graph(|graph| graph.create_policy_class(name, properties))
    }

    /// Create a node assigned to `parent` and every one of `additional_parents`
    ///
    /// # Errors
    ///
    /// Fails without creating anything if the name is empty or taken, a parent
    /// does not exist, or an assignment is not legal for the type pair.
    pub fn create_node(
        &self,
        name: &str,
        node_type: NodeType,
        properties: Properties,
        parent: &str,
        additional_parents: &[&str],
    ) -> Result<Node> {
        self.mutate_graph(|graph| {
            graph.create_node(name, node_type, properties, parent, additional_parents)
        })
    }

    pub fn update_node(&self, name: &str, properties: Properties) -> Result<()> {
        self.mutate_graph(|graph| graph.update_node(name, properties))
    }

    /// Remove a node, its edges and the prohibitions held against it
    pub fn remove_node(&self, name: &str) -> Result<()> {
        let mut graph = self.graph.write();
        let mut prohibitions = self.prohibitions.write();
        graph.remove_node(name)?;
        let dropped =
            prohibitions.remove_for_subject(&ProhibitionSubject::Node(name.to_string()));
        if dropped > 0 {
            debug!("Dropped {} prohibition(s) held against {}", dropped, name);
        }
        self.invalidate();
        Ok(())
    }

    pub fn assign(&self, child: &str, parent: &str) -> Result<()> {
        self.mutate_graph(|graph| graph.assign(child, parent))
    }

    pub fn deassign(&self, child: &str, parent: &str) -> Result<()> {
        self.mutate_graph(|graph| graph.deassign(child, parent))
    }

    /// Grant `operations` on `target` to `ua`, replacing any previous grant
    pub fn associate(&self, ua: &str, target: &str, operations: OperationSet) -> Result<()> {
        self.mutate_graph(|graph| graph.associate(ua, target, operations))
    }

    pub fn dissociate(&self, ua: &str, target: &str) -> Result<()> {
        self.mutate_graph(|graph| graph.dissociate(ua, target))
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Result<Node> {
        self.graph.read().node(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.graph.read().exists(name)
    }

    // ---- Prohibitions ----

    /// Validate a prohibition against the graph and store it
    pub fn create_prohibition(&self, prohibition: Prohibition) -> Result<()> {
        let graph = self.graph.read();
        let mut prohibitions = self.prohibitions.write();
        prohibition.validate(&*graph)?;
        prohibitions.create(prohibition)?;
        self.invalidate();
        Ok(())
    }

    /// Replace the prohibition called `name`
    pub fn update_prohibition(&self, name: &str, prohibition: Prohibition) -> Result<()> {
        let graph = self.graph.read();
        let mut prohibitions = self.prohibitions.write();
        prohibition.validate(&*graph)?;
        prohibitions.update(name, prohibition)?;
        self.invalidate();
        Ok(())
    }

    pub fn remove_prohibition(&self, name: &str) -> Result<Prohibition> {
        let mut prohibitions = self.prohibitions.write();
        let removed = prohibitions.remove(name)?;
        self.invalidate();
        Ok(removed)
    }

    pub fn prohibition(&self, name: &str) -> Result<Prohibition> {
        self.prohibitions.read().get(name).cloned()
    }

    /// All prohibitions in creation order
    pub fn prohibitions(&self) -> Vec<Prohibition> {
        self.prohibitions.read().all().into_iter().cloned().collect()
    }

    // ---- Decisions ----

    /// Operations `subject` acting as `process` may perform on `target`
    ///
    /// Answers from the decision cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the subject or the target does not exist.
    pub fn list(&self, subject: &str, process: &str, target: &str) -> Result<OperationSet> {
        let snapshot = self.read();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(subject, process, target) {
                return Ok(hit);
            }
        }

        let allowed = snapshot.decider().list(subject, process, target)?;
        if let Some(cache) = &self.cache {
            cache.lock().put(subject, process, target, allowed.clone());
        }
        Ok(allowed)
    }

    /// Whether every requested operation is permitted
    pub fn check(
        &self,
        subject: &str,
        process: &str,
        target: &str,
        operations: &[&str],
    ) -> Result<bool> {
        let allowed = self.list(subject, process, target)?;
        Ok(self.vocabulary.permits(&allowed, operations))
    }

    /// The subset of `nodes` on which the requested operations are permitted
    pub fn filter(
        &self,
        subject: &str,
        process: &str,
        nodes: &[String],
        operations: &[&str],
    ) -> Result<Vec<String>> {
        self.read().decider().filter(subject, process, nodes, operations)
    }

    /// Children of `target` on which the requested operations are permitted
    pub fn children(
        &self,
        subject: &str,
        process: &str,
        target: &str,
        operations: &[&str],
    ) -> Result<Vec<String>> {
        self.read()
            .decider()
            .children(subject, process, target, operations)
    }

    pub fn capability_list(&self, subject: &str, process: &str) -> Result<PermissionMap> {
        self.read().decider().capability_list(subject, process)
    }

    pub fn generate_acl(&self, target: &str, process: &str) -> Result<PermissionMap> {
        self.read().decider().generate_acl(target, process)
    }

    // ---- Persistence ----

    /// Export the graph and prohibitions as one JSON document
    pub fn to_json(&self) -> Result<String> {
        let snapshot = self.read();
        let doc = PolicyDocument {
            graph: snapshot.graph.snapshot(),
            prohibitions: snapshot
                .prohibitions
                .all()
                .into_iter()
                .cloned()
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Replace the whole policy with a JSON document from [`PolicyStore::to_json`]
    ///
    /// The document is fully validated before anything is replaced.
    pub fn load_json(&self, json: &str) -> Result<()> {
        let doc: PolicyDocument = serde_json::from_str(json)?;
        let graph = MemGraph::from_snapshot(doc.graph)?;
        for prohibition in &doc.prohibitions {
            prohibition.validate(&graph)?;
        }
        let prohibitions = MemProhibitions::from_prohibitions(doc.prohibitions)?;

        let mut graph_guard = self.graph.write();
        let mut prohibitions_guard = self.prohibitions.write();
        *graph_guard = graph;
        *prohibitions_guard = prohibitions;
        self.invalidate();
        info!(
            "Loaded policy with {} nodes and {} prohibitions",
            graph_guard.len(),
            prohibitions_guard.len()
        );
        Ok(())
    }

    /// Build a store from a JSON document
    ///
    /// Wildcard grants in the document only expand to the operations `config`
    /// names, so pass the configuration the document was exported under.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid, otherwise whatever
    /// [`PolicyStore::load_json`] reports.
    pub fn from_json(json: &str, config: &EngineConfig) -> Result<Self> {
        let store = PolicyStore::new(config.vocabulary()?, config.decision_cache_capacity);
        store.load_json(json)?;
        Ok(store)
    }

    /// Remove every node and prohibition
    pub fn reset(&self) {
        let mut graph = self.graph.write();
        let mut prohibitions = self.prohibitions.write();
        *graph = MemGraph::new();
        *prohibitions = MemProhibitions::new();
        self.invalidate();
        info!("Policy reset");
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(OperationVocabulary::default(), DEFAULT_CACHE_CAPACITY)
    }
}

/// Read-locked view of a [`PolicyStore`]
///
/// Writers block until the snapshot is dropped, so keep it short-lived.
pub struct PolicySnapshot<'a> {
    graph: RwLockReadGuard<'a, MemGraph>,
    prohibitions: RwLockReadGuard<'a, MemProhibitions>,
    vocabulary: &'a OperationVocabulary,
}

impl<'a> PolicySnapshot<'a> {
    pub fn graph(&self) -> &MemGraph {
        &self.graph
    }

    pub fn prohibitions(&self) -> &MemProhibitions {
        &self.prohibitions
    }

    /// A decider over this snapshot; bypasses the decision cache
    pub fn decider(&self) -> PReviewDecider<'_, MemGraph, MemProhibitions> {
        PReviewDecider::new(&*self.graph, &*self.prohibitions, self.vocabulary)
    }
}

/// Builder for a [`PolicyStore`]
///
/// # Examples
///
/// ```rust
/// use ngac::PolicyBuilder;
///
/// let policy = PolicyBuilder::new()
///     .resource_operations(["read", "write"])
///     .cache_capacity(0)
///     .build()
///     .unwrap();
///
/// assert!(!policy.is_caching());
/// assert!(policy.vocabulary().resource().contains("read"));
/// ```
pub struct PolicyBuilder {
    config: EngineConfig,
    config_path: Option<PathBuf>,
}

impl PolicyBuilder {
    /// Create a new PolicyBuilder with default settings
    pub fn new() -> Self {
        PolicyBuilder {
            config: EngineConfig::default(),
            config_path: None,
        }
    }

    /// Set the resource operations granted through associations
    pub fn resource_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.resource_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the built-in administrative operations
    pub fn admin_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.admin_operations = Some(operations.into_iter().map(Into::into).collect());
        self
    }

    /// Set the decision cache capacity (0 disables the cache)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.decision_cache_capacity = capacity;
        self
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file at build time
    ///
    /// The file replaces any settings made on the builder.
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Build the PolicyStore
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Toml` if the configuration file cannot be loaded and
    /// `Config` if an operation name is empty or a reserved wildcard.
    pub fn build(self) -> Result<PolicyStore> {
        let config = match self.config_path {
            Some(path) => EngineConfig::from_file(path)?,
            None => self.config,
        };
        let vocabulary = config.vocabulary()?;

        info!(
            "Building policy store with {} admin and {} resource operations, cache capacity {}",
            vocabulary.admin().len(),
            vocabulary.resource().len(),
            config.decision_cache_capacity
        );
        Ok(PolicyStore::new(vocabulary, config.decision_cache_capacity))
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    fn store() -> PolicyStore {
        let policy = PolicyBuilder::new()
            .resource_operations(["read", "write"])
            .build()
            .unwrap();
        policy.create_policy_class("pc1", Properties::new()).unwrap();
        policy
            .create_node("ua1", NodeType::UserAttribute, Properties::new(), "pc1", &[])
            .unwrap();
        policy
            .create_node("u1", NodeType::User, Properties::new(), "ua1", &[])
            .unwrap();
        policy
            .create_node("oa1", NodeType::ObjectAttribute, Properties::new(), "pc1", &[])
            .unwrap();
        policy
            .create_node("o1", NodeType::Object, Properties::new(), "oa1", &[])
            .unwrap();
        policy
    }

    #[test]
    fn test_builder_defaults() {
        let policy = PolicyBuilder::default().build().unwrap();
        assert!(policy.is_caching());
        assert_eq!(policy.vocabulary().admin().len(), ADMIN_OPERATIONS.len());
        assert!(policy.vocabulary().resource().is_empty());
    }

    #[test]
    fn test_builder_rejects_wildcard_operations() {
        let result = PolicyBuilder::new().resource_operations(["*"]).build();
        assert!(matches!(result, Err(NgacError::Config(_))));
    }

    #[test]
    fn test_mutations_invalidate_cache() {
        let policy = store();
        policy.associate("ua1", "oa1", ops!["read"]).unwrap();

        assert_eq!(policy.list("u1", "", "o1").unwrap(), ops!["read"]);
        assert_eq!(policy.cached_decisions(), 1);
        // served from the cache
        assert_eq!(policy.list("u1", "", "o1").unwrap(), ops!["read"]);
        assert_eq!(policy.cached_decisions(), 1);

        policy.associate("ua1", "oa1", ops!["read", "write"]).unwrap();
        assert_eq!(policy.cached_decisions(), 0);
        assert_eq!(policy.list("u1", "", "o1").unwrap(), ops!["read", "write"]);

        policy
            .create_prohibition(
                Prohibition::builder("deny-write", ProhibitionSubject::Node("u1".into()))
                    .operation("write")
                    .container("oa1", false)
                    .build(),
            )
            .unwrap();
        assert_eq!(policy.list("u1", "", "o1").unwrap(), ops!["read"]);

        policy.remove_prohibition("deny-write").unwrap();
        assert_eq!(policy.list("u1", "", "o1").unwrap(), ops!["read", "write"]);
    }

    #[test]
    fn test_failed_mutation_keeps_cache() {
        let policy = store();
        policy.associate("ua1", "oa1", ops!["read"]).unwrap();
        policy.list("u1", "", "o1").unwrap();

        assert!(policy.assign("o1", "ua1").is_err());
        assert_eq!(policy.cached_decisions(), 1);
    }

    #[test]
    fn test_prohibition_validated_against_graph() {
        let policy = store();
        let dangling = Prohibition::builder("p1", ProhibitionSubject::Node("u1".into()))
            .operation("read")
            .container("ghost", false)
            .build();
        assert!(matches!(
            policy.create_prohibition(dangling),
            Err(NgacError::InvalidProhibition(_))
        ));
        assert!(policy.prohibitions().is_empty());
    }

    #[test]
    fn test_remove_node_drops_its_prohibitions() {
        let policy = store();
        policy
            .create_prohibition(
                Prohibition::builder("p1", ProhibitionSubject::Node("u1".into()))
                    .operation("read")
                    .container("oa1", false)
                    .build(),
            )
            .unwrap();

        policy.remove_node("u1").unwrap();
        assert!(!policy.exists("u1"));
        assert!(matches!(
            policy.prohibition("p1"),
            Err(NgacError::ProhibitionNotFound(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let policy = store();
        policy.associate("ua1", "oa1", ops!["read", "write"]).unwrap();
        policy
            .create_prohibition(
                Prohibition::builder("p1", ProhibitionSubject::Process("proc".into()))
                    .operation("write")
                    .container("oa1", false)
                    .build(),
            )
            .unwrap();

        let config = EngineConfig {
            resource_operations: vec!["read".into(), "write".into()],
            ..EngineConfig::default()
        };
        let restored = PolicyStore::from_json(&policy.to_json().unwrap(), &config).unwrap();
        assert_eq!(restored.node("pc1").unwrap(), policy.node("pc1").unwrap());
        assert_eq!(restored.prohibitions(), policy.prohibitions());
        assert_eq!(restored.list("u1", "proc", "o1").unwrap(), ops!["read"]);
    }

    #[test]
    fn test_json_reload_keeps_wildcard_vocabulary() {
        let policy = store();
        policy
            .associate("ua1", "oa1", ops![ALL_RESOURCE_OPERATIONS])
            .unwrap();
        let json = policy.to_json().unwrap();

        let config = EngineConfig {
            resource_operations: vec!["read".into(), "write".into()],
            decision_cache_capacity: 0,
            admin_operations: None,
        };
        let restored = PolicyStore::from_json(&json, &config).unwrap();
        assert!(!restored.is_caching());
        assert_eq!(restored.list("u1", "", "o1").unwrap(), ops!["read", "write"]);

        let invalid = EngineConfig {
            resource_operations: vec!["*".into()],
            ..EngineConfig::default()
        };
        assert!(matches!(
            PolicyStore::from_json(&json, &invalid),
            Err(NgacError::Config(_))
        ));
    }

    #[test]
    fn test_remove_node_keeps_same_named_process_prohibitions() {
        let policy = store();
        policy
            .create_prohibition(
                Prohibition::builder("node-u1", ProhibitionSubject::Node("u1".into()))
                    .operation("read")
                    .container("oa1", false)
                    .build(),
            )
            .unwrap();
        policy
            .create_prohibition(
                Prohibition::builder("process-u1", ProhibitionSubject::Process("u1".into()))
                    .operation("write")
                    .container("oa1", false)
                    .build(),
            )
            .unwrap();

        policy.remove_node("u1").unwrap();
        assert!(policy.prohibition("node-u1").is_err());
        assert_eq!(
            policy.prohibition("process-u1").unwrap().subject,
            ProhibitionSubject::Process("u1".into())
        );
    }

    #[test]
    fn test_load_json_rejects_dangling_prohibition() {
        let policy = store();
        let json = r#"{
            "graph": { "nodes": [ { "name": "u1", "type": "U" } ] },
            "prohibitions": [ {
                "name": "p1",
                "subject": { "kind": "node", "name": "u1" },
                "operations": ["read"],
                "containers": { "ghost": false },
                "intersection": false
            } ]
        }"#;
        assert!(policy.load_json(json).is_err());
        // nothing replaced
        assert!(policy.exists("o1"));
    }

    #[test]
    fn test_reset() {
        let policy = store();
        policy.reset();
        assert!(!policy.exists("pc1"));
        assert!(policy.read().graph().is_empty());
    }

    #[test]
    fn test_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PolicyStore>();
    }
}
