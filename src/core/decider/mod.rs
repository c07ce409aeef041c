//! Policy-review decision engine
//!
//! Computes the operations a subject, acting through a process, may perform on
//! a target. A decision runs in phases:
//! 1. Walk upward from the subject, collecting associations (border targets)
//!    and the prohibitions of the subject, the process and every user
//!    attribute reached.
//! 2. Walk upward from the target to the policy classes, carrying one
//!    operation bucket per policy class down to the target.
//! 3. Combine the buckets: union within a policy class, intersection across
//!    policy classes.
//! 4. Expand wildcard operations.
//! 5. Remove every operation denied by an applicable prohibition.

mod cache;


pub use cache::DecisionCache;

use crate::core::graph::{Graph, NodeType};
use crate::core::operations::{OperationSet, OperationVocabulary, ALL_OPERATIONS};
use crate::core::prohibitions::{applies, Prohibition, ProhibitionReader};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::trace;

/// Node name -> operations
pub type PermissionMap = BTreeMap<String, OperationSet>;

/// Authorization queries over a graph
pub trait Decider {
    /// The vocabulary used for wildcard expansion
    fn vocabulary(&self) -> &OperationVocabulary;

    /// Operations `subject` acting as `process` may perform on `target`
    ///
    /// An empty `process` means no process prohibitions are consulted.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the subject or the target does not exist.
    fn list(&self, subject: &str, process: &str, target: &str) -> Result<OperationSet>;

    /// Whether every requested operation is permitted
    ///
    /// With no requested operations, any permission at all is enough.
    fn check(&self, subject: &str, process: &str, target: &str, operations: &[&str]) -> Result<bool> {
        let allowed = self.list(subject, process, target)?;
        Ok(self.vocabulary().permits(&allowed, operations))
    }

    /// The subset of `nodes` on which [`Decider::check`] holds
    fn filter(
        &self,
        subject: &str,
        process: &str,
        nodes: &[String],
        operations: &[&str],
    ) -> Result<Vec<String>>;

    /// Children of `target` on which [`Decider::check`] holds
    fn children(
        &self,
        subject: &str,
        process: &str,
        target: &str,
        operations: &[&str],
    ) -> Result<Vec<String>>;

    /// Every node reachable below the subject's border targets with its permissions
    fn capability_list(&self, subject: &str, process: &str) -> Result<PermissionMap>;

    /// Permissions of every user on `target`
    fn generate_acl(&self, target: &str, process: &str) -> Result<PermissionMap>;
}

/// Result of the user-side walk
struct UserContext<'a> {
    /// Association targets reached from the subject, with the union of their operations
    border_targets: PermissionMap,
    /// Prohibitions of the subject, the process and reached user attributes, by name
    prohibitions: BTreeMap<&'a str, &'a Prohibition>,
}

/// Result of the target-side walk
struct TargetContext {
    /// Policy class -> operations granted through it
    buckets: PermissionMap,
    /// Every node reached walking upward from the target, the target included
    reached: HashSet<String>,
}

/// Pending work in the target-side walk
enum Frame {
    /// Schedule the parents of a node
    Enter(String),
    /// All parents are settled; compute the node's buckets
    Exit(String, Vec<String>),
}

/// Depth-first walk from a target up to the policy classes
struct TargetWalk<'g, G: ?Sized> {
    graph: &'g G,
    border_targets: &'g PermissionMap,
    buckets: HashMap<String, PermissionMap>,
    visited: HashSet<String>,
}

impl<'g, G: Graph + ?Sized> TargetWalk<'g, G> {
    fn new(graph: &'g G, border_targets: &'g PermissionMap) -> Self {
        TargetWalk {
            graph,
            border_targets,
            buckets: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Post-order walk: a node's buckets are complete once all its parents are done
    ///
    /// Uses an explicit stack so hierarchy depth is bounded by memory, not by the
    /// thread's stack.
    fn visit(&mut self, start: &str) -> Result<()> {
        let mut stack = vec![Frame::Enter(start.to_string())];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(name) => {
                    if !self.visited.insert(name.clone()) {
                        continue;
                    }
                    let parents = self.graph.parents(&name)?;
                    let pending: Vec<String> = parents
                        .iter()
                        .rev()
                        .filter(|parent| !self.visited.contains(*parent))
                        .cloned()
                        .collect();
                    stack.push(Frame::Exit(name, parents));
                    stack.extend(pending.into_iter().map(Frame::Enter));
                }
                Frame::Exit(name, parents) => self.settle(name, &parents)?,
            }
        }
        Ok(())
    }

    /// Merge the parents' buckets into `name`, then apply its own grant
    fn settle(&mut self, name: String, parents: &[String]) -> Result<()> {
        let mut node_buckets = PermissionMap::new();
        for parent in parents {
            if let Some(parent_buckets) = self.buckets.get(parent) {
                for (pc, ops) in parent_buckets {
                    node_buckets.entry(pc.clone()).or_default().add_all(ops);
                }
            }
        }

        if self.graph.node(&name)?.node_type == NodeType::PolicyClass {
            node_buckets.insert(name.clone(), OperationSet::new());
        } else if let Some(ops) = self.border_targets.get(&name) {
            for bucket in node_buckets.values_mut() {
                bucket.add_all(ops);
            }
        }

        self.buckets.insert(name, node_buckets);
        Ok(())
    }

    fn finish(mut self, target: &str) -> TargetContext {
        TargetContext {
            buckets: self.buckets.remove(target).unwrap_or_default(),
            reached: self.visited,
        }
    }
}

/// Fold per policy class buckets into the allowed set
///
/// A target reachable through several policy classes is only granted what
/// every one of them grants. An `ALL_OPERATIONS` placeholder is replaced by
/// the next bucket; a later wildcard bucket leaves the running set alone; an
/// empty bucket vetoes everything.
fn resolve_allowed(buckets: &PermissionMap) -> OperationSet {
    let mut allowed = OperationSet::new();
    let mut first = true;

    for ops in buckets.values() {
        if first {
            allowed.add_all(ops);
            first = false;
        } else if allowed.contains(ALL_OPERATIONS) {
            allowed = ops.clone();
        } else if ops.is_empty() {
            allowed.clear();
            break;
        } else if ops.contains(ALL_OPERATIONS) {
            continue;
        } else {
            allowed.retain_all(ops);
        }
    }

    allowed
}

/// The policy-review decider
///
/// Borrows a graph, a prohibition store and a vocabulary for the duration of
/// a batch of queries. Holds no state between queries.
pub struct PReviewDecider<'a, G: ?Sized, P: ?Sized> {
    graph: &'a G,
    prohibitions: &'a P,
    vocabulary: &'a OperationVocabulary,
}

impl<'a, G, P> PReviewDecider<'a, G, P>
where
    G: Graph + ?Sized,
    P: ProhibitionReader + ?Sized,
{
    pub fn new(graph: &'a G, prohibitions: &'a P, vocabulary: &'a OperationVocabulary) -> Self {
        PReviewDecider {
            graph,
            prohibitions,
            vocabulary,
        }
    }

    fn collect_prohibitions(&self, subject: &str, into: &mut BTreeMap<&'a str, &'a Prohibition>) {
        let store: &'a P = self.prohibitions;
        for prohibition in store.prohibitions_for(subject) {
            into.insert(prohibition.name.as_str(), prohibition);
        }
    }

    /// Breadth-first walk from the subject through its user attributes
    fn process_user_dag(&self, subject: &str, process: &str) -> Result<UserContext<'a>> {
        self.graph.node(subject)?;

        let mut prohibitions = BTreeMap::new();
        self.collect_prohibitions(subject, &mut prohibitions);
        if !process.is_empty() {
            self.collect_prohibitions(process, &mut prohibitions);
        }

        let mut border_targets = PermissionMap::new();
        let mut visited = HashSet::from([subject.to_string()]);
        let mut queue = VecDeque::from([subject.to_string()]);

        while let Some(name) = queue.pop_front() {
            if self.graph.node(&name)?.node_type == NodeType::UserAttribute {
                for (target, ops) in self.graph.source_associations(&name)? {
                    border_targets.entry(target).or_default().add_all(&ops);
                }
                self.collect_prohibitions(&name, &mut prohibitions);
            }
            for parent in self.graph.parents(&name)? {
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }

        trace!(
            "{} reaches {} border target(s) and {} prohibition(s)",
            subject,
            border_targets.len(),
            prohibitions.len()
        );
        Ok(UserContext {
            border_targets,
            prohibitions,
        })
    }

    fn process_target_dag(&self, target: &str, user: &UserContext<'_>) -> Result<TargetContext> {
        let mut walk = TargetWalk::new(self.graph, &user.border_targets);
        walk.visit(target)?;
        Ok(walk.finish(target))
    }

    /// Denied operations from every applicable prohibition
    fn resolve_prohibitions(
        &self,
        user: &UserContext<'_>,
        target: &str,
        reached: &HashSet<String>,
    ) -> OperationSet {
        let mut denied = OperationSet::new();
        for prohibition in user.prohibitions.values() {
            if applies(prohibition, target, reached) {
                trace!("Prohibition {} applies to {}", prohibition.name, target);
                denied.add_all(&prohibition.operations);
            }
        }
        self.vocabulary.expand(&mut denied);
        denied
    }

    /// Phases 2 through 5 for one target
    fn decide(&self, user: &UserContext<'_>, target: &str) -> Result<OperationSet> {
        self.graph.node(target)?;
        if user.border_targets.is_empty() {
            return Ok(OperationSet::new());
        }

        let target_ctx = self.process_target_dag(target, user)?;
        let mut allowed = resolve_allowed(&target_ctx.buckets);
        self.vocabulary.expand(&mut allowed);

        let denied = self.resolve_prohibitions(user, target, &target_ctx.reached);
        allowed.remove_all(&denied);
        Ok(allowed)
    }

    /// Every node below `start` (inclusive) along containment edges
    fn descendants(&self, start: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::from([start.to_string()]);
        let mut order = vec![start.to_string()];
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(name) = queue.pop_front() {
            for child in self.graph.children(&name)? {
                if seen.insert(child.clone()) {
                    order.push(child.clone());
                    queue.push_back(child);
                }
            }
        }
        Ok(order)
    }
}

impl<'a, G, P> Decider for PReviewDecider<'a, G, P>
where
    G: Graph + ?Sized,
    P: ProhibitionReader + ?Sized,
{
    fn vocabulary(&self) -> &OperationVocabulary {
        self.vocabulary
    }

    fn list(&self, subject: &str, process: &str, target: &str) -> Result<OperationSet> {
        self.graph.node(target)?;
        let user = self.process_user_dag(subject, process)?;
        let allowed = self.decide(&user, target)?;
        trace!("list({}, {}, {}) = {}", subject, process, target, allowed);
        Ok(allowed)
    }

    fn filter(
        &self,
        subject: &str,
        process: &str,
        nodes: &[String],
        operations: &[&str],
    ) -> Result<Vec<String>> {
        let user = self.process_user_dag(subject, process)?;
        let mut kept = Vec::new();
        for node in nodes {
            let allowed = self.decide(&user, node)?;
            if self.vocabulary.permits(&allowed, operations) {
                kept.push(node.clone());
            }
        }
        Ok(kept)
    }

    fn children(
        &self,
        subject: &str,
        process: &str,
        target: &str,
        operations: &[&str],
    ) -> Result<Vec<String>> {
        let children = self.graph.children(target)?;
        self.filter(subject, process, &children, operations)
    }

    fn capability_list(&self, subject: &str, process: &str) -> Result<PermissionMap> {
        let user = self.process_user_dag(subject, process)?;
        let mut results = PermissionMap::new();

        for border_target in user.border_targets.keys() {
            for node in self.descendants(border_target)? {
                if results.contains_key(&node) {
                    continue;
                }
                let allowed = self.decide(&user, &node)?;
                results.insert(node, allowed);
            }
        }

        trace!("{} has capabilities on {} node(s)", subject, results.len());
        Ok(results)
    }

    fn generate_acl(&self, target: &str, process: &str) -> Result<PermissionMap> {
        self.graph.node(target)?;
        let mut acl = PermissionMap::new();
        for user in self.graph.nodes() {
            if user.node_type != NodeType::User {
                continue;
            }
            let ops = self.list(&user.name, process, target)?;
            acl.insert(user.name.clone(), ops);
        }
        Ok(acl)
    }
}
