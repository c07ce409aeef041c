//! Operation sets and the operation vocabulary
//!
//! An operation is an opaque string token such as `"read"` or `"assign"`.
//! Three reserved tokens act as wildcards and are expanded against an
//! [`OperationVocabulary`] when a decision is resolved:
//! - [`ALL_OPERATIONS`]: every administrative and resource operation
//! - [`ALL_ADMIN_OPERATIONS`]: every administrative operation
//! - [`ALL_RESOURCE_OPERATIONS`]: every resource operation

use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;

/// Wildcard granting every administrative and resource operation
pub const ALL_OPERATIONS: &str = "*";

/// Wildcard granting every administrative operation
pub const ALL_ADMIN_OPERATIONS: &str = "*a";

/// Wildcard granting every resource operation
pub const ALL_RESOURCE_OPERATIONS: &str = "*r";

/// Built-in administrative operations (graph and prohibition CRUD verbs)
pub const ADMIN_OPERATIONS: &[&str] = &[
    "create_policy_class",
    "create_object_attribute",
    "create_user_attribute",
    "create_object",
    "create_user",
    "update_node",
    "delete_node",
    "delete_policy_class",
    "assign",
    "assign_to",
    "deassign",
    "deassign_from",
    "associate",
    "dissociate",
    "get_associations",
    "create_prohibition",
    "update_prohibition",
    "delete_prohibition",
    "get_prohibitions",
    "reset",
];

/// Returns true for the three reserved wildcard tokens
pub fn is_wildcard(op: &str) -> bool {
    op == ALL_OPERATIONS || op == ALL_ADMIN_OPERATIONS || op == ALL_RESOURCE_OPERATIONS
}

/// Ordered set of operation tokens
///
/// Iteration order is lexicographic so decisions and serialized snapshots are
/// stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationSet(BTreeSet<String>);

impl OperationSet {
    pub fn new() -> Self {
        OperationSet(BTreeSet::new())
    }

    /// Add an operation; returns false if it was already present
    pub fn insert<S: Into<String>>(&mut self, op: S) -> bool {
        self.0.insert(op.into())
    }

    pub fn remove(&mut self, op: &str) -> bool {
        self.0.remove(op)
    }

    pub fn contains(&self, op: &str) -> bool {
        self.0.contains(op)
    }

    /// True if every operation in `other` is also in `self`
    pub fn contains_all(&self, other: &OperationSet) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Union `other` into `self`
    pub fn add_all(&mut self, other: &OperationSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Keep only the operations also present in `other`
    pub fn retain_all(&mut self, other: &OperationSet) {
        self.0.retain(|op| other.0.contains(op));
    }

    /// Remove every operation present in `other`
    pub fn remove_all(&mut self, other: &OperationSet) {
        self.0.retain(|op| !other.0.contains(op));
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for OperationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        OperationSet(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for OperationSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for OperationSet {
    type Item = String;
    type IntoIter = btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OperationSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", op)?;
        }
        write!(f, "}}")
    }
}

/// Build an [`OperationSet`] from string literals
///
/// ```
/// use ngac::ops;
///
/// let set = ops!["read", "write"];
/// assert!(set.contains("read"));
/// assert_eq!(set.len(), 2);
/// ```
#[macro_export]
macro_rules! ops {
    () => {
        $crate::OperationSet::new()
    };
    ($($op:expr),+ $(,)?) => {
        [$($op),+].into_iter().collect::<$crate::OperationSet>()
    };
}

/// The administrative and resource operations known to an engine
///
/// The administrative set defaults to [`ADMIN_OPERATIONS`]; the resource set is
/// whatever the caller configures for its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationVocabulary {
    admin: OperationSet,
    resource: OperationSet,
}

impl OperationVocabulary {
    /// Vocabulary with the built-in admin operations and the given resource operations
    pub fn new<I, S>(resource: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OperationVocabulary {
            admin: ADMIN_OPERATIONS.iter().copied().collect(),
            resource: resource.into_iter().collect(),
        }
    }

    /// Vocabulary with an explicit administrative set
    pub fn with_admin(admin: OperationSet, resource: OperationSet) -> Self {
        OperationVocabulary { admin, resource }
    }

    pub fn admin(&self) -> &OperationSet {
        &self.admin
    }

    pub fn resource(&self) -> &OperationSet {
        &self.resource
    }

    /// Replace wildcard tokens in `ops` with the operations they stand for
    ///
    /// [`ALL_OPERATIONS`] expands to both vocabularies. Otherwise the admin and
    /// resource wildcards are expanded independently, so a set holding both
    /// tokens receives both expansions.
    pub fn expand(&self, ops: &mut OperationSet) {
        if ops.remove(ALL_OPERATIONS) {
            ops.add_all(&self.admin);
            ops.add_all(&self.resource);
            // the narrower tokens are subsumed
            ops.remove(ALL_ADMIN_OPERATIONS);
            ops.remove(ALL_RESOURCE_OPERATIONS);
            return;
        }
        if ops.remove(ALL_ADMIN_OPERATIONS) {
            ops.add_all(&self.admin);
        }
        if ops.remove(ALL_RESOURCE_OPERATIONS) {
            ops.add_all(&self.resource);
        }
    }

    /// Whether `allowed` satisfies a request for `requested`
    ///
    /// Requested wildcards are expanded first. A request that names nothing is
    /// satisfied by any non-empty grant. A wildcard that expands to nothing
    /// requests an empty category and is never satisfied.
    pub fn permits(&self, allowed: &OperationSet, requested: &[&str]) -> bool {
        if requested.is_empty() {
            return !allowed.is_empty();
        }
        let mut expanded: OperationSet = requested.iter().copied().collect();
        self.expand(&mut expanded);
        if expanded.is_empty() {
            return false;
        }
        allowed.contains_all(&expanded)
    }
}

impl Default for OperationVocabulary {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}
