//! Error types for graph, prohibition and configuration operations

use crate::core::graph::NodeType;
use thiserror::Error;

/// Errors raised by the authorization graph and its surrounding layers
///
/// The decider itself never reports a denial as an error: an empty permission
/// set is a legitimate answer. Errors are reserved for misconfiguration, such as
/// a query naming a node that does not exist.
#[derive(Error, Debug)]
pub enum NgacError {
    /// A referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node or prohibition with this name already exists
    #[error("Name already exists: {0}")]
    DuplicateName(String),

    /// The assignment edge already exists
    #[error("Assignment already exists: {child} -> {parent}")]
    DuplicateEdge { child: String, parent: String },

    /// The node type cannot be created through this call
    #[error("Invalid node type {node_type} for node {name}")]
    InvalidType { name: String, node_type: NodeType },

    /// The type pair is not a legal assignment, or the edge would close a cycle
    #[error("Invalid assignment: {child} -> {parent}")]
    InvalidAssignment { child: String, parent: String },

    /// The type pair is not a legal association
    #[error("Invalid association: {ua} -> {target}")]
    InvalidAssociation { ua: String, target: String },

    /// Prohibition definition is malformed or references unknown nodes
    #[error("Invalid prohibition: {0}")]
    InvalidProhibition(String),

    /// A referenced prohibition does not exist
    #[error("Prohibition not found: {0}")]
    ProhibitionNotFound(String),

    /// Node and prohibition names cannot be empty
    #[error("Name cannot be empty")]
    EmptyName,

    /// Engine configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, NgacError>;
