//! Engine modules: operations, graph, prohibitions and the decider

pub mod decider;
pub mod graph;
pub mod operations;
pub mod prohibitions;
