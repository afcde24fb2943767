//! Kestrel Workflow
//!
//! This crate compiles a [`WorkflowDef`](kestrel_config::WorkflowDef) into an
//! [`ExecutionGraph`]: the static structure the scheduler walks.
//!
//! Compilation:
//! - indexes nodes by id (duplicates are rejected)
//! - classifies every edge by its source handle label into exactly one
//!   [`BranchClass`]
//! - builds the condition / loop / error branch maps
//! - marks loop back-edges (body nodes wired back into their loop node)
//! - identifies subflows, by group geometry or by header node
//! - determines the start nodes of the main flow
//!
//! Cycles are allowed. The graph is never topologically sorted; the scheduler
//! relies on the join rule instead.

mod branch;
mod compile;
mod error;
mod graph;
mod subflow;

pub use branch::BranchClass;
pub use compile::compile;
pub use error::GraphError;
pub use graph::{
  BodyClosure, ConditionBranches, ExecutionGraph, GraphEdge, LoopBranches, NodeKind,
};
pub use subflow::{Subflow, SubflowKind};

/// Node types driven by the loop driver.
pub const LOOP_TYPES: &[&str] = &["loop", "foreach"];
/// Node type that calls a subflow.
pub const SUBFLOW_CALL_TYPE: &str = "subflow";
/// Visual container node type; a group may be marked as a subflow.
pub const GROUP_TYPE: &str = "group";
/// Header node type that starts a headered subflow.
pub const SUBFLOW_HEADER_TYPE: &str = "subflow_header";
