//! Kestrel Config
//!
//! This crate contains the serializable workflow definition types for Kestrel.
//! These types mirror what the visual editor saves: a list of typed nodes with
//! free-form `data` bags, a list of edges whose handle labels carry branch
//! semantics, and a list of initial variables.
//!
//! Definitions are read-only input to the engine. The graph compiler in
//! `kestrel-workflow` turns them into an execution graph.

mod edge;
mod node;
mod variable;
mod workflow;

pub use edge::EdgeDef;
pub use node::{NodeDef, Position};
pub use variable::VariableDef;
pub use workflow::WorkflowDef;
