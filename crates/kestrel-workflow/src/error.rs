use thiserror::Error;

/// Errors raised while compiling a workflow. All of them abort the run
/// before any node executes.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("invalid graph: node at index {index} has an empty id")]
  EmptyNodeId { index: usize },

  #[error("invalid graph: duplicate node id '{0}'")]
  DuplicateNode(String),

  #[error("invalid graph: edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },
}
