//! Engine errors.

use kestrel_workflow::GraphError;

/// Errors raised before a run starts. Once running, failures are
/// materialized as node results and reported through the run summary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The workflow could not be compiled.
  #[error(transparent)]
  InvalidGraph(#[from] GraphError),
}
