use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("invalid expression '{expression}': {message}")]
  InvalidExpression { expression: String, message: String },

  #[error("failed to evaluate '{expression}': {message}")]
  Evaluation { expression: String, message: String },
}
