use kestrel_context::HandleError;
use kestrel_resolver::ResolveError;
use kestrel_trigger::TriggerError;

/// Errors a module may return instead of a failing result.
///
/// The scheduler never propagates these; they become a failing
/// `ModuleResult` carrying the error message.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
  #[error("missing required field '{field}'")]
  MissingField { field: String },

  #[error("invalid value for '{field}': {message}")]
  InvalidField { field: String, message: String },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Handle(#[from] HandleError),

  #[error(transparent)]
  Trigger(#[from] TriggerError),

  #[error("{message}")]
  Failed { message: String },

  #[error("cancelled")]
  Cancelled,
}

impl ModuleError {
  pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidField {
      field: field.into(),
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}
