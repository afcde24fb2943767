/// Error type for trigger operations.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  #[error("trigger not found: {0}")]
  NotFound(String),

  #[error("invalid trigger configuration: {0}")]
  InvalidConfig(String),

  #[error("trigger timed out after {ms}ms")]
  Timeout { ms: u64 },

  #[error("trigger wait cancelled")]
  Cancelled,
}
