use thiserror::Error;

/// Errors raised by external handles owned by the context.
#[derive(Debug, Error)]
pub enum HandleError {
  #[error("no browser session is attached")]
  NoBrowser,

  #[error("browser has no open page")]
  NoPage,

  #[error("frame not found: {locator}")]
  FrameNotFound { locator: String },

  #[error("handle '{name}' failed: {message}")]
  Failed { name: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
