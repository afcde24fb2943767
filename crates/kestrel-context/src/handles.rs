use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HandleError;

/// A page (tab) of a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
  pub id: String,
  pub url: String,
}

/// The frame later browser operations should target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
  pub page_id: String,
  /// `None` targets the page's main frame.
  pub locator: Option<String>,
}

/// A browser driven by browser modules.
///
/// The driver integration lives outside the engine; the context only needs
/// enough to track focus and tear the session down.
#[async_trait]
pub trait BrowserSession: Send + Sync {
  /// Open pages in creation order.
  async fn pages(&self) -> Result<Vec<PageRef>, HandleError>;

  /// Resolve an iframe locator inside a page.
  async fn frame(&self, page: &PageRef, locator: &str) -> Result<FrameRef, HandleError>;

  /// Graceful shutdown.
  async fn close(&self) -> Result<(), HandleError>;

  /// Forced teardown from the kill switch. Must not block.
  fn kill(&self) {}
}

/// Any other resource owned by a run: devices, capture sessions,
/// background processes.
#[async_trait]
pub trait ExternalHandle: Send + Sync {
  fn name(&self) -> &str;

  async fn close(&self) -> Result<(), HandleError>;

  /// Forced teardown from the kill switch. Must not block.
  fn kill(&self) {}
}
