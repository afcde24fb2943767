//! Kestrel Context
//!
//! The per-run state shared by every module invocation of one workflow run:
//!
//! - variables, resolved into module configs through `kestrel-resolver`
//! - the data table (`current_row` plus committed `data_rows`)
//! - the loop stack and the single-shot break/continue flags
//! - external handles (browser session, devices, background processes)
//!   owned by the run and released on every exit path
//! - the kill switch that interrupts blocking I/O on `stop()`
//! - the log ring and the [`ExecutionNotifier`] receiving events
//!
//! All mutable state sits behind one mutex. Parallel nodes may read and write
//! variables freely; the last write wins.

mod context;
mod error;
mod events;
mod handles;
mod kill;
mod log;
mod loops;
mod result;
mod user_data;

pub use context::{ContextOptions, ExecutionContext};
pub use error::HandleError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier, RunStatus};
pub use handles::{BrowserSession, ExternalHandle, FrameRef, PageRef};
pub use kill::{KillSwitch, ReleaserGuard};
pub use log::{LogBuffer, LogEntry, LogLevel};
pub use loops::{LoopFrame, LoopKind, LoopSpec};
pub use result::{Control, ModuleResult};
pub use user_data::{LOCK_FILES, prepare_user_data_dir};
