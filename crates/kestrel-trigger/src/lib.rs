//! Kestrel Trigger
//!
//! Trigger nodes block until something outside the workflow happens: a
//! webhook call, a hotkey, a file change, a new mail. The event sources
//! themselves live outside the engine behind the [`TriggerManager`] trait.
//!
//! Trigger modules all follow the same pattern, captured by
//! [`wait_for_event`]: register a listener through a scoped
//! [`TriggerRegistration`], wait for the first matching event under a timeout
//! and the run's cancellation token, and unregister on every exit path.

mod error;
mod manager;
mod memory;
mod registration;
mod types;
mod wait;

pub use error::TriggerError;
pub use manager::{OnFire, TriggerManager};
pub use memory::InMemoryTriggerManager;
pub use registration::TriggerRegistration;
pub use types::{TriggerEvent, TriggerHandle, TriggerKind};
pub use wait::wait_for_event;
