//! Kestrel Module
//!
//! The uniform contract between the engine and the code behind a node's
//! `type`:
//!
//! - [`Module`]: `execute(config, context) -> Result`
//! - [`ModuleConfig`]: the node's config, already resolved against the
//!   context's variables, with typed accessors
//! - [`ModuleRegistry`]: type string to implementation
//! - [`TimeoutPolicy`]: per-type default timeouts, per-node overrides and the
//!   modules whose failure aborts their subtree

mod config;
mod error;
mod module;
mod registry;
mod timeout;

pub use config::ModuleConfig;
pub use error::ModuleError;
pub use module::Module;
pub use registry::ModuleRegistry;
pub use timeout::{TIMEOUT_KEY, TimeoutPolicy};
