//! Kestrel Workflow Engine
//!
//! This crate runs a compiled workflow graph over one shared
//! [`ExecutionContext`](kestrel_context::ExecutionContext).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowExecutor                         │
//! │  - new(workflow, registry, config, notifier) compiles       │
//! │  - execute() → RunSummary                                   │
//! │  - stop() / StopHandle                                      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Scheduler                             │
//! │  - one task per ready node, join on predecessors            │
//! │  - branch / error routing, dead-path skipping               │
//! │  - timeout + panic capture around every module call         │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                 │
//!              ▼                                 ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       Loop driver        │   │        Subflow runner        │
//! │  - body closure re-run   │   │  - member scope, same context│
//! │    once per iteration    │   │  - bounded nesting           │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use kestrel_engine::{ExecutorConfig, WorkflowExecutor};
//! use kestrel_context::NoopNotifier;
//!
//! let executor = WorkflowExecutor::new(
//!     &workflow,
//!     kestrel_modules::default_registry(),
//!     ExecutorConfig::default(),
//!     Arc::new(NoopNotifier),
//! )?;
//!
//! let stop = executor.stop_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stop.stop();
//! });
//!
//! let summary = executor.execute().await;
//! ```

mod config;
mod error;
mod executor;
mod loops;
mod scheduler;
mod subflow;
mod summary;

pub use config::ExecutorConfig;
pub use error::EngineError;
pub use executor::{StopHandle, WorkflowExecutor};
pub use summary::{NodeState, RunSummary};
