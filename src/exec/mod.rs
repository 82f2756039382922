//! Fan-out execution engine
//!
//! ```text
//!                ┌──────────────┐
//!  Batch ───────▶│  Dispatcher  │── one tokio task per context, gated by a semaphore
//!                └──────┬───────┘
//!                       │ TaskRunner::run (subprocess per context)
//!                       ▼
//!                ┌──────────────┐      ┌──────────────┐
//!                │   Console    │◀─────│   Reporter   │◀── Trigger (Enter key)
//!                │ board + sink │      └──────────────┘
//!                └──────────────┘
//! ```
//!
//! The [`Console`] lock is the only synchronisation point: status changes and
//! output blocks go through it, and it is never held across a subprocess.

pub mod console;
pub mod dispatcher;
pub mod error;
pub mod reporter;
pub mod runner;
pub mod status;

pub use console::{BufferSink, Console, OutputSink, StdSink};
pub use dispatcher::{Batch, BatchConfig, BatchSummary, DEFAULT_PARALLEL, Dispatcher};
pub use error::ExecError;
pub use reporter::{Trigger, TriggerHandle};
pub use runner::{CommandSpec, Invocation, ProcessRunner, TaskOutput, TaskRunner};
pub use status::{StatusBoard, StatusSnapshot, TaskState, TaskStatus};
