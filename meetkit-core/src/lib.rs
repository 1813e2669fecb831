//! Shared foundation of the meetkit SDK
//!
//! - **`config`**: layered configuration (file + `MEETKIT_*` environment)
//! - **`logging`**: `tracing` subscriber bootstrap
//! - **`task`**: the cancelable [`Task`] protocol and [`TimeoutTask`]
//! - **`status`**: session status codes reported to the session driver

pub mod config;
pub mod error;
pub mod logging;
pub mod status;
pub mod task;
pub mod types;

pub use config::Config;
pub use error::{Error, Result, TaskError, TaskResult};
pub use status::SessionStatusCode;
pub use task::{RunGuard, Task, TaskCanceler, TaskLifecycle, TaskState, TimeoutTask};
pub use types::{AttendeeId, StreamId};
