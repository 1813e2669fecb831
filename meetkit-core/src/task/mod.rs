//! Cancelable task protocol
//!
//! A [`Task`] is one attempt at an asynchronous operation that produces
//! exactly one terminal outcome: success, failure or cancellation. Tasks
//! never retry; a session driver decides whether to run them again.
//!
//! While a task is suspended on an external event it hands a
//! [`TaskCanceler`] to its [`TaskLifecycle`], so that [`Task::cancel`] can
//! unblock the wait and tear down whatever registration the wait holds.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let task = TimeoutTask::new(SubscribeExchangeTask::new(), Duration::from_secs(15));
//! task.run(&mut context).await?;
//! ```

mod lifecycle;
mod timeout;

pub use lifecycle::{RunGuard, TaskLifecycle, TaskState};
pub use timeout::TimeoutTask;

use crate::error::TaskResult;
use async_trait::async_trait;

/// Unit of cancelable asynchronous work over a context `C`
#[async_trait]
pub trait Task<C: Send>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Run one attempt; settles exactly once
    async fn run(&self, context: &mut C) -> TaskResult<()>;

    /// Request cancellation. Idempotent, and a no-op once the task settled.
    fn cancel(&self);
}

/// Capability that aborts a pending wait
pub trait TaskCanceler: Send + Sync {
    fn cancel(&self);
}
