use super::Task;
use crate::error::{TaskError, TaskResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Cancels the wrapped task when it has not settled within `timeout`
pub struct TimeoutTask<T> {
    inner: T,
    timeout: Duration,
}

impl<T> TimeoutTask<T> {
    pub const fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<C, T> Task<C> for TimeoutTask<T>
where
    C: Send,
    T: Task<C>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, context: &mut C) -> TaskResult<()> {
        let mut run = self.inner.run(context);

        tokio::select! {
            result = &mut run => result,
            () = tokio::time::sleep(self.timeout) => {
                warn!(
                    task = %self.inner.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Task timed out, canceling"
                );
                self.inner.cancel();
                match run.await {
                    Err(TaskError::Canceled { task }) => Err(TaskError::TimedOut {
                        task,
                        after: self.timeout,
                    }),
                    other => other,
                }
            }
        }
    }

    fn cancel(&self) {
        self.inner.cancel();
    }
}
