use super::TaskCanceler;
use crate::error::{TaskError, TaskResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of the current invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Settled,
}

struct LifecycleInner {
    state: TaskState,
    cancel_requested: bool,
    canceler: Option<Arc<dyn TaskCanceler>>,
}

/// Shared run/cancel bookkeeping for a concrete task
///
/// A cancel received while `Idle` is remembered and consumed by the next
/// invocation. A cancel received while `Running` fires the registered
/// canceler exactly once; if no canceler is registered yet, the one passed
/// to the next [`register_canceler`](Self::register_canceler) fires on
/// registration.
pub struct TaskLifecycle {
    name: String,
    inner: Mutex<LifecycleInner>,
}

impl TaskLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(LifecycleInner {
                state: TaskState::Idle,
                cancel_requested: false,
                canceler: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.lock().cancel_requested
    }

    /// Start a fresh invocation
    pub fn begin(&self) -> TaskResult<RunGuard<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Running => {
                return Err(TaskError::AlreadyRunning {
                    task: self.name.clone(),
                })
            }
            TaskState::Settled => inner.cancel_requested = false,
            TaskState::Idle => {}
        }
        inner.state = TaskState::Running;
        inner.canceler = None;
        drop(inner);

        debug!(task = %self.name, "Running task");
        Ok(RunGuard {
            lifecycle: self,
            finished: false,
        })
    }

    /// Fail fast if a cancel arrived since the invocation started
    pub fn check_canceled(&self) -> TaskResult<()> {
        if self.is_canceled() {
            return Err(TaskError::canceled(self.name.clone()));
        }
        Ok(())
    }

    /// Hand the party we are about to wait on a way to abort the wait
    pub fn register_canceler(&self, canceler: Arc<dyn TaskCanceler>) {
        let fire_now = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Running {
                false
            } else if inner.cancel_requested {
                true
            } else {
                inner.canceler = Some(Arc::clone(&canceler));
                false
            }
        };

        if fire_now {
            debug!(task = %self.name, "Cancel arrived before the wait started");
            canceler.cancel();
        }
    }

    /// Request cancellation of the current invocation
    pub fn cancel(&self) {
        let canceler = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Settled => {
                    debug!(task = %self.name, "Ignoring cancel of a settled task");
                    return;
                }
                TaskState::Idle => {
                    inner.cancel_requested = true;
                    None
                }
                TaskState::Running => {
                    if inner.cancel_requested {
                        return;
                    }
                    inner.cancel_requested = true;
                    inner.canceler.take()
                }
            }
        };

        info!(task = %self.name, "Canceling task");
        if let Some(canceler) = canceler {
            canceler.cancel();
        }
    }

    fn settle(&self, outcome: Result<(), &TaskError>) -> Option<Arc<dyn TaskCanceler>> {
        let canceler = {
            let mut inner = self.inner.lock();
            inner.state = TaskState::Settled;
            inner.canceler.take()
        };

        match outcome {
            Ok(()) => debug!(task = %self.name, "Task succeeded"),
            Err(e) if e.is_canceled() => info!(task = %self.name, "Task canceled"),
            Err(e) => warn!(task = %self.name, error = %e, "Task failed"),
        }
        canceler
    }
}

impl fmt::Debug for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TaskLifecycle")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("cancel_requested", &inner.cancel_requested)
            .finish_non_exhaustive()
    }
}

/// Marks one invocation as running until it is finished
///
/// Dropping the guard without calling [`finish`](Self::finish), which happens
/// when the run future itself is dropped, settles the invocation and fires
/// the registered canceler so the external registration does not outlive it.
#[must_use = "an unfinished guard settles the task as abandoned"]
pub struct RunGuard<'a> {
    lifecycle: &'a TaskLifecycle,
    finished: bool,
}

impl RunGuard<'_> {
    /// Settle the invocation with `result`
    pub fn finish<T>(mut self, result: TaskResult<T>) -> TaskResult<T> {
        self.finished = true;
        // The wait that owned the canceler has already completed here.
        let _ = self.lifecycle.settle(result.as_ref().map(|_| ()));
        result
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(task = %self.lifecycle.name, "Task dropped before settling");
        let abandoned = TaskError::canceled(self.lifecycle.name.clone());
        if let Some(canceler) = self.lifecycle.settle(Err(&abandoned)) {
            canceler.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCanceler {
        calls: AtomicUsize,
    }

    impl TaskCanceler for CountingCanceler {
        fn cancel(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancel_fires_registered_canceler_once() {
        let lifecycle = TaskLifecycle::new("test");
        let canceler = Arc::new(CountingCanceler::default());

        let guard = lifecycle.begin().unwrap();
        lifecycle.register_canceler(canceler.clone());
        lifecycle.cancel();
        lifecycle.cancel();

        assert_eq!(canceler.calls.load(Ordering::SeqCst), 1);
        assert!(lifecycle.check_canceled().is_err());

        let result: TaskResult<()> = guard.finish(Err(TaskError::canceled("test")));
        assert!(result.unwrap_err().is_canceled());
        assert_eq!(lifecycle.state(), TaskState::Settled);
    }

    #[test]
    fn test_cancel_after_settle_is_noop() {
        let lifecycle = TaskLifecycle::new("test");
        let canceler = Arc::new(CountingCanceler::default());

        let guard = lifecycle.begin().unwrap();
        lifecycle.register_canceler(canceler.clone());
        guard.finish(Ok(())).unwrap();

        lifecycle.cancel();
        assert_eq!(canceler.calls.load(Ordering::SeqCst), 0);
        assert!(!lifecycle.is_canceled());
    }

    #[test]
    fn test_cancel_before_registration_fires_on_register() {
        let lifecycle = TaskLifecycle::new("test");
        let canceler = Arc::new(CountingCanceler::default());

        let _guard = lifecycle.begin().unwrap();
        lifecycle.cancel();
        lifecycle.register_canceler(canceler.clone());

        assert_eq!(canceler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_while_idle_applies_to_next_run() {
        let lifecycle = TaskLifecycle::new("test");
        lifecycle.cancel();

        let guard = lifecycle.begin().unwrap();
        assert!(lifecycle.check_canceled().is_err());
        let _ = guard.finish::<()>(Err(TaskError::canceled("test")));

        // A fresh invocation after settling starts clean
        let guard = lifecycle.begin().unwrap();
        assert!(lifecycle.check_canceled().is_ok());
        guard.finish(Ok(())).unwrap();
    }

    #[test]
    fn test_second_concurrent_run_rejected() {
        let lifecycle = TaskLifecycle::new("test");
        let _guard = lifecycle.begin().unwrap();

        assert!(matches!(
            lifecycle.begin(),
            Err(TaskError::AlreadyRunning { .. })
        ));
    }

    #[test]
    fn test_dropped_guard_tears_down_registration() {
        let lifecycle = TaskLifecycle::new("test");
        let canceler = Arc::new(CountingCanceler::default());

        {
            let _guard = lifecycle.begin().unwrap();
            lifecycle.register_canceler(canceler.clone());
        }

        assert_eq!(canceler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), TaskState::Settled);
        lifecycle.cancel();
        assert_eq!(canceler.calls.load(Ordering::SeqCst), 1);
    }
}
