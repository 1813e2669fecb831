//! Integration tests for the meetkit-core task protocol, configuration and logging
//!
//! Run with: cargo test --test integration_tests

use async_trait::async_trait;
use meetkit_core::config::{Config, LogFormat};
use meetkit_core::logging::init_logging;
use meetkit_core::{Task, TaskCanceler, TaskError, TaskLifecycle, TaskResult, TaskState, TimeoutTask};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct Session {
    completed: usize,
}

/// Resolves the pending wait of a [`GateTask`]
struct Gate(Mutex<Option<oneshot::Sender<bool>>>);

impl Gate {
    fn resolve(&self, opened: bool) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(opened);
        }
    }
}

impl TaskCanceler for Gate {
    fn cancel(&self) {
        self.resolve(false);
    }
}

/// Waits until the test opens its gate or the task is canceled
struct GateTask {
    lifecycle: TaskLifecycle,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl GateTask {
    fn new() -> Self {
        Self {
            lifecycle: TaskLifecycle::new("GateTask"),
            gate: Mutex::new(None),
        }
    }

    fn open(&self) {
        if let Some(gate) = self.gate.lock().clone() {
            gate.resolve(true);
        }
    }

    async fn wait(&self, session: &mut Session) -> TaskResult<()> {
        self.lifecycle.check_canceled()?;
        let (tx, rx) = oneshot::channel();
        let gate = Arc::new(Gate(Mutex::new(Some(tx))));
        *self.gate.lock() = Some(gate.clone());
        self.lifecycle.register_canceler(gate);

        match rx.await {
            Ok(true) => {
                session.completed += 1;
                Ok(())
            }
            _ => Err(TaskError::canceled(self.lifecycle.name())),
        }
    }

    async fn wait_until_gated(&self) {
        while self.gate.lock().is_none() {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Task<Session> for GateTask {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn run(&self, session: &mut Session) -> TaskResult<()> {
        let guard = self.lifecycle.begin()?;
        let result = self.wait(session).await;
        guard.finish(result)
    }

    fn cancel(&self) {
        self.lifecycle.cancel();
    }
}

#[tokio::test]
async fn test_task_runs_again_after_settling() {
    let task = GateTask::new();
    let mut session = Session::default();

    for _ in 0..2 {
        *task.gate.lock() = None;
        let (result, ()) = tokio::join!(task.run(&mut session), async {
            task.wait_until_gated().await;
            task.open();
        });
        result.unwrap();
        assert_eq!(task.lifecycle.state(), TaskState::Settled);
    }
    assert_eq!(session.completed, 2);
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    let task = GateTask::new();
    let mut session = Session::default();

    let (result, ()) = tokio::join!(task.run(&mut session), async {
        task.wait_until_gated().await;
        task.cancel();
        task.cancel();
    });

    assert_eq!(result, Err(TaskError::canceled("GateTask")));
    assert_eq!(session.completed, 0);

    // Settled: a late open or cancel changes nothing
    task.open();
    task.cancel();
    assert_eq!(task.lifecycle.state(), TaskState::Settled);
    assert_eq!(session.completed, 0);
}

#[tokio::test]
async fn test_cancel_before_run_is_consumed_once() {
    let task = GateTask::new();
    let mut session = Session::default();

    task.cancel();
    assert!(matches!(
        task.run(&mut session).await,
        Err(TaskError::Canceled { .. })
    ));

    *task.gate.lock() = None;
    let (result, ()) = tokio::join!(task.run(&mut session), async {
        task.wait_until_gated().await;
        task.open();
    });
    result.unwrap();
    assert_eq!(session.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_task_reports_timed_out() {
    let task = TimeoutTask::new(GateTask::new(), Duration::from_millis(250));
    let mut session = Session::default();

    let result = task.run(&mut session).await;

    assert_eq!(
        result,
        Err(TaskError::TimedOut {
            task: "GateTask".to_string(),
            after: Duration::from_millis(250),
        })
    );
    assert_eq!(task.inner().lifecycle.state(), TaskState::Settled);
}

#[test]
fn test_config_from_environment() {
    std::env::set_var("MEETKIT_UPLINK__STARTUP_DURATION_MS", "3000");
    std::env::set_var("MEETKIT_NEGOTIATION__REQUIRES_UNIFIED_PLAN_MUNGING", "true");

    let config = Config::from_env().unwrap();

    std::env::remove_var("MEETKIT_UPLINK__STARTUP_DURATION_MS");
    std::env::remove_var("MEETKIT_NEGOTIATION__REQUIRES_UNIFIED_PLAN_MUNGING");

    assert_eq!(config.uplink.startup_duration(), Duration::from_secs(3));
    assert!(config.negotiation.requires_unified_plan_munging);
    assert!(config.negotiation.enable_simulcast);
}

#[test]
fn test_logging_from_config_file() {
    std::env::remove_var("RUST_LOG");
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("meetkit.log");
    let config_path = dir.path().join("meetkit.toml");
    std::fs::write(
        &config_path,
        format!(
            "[logging]\nlevel = \"debug\"\nformat = \"json\"\nfile_path = {:?}\n",
            log_path.to_str().unwrap()
        ),
    )
    .unwrap();

    let config = Config::from_file(config_path.to_str().unwrap()).unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
    init_logging(&config.logging).unwrap();

    tracing::debug!(target: "meetkit_rtc::subscribe", close_code = 4501, "exchange terminated");
    tracing::info!(target: "hyper::proto", "connection pooled");
    tracing::warn!(target: "hyper::proto", "connection reset");

    let written = std::fs::read_to_string(&log_path).unwrap();
    assert!(written.contains("exchange terminated"));
    assert!(written.contains("\"close_code\":4501"));
    assert!(written.contains("connection reset"));
    assert!(!written.contains("connection pooled"));

    // Only one global subscriber per process
    assert!(init_logging(&config.logging).is_err());
}
