use std::time::Duration;

use thiserror::Error;

use crate::status::SessionStatusCode;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Terminal failure of a single task invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{task} got canceled")]
    Canceled { task: String },

    #[error("{task} connection was terminated with code {close_code} and reason: {reason}")]
    ChannelTerminated {
        task: String,
        status: SessionStatusCode,
        close_code: u16,
        reason: String,
    },

    #[error("{task} failed: {message}")]
    Failed {
        task: String,
        status: SessionStatusCode,
        message: String,
    },

    #[error("{task} is already running")]
    AlreadyRunning { task: String },

    #[error("{task} timed out after {after:?}")]
    TimedOut { task: String, after: Duration },
}

impl TaskError {
    pub fn canceled(task: impl Into<String>) -> Self {
        Self::Canceled { task: task.into() }
    }

    pub fn failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            task: task.into(),
            status: SessionStatusCode::TaskFailed,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Status code a session driver should report for this failure
    #[must_use]
    pub const fn status(&self) -> SessionStatusCode {
        match self {
            Self::ChannelTerminated { status, .. } | Self::Failed { status, .. } => *status,
            Self::Canceled { .. } | Self::AlreadyRunning { .. } | Self::TimedOut { .. } => {
                SessionStatusCode::TaskFailed
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub type TaskResult<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_status() {
        let err = TaskError::ChannelTerminated {
            task: "SubscribeExchangeTask".to_string(),
            status: SessionStatusCode::SignalingInternalServerError,
            close_code: 4501,
            reason: "boom".to_string(),
        };
        assert_eq!(err.status(), SessionStatusCode::SignalingInternalServerError);
        assert_eq!(
            TaskError::canceled("t").status(),
            SessionStatusCode::TaskFailed
        );
        assert!(TaskError::canceled("t").is_canceled());
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::failed("SubscribeExchangeTask", "send failed");
        assert_eq!(err.to_string(), "SubscribeExchangeTask failed: send failed");
    }
}
