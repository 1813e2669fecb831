//! Session status codes surfaced to the session driver

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Close codes the signaling backend reserves for its own internal failures
pub const SIGNALING_INTERNAL_ERROR_CLOSE_CODES: Range<u16> = 4500..4600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusCode {
    Ok,
    /// A negotiation task could not complete
    TaskFailed,
    /// The signaling backend closed the channel because of an internal error
    SignalingInternalServerError,
}

impl SessionStatusCode {
    /// Classify a signaling channel close code
    #[must_use]
    pub fn from_close_code(close_code: u16) -> Self {
        if SIGNALING_INTERNAL_ERROR_CLOSE_CODES.contains(&close_code) {
            Self::SignalingInternalServerError
        } else {
            Self::TaskFailed
        }
    }

    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl fmt::Display for SessionStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "Ok",
            Self::TaskFailed => "TaskFailed",
            Self::SignalingInternalServerError => "SignalingInternalServerError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_classification() {
        for code in 0..=u16::MAX {
            let status = SessionStatusCode::from_close_code(code);
            if (4500..4600).contains(&code) {
                assert_eq!(status, SessionStatusCode::SignalingInternalServerError);
            } else {
                assert_eq!(status, SessionStatusCode::TaskFailed);
            }
        }
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(
            SessionStatusCode::from_close_code(4499),
            SessionStatusCode::TaskFailed
        );
        assert_eq!(
            SessionStatusCode::from_close_code(4500),
            SessionStatusCode::SignalingInternalServerError
        );
        assert_eq!(
            SessionStatusCode::from_close_code(4599),
            SessionStatusCode::SignalingInternalServerError
        );
        assert_eq!(
            SessionStatusCode::from_close_code(4600),
            SessionStatusCode::TaskFailed
        );
        assert!(!SessionStatusCode::Ok.is_failure());
    }
}
