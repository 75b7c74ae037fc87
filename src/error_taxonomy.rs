//! Shared error taxonomy across transport, registry, controller, and UI.

use thiserror::Error;

use crate::notify::NoticeKind;
use crate::operation::OperationKind;
use crate::slots::SlotId;

/// Broad category for typed error handling and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    State,
    Upload,
    RateLimit,
    Request,
    Network,
    Parse,
}

/// Local precondition failures. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("no aspect ratio selected")]
    MissingAspectRatio,
    #[error("unknown upload slot {0}")]
    UnknownSlot(SlotId),
}

/// Every failure a session action can end in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The single-flight control for this operation is disabled.
    #[error("{0} is already in flight")]
    Busy(OperationKind),

    #[error("upload rejected: {}", .message.as_deref().unwrap_or("no reason given"))]
    Upload { message: Option<String> },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request failed with HTTP {status}: {}", .message.as_deref().unwrap_or("no reason given"))]
    Request {
        status: u16,
        message: Option<String>,
    },

    /// No response was received at all.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Busy(_) => ErrorCategory::State,
            Self::Upload { .. } => ErrorCategory::Upload,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Request { .. } => ErrorCategory::Request,
            Self::Transport(_) => ErrorCategory::Network,
            Self::InvalidResponse(_) => ErrorCategory::Parse,
        }
    }

    /// Notice kind used when this error is surfaced, or `None` when the
    /// error is rejected quietly (a disabled control was "clicked").
    #[must_use]
    pub fn notice_kind(&self) -> Option<NoticeKind> {
        match self {
            Self::Busy(_) => None,
            _ => Some(NoticeKind::Error),
        }
    }

    /// Server-supplied message, when the server sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Upload { message } | Self::Request { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::InvalidResponse(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_quiet_everything_else_is_an_error_notice() {
        assert_eq!(SessionError::Busy(OperationKind::Assist).notice_kind(), None);
        assert_eq!(
            SessionError::Transport("refused".into()).notice_kind(),
            Some(NoticeKind::Error)
        );
        assert_eq!(
            SessionError::from(ValidationError::EmptyPrompt).category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn server_message_only_comes_from_server_rejections() {
        let err = SessionError::Request {
            status: 400,
            message: Some("Prompt is required".into()),
        };
        assert_eq!(err.server_message(), Some("Prompt is required"));
        assert_eq!(SessionError::Transport("x".into()).server_message(), None);
        assert_eq!(
            SessionError::RateLimited {
                retry_after_secs: 3
            }
            .server_message(),
            None
        );
    }
}
