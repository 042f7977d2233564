//! Unified error handling for the messaging hub.
//!
//! Mirrors the handler/storage error split: [`AppError`] is what handlers
//! return and what gets turned into the single outbound `error` frame;
//! [`crate::db::DbError`] stays next to the sqlx `#[from]` impl.

use crate::frame::OutboundFrame;
use thiserror::Error;

/// Errors surfaced to handlers and, ultimately, to the client as a single
/// `error` frame. The wire only ever carries `message`; `kind` drives
/// internal branching and metrics/log labeling.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Invalid(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("{0}")]
    AuthRejected(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("redpacket already claimed")]
    AlreadyClaimed,

    #[error("redpacket exhausted")]
    Exhausted,

    #[error("redpacket claim amount inconsistent")]
    Inconsistent,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Static error code for logging/metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::AuthRequired => "auth_required",
            Self::AuthRejected(_) => "auth_rejected",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::AlreadyClaimed => "already_claimed",
            Self::Exhausted => "exhausted",
            Self::Inconsistent => "inconsistent",
            Self::Internal(_) => "internal",
        }
    }

    /// Build the single outbound `error` frame carried to the client.
    ///
    /// Per the propagation policy, handler errors never drop the
    /// connection — they are always turned into this frame.
    pub fn to_frame(&self) -> OutboundFrame {
        OutboundFrame::Error {
            message: self.to_string(),
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(e: crate::db::DbError) -> Self {
        AppError::Internal(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
