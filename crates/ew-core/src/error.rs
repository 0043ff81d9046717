//! # AppError
//!
//! Centralized error handling for the Echo-Wall ecosystem. Each variant
//! maps to a wire response code; validation failures carry only a message.

use thiserror::Error;

/// The primary error type for all ew-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required request field missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// Admin-only operation attempted without an admin identity.
    #[error("please log in first")]
    Unauthorized,

    /// Event name the dispatcher does not know.
    #[error("unsupported event, please upgrade the widget client")]
    UnsupportedEvent,

    /// Admin password already configured; replacing it needs a session.
    #[error("password already exists")]
    PasswordExists,

    /// No admin password configured yet.
    #[error("password is not configured")]
    PasswordUnset,

    /// Login attempt with a wrong password.
    #[error("password does not match")]
    PasswordMismatch,

    /// Submission rejected by a rate-limit window or the request ceiling.
    #[error("{0}")]
    RateLimited(String),

    /// Request rejected outright (origin not allowed, challenge failed).
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found (comment, parent thread root).
    #[error("{0} not found")]
    NotFound(String),

    /// Infrastructure failure (storage, collaborator call).
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// The wire response code, or `None` for validation failures which
    /// return a bare message.
    pub fn code(&self) -> Option<u32> {
        match self {
            AppError::Validation(_) => None,
            AppError::Unauthorized => Some(1024),
            AppError::UnsupportedEvent => Some(1001),
            AppError::PasswordExists => Some(1010),
            AppError::PasswordUnset => Some(1022),
            AppError::PasswordMismatch => Some(1023),
            AppError::RateLimited(_)
            | AppError::Forbidden(_)
            | AppError::NotFound(_)
            | AppError::Internal(_) => Some(1000),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// A specialized Result type for Echo-Wall logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_no_code() {
        assert_eq!(AppError::Validation("url is required".into()).code(), None);
    }

    #[test]
    fn auth_and_password_codes_are_distinct() {
        assert_eq!(AppError::Unauthorized.code(), Some(1024));
        assert_eq!(AppError::UnsupportedEvent.code(), Some(1001));
        assert_eq!(AppError::PasswordExists.code(), Some(1010));
        assert_eq!(AppError::PasswordUnset.code(), Some(1022));
        assert_eq!(AppError::PasswordMismatch.code(), Some(1023));
        assert_eq!(AppError::Internal("db".into()).code(), Some(1000));
    }
}
