//! Typed error hierarchy for the feedback backend.
//!
//! One enum, `FeedbackError`, covers every failure that can reach a caller.
//! Each variant maps to an HTTP-style status code and a stable `kind` string so
//! the API layer can render a uniform error envelope.

use thiserror::Error;

/// Errors surfaced by the credential store, token service, session guard,
/// provisioning engine and submission state machine.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation, double submission or double attempt.
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials, invalid or expired token, actor no longer exists.
    #[error("{0}")]
    Auth(String),

    /// Authenticated actor is not allowed to touch the resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedbackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Blob(_) => 502,
            Self::Storage(_) | Self::LockPoisoned | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable tag used in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict_error",
            Self::Auth(_) => "auth_error",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found_error",
            Self::Blob(_) => "blob_store_error",
            Self::Storage(_) | Self::LockPoisoned | Self::Internal(_) => "internal_error",
        }
    }

    /// Server-side failures whose details must not reach the client.
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

pub type FeedbackResult<T> = Result<T, FeedbackError>;
