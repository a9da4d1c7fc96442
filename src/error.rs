//! Error types for permscope

use thiserror::Error;

/// Fieldless discriminant of [`Error`], handy for matching and wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    InvalidArgument,
    Forbidden,
    NotFound,
    Conflict,
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
        }
    }
}

/// Every failure the controller can surface to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Actor lacks the capability the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request shape is malformed (empty action set, owner as subject, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Target is structurally protected, or the actor would lock themselves out.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Permission id or resource does not exist at call time.
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent store mutation outlasted the retry budget.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store unavailable. Safe to retry with backoff.
    #[error("transient: {0}")]
    Transient(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Transient(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Uniform error type for all storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Error::NotFound("no such record".into()),
            StoreError::Conflict => Error::Conflict("concurrent store mutation".into()),
            StoreError::Unavailable(m) | StoreError::Backend(m) => Error::Transient(m),
        }
    }
}

/// Result type alias for permscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Convert any backend error to a StoreError
pub(crate) fn err<E: std::error::Error>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}
