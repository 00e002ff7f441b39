//! Error types for the vision scanner

use thiserror::Error;

/// Errors surfaced by the scanner, mirroring the recognition engine
/// error codes plus the orchestration-level misuse conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Unspecified engine error
    #[error("unspecified error")]
    Generic,
    /// Invalid use of the engine (bad image size, wrong call sequence, ...)
    #[error("invalid use of the library")]
    Misuse,
    /// Access permission denied
    #[error("access permission denied")]
    NoPerm,
    /// Database file not found
    #[error("file not found")]
    NoFile,
    /// Database file locked by another handle
    #[error("database file locked")]
    Busy,
    /// Database file corrupted
    #[error("database file corrupted")]
    Corrupt,
    /// The local database holds no records
    #[error("empty database")]
    Empty,
    /// Authorization denied by the recognition service
    #[error("authorization denied")]
    AuthDenied,
    /// No internet connection
    #[error("no internet connection")]
    NoConn,
    /// Operation timeout
    #[error("operation timeout")]
    Timeout,
    /// Threading error inside the engine
    #[error("threading error")]
    Thread,
    /// Credentials do not match the synchronized database
    #[error("credentials mismatch")]
    CredMismatch,
    /// Internet connection too slow
    #[error("internet connection too slow")]
    SlowConn,
    /// Record not found in the local database
    #[error("record not found")]
    NotFound,
    /// Operation aborted by a cooperative cancellation
    #[error("operation aborted")]
    Aborted,
    /// Resource temporarily unavailable, retrying later may work
    #[error("resource temporarily unavailable")]
    Unavailable,
    /// Image size or format not supported
    #[error("image size or format not supported")]
    BadImage,
    /// Wrong API key or no offline image
    #[error("wrong API key or no offline image")]
    BadApiKey,

    /// The scanner is already open
    #[error("scanner already open")]
    AlreadyOpen,
    /// The scanner is not open
    #[error("scanner not open")]
    NotOpen,
    /// A sync or search task is already active on this pipeline
    #[error("a task is already active")]
    AlreadyActive,
}

impl ScanError {
    /// Whether the error reports a misuse of the API by the caller.
    ///
    /// Misuse-class errors are programming errors: they are reported once
    /// and never retried internally.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            ScanError::Misuse
                | ScanError::AlreadyOpen
                | ScanError::NotOpen
                | ScanError::AlreadyActive
        )
    }

    /// Whether the error is transient: the caller may decide to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScanError::NoConn | ScanError::Timeout | ScanError::SlowConn | ScanError::Unavailable
        )
    }

    /// Whether the error is the terminal outcome of a cancelled task.
    ///
    /// Cancellation is distinct from failure and is never retryable.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ScanError::Aborted)
    }
}
