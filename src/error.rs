//! Error taxonomy for the virtual directory engine.
//!
//! Every fallible core operation resolves to exactly one of these kinds;
//! callers never see a raw internal fault. Persistence failures are kept
//! separate because they are retried by the backup scheduler and must not
//! surface to request callers.

use thiserror::Error;

/// Errors surfaced by directory operations.
#[derive(Debug, Error)]
pub enum DriveError {
    /// A path segment or id-based lookup did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness invariant would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Structurally impossible request, rejected before any mutation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Share-token validation failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Snapshot read or write failed. Logged and retried, never propagated
    /// to request callers.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl DriveError {
    pub fn not_found(path: &str) -> Self {
        DriveError::NotFound(path.to_string())
    }
}
