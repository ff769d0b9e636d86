//! Error taxonomy for the codespace lifecycle engine
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error
//! category drives both the Lifecycle Manager's rollback behavior and the
//! CLI's user-facing presentation. Categories are never swallowed across a
//! module boundary; a later `Filesystem` error encountered during cleanup
//! does not overwrite an earlier, more specific error.

use thiserror::Error;

/// Domain errors for the codespace engine.
#[derive(Error, Debug)]
pub enum McsError {
    /// Bad input: name, URL, port range, IP mode, component id, dependency cycle.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The requested entity does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The requested entity already exists, or the resource is already held.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Repository authentication failed, or a required token is missing/invalid.
    #[error("authentication error: {message}")]
    Auth { message: String },

    /// Host unreachable, timeout, or the remote returned 4xx/5xx.
    #[error("network error: {message}")]
    Network { message: String },

    /// The container runtime CLI failed; message is the runtime's own text, verbatim.
    #[error("runtime error: {message}")]
    Runtime { message: String },

    /// Permission denied, disk full, or a directory could not be created.
    #[error("filesystem error: {message}")]
    Filesystem { message: String },

    /// The operation was cancelled or exceeded its deadline.
    #[error("cancelled: {message}")]
    Cancelled { message: String },

    /// An invariant was violated; this indicates a bug in the engine, not bad input.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl McsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into() }
    }

    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::Filesystem { message: message.into() }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Short category tag used by the CLI's one-line error presentation.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Validation",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Auth { .. } => "Auth",
            Self::Network { .. } => "Network",
            Self::Runtime { .. } => "Runtime",
            Self::Filesystem { .. } => "Filesystem",
            Self::Cancelled { .. } => "Cancelled",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Whether the Repository Acquirer should retry this error (spec: only Auth and Network).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Network { .. })
    }
}

impl From<std::io::Error> for McsError {
    fn from(err: std::io::Error) -> Self {
        Self::Filesystem { message: err.to_string() }
    }
}

impl From<serde_json::Error> for McsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal { message: format!("JSON error: {err}") }
    }
}

impl From<git2::Error> for McsError {
    fn from(err: git2::Error) -> Self {
        use git2::ErrorCode;
        match err.code() {
            ErrorCode::Auth | ErrorCode::Certificate => {
                Self::Auth { message: err.message().to_string() }
            }
            ErrorCode::NotFound => Self::NotFound { message: err.message().to_string() },
            _ => Self::Network { message: err.message().to_string() },
        }
    }
}

/// Convenience alias for results carrying an [`McsError`].
pub type Result<T> = std::result::Result<T, McsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matches_variant() {
        assert_eq!(McsError::validation("bad").category(), "Validation");
        assert_eq!(McsError::conflict("dup").category(), "Conflict");
    }

    #[test]
    fn only_auth_and_network_retry() {
        assert!(McsError::auth("x").is_retryable());
        assert!(McsError::network("x").is_retryable());
        assert!(!McsError::runtime("x").is_retryable());
        assert!(!McsError::filesystem("x").is_retryable());
    }

    #[test]
    fn io_error_maps_to_filesystem() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: McsError = io_err.into();
        assert_eq!(err.category(), "Filesystem");
    }
}
