//! Caller-facing errors.
//!
//! Every error leaving the facade carries a kind tag, so transports can
//! map it to their own status vocabulary without parsing messages.

use thiserror::Error;

use crate::release::ReleaseError;

/// The kind of a caller-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; never retried.
    BadInput,
    /// The referenced thing doesn't exist.
    NotFound,
    /// A release is already in progress; the caller may retry.
    Conflict,
    /// A platform, registry, or repository call failed.
    Upstream,
    /// A batch regrade succeeded for some workloads and failed for
    /// others.
    Partial,
    /// A logic or storage error on our side.
    Internal,
}

/// An error surfaced to callers of the server facade.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServerError {
    kind: ErrorKind,
    message: String,
}

impl ServerError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Partial, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ReleaseError> for ServerError {
    fn from(err: ReleaseError) -> Self {
        match &err {
            ReleaseError::AlreadyInProgress => Self::conflict(err.to_string()),
            ReleaseError::Regrade(_) => Self::partial(err.to_string()),
            _ => Self::upstream(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_error_mapping() {
        let err: ServerError = ReleaseError::AlreadyInProgress.into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.message(),
            "a release is already in progress; please try again later"
        );

        let err: ServerError = ReleaseError::Regrade(crate::platform::RegradeError::new()).into();
        assert_eq!(err.kind(), ErrorKind::Partial);
    }

    #[test]
    fn test_constructors_set_kinds() {
        assert_eq!(ServerError::bad_input("x").kind(), ErrorKind::BadInput);
        assert_eq!(ServerError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(ServerError::upstream("x").kind(), ErrorKind::Upstream);
        assert_eq!(ServerError::internal("x").kind(), ErrorKind::Internal);
    }
}
