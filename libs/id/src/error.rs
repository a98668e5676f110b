//! Error types for ID and reference parsing.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs and references.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A service reference is not of the form `namespace/name`.
    #[error("invalid service reference {reference:?}: expected namespace/name")]
    InvalidServiceRef { reference: String },

    /// An image reference could not be parsed.
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidImageRef { reference: String, message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
