//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The identifier exceeds the maximum length.
    #[error("{kind} too long: {actual} bytes (max {max})")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// The identifier contains whitespace or a control character.
    #[error("{kind} contains invalid character {ch:?} at byte {position}")]
    InvalidCharacter {
        kind: &'static str,
        ch: char,
        position: usize,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }
}
