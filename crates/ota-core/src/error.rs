//! # Error Types
//!
//! Errors raised by the foundational types. All errors use `thiserror` for
//! derive-based `Display` and `Error` implementations.
//!
//! Validation errors name the kind of value that was rejected ("app id",
//! "version name", "file digest") so they can be surfaced to API callers
//! verbatim.

use thiserror::Error;

/// A value failed its constructor's validation rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The value was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// What kind of value was being validated.
        kind: &'static str,
    },

    /// The value exceeded its maximum length.
    #[error("{kind} too long: {len} chars (max {max})")]
    TooLong {
        /// What kind of value was being validated.
        kind: &'static str,
        /// Actual length in characters.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// The value contained a character outside its permitted set.
    #[error("{kind} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// What kind of value was being validated.
        kind: &'static str,
        /// The offending character.
        ch: char,
    },

    /// The value uses a reserved form (leading dot, `.` or `..`).
    #[error("{kind} {value:?} is reserved")]
    Reserved {
        /// What kind of value was being validated.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Errors reading, writing, or building a [`Manifest`](crate::Manifest).
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest JSON could not be parsed or produced.
    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A manifest key is not a safe relative path.
    #[error("manifest path {path:?} is not a normalized relative path")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// A manifest value is not a valid digest.
    #[error("manifest entry {path:?} has an invalid digest: {reason}")]
    InvalidDigest {
        /// The entry whose digest is malformed.
        path: String,
        /// Why the digest was rejected.
        reason: String,
    },

    /// Reading or writing the manifest file failed.
    #[error("manifest io error: {0}")]
    Io(#[from] std::io::Error),
}
