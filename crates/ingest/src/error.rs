//! Ingestion Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An ingestion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The capability database could not be read.
    #[display("unable to read capability database")]
    Io,
    /// The second line of the database does not hold a version number.
    #[display("missing or invalid database version")]
    MissingVersion,
    /// A data row does not conform to the fixed column schema.
    #[display("malformed record on line {line}: {reason}")]
    MalformedRecord {
        /// One-based line number within the source text.
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Only reading can fail transiently; the text itself is either
        // well-formed or it isn't.
        matches!(self, Self::Io)
    }
}
