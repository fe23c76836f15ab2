//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote could not be reached or the transfer broke off.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The remote answered with something other than `200 OK`. The browscap
    /// site does this when a client asks for updates too often.
    #[display("unexpected HTTP status: {_0}")]
    Status(#[error(not(source))] u16),
    /// The version endpoint returned something that isn't a version number.
    #[display("invalid version response: {_0}")]
    InvalidVersion(#[error(not(source))] String),
    /// The downloaded database could not be written to its destination.
    #[display("unable to write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// The blocking transfer task panicked or was cancelled.
    #[display("transfer task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Write(_) | Self::Task)
    }
}
