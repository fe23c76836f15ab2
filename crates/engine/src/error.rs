//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors raised by the lower crates
//! stay attached as children, so the full chain is available in the `Debug`
//! output of an [`Error`].

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The capability database (or its directory) could not be read or written.
    #[display("capability database I/O error")]
    Io,
    /// The capability database does not conform to the expected layout.
    #[display("malformed capability database")]
    MalformedRecord,
    /// A remote transfer failed or was refused.
    #[display("network error")]
    Network,
    /// Creating or querying the pattern index failed.
    #[display("pattern index error")]
    Storage,
    /// The configuration could not be loaded.
    #[display("configuration error")]
    Config,
    /// A blocking task panicked or was cancelled.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Network | Self::Storage | Self::Task)
    }
}

/// Raise an ingestion failure into the engine's taxonomy, keeping the read
/// errors apart from the layout errors.
#[track_caller]
pub(crate) fn from_ingest<T>(result: browscap_ingest::error::Result<T>) -> Result<T> {
    use exn::ResultExt;
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let kind = match &*err {
                browscap_ingest::error::ErrorKind::Io => ErrorKind::Io,
                _ => ErrorKind::MalformedRecord,
            };
            Err(err).or_raise(|| kind)
        },
    }
}

/// Raise a fetch failure; a download that arrived but couldn't be written is
/// a local I/O problem, not a network one.
#[track_caller]
pub(crate) fn from_fetch<T>(result: browscap_fetch::error::Result<T>) -> Result<T> {
    use exn::ResultExt;
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let kind = match &*err {
                browscap_fetch::error::ErrorKind::Write(_) => ErrorKind::Io,
                browscap_fetch::error::ErrorKind::Task => ErrorKind::Task,
                _ => ErrorKind::Network,
            };
            Err(err).or_raise(|| kind)
        },
    }
}
