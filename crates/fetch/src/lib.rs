//! Retrieval of the remote capability database.
//!
//! The rest of the workspace only needs two things from the network: the
//! version number of the newest published `browscap.csv`, and the file
//! itself. Both are behind the [`Fetcher`] trait so that the update logic can
//! be exercised without a network (see [`MockFetcher`] behind the `mock`
//! feature).

pub mod error;
mod http;
#[cfg(feature = "mock")]
mod mock;

pub use crate::http::HttpFetcher;
#[cfg(feature = "mock")]
pub use crate::mock::MockFetcher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;

pub type FetcherHandle = Arc<dyn Fetcher + Send + Sync>;

/// Source of the remote capability database.
///
/// Calls complete (or fail) before returning; there is no cancellation
/// beyond the implementation's own timeout. Callers that must not wait
/// should spawn the call onto their own task.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of the source (used for logging only).
    fn name(&self) -> &str;

    /// Ask the remote for the version number of its current database.
    async fn fetch_version(&self) -> Result<u32>;

    /// Download the current database to `destination`, replacing any file
    /// already there. Returns the number of bytes written.
    ///
    /// A failed download leaves an existing destination untouched.
    async fn fetch_and_store(&self, destination: &Path) -> Result<u64>;
}

/// Parse the body of a version response: the first line holds the number.
pub(crate) fn parse_version(body: &str) -> Result<u32> {
    let line = body.lines().next().unwrap_or_default().trim();
    line.parse::<u32>().or_raise(|| ErrorKind::InvalidVersion(line.to_string()))
}
