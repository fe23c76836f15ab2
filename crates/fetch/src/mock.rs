//! Scripted source for testing.

use crate::Fetcher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory source for testing.
///
/// Serves a fixed version number and database body, either of which can be
/// switched to failing. Every call is counted so tests can assert how often
/// the network would have been hit.
///
/// # Examples
///
/// ```
/// use browscap_fetch::{Fetcher, MockFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = MockFetcher::new(4594, "\"GJK_Browscap_Version\"\n\"4594\"\n");
/// assert_eq!(fetcher.fetch_version().await.unwrap(), 4594);
/// assert_eq!(fetcher.version_calls(), 1);
///
/// fetcher.fail_version().await;
/// assert!(fetcher.fetch_version().await.is_err());
/// # }
/// ```
pub struct MockFetcher {
    version: RwLock<Option<u32>>,
    body: RwLock<Option<Vec<u8>>>,
    version_calls: AtomicUsize,
    download_calls: AtomicUsize,
}
impl MockFetcher {
    pub fn new(version: u32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            version: RwLock::new(Some(version)),
            body: RwLock::new(Some(body.into())),
            version_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    /// Serve a different version number from now on.
    pub async fn set_version(&self, version: u32) {
        *self.version.write().await = Some(version);
    }

    /// Serve a different database body from now on.
    pub async fn set_body(&self, body: impl Into<Vec<u8>>) {
        *self.body.write().await = Some(body.into());
    }

    /// Make every version request fail like an unreachable host.
    pub async fn fail_version(&self) {
        *self.version.write().await = None;
    }

    /// Make every download fail like an unreachable host.
    pub async fn fail_download(&self) {
        *self.body.write().await = None;
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_version(&self) -> Result<u32> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        match *self.version.read().await {
            Some(version) => Ok(version),
            None => exn::bail!(ErrorKind::Network("mock: version unavailable".to_string())),
        }
    }

    async fn fetch_and_store(&self, destination: &Path) -> Result<u64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let Some(body) = self.body.read().await.clone() else {
            exn::bail!(ErrorKind::Network("mock: download unavailable".to_string()));
        };
        tokio::fs::write(destination, &body).await.or_raise(|| ErrorKind::Write(destination.to_path_buf()))?;
        Ok(body.len() as u64)
    }
}
