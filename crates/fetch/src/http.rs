//! HTTP source backed by a blocking `ureq` agent.

use crate::error::{ErrorKind, Result};
use crate::{Fetcher, parse_version};
use async_trait::async_trait;
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Fetches the database and its version number over HTTP(S).
///
/// `ureq` is a blocking client, so every transfer runs on Tokio's blocking
/// thread pool. Only a `200 OK` counts as success.
///
/// # Examples
///
/// ```no_run
/// use browscap_fetch::{Fetcher, HttpFetcher};
/// use std::time::Duration;
///
/// # async fn example() -> browscap_fetch::error::Result<()> {
/// let fetcher = HttpFetcher::new(
///     "https://browscap.org/stream?q=BrowsCapCSV",
///     "https://browscap.org/version-number",
///     Duration::from_secs(30),
/// );
/// let version = fetcher.fetch_version().await?;
/// println!("remote version: {version}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpFetcher {
    name: String,
    agent: ureq::Agent,
    csv_url: String,
    version_url: String,
}
impl HttpFetcher {
    pub fn new(csv_url: impl Into<String>, version_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: "http".to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            csv_url: csv_url.into(),
            version_url: version_url.into(),
        }
    }

    /// Change the name used in log output.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn get(agent: &ureq::Agent, url: &str) -> Result<ureq::Response> {
        match agent.get(url).call() {
            Ok(response) if response.status() == 200 => Ok(response),
            Ok(response) => exn::bail!(ErrorKind::Status(response.status())),
            Err(ureq::Error::Status(code, _)) => exn::bail!(ErrorKind::Status(code)),
            Err(err) => Err(err).or_raise(|| ErrorKind::Network(url.to_string())),
        }
    }

    fn download(agent: &ureq::Agent, url: &str, destination: &Path) -> Result<u64> {
        let response = Self::get(agent, url)?;
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory).or_raise(|| ErrorKind::Write(destination.to_path_buf()))?;
        // Stage the body next to the destination so that the final rename
        // stays on one filesystem and a broken transfer never truncates the
        // previous database.
        let mut staged = NamedTempFile::new_in(&directory).or_raise(|| ErrorKind::Write(destination.to_path_buf()))?;
        let bytes = std::io::copy(&mut response.into_reader(), &mut staged)
            .or_raise(|| ErrorKind::Network(url.to_string()))?;
        staged.flush().or_raise(|| ErrorKind::Write(destination.to_path_buf()))?;
        staged.persist(destination).or_raise(|| ErrorKind::Write(destination.to_path_buf()))?;
        Ok(bytes)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_version(&self) -> Result<u32> {
        let agent = self.agent.clone();
        let url = self.version_url.clone();
        let version = tokio::task::spawn_blocking(move || -> Result<u32> {
            let body = Self::get(&agent, &url)?.into_string().or_raise(|| ErrorKind::Network(url.clone()))?;
            parse_version(&body)
        })
        .await
        .or_raise(|| ErrorKind::Task)??;
        tracing::debug!(source = %self.name, version, "Fetched remote version");
        Ok(version)
    }

    async fn fetch_and_store(&self, destination: &Path) -> Result<u64> {
        let agent = self.agent.clone();
        let url = self.csv_url.clone();
        let target = destination.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || Self::download(&agent, &url, &target))
            .await
            .or_raise(|| ErrorKind::Task)??;
        tracing::debug!(source = %self.name, path = %destination.display(), bytes, "Stored response body");
        Ok(bytes)
    }
}
