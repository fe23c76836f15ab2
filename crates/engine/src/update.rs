//! Keeping the local capability database and its index current.

use crate::error::{ErrorKind, Result, from_fetch, from_ingest};
use browscap_fetch::FetcherHandle;
use browscap_index::{CheckMarkers, Index};
use browscap_ingest::{Filters, Ingest, Record, parse_str, read_version};
use exn::ResultExt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcDateTime;
use tracing::instrument;

/// Minimum time between two remote version checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Decides whether the local `browscap.csv` and the index built from it are
/// stale, and refreshes them.
///
/// Remote version checks are rate-limited: their outcome is stored in the
/// index and reused until the check interval has passed.
pub struct Updater {
    csv_path: PathBuf,
    index: Index,
    fetcher: FetcherHandle,
    filters: Filters,
    check_interval: Duration,
}
impl Updater {
    pub fn new(csv_path: impl Into<PathBuf>, index: Index, fetcher: FetcherHandle) -> Self {
        Self {
            csv_path: csv_path.into(),
            index,
            fetcher,
            filters: Filters::default(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Filters applied when the index is built from the local CSV.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    // =========================================================================
    // Versions
    // =========================================================================

    /// Version embedded in the local CSV; `None` if the file is missing or
    /// unreadable.
    #[instrument(skip(self), fields(path = %self.csv_path.display()))]
    pub async fn source_version(&self) -> Option<u32> {
        let path = self.csv_path.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<Option<u32>> {
            if !path.exists() {
                return Ok(None);
            }
            let file = File::open(&path).or_raise(|| ErrorKind::Io)?;
            from_ingest(read_version(BufReader::new(file))).map(Some)
        })
        .await
        .or_raise(|| ErrorKind::Task);
        match result {
            Ok(Ok(version)) => version,
            Ok(Err(err)) | Err(err) => {
                tracing::warn!(error = ?err, "Unable to read the capability database version");
                None
            },
        }
    }

    /// Version the index was built from; `None` if it hasn't been built.
    pub async fn index_version(&self) -> Result<Option<u32>> {
        self.index.version().await.or_raise(|| ErrorKind::Storage)
    }

    /// Version of the newest published database; `None` if the remote
    /// couldn't tell.
    ///
    /// Asks the remote at most once per check interval; within the interval
    /// the answer of the last check (successful or not) is reused. Every
    /// actual check is recorded in the index.
    #[instrument(skip(self))]
    pub async fn latest_version(&self) -> Result<Option<u32>> {
        let now = UtcDateTime::now();
        if let Some(markers) = self.index.check_markers().await.or_raise(|| ErrorKind::Storage)?
            && now - markers.checked_at < self.check_interval
        {
            tracing::debug!(version = ?markers.version, checked_at = %markers.checked_at, "Reusing last remote version check");
            return Ok(markers.version);
        }
        let version = match self.fetcher.fetch_version().await {
            Ok(version) => {
                tracing::info!(fetcher = self.fetcher.name(), version, "Checked remote version");
                Some(version)
            },
            Err(err) => {
                tracing::warn!(fetcher = self.fetcher.name(), error = ?err, "Remote version check failed");
                None
            },
        };
        self.index
            .set_check_markers(CheckMarkers { checked_at: now, version })
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok(version)
    }

    /// Whether the local CSV is the newest published one.
    ///
    /// An unknown remote version counts as current: network trouble should
    /// not stop a working installation.
    #[instrument(skip(self))]
    pub async fn is_current(&self) -> Result<bool> {
        let local = self.source_version().await;
        let Some(remote) = self.latest_version().await? else {
            tracing::warn!(?local, "Remote version unknown; assuming the local database is current");
            return Ok(true);
        };
        Ok(local == Some(remote))
    }

    /// Whether the index was built from the local CSV as it is now.
    pub async fn index_is_up_to_date(&self) -> Result<bool> {
        let Some(indexed) = self.index_version().await? else {
            return Ok(false);
        };
        Ok(self.source_version().await == Some(indexed))
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Download the newest database to `destination`, returning its size.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn download_update(&self, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io)?;
        }
        let bytes = from_fetch(self.fetcher.fetch_and_store(destination).await)?;
        tracing::info!(fetcher = self.fetcher.name(), bytes, "Downloaded capability database");
        Ok(bytes)
    }

    /// Rebuild the index from the local CSV.
    ///
    /// Without `force`, nothing happens when the index is already up to
    /// date. Returns whether the index was rebuilt.
    #[instrument(skip(self))]
    pub async fn build_index(&self, force: bool) -> Result<bool> {
        if !force && self.index_is_up_to_date().await? {
            tracing::debug!("Index is up to date; not rebuilding");
            return Ok(false);
        }
        let path = self.csv_path.clone();
        let filters = self.filters;
        let (version, records) = tokio::task::spawn_blocking(move || -> Result<(u32, Vec<Record>)> {
            let file = File::open(&path).or_raise(|| ErrorKind::Io)?;
            let ingest = from_ingest(Ingest::new(BufReader::new(file), filters))?;
            let version = ingest.version();
            let records = from_ingest(ingest.collect::<browscap_ingest::error::Result<Vec<_>>>())?;
            Ok((version, records))
        })
        .await
        .or_raise(|| ErrorKind::Task)??;
        self.store(version, records).await?;
        Ok(true)
    }

    /// Rebuild the index from in-memory database text.
    ///
    /// The CSV on disk is neither read nor touched. Returns the number of
    /// stored records.
    #[instrument(skip(self, text), fields(text_size = text.len()))]
    pub async fn rebuild_index(&self, text: String, filters: Filters) -> Result<u64> {
        let (version, records) = tokio::task::spawn_blocking(move || from_ingest(parse_str(&text, filters)))
            .await
            .or_raise(|| ErrorKind::Task)??;
        self.store(version, records).await
    }

    async fn store(&self, version: u32, records: Vec<Record>) -> Result<u64> {
        self.index.rebuild(records, version).await.or_raise(|| ErrorKind::Storage)
    }

    /// Download a newer database if there is one, then make sure the index
    /// matches the local CSV.
    ///
    /// A failed download aborts before the index is touched. Returns whether
    /// the index was rebuilt.
    #[instrument(skip(self))]
    pub async fn self_update(&self) -> Result<bool> {
        if !self.is_current().await? {
            self.download_update(&self.csv_path).await?;
        }
        self.build_index(false).await
    }
}
