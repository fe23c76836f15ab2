//! User-Agent classification against the browscap capability database.
//!
//! [`Browscap`] ties the pieces of the workspace together: the local
//! `browscap.csv` (kept current through a [`Fetcher`](browscap_fetch::Fetcher)),
//! the persistent pattern [`Index`] built from it, and a [`Matcher`] that
//! answers repeated lookups from memory.
//!
//! ```no_run
//! use browscap::Browscap;
//! use browscap_config::Config;
//!
//! # async fn run() -> browscap::error::Result<()> {
//! let browscap = Browscap::from_config(&Config::load(None).unwrap()).await?;
//! browscap.self_update().await?;
//! let result = browscap
//!     .match_user_agent("Mozilla/5.0 (Windows; U; Windows NT 6.1; en-US; rv:1.9.2.10) Gecko/20100914 Firefox/3.6.10")
//!     .await?;
//! if let Some(record) = result.record() {
//!     println!("{record}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every operation completes before it returns, including network transfers
//! (bounded by the fetcher's timeout). Callers that must not wait should
//! spawn the call onto a task of their own.

mod cache;
pub mod error;
mod matcher;
mod update;

pub use crate::cache::VolatileCache;
pub use crate::matcher::{Match, Matcher, PatternLookup};
pub use crate::update::{DEFAULT_CHECK_INTERVAL, Updater};
pub use browscap_index::Index;
pub use browscap_ingest::{Filters, Record};

use crate::error::{ErrorKind, Result};
use browscap_config::Config;
use browscap_fetch::{FetcherHandle, HttpFetcher};
use browscap_index::Database;
use exn::ResultExt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Settings of a [`Browscap`] that aren't collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Local copy of `browscap.csv`.
    pub csv_path: PathBuf,
    /// Filters applied when the index is built from the local copy.
    pub filters: Filters,
    /// Bound of the in-memory result cache; unbounded if `None`.
    pub cache_capacity: Option<NonZeroUsize>,
    pub check_interval: Duration,
}
impl Options {
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            filters: Filters::default(),
            cache_capacity: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}
impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            csv_path: config.source.path.clone(),
            filters: config.filters,
            cache_capacity: config.cache.capacity,
            check_interval: config.update.check_interval(),
        }
    }
}

/// Browser capability lookups backed by a self-updating local database.
pub struct Browscap {
    updater: Updater,
    matcher: Matcher<Index>,
}
impl Browscap {
    pub fn new(index: Index, fetcher: FetcherHandle, options: Options) -> Self {
        let updater = Updater::new(options.csv_path, index.clone(), fetcher)
            .with_filters(options.filters)
            .with_check_interval(options.check_interval);
        Self { updater, matcher: Matcher::new(index, options.cache_capacity) }
    }

    /// Open (or create) the index database and set up the HTTP source
    /// described by the configuration.
    ///
    /// The configuration is validated first, so one built in code gets the
    /// same checks as one loaded from a file. Nothing is downloaded or built
    /// yet; see [`self_update`](Self::self_update).
    #[instrument(skip(config), fields(index = %config.index.path.display()))]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let db = Database::connect(&config.index.path).await.or_raise(|| ErrorKind::Storage)?;
        let fetcher = HttpFetcher::new(&config.source.url, &config.source.version_url, config.source.timeout());
        Ok(Self::new(Index::from(&db), Arc::new(fetcher), Options::from(config)))
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// Rebuild the index from in-memory database text and exclusion filters.
    ///
    /// Returns the number of stored records.
    pub async fn rebuild_index(&self, text: impl Into<String>, filters: Filters) -> Result<u64> {
        let stored = self
            .updater
            .rebuild_index(text.into(), filters)
            .await
            .inspect_err(|err| tracing::error!(error = ?err, "Unable to rebuild the index"))?;
        self.clear_cache();
        Ok(stored)
    }

    /// Rebuild the index from the local CSV, unless it's up to date and
    /// `force` is not set. Returns whether the index was rebuilt.
    pub async fn build_index(&self, force: bool) -> Result<bool> {
        let rebuilt = self
            .updater
            .build_index(force)
            .await
            .inspect_err(|err| tracing::error!(error = ?err, "Unable to build the index"))?;
        if rebuilt {
            self.clear_cache();
        }
        Ok(rebuilt)
    }

    /// See [`Updater::is_current`].
    pub async fn is_current(&self) -> Result<bool> {
        self.updater
            .is_current()
            .await
            .inspect_err(|err| tracing::error!(error = ?err, "Unable to determine whether the database is current"))
    }

    /// Download a newer database if one is published, then bring the index
    /// in line with the local CSV. Returns whether the index was rebuilt.
    pub async fn self_update(&self) -> Result<bool> {
        let rebuilt = self
            .updater
            .self_update()
            .await
            .inspect_err(|err| tracing::error!(error = ?err, "Self-update failed"))?;
        if rebuilt {
            self.clear_cache();
        }
        Ok(rebuilt)
    }

    /// Find the capabilities of a User-Agent.
    ///
    /// An unknown User-Agent is [`Match::NotFound`]; only a failing index
    /// is an error.
    pub async fn match_user_agent(&self, user_agent: &str) -> Result<Match> {
        self.matcher.match_user_agent(user_agent).await
    }

    pub async fn source_version(&self) -> Option<u32> {
        self.updater.source_version().await
    }

    pub async fn index_version(&self) -> Result<Option<u32>> {
        self.updater.index_version().await
    }

    pub async fn index_is_up_to_date(&self) -> Result<bool> {
        self.updater.index_is_up_to_date().await
    }

    /// Number of User-Agents currently remembered in memory.
    pub fn cached(&self) -> usize {
        self.matcher.len()
    }

    pub fn clear_cache(&self) {
        self.matcher.clear();
    }
}
