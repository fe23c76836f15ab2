//! Configuration loading and validation.
//!
//! Values are layered with [`figment`], later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. An optional configuration file (`.toml`, `.yaml`/`.yml` or `.json`).
//! 3. Environment variables prefixed with `BROWSCAP_`, using `__` to reach
//!    nested keys (e.g. `BROWSCAP_CACHE__CAPACITY=10000`).

pub mod error;

use crate::error::{ErrorKind, Result};
use browscap_ingest::Filters;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "BROWSCAP_";
pub const DEFAULT_CSV_URL: &str = "https://browscap.org/stream?q=BrowsCapCSV";
pub const DEFAULT_VERSION_URL: &str = "https://browscap.org/version-number";
/// Remote version checks happen at most once per day.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 86_400;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "browscap", "browscap")
}

fn data_file(name: &str) -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join(name),
        None => PathBuf::from(name),
    }
}

/// Where the capability database comes from and where it is kept locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Local copy of `browscap.csv`.
    pub path: PathBuf,
    /// Download location of the database.
    pub url: String,
    /// Location answering with the current database version number.
    pub version_url: String,
    /// Timeout applied to every HTTP request.
    pub timeout_secs: u64,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: data_file("browscap.csv"),
            url: DEFAULT_CSV_URL.to_string(),
            version_url: DEFAULT_VERSION_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database holding the pattern index.
    pub path: PathBuf,
}
impl Default for IndexConfig {
    fn default() -> Self {
        Self { path: data_file("index.db") }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of User-Agents remembered in memory; unbounded if unset.
    pub capacity: Option<NonZeroUsize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Minimum number of seconds between two remote version checks.
    pub check_interval_secs: u64,
}
impl Default for UpdateConfig {
    fn default() -> Self {
        Self { check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS }
    }
}
impl UpdateConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub index: IndexConfig,
    pub filters: Filters,
    pub cache: CacheConfig,
    pub update: UpdateConfig,
}
impl Config {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the configuration from defaults, an optional file, and the
    /// environment.
    ///
    /// A missing file is not an error (figment treats it as empty), but an
    /// unsupported file extension is.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(
            csv = %config.source.path.display(),
            index = %config.index.path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check values that deserialize fine but can't be used.
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [("source.url", &self.source.url), ("source.version_url", &self.source.version_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                exn::bail!(ErrorKind::Invalid(field));
            }
        }
        if self.source.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("source.path"));
        }
        if self.index.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("index.path"));
        }
        if self.source.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("source.timeout_secs"));
        }
        if self.update.check_interval_secs == 0 {
            exn::bail!(ErrorKind::Invalid("update.check_interval_secs"));
        }
        Ok(())
    }
}
