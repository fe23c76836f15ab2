use crate::error::{Error, ErrorKind};
use browscap_ingest::Record;
use exn::ResultExt;
use time::UtcDateTime;

/// Reserved rows stored alongside the patterns.
///
/// Keys are wrapped in square brackets: ingestion strips brackets from every
/// pattern, so a real pattern can never collide with a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Version of the database the index was built from.
    IndexVersion,
    /// Unix timestamp of the last remote version check.
    LastCheck,
    /// Remote version observed by the last check.
    LastRemoteVersion,
}
impl Marker {
    pub const ALL: [Marker; 3] = [Self::IndexVersion, Self::LastCheck, Self::LastRemoteVersion];

    pub fn key(self) -> &'static str {
        match self {
            Self::IndexVersion => "[browscap:version]",
            Self::LastCheck => "[browscap:last-check]",
            Self::LastRemoteVersion => "[browscap:last-remote-version]",
        }
    }

    /// Returns `true` if the pattern is one of the reserved keys.
    pub fn is_reserved(pattern: &str) -> bool {
        Self::ALL.iter().any(|marker| marker.key() == pattern)
    }
}

/// Bookkeeping of the last remote version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckMarkers {
    /// When the remote was last asked for its version.
    pub checked_at: UtcDateTime,
    /// What it answered; `None` if the check failed.
    pub version: Option<u32>,
}
impl CheckMarkers {
    pub(crate) fn encode_version(version: Option<u32>) -> String {
        version.map(i64::from).unwrap_or(-1).to_string()
    }

    pub(crate) fn decode_version(value: &str) -> Result<Option<u32>, Error> {
        let version = value.parse::<i64>().or_raise(|| ErrorKind::InvalidData("remote version"))?;
        Ok(u32::try_from(version).ok())
    }

    pub(crate) fn decode_timestamp(value: &str) -> Result<UtcDateTime, Error> {
        let timestamp = value.parse::<i64>().or_raise(|| ErrorKind::InvalidData("check timestamp"))?;
        UtcDateTime::from_unix_timestamp(timestamp).or_raise(|| ErrorKind::InvalidData("check timestamp"))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) pattern: String,
    pub(crate) platform: String,
    pub(crate) browser_name: String,
    pub(crate) browser_version: String,
    pub(crate) browser_version_major: i64,
    pub(crate) browser_version_minor: i64,
    pub(crate) is_mobile: bool,
    pub(crate) has_javascript: bool,
    pub(crate) is_banned: bool,
    pub(crate) is_crawler: bool,
    pub(crate) is_feed_reader: bool,
}
impl From<&Record> for RecordRow {
    fn from(record: &Record) -> Self {
        Self {
            pattern: record.pattern.clone(),
            platform: record.platform.clone(),
            browser_name: record.browser_name.clone(),
            browser_version: record.browser_version.clone(),
            browser_version_major: i64::from(record.browser_version_major),
            browser_version_minor: i64::from(record.browser_version_minor),
            is_mobile: record.is_mobile,
            has_javascript: record.has_javascript,
            is_banned: record.is_banned,
            is_crawler: record.is_crawler,
            is_feed_reader: record.is_feed_reader,
        }
    }
}
impl TryFrom<RecordRow> for Record {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            pattern: row.pattern,
            platform: row.platform,
            browser_name: row.browser_name,
            browser_version: row.browser_version,
            browser_version_major: u32::try_from(row.browser_version_major)
                .or_raise(|| ErrorKind::InvalidData("major version"))?,
            browser_version_minor: u32::try_from(row.browser_version_minor)
                .or_raise(|| ErrorKind::InvalidData("minor version"))?,
            is_mobile: row.is_mobile,
            has_javascript: row.has_javascript,
            is_banned: row.is_banned,
            is_crawler: row.is_crawler,
            is_feed_reader: row.is_feed_reader,
        })
    }
}
