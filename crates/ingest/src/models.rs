use std::fmt;

/// A single matchable entry of the capability database.
///
/// All inherited defaults have already been resolved: every field holds the
/// final value for this pattern, regardless of whether it was written on the
/// row itself or supplied by its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    /// Glob pattern matched against User-Agent strings (unique, never empty).
    pub pattern: String,
    pub platform: String,
    pub browser_name: String,
    /// Version as written in the database, e.g. `"8.0"`.
    pub browser_version: String,
    pub browser_version_major: u32,
    pub browser_version_minor: u32,
    pub is_mobile: bool,
    pub has_javascript: bool,
    pub is_banned: bool,
    pub is_crawler: bool,
    pub is_feed_reader: bool,
}
impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {}) on {}",
            self.browser_name,
            self.browser_version,
            self.browser_version_major,
            self.browser_version_minor,
            self.platform,
        )
    }
}

/// Exclusion switches applied to resolved records during ingestion.
///
/// Each switch set to `true` drops every record with the matching capability.
/// The default excludes everything that is not a regular, JavaScript-capable
/// browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Filters {
    /// Drop known crawlers.
    pub crawlers: bool,
    /// Drop known feed readers.
    pub feed_readers: bool,
    /// Drop banned entries.
    pub banned: bool,
    /// Drop entries without JavaScript support.
    pub no_javascript: bool,
}
impl Default for Filters {
    fn default() -> Self {
        Self {
            crawlers: true,
            feed_readers: true,
            banned: true,
            no_javascript: true,
        }
    }
}
impl Filters {
    /// Keep every record.
    pub fn none() -> Self {
        Self {
            crawlers: false,
            feed_readers: false,
            banned: false,
            no_javascript: false,
        }
    }

    /// Returns `true` if an active switch drops the given record.
    pub fn excludes(&self, record: &Record) -> bool {
        (self.banned && record.is_banned)
            || (self.crawlers && record.is_crawler)
            || (self.feed_readers && record.is_feed_reader)
            || (self.no_javascript && !record.has_javascript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn chrome() -> Record {
        Record {
            pattern: "Mozilla/5.0 (Macintosh; *) Chrome/8.0*".to_string(),
            platform: "MacOSX".to_string(),
            browser_name: "Chrome".to_string(),
            browser_version: "8.0".to_string(),
            browser_version_major: 8,
            browser_version_minor: 0,
            is_mobile: false,
            has_javascript: true,
            is_banned: false,
            is_crawler: false,
            is_feed_reader: false,
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(chrome().to_string(), "Chrome 8.0 (8, 0) on MacOSX");
    }

    #[rstest]
    #[case(Record { is_banned: true, ..chrome() }, Filters { banned: true, ..Filters::none() }, true)]
    #[case(Record { is_banned: true, ..chrome() }, Filters::none(), false)]
    #[case(Record { is_crawler: true, ..chrome() }, Filters { crawlers: true, ..Filters::none() }, true)]
    #[case(Record { is_feed_reader: true, ..chrome() }, Filters { feed_readers: true, ..Filters::none() }, true)]
    #[case(Record { is_feed_reader: true, ..chrome() }, Filters { crawlers: true, ..Filters::none() }, false)]
    #[case(Record { has_javascript: false, ..chrome() }, Filters { no_javascript: true, ..Filters::none() }, true)]
    #[case(chrome(), Filters::default(), false)]
    fn test_filters(#[case] record: Record, #[case] filters: Filters, #[case] excluded: bool) {
        assert_eq!(filters.excludes(&record), excluded);
    }
}
