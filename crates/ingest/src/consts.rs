//! Fixed column layout of `browscap.csv`.

/// Separator between two quoted columns.
pub(crate) const SEPARATOR: &str = "\",\"";
/// Case-insensitive token marking a capability flag as inherited.
pub(crate) const INHERIT: &str = "default";
/// Case-insensitive token for a set capability flag.
pub(crate) const TRUE: &str = "true";

/// Lines preceding the data rows: a header, the version line, and a second
/// header naming the columns.
pub(crate) const HEADER_LINES: u64 = 3;
/// One-based line number of the version line.
pub(crate) const VERSION_LINE: u64 = 2;

pub(crate) const COL_PARENT: usize = 0;
pub(crate) const COL_PATTERN: usize = 1;
pub(crate) const COL_BROWSER: usize = 2;
pub(crate) const COL_VERSION: usize = 3;
pub(crate) const COL_MAJOR: usize = 4;
pub(crate) const COL_MINOR: usize = 5;
pub(crate) const COL_PLATFORM: usize = 6;
pub(crate) const COL_JAVASCRIPT: usize = 18;
pub(crate) const COL_BANNED: usize = 21;
pub(crate) const COL_MOBILE: usize = 22;
pub(crate) const COL_FEED_READER: usize = 23;
pub(crate) const COL_CRAWLER: usize = 24;

/// Minimum number of columns in a data row.
pub(crate) const MIN_COLUMNS: usize = COL_CRAWLER + 1;
