//! Streaming parser for `browscap.csv`.
//!
//! Rows are resolved as a fold: each row is combined with the field set of
//! the most recent default provider (the "parent"), producing either a new
//! parent or a finished [`Record`]. The parent is plain data owned by the
//! [`Ingest`] iterator; nothing survives between two runs over the text.

use crate::consts::*;
use crate::error::{ErrorKind, Result};
use crate::models::{Filters, Record};
use exn::{OptionExt, ResultExt};
use std::borrow::Cow;
use std::io::BufRead;
use tracing::instrument;

/// Resolved field set of the current default provider.
///
/// Before the first default provider is seen, everything is empty or zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Defaults {
    browser_name: String,
    browser_version: String,
    major: u32,
    minor: u32,
    platform: String,
    has_javascript: bool,
    is_banned: bool,
    is_mobile: bool,
    is_feed_reader: bool,
    is_crawler: bool,
}

/// Outcome of resolving a single data row against its parent.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The row only supplies defaults for the rows that follow it.
    Parent(Defaults),
    /// The row is a matchable entry.
    Leaf(Record),
}

/// Split a quoted row into its columns.
fn split(line: &str) -> Vec<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let line = line.strip_prefix('"').unwrap_or(line);
    let line = line.strip_suffix('"').unwrap_or(line);
    line.split(SEPARATOR).collect()
}

fn text(column: &str, inherited: &str) -> String {
    let value = if column.is_empty() { inherited } else { column };
    value.to_string()
}

fn number(column: &str, inherited: u32, line: u64, field: &'static str) -> u32 {
    if column.is_empty() {
        return inherited;
    }
    column.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(line, field, value = column, "Non-numeric version component; using 0");
        0
    })
}

fn flag(column: &str, inherited: bool) -> bool {
    if column.eq_ignore_ascii_case(INHERIT) {
        inherited
    } else {
        column.eq_ignore_ascii_case(TRUE)
    }
}

/// Resolve one data row against the current parent.
pub(crate) fn resolve(parent: &Defaults, line: u64, columns: &[&str]) -> Result<Resolved> {
    if columns.len() < MIN_COLUMNS {
        exn::bail!(ErrorKind::MalformedRecord {
            line,
            reason: format!("expected at least {MIN_COLUMNS} columns, found {}", columns.len()),
        });
    }
    let resolved = Defaults {
        browser_name: text(columns[COL_BROWSER], &parent.browser_name),
        browser_version: text(columns[COL_VERSION], &parent.browser_version),
        major: number(columns[COL_MAJOR], parent.major, line, "major"),
        minor: number(columns[COL_MINOR], parent.minor, line, "minor"),
        platform: text(columns[COL_PLATFORM], &parent.platform),
        has_javascript: flag(columns[COL_JAVASCRIPT], parent.has_javascript),
        is_banned: flag(columns[COL_BANNED], parent.is_banned),
        is_mobile: flag(columns[COL_MOBILE], parent.is_mobile),
        is_feed_reader: flag(columns[COL_FEED_READER], parent.is_feed_reader),
        is_crawler: flag(columns[COL_CRAWLER], parent.is_crawler),
    };
    if columns[COL_PARENT] == columns[COL_PATTERN] {
        return Ok(Resolved::Parent(resolved));
    }
    let pattern = columns[COL_PATTERN].replace(['[', ']'], "");
    if pattern.is_empty() {
        exn::bail!(ErrorKind::MalformedRecord { line, reason: "empty pattern".to_string() });
    }
    Ok(Resolved::Leaf(Record {
        pattern,
        platform: resolved.platform,
        browser_name: resolved.browser_name,
        browser_version: resolved.browser_version,
        browser_version_major: resolved.major,
        browser_version_minor: resolved.minor,
        is_mobile: resolved.is_mobile,
        has_javascript: resolved.has_javascript,
        is_banned: resolved.is_banned,
        is_crawler: resolved.is_crawler,
        is_feed_reader: resolved.is_feed_reader,
    }))
}

/// Thread the parent through one row: returns the parent for the next row,
/// and the record produced by this row (if any).
pub(crate) fn step(parent: Defaults, line: u64, columns: &[&str]) -> Result<(Defaults, Option<Record>)> {
    Ok(match resolve(&parent, line, columns)? {
        Resolved::Parent(next) => (next, None),
        Resolved::Leaf(record) => (parent, Some(record)),
    })
}

fn parse_version(line: &str) -> Result<u32> {
    let first = split(line).into_iter().next().unwrap_or_default();
    first.trim().parse::<u32>().or_raise(|| ErrorKind::MissingVersion)
}

/// Read only the embedded database version (second line of the text).
pub fn read_version<R: BufRead>(reader: R) -> Result<u32> {
    let mut lines = TextLines::new(reader);
    let mut version_line = None;
    for _ in 0..VERSION_LINE {
        version_line = Some(lines.next().ok_or_raise(|| ErrorKind::MissingVersion)??);
    }
    parse_version(&version_line.unwrap_or_default())
}

/// Lines of the text with their terminator (`\n` or `\r\n`) removed.
///
/// Decoding is lenient: bytes that aren't valid UTF-8 are replaced with
/// U+FFFD instead of failing the whole read. Only an unreadable source is an
/// error.
struct TextLines<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
}
impl<R: BufRead> TextLines<R> {
    fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new(), line: 0 }
    }
}
impl<R: BufRead> Iterator for TextLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf).or_raise(|| ErrorKind::Io) {
            Ok(0) => return None,
            Ok(_) => {},
            Err(err) => return Some(Err(err)),
        }
        self.line += 1;
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        let text = String::from_utf8_lossy(&self.buf);
        if let Cow::Owned(_) = text {
            tracing::warn!(line = self.line, "Replaced invalid UTF-8 in capability database");
        }
        Some(Ok(text.into_owned()))
    }
}

/// Lazy sequence of finished records read from a capability database.
///
/// The header lines are consumed on construction so that the embedded
/// version is known up front. Iteration yields every leaf record that
/// passes the [`Filters`]; default-provider rows are folded into the parent
/// state and never yielded. After the first error the iterator is exhausted.
pub struct Ingest<R> {
    lines: TextLines<R>,
    version: u32,
    parent: Defaults,
    filters: Filters,
    failed: bool,
}
impl<R: BufRead> Ingest<R> {
    pub fn new(reader: R, filters: Filters) -> Result<Self> {
        let mut lines = TextLines::new(reader);
        let mut version = None;
        while lines.line < HEADER_LINES {
            let Some(text) = lines.next() else {
                break;
            };
            let text = text?;
            if lines.line == VERSION_LINE {
                version = Some(parse_version(&text)?);
            }
        }
        Ok(Self {
            lines,
            version: version.ok_or_raise(|| ErrorKind::MissingVersion)?,
            parent: Defaults::default(),
            filters,
            failed: false,
        })
    }

    /// Version number embedded in the database.
    pub fn version(&self) -> u32 {
        self.version
    }
}
impl<R: BufRead> Iterator for Ingest<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                },
            };
            if text.trim().is_empty() {
                continue;
            }
            let parent = std::mem::take(&mut self.parent);
            let (parent, record) = match step(parent, self.lines.line, &split(&text)) {
                Ok(next) => next,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                },
            };
            self.parent = parent;
            match record {
                Some(record) if self.filters.excludes(&record) => continue,
                Some(record) => return Some(Ok(record)),
                None => continue,
            }
        }
    }
}

/// Parse an in-memory capability database into its version and records.
#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_str(text: &str, filters: Filters) -> Result<(u32, Vec<Record>)> {
    let ingest = Ingest::new(text.as_bytes(), filters)?;
    let version = ingest.version();
    let records = ingest.collect::<Result<Vec<_>>>()?;
    tracing::debug!(version, records = records.len(), "Parsed capability database");
    Ok((version, records))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    const HEADER: &str = "\"GJK_Browscap_Version\",\"GJK_Browscap_Version\"\n\"4594\",\"Mon, 29 Nov 2010 23:12:55 -0000\"\n\"Parent\",\"PropertyName\",\"Browser\"\n";

    /// Build a full-width row. `fields` is browser, version, major, minor,
    /// platform; `flags` is JavaScript, banned, mobile, feed reader, crawler.
    pub(crate) fn row(parent: &str, pattern: &str, fields: [&str; 5], flags: [&str; 5]) -> String {
        let mut columns = vec!["false"; 27];
        columns[COL_PARENT] = parent;
        columns[COL_PATTERN] = pattern;
        columns[COL_BROWSER] = fields[0];
        columns[COL_VERSION] = fields[1];
        columns[COL_MAJOR] = fields[2];
        columns[COL_MINOR] = fields[3];
        columns[COL_PLATFORM] = fields[4];
        columns[COL_JAVASCRIPT] = flags[0];
        columns[COL_BANNED] = flags[1];
        columns[COL_MOBILE] = flags[2];
        columns[COL_FEED_READER] = flags[3];
        columns[COL_CRAWLER] = flags[4];
        format!("\"{}\"", columns.join(SEPARATOR))
    }

    fn database(rows: &[String]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    const INHERIT_ALL: [&str; 5] = ["default"; 5];
    const EMPTY: [&str; 5] = [""; 5];

    fn chrome_parent() -> String {
        row("Chrome 8.0", "Chrome 8.0", ["Chrome", "8.0", "8", "0", ""], ["true", "false", "false", "false", "false"])
    }

    #[test]
    fn test_version_is_captured() {
        let (version, records) = parse_str(HEADER, Filters::none()).unwrap();
        assert_eq!(version, 4594);
        assert!(records.is_empty());
    }

    #[test]
    fn test_read_version_only_reads_header() {
        // Garbage after the version line is never touched.
        let text = format!("{HEADER}not a row at all\n");
        assert_eq!(read_version(text.as_bytes()).unwrap(), 4594);
    }

    #[rstest]
    #[case("")]
    #[case("\"GJK_Browscap_Version\"\n")]
    #[case("\"GJK_Browscap_Version\"\n\"four\",\"date\"\n")]
    fn test_missing_version(#[case] text: &str) {
        let err = read_version(text.as_bytes()).unwrap_err();
        assert_eq!(*err, ErrorKind::MissingVersion);
        let err = Ingest::new(text.as_bytes(), Filters::none()).err().unwrap();
        assert_eq!(*err, ErrorKind::MissingVersion);
    }

    #[test]
    fn test_children_inherit_from_parent() {
        let text = database(&[
            chrome_parent(),
            row("Chrome 8.0", "Mozilla/5.0 (Macintosh; *) Chrome/8.0*", ["", "", "", "", "MacOSX"], INHERIT_ALL),
        ]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.pattern, "Mozilla/5.0 (Macintosh; *) Chrome/8.0*");
        assert_eq!(record.browser_name, "Chrome");
        assert_eq!(record.browser_version, "8.0");
        assert_eq!(record.browser_version_major, 8);
        assert_eq!(record.browser_version_minor, 0);
        assert_eq!(record.platform, "MacOSX");
        assert!(record.has_javascript);
        assert!(!record.is_mobile);
    }

    #[test]
    fn test_explicit_values_override_parent() {
        let text = database(&[
            chrome_parent(),
            row(
                "Chrome 8.0",
                "Mozilla/5.0 (Linux; *) Chrome/8.1*",
                ["Chromium", "8.1", "8", "1", "Linux"],
                ["false", "default", "TRUE", "default", "default"],
            ),
        ]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        let record = &records[0];
        assert_eq!(record.browser_name, "Chromium");
        assert_eq!(record.browser_version, "8.1");
        assert_eq!(record.browser_version_minor, 1);
        assert_eq!(record.platform, "Linux");
        assert!(!record.has_javascript);
        assert!(record.is_mobile);
    }

    #[test]
    fn test_nearest_parent_wins() {
        let text = database(&[
            chrome_parent(),
            row("Firefox 3.6", "Firefox 3.6", ["Firefox", "3.6", "3", "6", ""], INHERIT_ALL),
            row("Firefox 3.6", "Mozilla/5.0 (Windows; *) Firefox/3.6*", ["", "", "", "", "Win7"], INHERIT_ALL),
        ]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].browser_name, "Firefox");
        assert_eq!(records[0].browser_version_major, 3);
        // Flags marked "default" on the parent came from the previous parent.
        assert!(records[0].has_javascript);
    }

    #[test]
    fn test_initial_parent_is_empty() {
        let text = database(&[row("Orphan", "Orphan/*", EMPTY, INHERIT_ALL)]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        let record = &records[0];
        assert_eq!(record.browser_name, "");
        assert_eq!(record.browser_version_major, 0);
        assert!(!record.has_javascript && !record.is_banned && !record.is_crawler);
    }

    #[test]
    fn test_parents_are_never_yielded() {
        let text = database(&[chrome_parent()]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_brackets_are_stripped() {
        let text = database(&[
            chrome_parent(),
            row("Chrome 8.0", "Mozilla/5.0 [en] Chrome/8.0*", EMPTY, INHERIT_ALL),
        ]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(records[0].pattern, "Mozilla/5.0 en Chrome/8.0*");
    }

    #[test]
    fn test_short_row_is_malformed() {
        let text = format!("{HEADER}{}\n\"Chrome 8.0\",\"Short/*\",\"Chrome\"\n", chrome_parent());
        let mut ingest = Ingest::new(text.as_bytes(), Filters::none()).unwrap();
        let err = ingest.next().unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedRecord { line: 5, .. }));
        assert!(ingest.next().is_none());
    }

    #[test]
    fn test_empty_pattern_is_malformed() {
        let text = database(&[chrome_parent(), row("Chrome 8.0", "[]", EMPTY, INHERIT_ALL)]);
        let err = parse_str(&text, Filters::none()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedRecord { line: 5, .. }));
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let text = database(&[chrome_parent(), String::new(), row("Chrome 8.0", "A*", EMPTY, INHERIT_ALL)])
            .replace('\n', "\r\n");
        let (version, records) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(version, 4594);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pattern, "A*");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = database(&[chrome_parent()]).into_bytes();
        bytes.extend_from_slice(b"\"Chrome 8.0\",\"Caf");
        bytes.push(0xE9);
        let tail = row("Chrome 8.0", "/*", EMPTY, INHERIT_ALL);
        bytes.extend_from_slice(&tail.as_bytes()["\"Chrome 8.0\",\"".len()..]);
        bytes.push(b'\n');
        bytes.extend_from_slice(row("Chrome 8.0", "After*", EMPTY, INHERIT_ALL).as_bytes());
        bytes.push(b'\n');

        let ingest = Ingest::new(bytes.as_slice(), Filters::none()).unwrap();
        let records = ingest.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pattern, "Caf\u{FFFD}/*");
        assert_eq!(records[0].browser_name, "Chrome");
        assert_eq!(records[1].pattern, "After*");
    }

    #[test]
    fn test_invalid_utf8_in_header_keeps_version() {
        let mut bytes = b"\"GJK_Browscap_Version\",\"\xFF\"\n".to_vec();
        bytes.extend_from_slice(b"\"4594\",\"Mon, 29 Nov 2010\"\n");
        assert_eq!(read_version(bytes.as_slice()).unwrap(), 4594);
    }

    #[test]
    fn test_non_numeric_version_component_is_zero() {
        let text = database(&[row("Odd", "Odd/*", ["Odd", "1.x", "1", "x", ""], INHERIT_ALL)]);
        let (_, records) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(records[0].browser_version_major, 1);
        assert_eq!(records[0].browser_version_minor, 0);
    }

    #[test]
    fn test_filters_are_applied() {
        let text = database(&[
            chrome_parent(),
            row("Chrome 8.0", "Banned/*", EMPTY, ["default", "true", "default", "default", "default"]),
            row("Chrome 8.0", "Crawler/*", EMPTY, ["default", "default", "default", "default", "true"]),
            row("Chrome 8.0", "Feed/*", EMPTY, ["default", "default", "default", "true", "default"]),
            row("Chrome 8.0", "NoScript/*", EMPTY, ["false", "default", "default", "default", "default"]),
            row("Chrome 8.0", "Regular/*", EMPTY, INHERIT_ALL),
        ]);
        let (_, all) = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(all.len(), 5);
        let (_, kept) = parse_str(&text, Filters::default()).unwrap();
        assert_eq!(kept.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(), vec!["Regular/*"]);
        let (_, kept) = parse_str(&text, Filters { banned: true, ..Filters::none() }).unwrap();
        assert!(kept.iter().all(|r| r.pattern != "Banned/*"));
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn test_filtered_parent_still_provides_defaults() {
        // A parent whose own flags would be filtered still seeds its children.
        let text = database(&[
            row("Bots", "Bots", ["Bot", "1.0", "1", "0", "unknown"], ["false", "false", "false", "false", "true"]),
            row("Bots", "Mozilla/5.0 (compatible; Friendly/*)", EMPTY, ["true", "default", "default", "default", "false"]),
        ]);
        let (_, records) = parse_str(&text, Filters::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].browser_name, "Bot");
        assert!(!records[0].is_crawler);
    }

    #[test]
    fn test_step_threads_parent() {
        let parent = row("P", "P", ["Browser", "2.5", "2", "5", "Plat"], ["true", "false", "true", "false", "false"]);
        let leaf = row("P", "Leaf*", EMPTY, INHERIT_ALL);
        let (defaults, record) = step(Defaults::default(), 4, &split(&parent)).unwrap();
        assert!(record.is_none());
        let (after, record) = step(defaults.clone(), 5, &split(&leaf)).unwrap();
        assert_eq!(after, defaults);
        let record = record.unwrap();
        assert_eq!(record.to_string(), "Browser 2.5 (2, 5) on Plat");
        assert!(record.is_mobile);
    }

    #[test]
    fn test_parsing_is_restartable() {
        let text = database(&[chrome_parent(), row("Chrome 8.0", "A*", EMPTY, INHERIT_ALL)]);
        let first = parse_str(&text, Filters::none()).unwrap();
        let second = parse_str(&text, Filters::none()).unwrap();
        assert_eq!(first, second);
    }
}
