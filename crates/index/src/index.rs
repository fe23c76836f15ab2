//! Pattern index over the browscap records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{CheckMarkers, Marker, RecordRow};
use browscap_ingest::Record;
use exn::ResultExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

/// Persistent `pattern → record` store with longest-match lookup.
///
/// Besides the records, the same table holds the reserved [`Marker`] rows:
/// the version the index was built from and the bookkeeping of the last
/// remote version check. Those are only reachable through the typed
/// accessors below, and are never returned by [`lookup`](Self::lookup).
#[derive(Debug, Clone)]
pub struct Index {
    pool: SqlitePool,
}
impl From<&Database> for Index {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Index {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // A deferred transaction that reads first can't be upgraded to a writer
    // once another writer has committed, and fails without waiting out the
    // busy timeout. Take the write lock up front instead.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Replace the whole index with the given records.
    ///
    /// The records are written into a fresh table which is swapped in for the
    /// live one within the same transaction, so concurrent lookups observe
    /// either the previous or the new content. If a pattern occurs more than
    /// once, the first occurrence is kept. Version-check bookkeeping is carried
    /// over from the previous content.
    ///
    /// Returns the number of stored records.
    #[instrument(skip(self, records))]
    pub async fn rebuild(&self, records: impl IntoIterator<Item = Record>, version: u32) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        sqlx::query("DROP TABLE IF EXISTS browscap_next;")
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/create_next.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut stored = 0u64;
        for record in records {
            if Marker::is_reserved(&record.pattern) || record.pattern.is_empty() {
                tracing::warn!(pattern = %record.pattern, "Skipping record with a reserved or empty pattern");
                continue;
            }
            let row = RecordRow::from(&record);
            let result = sqlx::query(include_str!("../queries/insert_record.sql"))
                .bind(row.pattern)
                .bind(row.platform)
                .bind(row.browser_name)
                .bind(row.browser_version)
                .bind(row.browser_version_major)
                .bind(row.browser_version_minor)
                .bind(row.is_mobile)
                .bind(row.has_javascript)
                .bind(row.is_banned)
                .bind(row.is_crawler)
                .bind(row.is_feed_reader)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            stored += result.rows_affected();
        }
        sqlx::query(include_str!("../queries/insert_next_marker.sql"))
            .bind(Marker::IndexVersion.key())
            .bind(version.to_string())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/carry_markers.sql"))
            .bind(Marker::LastCheck.key())
            .bind(Marker::LastRemoteVersion.key())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/swap_tables.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(version, records = stored, "Rebuilt pattern index");
        Ok(stored)
    }

    // =========================================================================
    // Markers
    // =========================================================================

    async fn marker(&self, marker: Marker) -> Result<Option<String>> {
        sqlx::query_scalar(include_str!("../queries/get_marker.sql"))
            .bind(marker.key())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Version of the database the index was built from, if it was built.
    pub async fn version(&self) -> Result<Option<u32>> {
        self.marker(Marker::IndexVersion)
            .await?
            .map(|value| value.parse::<u32>().or_raise(|| ErrorKind::InvalidData("index version")))
            .transpose()
    }

    /// Bookkeeping of the last remote version check, if one was recorded.
    pub async fn check_markers(&self) -> Result<Option<CheckMarkers>> {
        let Some(checked_at) = self.marker(Marker::LastCheck).await? else {
            return Ok(None);
        };
        let version = match self.marker(Marker::LastRemoteVersion).await? {
            Some(value) => CheckMarkers::decode_version(&value)?,
            None => None,
        };
        Ok(Some(CheckMarkers {
            checked_at: CheckMarkers::decode_timestamp(&checked_at)?,
            version,
        }))
    }

    /// Record the outcome of a remote version check.
    #[instrument(skip(self))]
    pub async fn set_check_markers(&self, markers: CheckMarkers) -> Result<()> {
        let mut tx = self.begin_write().await?;
        sqlx::query(include_str!("../queries/upsert_marker.sql"))
            .bind(Marker::LastCheck.key())
            .bind(markers.checked_at.unix_timestamp().to_string())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/upsert_marker.sql"))
            .bind(Marker::LastRemoteVersion.key())
            .bind(CheckMarkers::encode_version(markers.version))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Find the record whose pattern is the longest glob match for the
    /// User-Agent.
    ///
    /// Among several matching patterns of equal length, the lexicographically
    /// smallest one is returned. Matching is case-sensitive.
    pub async fn lookup(&self, user_agent: &str) -> Result<Option<Record>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/lookup.sql"))
            .bind(user_agent)
            .bind(Marker::IndexVersion.key())
            .bind(Marker::LastCheck.key())
            .bind(Marker::LastRemoteVersion.key())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Record::try_from).transpose()
    }

    /// Number of matchable records.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_records.sql"))
            .bind(Marker::IndexVersion.key())
            .bind(Marker::LastCheck.key())
            .bind(Marker::LastRemoteVersion.key())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("record count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::{Duration, UtcDateTime};

    fn record(pattern: &str, browser: &str) -> Record {
        Record {
            pattern: pattern.to_string(),
            platform: "MacOSX".to_string(),
            browser_name: browser.to_string(),
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

    async fn index() -> Index {
        let db = Database::connect_in_memory().await.unwrap();
        Index::from(&db)
    }

    #[tokio::test]
    async fn test_empty_index() {
        let index = index().await;
        assert_eq!(index.version().await.unwrap(), None);
        assert_eq!(index.check_markers().await.unwrap(), None);
        assert_eq!(index.lookup("Mozilla/5.0").await.unwrap(), None);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_stores_records_and_version() {
        let index = index().await;
        let stored = index.rebuild([record("A*", "A"), record("B*", "B")], 4594).await.unwrap();
        assert_eq!(stored, 2);
        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.version().await.unwrap(), Some(4594));
    }

    #[tokio::test]
    async fn test_longest_pattern_wins() {
        let index = index().await;
        index.rebuild([record("A*", "Short"), record("ABC*", "Long")], 1).await.unwrap();
        let found = index.lookup("ABCDEF").await.unwrap().unwrap();
        assert_eq!(found.pattern, "ABC*");
        assert_eq!(found.browser_name, "Long");
        let found = index.lookup("AXYZ").await.unwrap().unwrap();
        assert_eq!(found.browser_name, "Short");
    }

    #[tokio::test]
    async fn test_equal_length_tie_is_lexicographic() {
        let index = index().await;
        index.rebuild([record("AB?", "Second"), record("A?C", "First")], 1).await.unwrap();
        let found = index.lookup("ABC").await.unwrap().unwrap();
        assert_eq!(found.pattern, "A?C");
    }

    #[rstest]
    #[case("Mozilla/5.0 (X11; Linux)", "Mozilla/5.0 (*)", true)]
    #[case("mozilla/5.0 (X11; Linux)", "Mozilla/5.0 (*)", false)]
    #[case("Opera/9.80", "Opera/?.??", true)]
    #[case("Opera/9.8", "Opera/?.??", false)]
    #[case("Browser/7", "Browser/[0-9]", true)]
    #[case("Browser/x", "Browser/[0-9]", false)]
    #[tokio::test]
    async fn test_glob_semantics(#[case] user_agent: &str, #[case] pattern: &str, #[case] matches: bool) {
        let index = index().await;
        index.rebuild([record(pattern, "Test")], 1).await.unwrap();
        assert_eq!(index.lookup(user_agent).await.unwrap().is_some(), matches);
    }

    #[tokio::test]
    async fn test_markers_never_match() {
        let index = index().await;
        index.rebuild([record("*", "Catch-all")], 1).await.unwrap();
        index
            .set_check_markers(CheckMarkers { checked_at: UtcDateTime::now(), version: Some(1) })
            .await
            .unwrap();
        // Even a User-Agent spelled exactly like a marker key hits the real pattern.
        for marker in Marker::ALL {
            let found = index.lookup(marker.key()).await.unwrap().unwrap();
            assert_eq!(found.pattern, "*");
        }
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reserved_patterns_are_skipped() {
        let index = index().await;
        let stored = index.rebuild([record(Marker::IndexVersion.key(), "Evil"), record("", "Empty")], 7).await.unwrap();
        assert_eq!(stored, 0);
        assert_eq!(index.version().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_duplicate_patterns_keep_first() {
        let index = index().await;
        let stored = index.rebuild([record("A*", "First"), record("A*", "Second")], 1).await.unwrap();
        assert_eq!(stored, 1);
        assert_eq!(index.lookup("AB").await.unwrap().unwrap().browser_name, "First");
    }

    #[tokio::test]
    async fn test_rebuild_replaces_content() {
        let index = index().await;
        index.rebuild([record("Old*", "Old")], 1).await.unwrap();
        index.rebuild([record("New*", "New")], 2).await.unwrap();
        assert_eq!(index.lookup("Old/1.0").await.unwrap(), None);
        assert!(index.lookup("New/1.0").await.unwrap().is_some());
        assert_eq!(index.version().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let index = index().await;
        let records = vec![record("A*", "A"), record("ABC*", "ABC"), record("*Z", "Z")];
        let user_agents = ["ABCD", "AZ", "XYZ", "nothing"];
        index.rebuild(records.clone(), 3).await.unwrap();
        let mut first = Vec::new();
        for user_agent in user_agents {
            first.push(index.lookup(user_agent).await.unwrap());
        }
        index.rebuild(records, 3).await.unwrap();
        for (user_agent, expected) in user_agents.into_iter().zip(first) {
            assert_eq!(index.lookup(user_agent).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_check_markers_round_trip_and_survive_rebuild() {
        let index = index().await;
        let checked_at = UtcDateTime::now().replace_nanosecond(0).unwrap() - Duration::hours(2);
        let markers = CheckMarkers { checked_at, version: None };
        index.set_check_markers(markers).await.unwrap();
        assert_eq!(index.check_markers().await.unwrap(), Some(markers));
        index.rebuild([record("A*", "A")], 5).await.unwrap();
        assert_eq!(index.check_markers().await.unwrap(), Some(markers));
        let markers = CheckMarkers { checked_at, version: Some(5) };
        index.set_check_markers(markers).await.unwrap();
        assert_eq!(index.check_markers().await.unwrap(), Some(markers));
    }

    #[tokio::test]
    async fn test_record_survives_storage() {
        let index = index().await;
        let original = Record {
            is_mobile: true,
            is_crawler: true,
            browser_version_minor: 42,
            ..record("Mobile*", "Mobile")
        };
        index.rebuild([original.clone()], 1).await.unwrap();
        assert_eq!(index.lookup("Mobile Safari").await.unwrap(), Some(original));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rebuilds_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("index.db")).await.unwrap();
        let index = Index::from(&db);
        for round in 0..5u32 {
            let writers: Vec<_> = (0..2u32)
                .map(|writer| {
                    let index = index.clone();
                    let records: Vec<_> =
                        (0..3000).map(|i| record(&format!("W{writer}R{i:04}*"), "Concurrent")).collect();
                    tokio::spawn(async move { index.rebuild(records, round * 2 + writer).await })
                })
                .collect();
            let checker = {
                let index = index.clone();
                tokio::spawn(async move {
                    index.set_check_markers(CheckMarkers { checked_at: UtcDateTime::now(), version: Some(round) }).await
                })
            };
            for writer in writers {
                assert_eq!(writer.await.unwrap().unwrap(), 3000);
            }
            checker.await.unwrap().unwrap();
            assert_eq!(index.count().await.unwrap(), 3000);
            assert_eq!(index.check_markers().await.unwrap().unwrap().version, Some(round));
        }
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lookups_during_rebuild_see_whole_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("index.db")).await.unwrap();
        let index = Index::from(&db);
        let old: Vec<_> = (0..200).map(|i| record(&format!("Old{i:03}*"), "Old")).collect();
        index.rebuild(old, 1).await.unwrap();
        let new: Vec<_> = (0..200).map(|i| record(&format!("New{i:03}*"), "New")).collect();
        let writer = {
            let index = index.clone();
            tokio::spawn(async move { index.rebuild(new, 2).await.unwrap() })
        };
        for _ in 0..20 {
            let count = index.count().await.unwrap();
            assert_eq!(count, 200, "a reader must never see a partially built table");
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(index.version().await.unwrap(), Some(2));
        assert!(index.lookup("New199/1").await.unwrap().is_some());
        db.close().await;
    }
}
