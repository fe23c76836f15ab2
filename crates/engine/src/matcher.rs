//! User-Agent matching on top of the pattern index.

use crate::cache::VolatileCache;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use browscap_index::Index;
use browscap_ingest::Record;
use exn::ResultExt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::instrument;

/// Longest-match lookup of a User-Agent against stored patterns.
#[async_trait]
pub trait PatternLookup: Send + Sync {
    async fn lookup(&self, user_agent: &str) -> browscap_index::error::Result<Option<Record>>;
}

#[async_trait]
impl PatternLookup for Index {
    async fn lookup(&self, user_agent: &str) -> browscap_index::error::Result<Option<Record>> {
        Index::lookup(self, user_agent).await
    }
}

/// Outcome of matching a User-Agent.
///
/// An unrecognized User-Agent is a regular [`Match::NotFound`], not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Found(Arc<Record>),
    NotFound,
}
impl Match {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Found(record) => Some(&**record),
            Self::NotFound => None,
        }
    }
}
impl From<Option<Record>> for Match {
    fn from(record: Option<Record>) -> Self {
        match record {
            Some(record) => Self::Found(Arc::new(record)),
            None => Self::NotFound,
        }
    }
}

/// Matches User-Agents against a [`PatternLookup`], remembering every answer.
///
/// The store is only consulted on a cache miss; both hits and misses
/// ("not found") are cached. Store failures are returned to the caller and
/// never cached, so a transient error can't turn into a sticky "not found".
pub struct Matcher<L> {
    lookup: L,
    cache: VolatileCache,
}
impl<L: PatternLookup> Matcher<L> {
    pub fn new(lookup: L, capacity: Option<NonZeroUsize>) -> Self {
        Self { lookup, cache: VolatileCache::new(capacity) }
    }

    #[instrument(skip(self))]
    pub async fn match_user_agent(&self, user_agent: &str) -> Result<Match> {
        if let Some(cached) = self.cache.get(user_agent) {
            tracing::debug!(found = cached.is_found(), "Cache hit");
            return Ok(cached);
        }
        // A clear while the store is queried means the answer may predate new
        // index content; it is returned but not remembered.
        let generation = self.cache.generation();
        let result = Match::from(self.lookup.lookup(user_agent).await.or_raise(|| ErrorKind::Storage)?);
        tracing::debug!(found = result.is_found(), "Cache miss");
        Ok(self.cache.insert_at(generation, user_agent, result))
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
