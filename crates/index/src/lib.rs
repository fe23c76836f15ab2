//! SQLite pattern index for the browscap capability database.
//!
//! `browscap.csv` patterns are *NIX-style globs and SQLite ships a `GLOB`
//! operator with the same semantics, so the index is a single table keyed by
//! pattern. A lookup asks SQLite for every pattern that globs the User-Agent,
//! ordered by pattern length, and keeps the first (the most specific) one.
//!
//! The index is derived data: if the database file is deleted, it can be
//! rebuilt from `browscap.csv` at any time.

mod db;
pub mod error;
mod index;
mod models;

pub use crate::db::Database;
pub use crate::index::Index;
pub use crate::models::{CheckMarkers, Marker};
