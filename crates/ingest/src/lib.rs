//! Ingestion of the browscap capability database.
//!
//! `browscap.csv` is a flat list of quoted rows. Most rows only make sense in
//! the context of the row group they belong to: a group starts with a
//! *default provider* whose values are inherited by every following row that
//! leaves a column blank (or, for capability flags, writes `default`). This
//! crate resolves that inheritance and yields self-contained [`Record`]s.
//!
//! ```
//! use browscap_ingest::{Filters, parse_str};
//!
//! let text = "\"GJK_Browscap_Version\"\n\"4594\",\"Mon, 29 Nov 2010\"\n\"Parent\",\"PropertyName\"\n";
//! let (version, records) = parse_str(text, Filters::default()).unwrap();
//! assert_eq!(version, 4594);
//! assert!(records.is_empty());
//! ```

mod consts;
pub mod error;
mod models;
mod parse;

pub use crate::models::{Filters, Record};
pub use crate::parse::{Ingest, parse_str, read_version};
