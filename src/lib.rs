//! A tamper-evident, content-addressed skip-ledger: an append-only
//! row table whose rows carry logarithmic skip-pointers back to earlier
//! rows, so any two rows can be connected by a minimal hash path (§1-2).
//!
//! The crate is organized as a stack of independently testable layers:
//! row typing and hashing ([`cell`], [`source_row`], [`hash`]), the
//! ledger core and path algebra ([`ledger`], [`path`]), witnessing
//! ([`witness`], [`hash_ledger`]), text-journal replay ([`journal`]),
//! and the export/attestation formats built on top
//! ([`morsel`], [`seal`]). [`sql_source`] and [`config`] name the
//! contracts external collaborators (a relational source, a
//! configuration store) must satisfy; this crate does not implement
//! either concretely beyond what ships in [`config::StaticConfig`].

mod error;

pub mod cell;
pub mod config;
pub mod hash;
pub mod hash_ledger;
pub mod journal;
pub mod ledger;
pub mod morsel;
pub mod path;
pub mod seal;
pub mod source_row;
pub mod sql_source;
pub mod witness;

pub use error::{Result, SkipLedgerError};

pub use cell::{Cell, CellValue, SaltScheme};
pub use hash::{CountWidth, Hash};
pub use hash_ledger::{CrumRecord, HashLedger, TimestampService};
pub use journal::{ContextedHasher, Grammar, HashSource, JournalState, OffsetsFile};
pub use ledger::{InMemoryRowStore, Row, RowStore, SkipLedger};
pub use path::{Path, PathRow};
pub use source_row::SourceRow;
pub use witness::{Crum, Crumtrail, TrailedRow, WitnessedRowRepo};
