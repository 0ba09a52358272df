//! Typed cells, the salt scheme, and terminal-hash derivation (§4.B).

use crate::hash::{hash_bytes, hash_concat, Hash};
use std::collections::BTreeSet;

/// One cell's value. `Redacted` carries only the cell's precomputed
/// terminal hash; every other variant carries a revealed value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Long(i64),
    Double(f64),
    /// UTC millis, stored as a plain integer per §3.
    Date(i64),
    String(String),
    Bytes(Vec<u8>),
    /// An opaque 32-byte terminal hash used directly as `t_k` (e.g. a
    /// foreign-key reference to another row's commitment).
    Hash(Hash),
    /// A cell whose value has been redacted; only its terminal hash
    /// survives.
    Redacted(Hash),
}

impl CellValue {
    pub fn is_redacted(&self) -> bool {
        matches!(self, CellValue::Redacted(_))
    }

    /// Canonical byte encoding of a revealed value, per §4.B step 1.
    /// Returns `None` for `Redacted`, which has no payload to encode.
    fn canonical_payload(&self) -> Option<Vec<u8>> {
        match self {
            CellValue::Null => Some(Vec::new()),
            CellValue::Long(v) => Some(v.to_be_bytes().to_vec()),
            CellValue::Double(v) => Some(v.to_be_bytes().to_vec()),
            CellValue::Date(v) => Some(v.to_be_bytes().to_vec()),
            CellValue::String(s) => Some(s.as_bytes().to_vec()),
            CellValue::Bytes(b) => Some(b.clone()),
            CellValue::Hash(_) => None,
            CellValue::Redacted(_) => None,
        }
    }
}

/// A single cell: a value plus an optional per-cell salt.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Per-cell salt, present only when the row's salt scheme calls for
    /// salting this index *and* the salt isn't derived from a row-salt.
    pub salt: Option<Hash>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Cell { value, salt: None }
    }

    pub fn with_salt(value: CellValue, salt: Hash) -> Self {
        Cell {
            value,
            salt: Some(salt),
        }
    }

    pub fn redacted(terminal_hash: Hash) -> Self {
        Cell {
            value: CellValue::Redacted(terminal_hash),
            salt: None,
        }
    }

    /// Compute this cell's terminal hash `t_k`, per §4.B step 1.
    ///
    /// `index` is this cell's zero-based position in the row; `scheme`
    /// decides whether index should be salted; `row_salt` is the row's
    /// shared salt, used to derive a per-cell salt when the cell itself
    /// doesn't carry one (see §4.B "Row-salt derivation").
    pub fn terminal_hash(
        &self,
        index: usize,
        scheme: &SaltScheme,
        row_salt: Option<&Hash>,
    ) -> Hash {
        match &self.value {
            CellValue::Redacted(t) => *t,
            CellValue::Hash(h) => *h,
            CellValue::Null => {
                if scheme.is_salted(index) {
                    let salt = self.effective_salt(index, row_salt);
                    hash_concat(&[salt.as_bytes(), &[]])
                } else {
                    hash_bytes(&[])
                }
            }
            _ => {
                let payload = self
                    .value
                    .canonical_payload()
                    .expect("non-hash, non-redacted cells always have a payload");
                if scheme.is_salted(index) {
                    let salt = self.effective_salt(index, row_salt);
                    hash_concat(&[salt.as_bytes(), &payload])
                } else {
                    hash_bytes(&payload)
                }
            }
        }
    }

    /// Resolve the salt actually used for this cell: its own salt if
    /// present, else derived from the row-salt as
    /// `H(row_salt ‖ index-as-4-byte-big-endian)`.
    fn effective_salt(&self, index: usize, row_salt: Option<&Hash>) -> Hash {
        if let Some(salt) = &self.salt {
            return *salt;
        }
        let row_salt = row_salt.expect(
            "cell requires a salt but neither a per-cell salt nor a row-salt was supplied",
        );
        let index_be = (index as u32).to_be_bytes();
        hash_concat(&[row_salt.as_bytes(), &index_be])
    }
}

/// Which cell indices within a row are salted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltScheme {
    AllSalted,
    NoneSalted,
    SaltedIndices(BTreeSet<usize>),
    UnsaltedIndices(BTreeSet<usize>),
}

impl SaltScheme {
    pub fn is_salted(&self, index: usize) -> bool {
        match self {
            SaltScheme::AllSalted => true,
            SaltScheme::NoneSalted => false,
            SaltScheme::SaltedIndices(set) => set.contains(&index),
            SaltScheme::UnsaltedIndices(set) => !set.contains(&index),
        }
    }
}
