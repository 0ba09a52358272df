//! Witness attestations ("crumtrails") and the repo that stores them,
//! indexed by row number (§4.E).

use crate::error::{Result, SkipLedgerError};
use crate::hash::{hash_concat, Hash};
use tracing::warn;

/// The witnessed fact: a row hash paired with the UTC millisecond
/// timestamp a third-party timestamping service attested it at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crum {
    pub row_hash: Hash,
    pub utc: i64,
}

/// A Merkle-proof attestation binding a row hash to an external UTC
/// timestamp (§3, "Crumtrail").
///
/// `chain.len()` is the number of sibling hashes needed to walk from
/// `crum.row_hash` up to the tree's root, for a tree with `leaf_count`
/// leaves and this crum at `leaf_index` — a value smaller than
/// `ceil(log2(leaf_count))` whenever the path passes through a
/// promoted (unpaired) node.
#[derive(Debug, Clone, PartialEq)]
pub struct Crumtrail {
    pub leaf_count: u64,
    pub leaf_index: u64,
    pub chain: Vec<Hash>,
    pub crum: Crum,
}

impl Crumtrail {
    pub fn new(leaf_count: u64, leaf_index: u64, chain: Vec<Hash>, crum: Crum) -> Result<Self> {
        if leaf_index >= leaf_count {
            return Err(SkipLedgerError::FormatError {
                offset: 0,
                detail: format!("leaf_index {leaf_index} out of range for {leaf_count} leaves"),
            });
        }
        let expected = expected_chain_len(leaf_count, leaf_index);
        if chain.len() != expected {
            return Err(SkipLedgerError::FormatError {
                offset: 0,
                detail: format!(
                    "crumtrail for leaf {leaf_index}/{leaf_count} should carry {expected} links, has {}",
                    chain.len()
                ),
            });
        }
        Ok(Crumtrail {
            leaf_count,
            leaf_index,
            chain,
            crum,
        })
    }

    /// Reconstruct the Merkle root this trail proves membership under, by
    /// walking `crum.row_hash` up through `chain` (bottom to top),
    /// choosing left/right combination per the bit of the current index
    /// at each level, and carrying an unpaired ("promoted") node through
    /// unchanged.
    pub fn merkle_root(&self) -> Hash {
        let mut computed = self.crum.row_hash;
        let mut index = self.leaf_index;
        let mut size = self.leaf_count;
        for sibling in &self.chain {
            if index % 2 == 1 {
                computed = hash_concat(&[sibling.as_bytes(), computed.as_bytes()]);
            } else if index < size - 1 {
                computed = hash_concat(&[computed.as_bytes(), sibling.as_bytes()]);
            }
            index /= 2;
            size = size.div_ceil(2);
        }
        computed
    }
}

/// The exact number of sibling links a leaf at `leaf_index` needs to
/// reach the root of a tree with `leaf_count` leaves, accounting for
/// promoted (unpaired) nodes at each level. Never exceeds
/// `ceil(log2(leaf_count))`.
fn expected_chain_len(leaf_count: u64, leaf_index: u64) -> usize {
    let mut idx = leaf_index;
    let mut size = leaf_count;
    let mut count = 0usize;
    while size > 1 {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        if sibling_idx < size {
            count += 1;
        }
        idx /= 2;
        size = size.div_ceil(2);
    }
    count
}

/// A row number paired with the crumtrail that witnesses it (§3,
/// "Trailed row").
#[derive(Debug, Clone, PartialEq)]
pub struct TrailedRow {
    pub n: u64,
    pub crumtrail: Crumtrail,
}

/// Ordered store of [`TrailedRow`]s, indexed by row number (§4.E).
///
/// Invariant: entries are strictly increasing in `n`, and non-decreasing
/// in `crum.utc` — this is enforced by [`WitnessedRowRepo::add`], not by
/// the caller.
#[derive(Debug, Default)]
pub struct WitnessedRowRepo {
    trails: Vec<TrailedRow>,
}

impl WitnessedRowRepo {
    pub fn new() -> Self {
        WitnessedRowRepo { trails: Vec::new() }
    }

    /// Store `trailed` iff its row number strictly exceeds the last
    /// stored entry's and its timestamp is non-decreasing relative to
    /// it. A violation is not an error: it's logged and rejected
    /// (§4.E, §9 Open Question — kept as observed behavior, not
    /// silently "fixed").
    pub fn add(&mut self, trailed: TrailedRow) -> bool {
        if let Some(last) = self.trails.last() {
            if trailed.n <= last.n {
                warn!(
                    row = trailed.n,
                    last_row = last.n,
                    "rejecting trailed row: row number must strictly increase"
                );
                return false;
            }
            if trailed.crumtrail.crum.utc < last.crumtrail.crum.utc {
                warn!(
                    row = trailed.n,
                    utc = trailed.crumtrail.crum.utc,
                    last_utc = last.crumtrail.crum.utc,
                    "rejecting trailed row: witness utc must be non-decreasing"
                );
                return false;
            }
        }
        self.trails.push(trailed);
        true
    }

    pub fn count(&self) -> usize {
        self.trails.len()
    }

    pub fn get(&self, index: usize) -> Option<&TrailedRow> {
        self.trails.get(index)
    }

    pub fn last(&self) -> Option<&TrailedRow> {
        self.trails.last()
    }

    /// The smallest-row-number trailed entry with `n' >= n`, if any.
    pub fn nearest(&self, n: u64) -> Option<&TrailedRow> {
        let idx = self.trails.partition_point(|t| t.n < n);
        self.trails.get(idx)
    }

    /// Drop every entry with `n' > n`.
    pub fn trim_after(&mut self, n: u64) {
        let idx = self.trails.partition_point(|t| t.n <= n);
        self.trails.truncate(idx);
    }
}
