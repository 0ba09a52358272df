//! Path algebra (§4.D): skip-path construction, validation, stitching, and
//! coverage sets.

use crate::error::{Result, SkipLedgerError};
use crate::hash::{hash_concat, Hash};
use crate::ledger::{skip_count, RowStore, SkipLedger};
use std::collections::BTreeSet;

/// A row as it travels inside a [`Path`]: unlike [`crate::ledger::Row`],
/// it carries every skip-pointer hash it references (`levels[p]` is
/// `row_hash(n - 2^p)`), not just the final composed `row_hash`. This is
/// what lets [`Path::get_row_hash`] reconstruct the hash of a row that
/// isn't itself in the path but is one of a path row's skip targets
/// (§3, "coverage set").
#[derive(Debug, Clone, PartialEq)]
pub struct PathRow {
    pub n: u64,
    pub input_hash: Hash,
    /// `levels[p] == row_hash(n - 2^p)`, for `p` in `0..skip_count(n)`.
    pub levels: Vec<Hash>,
}

impl PathRow {
    /// Recompute this row's hash from its input hash and skip-pointer
    /// levels: `H(h_in ‖ levels[0] ‖ levels[1] ‖ ...)`.
    pub fn row_hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(1 + self.levels.len());
        parts.push(self.input_hash.as_bytes());
        for level in &self.levels {
            parts.push(level.as_bytes());
        }
        hash_concat(&parts)
    }

    /// Structural check: the row carries exactly `skip_count(n)` levels.
    fn check_structure(&self) -> Result<()> {
        let expected = skip_count(self.n) as usize;
        if self.levels.len() != expected {
            return Err(SkipLedgerError::FormatError {
                offset: self.n as usize,
                detail: format!(
                    "row {} should carry {expected} skip levels, has {}",
                    self.n,
                    self.levels.len()
                ),
            });
        }
        Ok(())
    }

    /// The row number this row's skip-pointer at level `p` targets.
    fn target(&self, p: usize) -> u64 {
        self.n - (1u64 << p)
    }
}

/// Compute the unique minimum-length skip-path of row *numbers* from
/// `lo` to `hi` (§4.D, "Skip-path construction").
///
/// Construction rule: from `r_k`, the next `r_{k+1} = min(hi, r_k + 2^p)`
/// where `p` is the largest exponent with `(r_k + 2^p)` divisible by
/// `2^p` and `<= hi`.
pub fn skip_path(lo: u64, hi: u64) -> Result<Vec<u64>> {
    if lo < 1 {
        return Err(SkipLedgerError::OutOfRange { row: lo, size: hi });
    }
    if hi < lo {
        return Err(SkipLedgerError::FormatError {
            offset: 0,
            detail: format!("hi ({hi}) must be >= lo ({lo})"),
        });
    }

    let mut path = vec![lo];
    let mut r = lo;
    while r < hi {
        let mut best_p = 0u32;
        for p in (0..64u32).rev() {
            let step = 1u64 << p;
            if r % step == 0 && r.checked_add(step).is_some_and(|next| next <= hi) {
                best_p = p;
                break;
            }
        }
        r += 1u64 << best_p;
        path.push(r);
    }
    Ok(path)
}

/// Given an ascending list of anchor row numbers, produce the
/// deduplicated, ascending union of the skip-paths between each
/// consecutive pair (§4.D, "Stitching").
pub fn stitch(anchors: &[u64]) -> Result<Vec<u64>> {
    if anchors.is_empty() {
        return Ok(Vec::new());
    }
    let mut set = BTreeSet::new();
    set.insert(anchors[0]);
    for window in anchors.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        for n in skip_path(lo, hi)? {
            set.insert(n);
        }
    }
    Ok(set.into_iter().collect())
}

/// A validated, non-empty, ascending sequence of [`PathRow`]s.
#[derive(Debug, Clone)]
pub struct Path {
    rows: Vec<PathRow>,
}

impl Path {
    /// Build and validate a path from already-materialized rows. Fails
    /// with `FormatError` on structural issues (wrong level count,
    /// non-ascending/duplicate numbers) and `HashConflict` when an
    /// adjacent pair's skip-pointer doesn't match.
    pub fn new(rows: Vec<PathRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(SkipLedgerError::FormatError {
                offset: 0,
                detail: "path must contain at least one row".into(),
            });
        }
        for row in &rows {
            row.check_structure()?;
        }
        for window in rows.windows(2) {
            let (prev, curr) = (&window[0], &window[1]);
            if curr.n <= prev.n {
                return Err(SkipLedgerError::FormatError {
                    offset: curr.n as usize,
                    detail: "path row numbers must be strictly ascending".into(),
                });
            }
            let d = curr.n - prev.n;
            if !d.is_power_of_two() || curr.n % d != 0 {
                return Err(SkipLedgerError::FormatError {
                    offset: curr.n as usize,
                    detail: format!(
                        "step {d} from row {} to row {} is not a valid skip step",
                        prev.n, curr.n
                    ),
                });
            }
            let level = d.trailing_zeros() as usize;
            if curr.levels[level] != prev.row_hash() {
                return Err(SkipLedgerError::HashConflict { row: curr.n });
            }
        }
        Ok(Path { rows })
    }

    /// Fetch every row and level this path needs directly from a
    /// skip-ledger, for the exact row numbers given by [`skip_path`]
    /// (or any other ascending subset).
    pub fn from_ledger<S: RowStore>(ledger: &SkipLedger<S>, row_numbers: &[u64]) -> Result<Self> {
        let mut rows = Vec::with_capacity(row_numbers.len());
        for &n in row_numbers {
            let input_hash = ledger.input_hash(n)?;
            let levels = SkipLedger::<S>::skip_targets(n)
                .into_iter()
                .map(|target| ledger.row_hash(target))
                .collect::<Result<Vec<_>>>()?;
            rows.push(PathRow {
                n,
                input_hash,
                levels,
            });
        }
        Path::new(rows)
    }

    /// Build the minimal skip-path between `lo` and `hi` directly from a
    /// ledger.
    pub fn skip_path_from_ledger<S: RowStore>(
        ledger: &SkipLedger<S>,
        lo: u64,
        hi: u64,
    ) -> Result<Self> {
        let numbers = skip_path(lo, hi)?;
        Path::from_ledger(ledger, &numbers)
    }

    pub fn rows(&self) -> &[PathRow] {
        &self.rows
    }

    pub fn lo(&self) -> u64 {
        self.rows.first().unwrap().n
    }

    pub fn hi(&self) -> u64 {
        self.rows.last().unwrap().n
    }

    /// Row numbers literally present in the path.
    pub fn row_numbers(&self) -> BTreeSet<u64> {
        self.rows.iter().map(|r| r.n).collect()
    }

    /// `coverage(R) = R ∪ {n − 2^p : n ∈ R, 0 ≤ p < s(n), n − 2^p ≥ 1}`.
    pub fn coverage(&self) -> BTreeSet<u64> {
        let mut set: BTreeSet<u64> = self.row_numbers();
        for row in &self.rows {
            for p in 0..row.levels.len() {
                let target = row.target(p);
                if target >= 1 {
                    set.insert(target);
                }
            }
        }
        set
    }

    /// Reconstruct the row hash of `m`, either because it's directly in
    /// the path or because some path row's skip-pointer reveals it.
    /// Fails with `NotCovered` otherwise (§4.D).
    pub fn get_row_hash(&self, m: u64) -> Result<Hash> {
        if let Some(row) = self.rows.iter().find(|r| r.n == m) {
            return Ok(row.row_hash());
        }
        for row in &self.rows {
            for p in 0..row.levels.len() {
                if row.target(p) == m {
                    return Ok(row.levels[p]);
                }
            }
        }
        if m == 0 {
            return Ok(Hash::SENTINEL);
        }
        Err(SkipLedgerError::NotCovered { row: m })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryRowStore;

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    fn populated_ledger(n: u8) -> SkipLedger<InMemoryRowStore> {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=n {
            ledger.append(h(i)).unwrap();
        }
        ledger
    }

    /// Scenario S2: skip_path(5, 12) == [5, 6, 8, 12].
    #[test]
    fn s2_skip_path_endpoints() {
        let path = skip_path(5, 12).unwrap();
        assert_eq!(path, vec![5, 6, 8, 12]);
        // Each step is a power of two dividing the successor.
        for window in path.windows(2) {
            let d = window[1] - window[0];
            assert!(d.is_power_of_two());
            assert_eq!(window[1] % d, 0);
        }
    }

    #[test]
    fn s1_skip_path_is_contiguous() {
        assert_eq!(skip_path(1, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn skip_path_is_minimal_length() {
        // Any valid skip path from lo to hi has no fewer steps than the
        // one our construction rule produces; spot-check a range where a
        // naive +1 walk would be much longer.
        let path = skip_path(1, 16).unwrap();
        assert!(path.len() < 16);
        assert_eq!(path.first().copied(), Some(1));
        assert_eq!(path.last().copied(), Some(16));
    }

    #[test]
    fn path_from_ledger_validates() {
        let ledger = populated_ledger(20);
        let path = Path::skip_path_from_ledger(&ledger, 5, 12).unwrap();
        assert_eq!(path.lo(), 5);
        assert_eq!(path.hi(), 12);
        for row in path.rows() {
            assert_eq!(ledger.row_hash(row.n).unwrap(), row.row_hash());
        }
    }

    #[test]
    fn coverage_includes_skip_targets_not_in_path() {
        let ledger = populated_ledger(20);
        let path = Path::skip_path_from_ledger(&ledger, 5, 12).unwrap();
        let coverage = path.coverage();
        // 12's skip targets include 11, 10, 8 -- 11 and 10 aren't literal
        // path rows but must be covered.
        assert!(coverage.contains(&11));
        assert!(coverage.contains(&10));
        assert_eq!(
            path.get_row_hash(11).unwrap(),
            ledger.row_hash(11).unwrap()
        );
    }

    #[test]
    fn uncovered_row_is_rejected() {
        let ledger = populated_ledger(20);
        let path = Path::skip_path_from_ledger(&ledger, 1, 8).unwrap();
        assert!(matches!(
            path.get_row_hash(3),
            Err(SkipLedgerError::NotCovered { row: 3 })
        ));
    }

    /// Scenario S6 fragment: path [1,2,4,8] of a 10-row ledger.
    #[test]
    fn s6_path_1_2_4_8_covers_and_rejects_row_3() {
        let ledger = populated_ledger(10);
        let path = Path::from_ledger(&ledger, &[1, 2, 4, 8]).unwrap();
        assert_eq!(
            path.get_row_hash(8).unwrap(),
            ledger.row_hash(8).unwrap()
        );
        assert!(matches!(
            path.get_row_hash(3),
            Err(SkipLedgerError::NotCovered { row: 3 })
        ));
    }

    #[test]
    fn tampered_level_is_rejected_as_hash_conflict() {
        let ledger = populated_ledger(20);
        let numbers = skip_path(5, 12).unwrap();
        let mut rows = Vec::new();
        for &n in &numbers {
            let input_hash = ledger.input_hash(n).unwrap();
            let levels = SkipLedger::<InMemoryRowStore>::skip_targets(n)
                .into_iter()
                .map(|t| ledger.row_hash(t).unwrap())
                .collect::<Vec<_>>();
            rows.push(PathRow {
                n,
                input_hash,
                levels,
            });
        }
        // Corrupt the level pointing back at row 5 inside row 6's entry.
        rows[1].levels[0] = h(0xff);
        assert!(matches!(
            Path::new(rows),
            Err(SkipLedgerError::HashConflict { .. })
        ));
    }

    #[test]
    fn stitch_dedups_and_sorts_across_anchors() {
        let numbers = stitch(&[1, 3, 12]).unwrap();
        assert_eq!(numbers.first().copied(), Some(1));
        assert_eq!(numbers.last().copied(), Some(12));
        // Strictly ascending, no duplicates.
        for window in numbers.windows(2) {
            assert!(window[0] < window[1]);
        }
    }
}
