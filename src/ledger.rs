//! Skip-ledger core (§4.C): an append-only row table where each row's hash
//! fuses its input hash with a logarithmic number of skip-pointers to
//! earlier rows.

use crate::error::{Result, SkipLedgerError};
use crate::hash::{hash_concat, Hash};

/// One row: its number, its input hash, and its row hash.
///
/// Invariant: once appended, `input_hash` and `row_hash` never change
/// (§3, "Row").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub n: u64,
    pub input_hash: Hash,
    pub row_hash: Hash,
}

/// Number of skip-pointers row `n` carries: `s(n) = 1 + v2(n)`, the
/// 2-adic valuation of `n` plus one. Row 1 has `s = 1`.
///
/// Panics if `n == 0` — row 0 is the sentinel predecessor and has no
/// pointers of its own.
pub fn skip_count(n: u64) -> u32 {
    assert!(n > 0, "skip_count is undefined for row 0");
    1 + n.trailing_zeros()
}

/// Physical storage for a skip-ledger's row table: a 1-based, append/
/// trim-only sequence of `(input_hash, row_hash)` pairs.
///
/// This is the "arena" of §9's design notes — an index-addressed store
/// rather than a graph of owned references, so skip-pointers are plain
/// row-number lookups.
pub trait RowStore {
    fn size(&self) -> u64;
    /// Read row `n` (1-based). `n` is guaranteed by the caller to be in
    /// `[1, size()]`.
    fn get(&self, n: u64) -> (Hash, Hash);
    /// Append one row. Called only after the caller has computed its hash.
    fn push(&mut self, input_hash: Hash, row_hash: Hash);
    /// Truncate to `new_size` rows. `new_size` is guaranteed `<= size()`.
    fn truncate(&mut self, new_size: u64);
}

/// A simple in-process row store. The one concrete [`RowStore`] this
/// crate ships; database-backed stores are an external collaborator's
/// concern (mirrors §4.J/§4.K's externalized backends).
#[derive(Debug, Default, Clone)]
pub struct InMemoryRowStore {
    rows: Vec<(Hash, Hash)>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        InMemoryRowStore { rows: Vec::new() }
    }
}

impl RowStore for InMemoryRowStore {
    fn size(&self) -> u64 {
        self.rows.len() as u64
    }

    fn get(&self, n: u64) -> (Hash, Hash) {
        self.rows[(n - 1) as usize]
    }

    fn push(&mut self, input_hash: Hash, row_hash: Hash) {
        self.rows.push((input_hash, row_hash));
    }

    fn truncate(&mut self, new_size: u64) {
        self.rows.truncate(new_size as usize);
    }
}

/// The skip-ledger itself: an ordered, append-only sequence of rows
/// numbered 1..N, generic over its physical [`RowStore`].
pub struct SkipLedger<S: RowStore> {
    store: S,
}

impl<S: RowStore> SkipLedger<S> {
    pub fn new(store: S) -> Self {
        SkipLedger { store }
    }

    pub fn size(&self) -> u64 {
        self.store.size()
    }

    /// Row hash of `n`, where `n == 0` yields the sentinel (§4.C,
    /// "row_hash(n) convenience").
    pub fn row_hash(&self, n: u64) -> Result<Hash> {
        if n == 0 {
            return Ok(Hash::SENTINEL);
        }
        self.check_range(n)?;
        Ok(self.store.get(n).1)
    }

    /// Input hash of row `n`, 1 <= n <= size().
    pub fn input_hash(&self, n: u64) -> Result<Hash> {
        self.check_range(n)?;
        Ok(self.store.get(n).0)
    }

    pub fn get_row(&self, n: u64) -> Result<Row> {
        self.check_range(n)?;
        let (input_hash, row_hash) = self.store.get(n);
        Ok(Row {
            n,
            input_hash,
            row_hash,
        })
    }

    /// `= row_hash(size())`.
    pub fn state_hash(&self) -> Result<Hash> {
        self.row_hash(self.size())
    }

    /// Append one row whose input hash is `h_in`; returns its row number.
    pub fn append(&mut self, h_in: Hash) -> Result<u64> {
        let n = self.size() + 1;
        let row_hash = self.compute_row_hash(n, h_in)?;
        self.store.push(h_in, row_hash);
        Ok(n)
    }

    /// Atomically append every input hash in `h_ins`, in order. Returns
    /// the resulting last row number. Whether the underlying store makes
    /// this transactional against concurrent crashes is a `RowStore`
    /// backend concern (§5); the in-memory store trivially is.
    pub fn append_batch(&mut self, h_ins: &[Hash]) -> Result<u64> {
        let mut last = self.size();
        for &h_in in h_ins {
            last = self.append(h_in)?;
        }
        Ok(last)
    }

    /// Truncate to `new_size` rows, `0 <= new_size <= size()`. Rows at
    /// indices `<= new_size` are unaffected.
    pub fn trim(&mut self, new_size: u64) -> Result<()> {
        if new_size > self.size() {
            return Err(SkipLedgerError::OutOfRange {
                row: new_size,
                size: self.size(),
            });
        }
        self.store.truncate(new_size);
        Ok(())
    }

    fn check_range(&self, n: u64) -> Result<()> {
        if n < 1 || n > self.size() {
            return Err(SkipLedgerError::OutOfRange {
                row: n,
                size: self.size(),
            });
        }
        Ok(())
    }

    /// `h_row(n) = H(h_in ‖ h_row(n-2^0) ‖ h_row(n-2^1) ‖ ... ‖ h_row(n-2^{s(n)-1}))`.
    /// Every predecessor referenced is `< n`, so this only ever reads
    /// already-appended rows (or the sentinel at 0).
    fn compute_row_hash(&self, n: u64, h_in: Hash) -> Result<Hash> {
        let s = skip_count(n);
        let mut parts: Vec<Hash> = Vec::with_capacity(1 + s as usize);
        parts.push(h_in);
        for p in 0..s {
            let pred = n - (1u64 << p);
            parts.push(self.row_hash(pred)?);
        }
        let refs: Vec<&[u8]> = parts.iter().map(|h| h.as_bytes() as &[u8]).collect();
        Ok(hash_concat(&refs))
    }

    /// The skip-pointer targets of row `n`: `{n - 2^p : 0 <= p < s(n)}`,
    /// ascending by `p` (i.e. nearest predecessor first).
    pub fn skip_targets(n: u64) -> Vec<u64> {
        (0..skip_count(n)).map(|p| n - (1u64 << p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    #[test]
    fn skip_counts_match_spec() {
        assert_eq!(skip_count(1), 1);
        assert_eq!(skip_count(2), 2);
        assert_eq!(skip_count(3), 1);
        assert_eq!(skip_count(4), 3);
        assert_eq!(skip_count(5), 1);
        assert_eq!(skip_count(6), 2);
        assert_eq!(skip_count(8), 4);
        assert_eq!(skip_count(12), 3);
    }

    /// Scenario S1: tiny 3-row chain with known input hashes.
    #[test]
    fn s1_tiny_chain() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        let h1 = h(0xaa);
        let h2 = h(0xbb);
        let h3 = h(0xcc);

        assert_eq!(ledger.append(h1).unwrap(), 1);
        assert_eq!(ledger.append(h2).unwrap(), 2);
        assert_eq!(ledger.append(h3).unwrap(), 3);

        let expected_r1 = hash_concat(&[h1.as_bytes(), Hash::SENTINEL.as_bytes()]);
        assert_eq!(ledger.row_hash(1).unwrap(), expected_r1);

        let expected_r2 = hash_concat(&[
            h2.as_bytes(),
            expected_r1.as_bytes(),
            Hash::SENTINEL.as_bytes(),
        ]);
        assert_eq!(ledger.row_hash(2).unwrap(), expected_r2);

        let expected_r3 = hash_concat(&[h3.as_bytes(), expected_r2.as_bytes()]);
        assert_eq!(ledger.row_hash(3).unwrap(), expected_r3);
    }

    #[test]
    fn out_of_range_errors() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        ledger.append(h(1)).unwrap();
        assert!(matches!(
            ledger.get_row(0),
            Err(SkipLedgerError::OutOfRange { row: 0, size: 1 })
        ));
        assert!(matches!(
            ledger.get_row(2),
            Err(SkipLedgerError::OutOfRange { row: 2, size: 1 })
        ));
    }

    #[test]
    fn trim_preserves_surviving_rows() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=10u8 {
            ledger.append(h(i)).unwrap();
        }
        let before = ledger.row_hash(5).unwrap();
        ledger.trim(5).unwrap();
        assert_eq!(ledger.size(), 5);
        assert_eq!(ledger.row_hash(5).unwrap(), before);
        assert!(ledger.get_row(6).is_err());
    }

    #[test]
    fn append_then_trim_commutes_with_identical_prefix() {
        // §8 invariant 8: append(x1..xk) then trim(n<=old size) leaves
        // rows 1..n identical to a ledger that never saw the extra appends.
        let mut base = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=4u8 {
            base.append(h(i)).unwrap();
        }
        let baseline_state = base.state_hash().unwrap();

        let mut extended = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=4u8 {
            extended.append(h(i)).unwrap();
        }
        for i in 5..=9u8 {
            extended.append(h(i)).unwrap();
        }
        extended.trim(4).unwrap();

        assert_eq!(extended.state_hash().unwrap(), baseline_state);
    }

    #[test]
    fn trim_rejects_growing_size() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        ledger.append(h(1)).unwrap();
        assert!(ledger.trim(5).is_err());
    }

    #[test]
    fn append_batch_reports_last_row_number() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        let last = ledger.append_batch(&[h(1), h(2), h(3)]).unwrap();
        assert_eq!(last, 3);
        assert_eq!(ledger.size(), 3);
    }

    #[test]
    fn skip_targets_cover_predecessors() {
        assert_eq!(SkipLedger::<InMemoryRowStore>::skip_targets(12), vec![11, 10, 8]);
        assert_eq!(SkipLedger::<InMemoryRowStore>::skip_targets(1), vec![0]);
    }

    /// Invariant 1 (§8): every row's hash recomputes from its declared
    /// predecessors, for a non-trivial ledger.
    #[test]
    fn every_row_hash_recomputes_from_its_skip_pointers() {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=20u8 {
            ledger.append(h(i)).unwrap();
        }
        for n in 1..=20u64 {
            let row = ledger.get_row(n).unwrap();
            let mut parts: Vec<Hash> = vec![row.input_hash];
            for pred in SkipLedger::<InMemoryRowStore>::skip_targets(n) {
                parts.push(ledger.row_hash(pred).unwrap());
            }
            let refs: Vec<&[u8]> = parts.iter().map(|x| x.as_bytes() as &[u8]).collect();
            assert_eq!(hash_concat(&refs), row.row_hash);
        }
    }
}
