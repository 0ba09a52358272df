//! Hash ledger (§4.F): composition of the skip-ledger core and the
//! witnessed-row repo, plus the witnessing protocol that talks to an
//! external timestamp service.

use crate::error::Result;
use crate::hash::Hash;
use crate::ledger::{Row, RowStore, SkipLedger};
use crate::witness::{Crumtrail, TrailedRow, WitnessedRowRepo};
use std::time::Duration;

/// One candidate's outcome from a round-trip to the external timestamp
/// service: either it hasn't been incorporated into a published Merkle
/// tree yet (`Pending`), or it has, with a proof (`Trailed`).
#[derive(Debug, Clone)]
pub enum CrumRecord {
    Pending { row: u64 },
    Trailed { row: u64, crumtrail: Crumtrail },
}

impl CrumRecord {
    pub fn row(&self) -> u64 {
        match self {
            CrumRecord::Pending { row } => *row,
            CrumRecord::Trailed { row, .. } => *row,
        }
    }
}

/// The external, network-reachable timestamp authority. The only
/// collaborator in this crate with a network round-trip (§5); callers
/// supply a deadline and get `SkipLedgerError::Network` on expiry.
pub trait TimestampService {
    /// Submit `(row, row_hash)` candidates for witnessing; returns one
    /// [`CrumRecord`] per candidate, in any order.
    fn submit(&self, candidates: &[(u64, Hash)], deadline: Duration) -> Result<Vec<CrumRecord>>;
}

/// Composition of a [`SkipLedger`] and a [`WitnessedRowRepo`], enforcing
/// the joint invariant that every trailed row's number is `<= size()`.
pub struct HashLedger<S: RowStore> {
    ledger: SkipLedger<S>,
    repo: WitnessedRowRepo,
}

impl<S: RowStore> HashLedger<S> {
    pub fn new(store: S) -> Self {
        HashLedger {
            ledger: SkipLedger::new(store),
            repo: WitnessedRowRepo::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.ledger.size()
    }

    pub fn append(&mut self, h_in: Hash) -> Result<u64> {
        self.ledger.append(h_in)
    }

    pub fn append_batch(&mut self, h_ins: &[Hash]) -> Result<u64> {
        self.ledger.append_batch(h_ins)
    }

    pub fn get_row(&self, n: u64) -> Result<Row> {
        self.ledger.get_row(n)
    }

    pub fn row_hash(&self, n: u64) -> Result<Hash> {
        self.ledger.row_hash(n)
    }

    pub fn repo(&self) -> &WitnessedRowRepo {
        &self.repo
    }

    pub fn ledger(&self) -> &SkipLedger<S> {
        &self.ledger
    }

    /// Trim both components; the witnessed-row repo cascades so the
    /// joint invariant (every trailed `n <= size()`) keeps holding.
    pub fn trim(&mut self, new_size: u64) -> Result<()> {
        self.ledger.trim(new_size)?;
        self.repo.trim_after(new_size);
        Ok(())
    }

    fn last_witnessed_n(&self) -> u64 {
        self.repo.last().map(|t| t.n).unwrap_or(0)
    }

    pub fn unwitnessed_count(&self) -> u64 {
        self.size() - self.last_witnessed_n()
    }

    /// Rows eligible for the next witness batch: every row number
    /// greater than the last witnessed one, divisible by `2^dex`, plus
    /// (optionally) the last row of the ledger even if not "toothed".
    pub fn candidate_rows(&self, dex: u32, include_last: bool) -> Vec<u64> {
        let start = self.last_witnessed_n() + 1;
        let tooth = 1u64 << dex;
        let mut rows: Vec<u64> = (start..=self.size())
            .filter(|n| n % tooth == 0)
            .collect();
        if include_last && self.size() > 0 && rows.last() != Some(&self.size()) {
            rows.push(self.size());
        }
        rows
    }

    /// Run one round of the witnessing protocol (§4.F): gather
    /// candidates, submit them, then apply the utc-based sort/tie-break/
    /// dedup rule before storing survivors. Returns the number of trails
    /// newly stored.
    pub fn witness_round(
        &mut self,
        service: &dyn TimestampService,
        dex: u32,
        include_last: bool,
        deadline: Duration,
    ) -> Result<usize> {
        let candidates: Vec<(u64, Hash)> = self
            .candidate_rows(dex, include_last)
            .into_iter()
            .map(|n| Ok((n, self.row_hash(n)?)))
            .collect::<Result<Vec<_>>>()?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let records = service.submit(&candidates, deadline)?;
        let mut trailed: Vec<(u64, i64, Crumtrail)> = records
            .into_iter()
            .filter_map(|r| match r {
                CrumRecord::Trailed { row, crumtrail } => {
                    let utc = crumtrail.crum.utc;
                    Some((row, utc, crumtrail))
                }
                CrumRecord::Pending { .. } => None,
            })
            .collect();

        // Sort by utc ascending, tie-broken by larger row number first
        // (§4.F), then keep only the lowest row number within each utc
        // group.
        trailed.sort_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));

        let mut stored = 0usize;
        let mut i = 0;
        while i < trailed.len() {
            let utc = trailed[i].1;
            let mut j = i;
            let mut best = i;
            while j < trailed.len() && trailed[j].1 == utc {
                if trailed[j].0 < trailed[best].0 {
                    best = j;
                }
                j += 1;
            }
            let (row, _, crumtrail) = trailed[best].clone();
            if self.repo.add(TrailedRow {
                n: row,
                crumtrail,
            }) {
                stored += 1;
            }
            i = j;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryRowStore;
    use crate::witness::Crum;

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    struct FakeService {
        utcs: Vec<(u64, i64)>,
    }

    impl TimestampService for FakeService {
        fn submit(&self, candidates: &[(u64, Hash)], _deadline: Duration) -> Result<Vec<CrumRecord>> {
            Ok(candidates
                .iter()
                .map(|(row, row_hash)| {
                    let utc = self
                        .utcs
                        .iter()
                        .find(|(r, _)| r == row)
                        .map(|(_, u)| *u);
                    match utc {
                        Some(utc) => CrumRecord::Trailed {
                            row: *row,
                            crumtrail: Crumtrail::new(
                                1,
                                0,
                                Vec::new(),
                                Crum {
                                    row_hash: *row_hash,
                                    utc,
                                },
                            )
                            .unwrap(),
                        },
                        None => CrumRecord::Pending { row: *row },
                    }
                })
                .collect())
        }
    }

    #[test]
    fn trim_cascades_to_repo() {
        let mut hl = HashLedger::new(InMemoryRowStore::new());
        for i in 1..=10u8 {
            hl.append(h(i)).unwrap();
        }
        let service = FakeService {
            utcs: vec![(4, 100), (8, 200)],
        };
        hl.witness_round(&service, 2, false, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hl.repo().count(), 2);

        hl.trim(5).unwrap();
        assert_eq!(hl.size(), 5);
        // row 8's trail must be dropped; row 4's survives.
        assert_eq!(hl.repo().count(), 1);
        assert_eq!(hl.repo().last().unwrap().n, 4);
    }

    #[test]
    fn unwitnessed_count_tracks_gap() {
        let mut hl = HashLedger::new(InMemoryRowStore::new());
        for i in 1..=10u8 {
            hl.append(h(i)).unwrap();
        }
        assert_eq!(hl.unwitnessed_count(), 10);
        let service = FakeService {
            utcs: vec![(8, 100)],
        };
        hl.witness_round(&service, 3, false, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hl.unwitnessed_count(), 2);
    }

    #[test]
    fn candidate_rows_respect_dex_and_last_row() {
        let mut hl = HashLedger::new(InMemoryRowStore::new());
        for i in 1..=10u8 {
            hl.append(h(i)).unwrap();
        }
        assert_eq!(hl.candidate_rows(2, false), vec![4, 8]);
        assert_eq!(hl.candidate_rows(2, true), vec![4, 8, 10]);
    }

    #[test]
    fn same_utc_tie_keeps_lower_row_number() {
        let mut hl = HashLedger::new(InMemoryRowStore::new());
        for i in 1..=8u8 {
            hl.append(h(i)).unwrap();
        }
        let service = FakeService {
            utcs: vec![(4, 100), (8, 100)],
        };
        hl.witness_round(&service, 2, false, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hl.repo().count(), 1);
        assert_eq!(hl.repo().last().unwrap().n, 4);
    }
}
