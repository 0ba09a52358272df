//! Sealer (§4.I): a single-row morsel-lite proving the state of a
//! write-once log — `(n, h_row(n), grammar, optional crumtrail)`.

use crate::error::{Result, SkipLedgerError};
use crate::hash::Hash;
use crate::hash_ledger::{CrumRecord, TimestampService};
use crate::journal::{play, Grammar, HashSource, JournalState, NullObserver};
use crate::ledger::{RowStore, SkipLedger};
use crate::witness::Crumtrail;
use std::time::Duration;

/// Sibling seal-file extensions (§6): a pending seal has no crumtrail
/// yet, a complete one does.
pub const PENDING_EXTENSION: &str = "sealp";
pub const COMPLETE_EXTENSION: &str = "seal";

/// The minimum artifact that proves the state of a write-once log.
#[derive(Debug, Clone, PartialEq)]
pub struct Seal {
    pub n: u64,
    pub row_hash: Hash,
    pub grammar: Grammar,
    pub crumtrail: Option<Crumtrail>,
}

impl Seal {
    pub fn is_pending(&self) -> bool {
        self.crumtrail.is_none()
    }

    /// The sibling filename extension this seal should be stored under.
    pub fn extension(&self) -> &'static str {
        if self.is_pending() {
            PENDING_EXTENSION
        } else {
            COMPLETE_EXTENSION
        }
    }

    fn write_grammar(grammar: &Grammar, out: &mut Vec<u8>) {
        match &grammar.comment_prefix {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(&(p.len() as u16).to_be_bytes());
                out.extend_from_slice(p.as_bytes());
            }
            None => out.push(0),
        }
        match &grammar.delimiters {
            Some(delims) => {
                out.push(delims.len() as u8);
                for &c in delims {
                    out.extend_from_slice(&(c as u32).to_be_bytes());
                }
            }
            None => out.push(0),
        }
    }

    fn read_grammar(buf: &[u8], mut off: usize) -> Result<(Grammar, usize)> {
        let fail = |off: usize, detail: &str| SkipLedgerError::FormatError {
            offset: off,
            detail: detail.to_string(),
        };
        if off >= buf.len() {
            return Err(fail(off, "truncated grammar"));
        }
        let has_prefix = buf[off] == 1;
        off += 1;
        let comment_prefix = if has_prefix {
            if off + 2 > buf.len() {
                return Err(fail(off, "truncated comment prefix length"));
            }
            let len = u16::from_be_bytes(buf[off..off + 2].try_into().unwrap()) as usize;
            off += 2;
            if off + len > buf.len() {
                return Err(fail(off, "truncated comment prefix"));
            }
            let s = String::from_utf8(buf[off..off + len].to_vec())
                .map_err(|_| fail(off, "comment prefix is not valid UTF-8"))?;
            off += len;
            Some(s)
        } else {
            None
        };
        if off >= buf.len() {
            return Err(fail(off, "truncated delimiter count"));
        }
        let delim_count = buf[off] as usize;
        off += 1;
        let delimiters = if delim_count == 0 {
            None
        } else {
            let mut delims = Vec::with_capacity(delim_count);
            for _ in 0..delim_count {
                if off + 4 > buf.len() {
                    return Err(fail(off, "truncated delimiter"));
                }
                let code = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
                let c = char::from_u32(code).ok_or_else(|| fail(off, "invalid delimiter code point"))?;
                off += 4;
                delims.push(c);
            }
            Some(delims)
        };
        Ok((
            Grammar {
                comment_prefix,
                delimiters,
            },
            off,
        ))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.n as i64).to_be_bytes());
        out.extend_from_slice(self.row_hash.as_bytes());
        Self::write_grammar(&self.grammar, &mut out);
        match &self.crumtrail {
            Some(trail) => {
                out.push(1);
                out.extend_from_slice(&trail.leaf_count.to_be_bytes());
                out.extend_from_slice(&trail.leaf_index.to_be_bytes());
                out.extend_from_slice(&(trail.chain.len() as u16).to_be_bytes());
                for link in &trail.chain {
                    out.extend_from_slice(link.as_bytes());
                }
                out.extend_from_slice(&trail.crum.utc.to_be_bytes());
                out.extend_from_slice(trail.crum.row_hash.as_bytes());
            }
            None => out.push(0),
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let fail = |off: usize, detail: &str| SkipLedgerError::FormatError {
            offset: off,
            detail: detail.to_string(),
        };
        if buf.len() < 8 + 32 {
            return Err(fail(0, "truncated seal header"));
        }
        let n = i64::from_be_bytes(buf[0..8].try_into().unwrap());
        if n <= 0 {
            return Err(fail(0, "seal row number must be positive"));
        }
        let row_hash = Hash::from_slice(&buf[8..40]).expect("slice is exactly 32 bytes");
        let (grammar, mut off) = Self::read_grammar(buf, 40)?;

        if off >= buf.len() {
            return Err(fail(off, "truncated crumtrail flag"));
        }
        let has_trail = buf[off] == 1;
        off += 1;
        let crumtrail = if has_trail {
            if off + 18 > buf.len() {
                return Err(fail(off, "truncated crumtrail"));
            }
            let leaf_count = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            let leaf_index = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            let chain_len = u16::from_be_bytes(buf[off..off + 2].try_into().unwrap()) as usize;
            off += 2;
            let mut chain = Vec::with_capacity(chain_len);
            for _ in 0..chain_len {
                if off + 32 > buf.len() {
                    return Err(fail(off, "truncated chain link"));
                }
                chain.push(Hash::from_slice(&buf[off..off + 32]).expect("slice is exactly 32 bytes"));
                off += 32;
            }
            if off + 8 + 32 > buf.len() {
                return Err(fail(off, "truncated crum"));
            }
            let utc = i64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            let crum_hash = Hash::from_slice(&buf[off..off + 32]).expect("slice is exactly 32 bytes");
            Some(Crumtrail::new(
                leaf_count,
                leaf_index,
                chain,
                crate::witness::Crum {
                    row_hash: crum_hash,
                    utc,
                },
            )?)
        } else {
            None
        };

        Ok(Seal {
            n: n as u64,
            row_hash,
            grammar,
            crumtrail,
        })
    }
}

/// A source of predecessor row hashes that is never actually consulted:
/// verifying a seal replays from the journal's very beginning, so every
/// predecessor lookup is either the sentinel or within the replay's own
/// frontier.
struct EmptyHashSource;

impl HashSource for EmptyHashSource {
    fn size(&self) -> u64 {
        0
    }

    fn row_hash(&self, n: u64) -> Result<Hash> {
        Err(SkipLedgerError::OutOfRange { row: n, size: 0 })
    }
}

/// `seal(journal, grammar)`: compute the ledger's current state and
/// produce a pending seal.
pub fn seal<S: RowStore>(ledger: &SkipLedger<S>, grammar: Grammar) -> Result<Seal> {
    Ok(Seal {
        n: ledger.size(),
        row_hash: ledger.state_hash()?,
        grammar,
        crumtrail: None,
    })
}

/// `witness(journal)`: submit the seal's row hash for external
/// timestamping. Returns `true` iff the seal was upgraded to complete.
pub fn witness(seal: &mut Seal, service: &dyn TimestampService, deadline: Duration) -> Result<bool> {
    let records = service.submit(&[(seal.n, seal.row_hash)], deadline)?;
    match records.into_iter().find(|r| r.row() == seal.n) {
        Some(CrumRecord::Trailed { crumtrail, .. }) => {
            seal.crumtrail = Some(crumtrail);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// `verify(journal)`: replay the whole journal with the seal's grammar
/// and check its terminal state still matches.
pub fn verify(seal: &Seal, journal_bytes: &[u8], salt_seed: &Hash) -> Result<()> {
    let outcome = play(
        journal_bytes,
        JournalState::INITIAL,
        &seal.grammar,
        salt_seed,
        &EmptyHashSource,
        &mut NullObserver,
        || false,
    )?;
    if outcome.end_state.n != seal.n || outcome.end_state.row_hash != seal.row_hash {
        return Err(SkipLedgerError::HashConflict { row: seal.n });
    }
    Ok(())
}
