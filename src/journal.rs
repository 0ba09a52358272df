//! Contexted state hasher (§4.G): turns a text journal into a stream of
//! source rows, replays forward from any saved state, and maintains an
//! offsets file of periodic checkpoints for O(tail) status/validate.

use crate::cell::{Cell, CellValue, SaltScheme};
use crate::error::{Result, SkipLedgerError};
use crate::hash::{hash_concat, Hash};
use crate::ledger::{skip_count, RowStore, SkipLedger};
use crate::source_row::SourceRow;
use std::collections::BTreeMap;

/// Rules by which a text journal's lines are classified and tokenized
/// (§3, "Grammar").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    /// Lines starting with this prefix are skippable comments.
    pub comment_prefix: Option<String>,
    /// Token delimiter set. `None` means "any ASCII whitespace".
    pub delimiters: Option<Vec<char>>,
}

impl Grammar {
    pub fn whitespace_delimited() -> Self {
        Grammar {
            comment_prefix: None,
            delimiters: None,
        }
    }

    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_prefix = Some(prefix.into());
        self
    }

    pub fn with_delimiters(mut self, delimiters: Vec<char>) -> Self {
        self.delimiters = Some(delimiters);
        self
    }

    /// A line is ledgerable iff non-empty, non-blank, and (when a
    /// comment prefix is set) doesn't start with it.
    pub fn is_ledgerable(&self, line: &str) -> bool {
        if line.is_empty() || line.trim().is_empty() {
            return false;
        }
        if let Some(prefix) = &self.comment_prefix {
            if line.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }

    /// Split a ledgerable line into an ordered, non-empty list of tokens.
    pub fn tokenize(&self, line: &str) -> Vec<String> {
        match &self.delimiters {
            Some(delims) => line
                .split(|c| delims.contains(&c))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// `(n, line_no, eol_offset, h_row(n))`, with the sentinel initial state
/// `(0, 0, 0, SENTINEL)` (§4.G, "State").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalState {
    pub n: u64,
    pub line_no: u64,
    pub eol_offset: u64,
    pub row_hash: Hash,
}

impl JournalState {
    pub const INITIAL: JournalState = JournalState {
        n: 0,
        line_no: 0,
        eol_offset: 0,
        row_hash: Hash::SENTINEL,
    };
}

/// A pluggable source of already-known row hashes for predecessors that
/// lie before the frontier of the current traversal (§4.G step 2) — the
/// ledger itself, or a saved offsets table.
pub trait HashSource {
    fn size(&self) -> u64;
    fn row_hash(&self, n: u64) -> Result<Hash>;
}

impl<S: RowStore> HashSource for SkipLedger<S> {
    fn size(&self) -> u64 {
        SkipLedger::size(self)
    }

    fn row_hash(&self, n: u64) -> Result<Hash> {
        SkipLedger::row_hash(self, n)
    }
}

/// Notified once per ledgerable line as `play` scans forward. Purely an
/// observation hook (e.g. for a CLI `list` command); it plays no part in
/// computing hashes.
pub trait RowObserver {
    fn observe_row(
        &mut self,
        row_no: u64,
        cells: &[Cell],
        start_offset: u64,
        end_offset: u64,
        line_no: u64,
    );
}

/// A no-op observer for callers that don't need per-line notification.
pub struct NullObserver;

impl RowObserver for NullObserver {
    fn observe_row(&mut self, _row_no: u64, _cells: &[Cell], _start: u64, _end: u64, _line: u64) {}
}

/// Everything `play` computed for one ledgerable line.
#[derive(Debug, Clone)]
pub struct PlayedRow {
    pub n: u64,
    pub line_no: u64,
    pub start_offset: u64,
    pub end_offset: u64,
    pub input_hash: Hash,
    pub row_hash: Hash,
    pub cells: Vec<Cell>,
}

/// The result of one `play` call: the terminal state plus every row
/// encountered along the way.
#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub end_state: JournalState,
    pub rows: Vec<PlayedRow>,
}

/// Derive the row-salt for row `n` from the configured salt seed
/// (§4.K, "source salt seed"): `H(seed ‖ n-as-8-byte-big-endian)`.
fn row_salt(seed: &Hash, n: u64) -> Hash {
    hash_concat(&[seed.as_bytes(), &n.to_be_bytes()])
}

/// Derive the per-cell salt for cell `k` of a row with row-salt `r`:
/// `H(r ‖ k-as-4-byte-big-endian)` (§4.B, "Row-salt derivation").
fn cell_salt(row_salt: &Hash, k: usize) -> Hash {
    hash_concat(&[row_salt.as_bytes(), &(k as u32).to_be_bytes()])
}

/// Advance from `from_state` over `bytes` (which must begin exactly at
/// `from_state.eol_offset` in the journal), tokenizing each ledgerable
/// line per `grammar` and computing its row hash using `hash_source` for
/// any predecessor row `<= from_state.n`; predecessors created *within*
/// this call are tracked locally. Returns the terminal state and the
/// full list of rows scanned (§4.G, "Streaming replay contract").
///
/// `cancelled` is polled between lines for cooperative cancellation
/// (§5); when it returns `true`, scanning stops and the state reached so
/// far is returned (the caller discards it rather than committing a
/// partial update).
pub fn play(
    bytes: &[u8],
    from_state: JournalState,
    grammar: &Grammar,
    salt_seed: &Hash,
    hash_source: &dyn HashSource,
    observer: &mut dyn RowObserver,
    mut cancelled: impl FnMut() -> bool,
) -> Result<PlayOutcome> {
    let mut frontier: BTreeMap<u64, Hash> = BTreeMap::new();
    let mut state = from_state;
    let mut rows = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        if cancelled() {
            break;
        }

        let newline_rel = bytes[pos..].iter().position(|&b| b == b'\n');
        let (line_bytes, consumed) = match newline_rel {
            Some(rel) => (&bytes[pos..pos + rel], rel + 1),
            None => (&bytes[pos..], bytes.len() - pos),
        };
        let start_offset = from_state.eol_offset + pos as u64;
        pos += consumed;
        let end_offset = from_state.eol_offset + pos as u64;
        state.line_no += 1;

        let line = String::from_utf8_lossy(line_bytes);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if !grammar.is_ledgerable(line) {
            continue;
        }

        let tokens = grammar.tokenize(line);
        let n = state.n + 1;
        let r_salt = row_salt(salt_seed, n);
        let cells: Vec<Cell> = tokens
            .iter()
            .enumerate()
            .map(|(k, tok)| {
                Cell::with_salt(CellValue::String(tok.clone()), cell_salt(&r_salt, k))
            })
            .collect();

        let source_row = SourceRow::with_row_salt(n, cells.clone(), r_salt);
        let input_hash = source_row.input_hash(&SaltScheme::AllSalted);

        let s = skip_count(n);
        let mut parts: Vec<Hash> = Vec::with_capacity(1 + s as usize);
        parts.push(input_hash);
        for p in 0..s {
            let pred = n - (1u64 << p);
            let pred_hash = if pred <= from_state.n {
                if pred == 0 {
                    Hash::SENTINEL
                } else {
                    hash_source.row_hash(pred)?
                }
            } else {
                *frontier.get(&pred).ok_or_else(|| SkipLedgerError::FormatError {
                    offset: start_offset as usize,
                    detail: format!("predecessor row {pred} not yet computed"),
                })?
            };
            parts.push(pred_hash);
        }
        let refs: Vec<&[u8]> = parts.iter().map(|h| h.as_bytes() as &[u8]).collect();
        let row_hash = hash_concat(&refs);
        frontier.insert(n, row_hash);

        observer.observe_row(n, &cells, start_offset, end_offset, state.line_no);

        rows.push(PlayedRow {
            n,
            line_no: state.line_no,
            start_offset,
            end_offset,
            input_hash,
            row_hash,
            cells,
        });

        state = JournalState {
            n,
            line_no: state.line_no,
            eol_offset: end_offset,
            row_hash,
        };
    }

    Ok(PlayOutcome {
        end_state: state,
        rows,
    })
}

/// One periodic checkpoint recorded by the offsets file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub n: u64,
    pub line_no: u64,
    pub eol_offset: u64,
    pub row_hash: Hash,
}

/// Periodic (row_no, eol_offset, line_no, h_row) checkpoints at rows
/// divisible by `2^dex` (§4.G, "Offsets file"). `dex == 63` disables
/// checkpointing entirely.
#[derive(Debug, Clone)]
pub struct OffsetsFile {
    dex: u32,
    checkpoints: Vec<Checkpoint>,
}

impl OffsetsFile {
    pub fn new(dex: u32) -> Self {
        OffsetsFile {
            dex,
            checkpoints: Vec::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.dex == 63
    }

    fn due(&self, n: u64) -> bool {
        if self.is_disabled() {
            return false;
        }
        n % (1u64 << self.dex) == 0
    }

    /// Record a checkpoint for `n` if it lands on a `2^dex` boundary.
    pub fn maybe_checkpoint(&mut self, n: u64, line_no: u64, eol_offset: u64, row_hash: Hash) {
        if self.due(n) {
            self.checkpoints.push(Checkpoint {
                n,
                line_no,
                eol_offset,
                row_hash,
            });
        }
    }

    /// Overwrite (or insert, preserving order) the checkpoint for row
    /// `n`, used by fix-offsets to correct a stale offset/line-no while
    /// keeping the row hash.
    pub fn replace_or_insert(&mut self, cp: Checkpoint) {
        match self.checkpoints.binary_search_by_key(&cp.n, |c| c.n) {
            Ok(idx) => self.checkpoints[idx] = cp,
            Err(idx) => self.checkpoints.insert(idx, cp),
        }
    }

    /// Latest checkpoint with `n <= target`, if any.
    pub fn latest_at_or_before(&self, target: u64) -> Option<&Checkpoint> {
        let idx = self.checkpoints.partition_point(|c| c.n <= target);
        if idx == 0 {
            None
        } else {
            Some(&self.checkpoints[idx - 1])
        }
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn trim_after(&mut self, n: u64) {
        let idx = self.checkpoints.partition_point(|c| c.n <= n);
        self.checkpoints.truncate(idx);
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }
}

/// Ties a [`SkipLedger`], an [`OffsetsFile`], and a [`Grammar`] together
/// into the journal-tracking operations of §4.G: update, fix-offsets,
/// verify, rollback.
pub struct ContextedHasher<S: RowStore> {
    pub ledger: SkipLedger<S>,
    pub offsets: OffsetsFile,
    pub grammar: Grammar,
    pub salt_seed: Hash,
}

impl<S: RowStore> ContextedHasher<S> {
    pub fn new(ledger: SkipLedger<S>, offsets: OffsetsFile, grammar: Grammar, salt_seed: Hash) -> Self {
        ContextedHasher {
            ledger,
            offsets,
            grammar,
            salt_seed,
        }
    }

    /// Re-derive the exact state at the ledger's current size. When a
    /// checkpoint sits exactly at `size()` this is free; otherwise the
    /// last checkpoint at or before `size()` (or the journal's start, if
    /// none) is replayed forward through already-tracked rows, verifying
    /// each against its stored hash, until `size()` is reached. This is
    /// the only way to recover the true byte offset of the last appended
    /// row when it doesn't land on a `2^dex` checkpoint boundary —
    /// assuming offset 0 there would replay already-tracked lines as if
    /// they were new.
    fn resume_state(&self, full_journal: &[u8]) -> Result<JournalState> {
        let target = self.ledger.size();
        if target == 0 {
            return Ok(JournalState::INITIAL);
        }
        let anchor = match self.offsets.latest_at_or_before(target) {
            Some(cp) => JournalState {
                n: cp.n,
                line_no: cp.line_no,
                eol_offset: cp.eol_offset,
                row_hash: cp.row_hash,
            },
            None => JournalState::INITIAL,
        };
        if anchor.n == target {
            return Ok(anchor);
        }

        let tail = &full_journal[(anchor.eol_offset as usize).min(full_journal.len())..];
        let outcome = play(
            tail,
            anchor,
            &self.grammar,
            &self.salt_seed,
            &self.ledger,
            &mut NullObserver,
            || false,
        )?;
        let mut state = anchor;
        for row in &outcome.rows {
            if row.n > target {
                break;
            }
            let stored = self.ledger.row_hash(row.n)?;
            if stored != row.row_hash {
                return Err(SkipLedgerError::HashConflict { row: row.n });
            }
            state = JournalState {
                n: row.n,
                line_no: row.line_no,
                eol_offset: row.end_offset,
                row_hash: row.row_hash,
            };
            if row.n == target {
                break;
            }
        }
        Ok(state)
    }

    /// Append every untracked ledgerable row found in `full_journal`,
    /// starting from the latest checkpoint (or the beginning). Returns
    /// the new end-state.
    pub fn update(&mut self, full_journal: &[u8]) -> Result<JournalState> {
        let from_state = self.resume_state(full_journal)?;
        let tail = &full_journal[(from_state.eol_offset as usize).min(full_journal.len())..];
        let outcome = play(
            tail,
            from_state,
            &self.grammar,
            &self.salt_seed,
            &self.ledger,
            &mut NullObserver,
            || false,
        )?;
        for row in &outcome.rows {
            let n = self.ledger.append(row.input_hash)?;
            debug_assert_eq!(n, row.n);
            self.offsets
                .maybe_checkpoint(row.n, row.line_no, row.end_offset, row.row_hash);
        }
        Ok(outcome.end_state)
    }

    /// Re-scan from `start_row` (by locating the nearest checkpoint at or
    /// before it, or the beginning), re-computing offsets/line-nos while
    /// verifying each row's hash still matches the stored one. Raises
    /// `HashConflict` at the first disagreement.
    pub fn fix_offsets(&mut self, full_journal: &[u8], start_row: u64) -> Result<()> {
        let from_state = match self.offsets.latest_at_or_before(start_row.saturating_sub(1)) {
            Some(cp) => JournalState {
                n: cp.n,
                line_no: cp.line_no,
                eol_offset: cp.eol_offset,
                row_hash: cp.row_hash,
            },
            None => JournalState::INITIAL,
        };
        let tail = &full_journal[(from_state.eol_offset as usize).min(full_journal.len())..];
        let outcome = play(
            tail,
            from_state,
            &self.grammar,
            &self.salt_seed,
            &self.ledger,
            &mut NullObserver,
            || false,
        )?;
        for row in &outcome.rows {
            let stored = self.ledger.row_hash(row.n)?;
            if stored != row.row_hash {
                return Err(SkipLedgerError::HashConflict { row: row.n });
            }
            if self.offsets.due(row.n) {
                self.offsets.replace_or_insert(Checkpoint {
                    n: row.n,
                    line_no: row.line_no,
                    eol_offset: row.end_offset,
                    row_hash: row.row_hash,
                });
            }
        }
        Ok(())
    }

    /// Re-scan from the beginning and assert every checkpoint still
    /// agrees with a fresh pass: `OffsetConflict` if only the stored
    /// offset disagrees, `HashConflict` if the row hash itself disagrees.
    pub fn verify(&self, full_journal: &[u8]) -> Result<()> {
        let outcome = play(
            full_journal,
            JournalState::INITIAL,
            &self.grammar,
            &self.salt_seed,
            &self.ledger,
            &mut NullObserver,
            || false,
        )?;
        for row in &outcome.rows {
            if row.n > self.ledger.size() {
                break;
            }
            let stored = self.ledger.row_hash(row.n)?;
            if stored != row.row_hash {
                return Err(SkipLedgerError::HashConflict { row: row.n });
            }
            if let Some(cp) = self
                .offsets
                .checkpoints()
                .iter()
                .find(|c| c.n == row.n)
            {
                if cp.eol_offset != row.end_offset {
                    return Err(SkipLedgerError::OffsetConflict {
                        row: row.n,
                        expected_offset: row.end_offset,
                    });
                }
            }
        }
        Ok(())
    }

    /// Trim the ledger and offsets file to `new_size >= 1`. Interactive
    /// confirmation is the CLI boundary's concern, not this core's.
    pub fn rollback(&mut self, new_size: u64) -> Result<()> {
        if new_size == 0 {
            return Err(SkipLedgerError::FormatError {
                offset: 0,
                detail: "rollback requires a target size >= 1".into(),
            });
        }
        self.ledger.trim(new_size)?;
        self.offsets.trim_after(new_size);
        Ok(())
    }
}
