//! Crate-wide error taxonomy.

/// The one error type returned by every fallible operation in this crate.
///
/// The core never prints; callers (the CLI, a report generator, ...) are
/// responsible for translating these into human-readable messages.
#[derive(Debug, thiserror::Error)]
pub enum SkipLedgerError {
    /// Malformed bytes in a morsel, seal, or offsets file. Not recoverable.
    #[error("format error at byte {offset}: {detail}")]
    FormatError {
        /// Byte offset in the buffer where the violation was detected.
        offset: usize,
        detail: String,
    },

    /// A computed row hash disagrees with a stored value.
    #[error("hash conflict at row {row}")]
    HashConflict {
        /// Row number of first disagreement.
        row: u64,
    },

    /// An offsets-file checkpoint disagrees with a re-scan, but row hashes
    /// still match. Recoverable via fix-offsets.
    #[error("offset conflict at row {row}: expected offset {expected_offset}")]
    OffsetConflict { row: u64, expected_offset: u64 },

    /// A requested row number falls outside `[1, size()]`.
    #[error("row {row} out of range (ledger size {size})")]
    OutOfRange { row: u64, size: u64 },

    /// A path lacks the hash of the requested row.
    #[error("row {row} is not covered by this path")]
    NotCovered { row: u64 },

    /// Underlying storage read/write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Witness submission failed (the only network round-trip in the core).
    #[error("network error: {detail}")]
    Network { detail: String },

    /// The operation requires a tracking directory that does not exist.
    #[error("journal is not tracked")]
    NotTracked,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SkipLedgerError>;
