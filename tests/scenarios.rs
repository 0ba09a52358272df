//! Black-box scenario tests, exercised purely through the public API
//! (`skipledger::...`), one per named scenario.

use skipledger::{
    hash::hash_bytes, Cell, CellValue, Hash, InMemoryRowStore, Path, SaltScheme, SkipLedger,
    SkipLedgerError, SourceRow,
};

fn h(byte: u8) -> Hash {
    Hash::from_bytes([byte; 32])
}

/// S1. Tiny chain: row_hash(1) = H(H1 ‖ sentinel), row_hash(2) =
/// H(H2 ‖ row_hash(1) ‖ sentinel), row_hash(3) = H(H3 ‖ row_hash(2)).
#[test]
fn s1_tiny_chain() {
    let h1 = h(0xaa);
    let h2 = h(0xbb);
    let h3 = h(0xcc);

    let mut ledger = SkipLedger::new(InMemoryRowStore::new());
    ledger.append(h1).unwrap();
    ledger.append(h2).unwrap();
    ledger.append(h3).unwrap();

    let expect1 = hash_bytes(&[h1.as_bytes().as_slice(), Hash::SENTINEL.as_bytes().as_slice()].concat());
    assert_eq!(ledger.row_hash(1).unwrap(), expect1);

    let expect2 = hash_bytes(
        &[
            h2.as_bytes().as_slice(),
            ledger.row_hash(1).unwrap().as_bytes().as_slice(),
            Hash::SENTINEL.as_bytes().as_slice(),
        ]
        .concat(),
    );
    assert_eq!(ledger.row_hash(2).unwrap(), expect2);

    let expect3 = hash_bytes(
        &[
            h3.as_bytes().as_slice(),
            ledger.row_hash(2).unwrap().as_bytes().as_slice(),
        ]
        .concat(),
    );
    assert_eq!(ledger.row_hash(3).unwrap(), expect3);

    let path = Path::skip_path_from_ledger(&ledger, 1, 3).unwrap();
    assert_eq!(path.row_numbers().into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
}

/// S2. skip_path(5, 12) == [5, 6, 8, 12], every step a power of two
/// dividing the successor.
#[test]
fn s2_skip_path_endpoints() {
    let path = skipledger::path::skip_path(5, 12).unwrap();
    assert_eq!(path, vec![5, 6, 8, 12]);
    for window in path.windows(2) {
        let d = window[1] - window[0];
        assert!(d.is_power_of_two());
        assert_eq!(window[1] % d, 0);
    }
}

/// S3. Journal parse: two ledgerable lines separated by a comment line
/// are tokenized and hashed in order, skipping the comment.
#[test]
fn s3_journal_parse() {
    use skipledger::{ContextedHasher, Grammar, JournalState, OffsetsFile};

    let journal = b"alpha beta\n# a comment\ngamma delta\n".to_vec();
    let grammar = Grammar::whitespace_delimited().with_comment_prefix("#");
    let ledger = SkipLedger::new(InMemoryRowStore::new());
    let mut hasher = ContextedHasher::new(ledger, OffsetsFile::new(63), grammar, h(0x01));

    let state = hasher.update(&journal).unwrap();
    assert_eq!(state.n, 2);
    assert_eq!(hasher.ledger.size(), 2);
    assert_ne!(state, JournalState::INITIAL);
}

/// S4. Fix-offsets after inserting a comment line: offsets move, row
/// hashes don't, and fix-offsets succeeds without a hash conflict.
#[test]
fn s4_fix_offsets_after_comment_insertion() {
    use skipledger::{ContextedHasher, Grammar, OffsetsFile};

    let original = b"alpha beta\ngamma delta\n".to_vec();
    let grammar = Grammar::whitespace_delimited().with_comment_prefix("#");
    let ledger = SkipLedger::new(InMemoryRowStore::new());
    let mut hasher = ContextedHasher::new(ledger, OffsetsFile::new(63), grammar, h(0x02));
    hasher.update(&original).unwrap();
    let hash_before = hasher.ledger.state_hash().unwrap();

    let edited = b"alpha beta\n# inserted comment\ngamma delta\n".to_vec();
    hasher.fix_offsets(&edited, 1).unwrap();
    assert_eq!(hasher.ledger.state_hash().unwrap(), hash_before);
}

/// S5. Redacting one cell of a multi-cell row leaves the row's input
/// hash unchanged.
#[test]
fn s5_redaction_preserves_input_hash() {
    let cells = vec![
        Cell::new(CellValue::Long(1)),
        Cell::new(CellValue::String("secret".into())),
        Cell::new(CellValue::Long(3)),
    ];
    let mut row = SourceRow::with_row_salt(1, cells, h(0x03));
    let scheme = SaltScheme::AllSalted;
    let before = row.input_hash(&scheme);

    row.redact_cell(1, &scheme);
    assert!(row.cells[1].value.is_redacted());

    let after = row.input_hash(&scheme);
    assert_eq!(before, after);
}

/// S6. Morsel round-trip: path [1,2,4,8] of a 10-row ledger, row 4
/// revealed, row 8 trailed. After serialize/parse, row 8's hash matches
/// the original ledger and row 3 is not covered.
#[test]
fn s6_morsel_round_trip() {
    use skipledger::morsel::{Builder, MorselPack};
    use skipledger::witness::{Crum, Crumtrail, TrailedRow};

    let mut ledger = SkipLedger::new(InMemoryRowStore::new());
    for i in 1u8..=10 {
        ledger.append(h(i)).unwrap();
    }
    let path = Path::from_ledger(&ledger, &[1, 2, 4, 8]).unwrap();

    let revealed_row = SourceRow::new(4, vec![Cell::new(CellValue::Long(42))]);
    let trail8 = TrailedRow {
        n: 8,
        crumtrail: Crumtrail::new(
            1,
            0,
            Vec::new(),
            Crum {
                row_hash: ledger.row_hash(8).unwrap(),
                utc: 1_700_000_000_000,
            },
        )
        .unwrap(),
    };

    let bytes = Builder::new(path.clone(), SaltScheme::NoneSalted)
        .with_source_row(revealed_row)
        .with_trail(trail8)
        .build()
        .unwrap();

    let parsed = MorselPack::parse(&bytes).unwrap();
    let parsed_path = &parsed.path;

    assert_eq!(parsed_path.get_row_hash(8).unwrap(), ledger.row_hash(8).unwrap());
    assert!(matches!(
        parsed_path.get_row_hash(3),
        Err(SkipLedgerError::NotCovered { row: 3 })
    ));
}
