//! Source rows and input-hash derivation (§4.B step 2, §3 "Source row").

use crate::cell::{Cell, SaltScheme};
use crate::hash::{hash_concat, Hash};

/// A structured source row: an ordered list of cells, an optional
/// row-salt, and the row number it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub n: u64,
    pub cells: Vec<Cell>,
    pub row_salt: Option<Hash>,
}

impl SourceRow {
    pub fn new(n: u64, cells: Vec<Cell>) -> Self {
        SourceRow {
            n,
            cells,
            row_salt: None,
        }
    }

    pub fn with_row_salt(n: u64, cells: Vec<Cell>, row_salt: Hash) -> Self {
        SourceRow {
            n,
            cells,
            row_salt: Some(row_salt),
        }
    }

    /// Per-cell terminal hashes `t_1..t_m`, in cell order.
    pub fn terminal_hashes(&self, scheme: &SaltScheme) -> Vec<Hash> {
        self.cells
            .iter()
            .enumerate()
            .map(|(k, cell)| cell.terminal_hash(k, scheme, self.row_salt.as_ref()))
            .collect()
    }

    /// The row's input hash: `H(t_1 ‖ t_2 ‖ ... ‖ t_m)`.
    pub fn input_hash(&self, scheme: &SaltScheme) -> Hash {
        let terminals = self.terminal_hashes(scheme);
        let refs: Vec<&[u8]> = terminals.iter().map(|h| h.as_bytes() as &[u8]).collect();
        hash_concat(&refs)
    }

    /// Replace the revealed cell at `index` with its precomputed terminal
    /// hash. The row's input hash is unchanged (§8 invariant 5, "Redaction
    /// law"): `t_k` already depends on the salt and the value, so swapping
    /// in the same `t_k` as a `Redacted` cell leaves the product
    /// `t_1 ‖ ... ‖ t_m` byte-identical.
    pub fn redact_cell(&mut self, index: usize, scheme: &SaltScheme) {
        let t_k = self.cells[index].terminal_hash(index, scheme, self.row_salt.as_ref());
        self.cells[index] = Cell::redacted(t_k);
    }

    /// Build a copy with the given indices redacted, leaving `self`
    /// untouched.
    pub fn redacted_copy(&self, indices: &[usize], scheme: &SaltScheme) -> SourceRow {
        let mut copy = self.clone();
        for &index in indices {
            copy.redact_cell(index, scheme);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    fn sample_row() -> SourceRow {
        SourceRow::new(
            1,
            vec![
                Cell::new(CellValue::String("alpha".into())),
                Cell::new(CellValue::Long(42)),
                Cell::new(CellValue::String("gamma".into())),
            ],
        )
    }

    #[test]
    fn redaction_preserves_input_hash() {
        let scheme = SaltScheme::AllSalted;
        let row_salt = Hash::from_bytes([5u8; 32]);
        let mut row = sample_row();
        row.row_salt = Some(row_salt);

        let before = row.input_hash(&scheme);
        row.redact_cell(1, &scheme);
        let after = row.input_hash(&scheme);

        assert_eq!(before, after);
        assert!(row.cells[1].value.is_redacted());
    }

    #[test]
    fn redacting_changed_value_changes_hash_if_not_done_via_terminal() {
        // Sanity check: a row with a genuinely different cell value at the
        // same index has a different input hash than the original.
        let scheme = SaltScheme::NoneSalted;
        let row_a = sample_row();
        let mut row_b = sample_row();
        row_b.cells[1] = Cell::new(CellValue::Long(43));
        assert_ne!(row_a.input_hash(&scheme), row_b.input_hash(&scheme));
    }

    #[test]
    fn redacted_copy_leaves_original_untouched() {
        let scheme = SaltScheme::NoneSalted;
        let row = sample_row();
        let copy = row.redacted_copy(&[0, 2], &scheme);
        assert!(!row.cells[0].value.is_redacted());
        assert!(copy.cells[0].value.is_redacted());
        assert!(copy.cells[2].value.is_redacted());
        assert_eq!(row.input_hash(&scheme), copy.input_hash(&scheme));
    }
}
