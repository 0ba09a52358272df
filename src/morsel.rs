//! Morsel pack binary container (§4.H): a self-contained, verifiable
//! extract of a ledger — a skip-path's row-hash bag, an optional subset
//! of fully-revealed (or redacted) source rows, overlapping crumtrails,
//! an annotation comment, and an asset bundle.

use crate::cell::{Cell, CellValue, SaltScheme};
use crate::error::{Result, SkipLedgerError};
use crate::hash::{CountWidth, Hash, HASH_WIDTH};
use crate::path::{Path, PathRow};
use crate::source_row::SourceRow;
use crate::witness::{Crum, Crumtrail, TrailedRow};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const MORSEL_HEADER: &[u8; 10] = b"MRSL  0.3 ";
const CURRENT_VERSION: &str = "0.3";

const SCHEMA_ISO_COUNT: u64 = 1;
const SCHEMA_SALTED_IDX: u64 = 2;
const SCHEMA_UNSALTED_IDX: u64 = 4;

const ROW_FLAG_HAS_ROW_SALT: u8 = 1;

const CELL_CODE_REDACTED: u8 = 0;
const CELL_CODE_NULL: u8 = 1;
const CELL_CODE_LONG: u8 = 2;
const CELL_CODE_DOUBLE: u8 = 3;
const CELL_CODE_DATE: u8 = 4;
const CELL_CODE_STRING: u8 = 5;
const CELL_CODE_BYTES: u8 = 6;
const CELL_CODE_HASH: u8 = 7;

/// How a parsed header's version compares to [`CURRENT_VERSION`] (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionNote {
    Current,
    Older,
    Newer,
    NonStandard,
}

fn fmt_err(offset: usize, detail: impl Into<String>) -> SkipLedgerError {
    SkipLedgerError::FormatError {
        offset,
        detail: detail.into(),
    }
}

fn parse_header(buf: &[u8]) -> Result<VersionNote> {
    if buf.len() < 10 || &buf[0..4] != b"MRSL" {
        return Err(fmt_err(0, "unrecognized morsel preamble"));
    }
    let version_field = String::from_utf8_lossy(&buf[4..10]);
    let version = version_field.trim();
    let note = if version == CURRENT_VERSION {
        VersionNote::Current
    } else if version.split('.').all(|p| p.chars().all(|c| c.is_ascii_digit())) && !version.is_empty()
    {
        if version < CURRENT_VERSION {
            debug!(version, "loading older-than-current morsel");
            VersionNote::Older
        } else {
            info!(version, "loading newer-than-current morsel");
            VersionNote::Newer
        }
    } else {
        warn!(version, "loading well-formed but non-standard morsel version");
        VersionNote::NonStandard
    };
    Ok(note)
}

fn write_u16(v: u16, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_be_bytes());
}
fn write_u32(v: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_be_bytes());
}
fn write_u64(v: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_be_bytes());
}
fn write_i64(v: i64, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn read_u16(buf: &[u8], off: usize) -> Result<(u16, usize)> {
    if off + 2 > buf.len() {
        return Err(fmt_err(off, "truncated u16"));
    }
    Ok((u16::from_be_bytes(buf[off..off + 2].try_into().unwrap()), off + 2))
}
fn read_u32(buf: &[u8], off: usize) -> Result<(u32, usize)> {
    if off + 4 > buf.len() {
        return Err(fmt_err(off, "truncated u32"));
    }
    Ok((u32::from_be_bytes(buf[off..off + 4].try_into().unwrap()), off + 4))
}
fn read_u64(buf: &[u8], off: usize) -> Result<(u64, usize)> {
    if off + 8 > buf.len() {
        return Err(fmt_err(off, "truncated u64"));
    }
    Ok((u64::from_be_bytes(buf[off..off + 8].try_into().unwrap()), off + 8))
}
fn read_i64(buf: &[u8], off: usize) -> Result<(i64, usize)> {
    if off + 8 > buf.len() {
        return Err(fmt_err(off, "truncated i64"));
    }
    Ok((i64::from_be_bytes(buf[off..off + 8].try_into().unwrap()), off + 8))
}
fn read_hash(buf: &[u8], off: usize) -> Result<(Hash, usize)> {
    if off + HASH_WIDTH > buf.len() {
        return Err(fmt_err(off, "truncated hash"));
    }
    let h = Hash::from_slice(&buf[off..off + HASH_WIDTH]).expect("slice is exactly HASH_WIDTH");
    Ok((h, off + HASH_WIDTH))
}
fn read_bytes<'a>(buf: &'a [u8], off: usize, len: usize) -> Result<(&'a [u8], usize)> {
    if off + len > buf.len() {
        return Err(fmt_err(off, "truncated byte payload"));
    }
    Ok((&buf[off..off + len], off + len))
}

/// Assembles a morsel from a path, an optional subset of source rows,
/// an optional subset of crumtrails, a comment, and an asset bundle.
pub struct Builder {
    path: Path,
    source_rows: Vec<SourceRow>,
    trails: Vec<TrailedRow>,
    comment: Option<String>,
    assets: BTreeMap<String, Vec<u8>>,
    salt_scheme: SaltScheme,
}

impl Builder {
    pub fn new(path: Path, salt_scheme: SaltScheme) -> Self {
        Builder {
            path,
            source_rows: Vec::new(),
            trails: Vec::new(),
            comment: None,
            assets: BTreeMap::new(),
            salt_scheme,
        }
    }

    pub fn with_source_row(mut self, row: SourceRow) -> Self {
        self.source_rows.push(row);
        self
    }

    pub fn with_trail(mut self, trail: TrailedRow) -> Self {
        self.trails.push(trail);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_asset(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.assets.insert(name.into(), data);
        self
    }

    fn validate(&self) -> Result<()> {
        let covered = self.path.row_numbers();
        for row in &self.source_rows {
            if !covered.contains(&row.n) {
                return Err(fmt_err(
                    0,
                    format!("source row {} is not a member of the morsel's path", row.n),
                ));
            }
        }
        for trail in &self.trails {
            if !covered.contains(&trail.n) {
                return Err(fmt_err(
                    0,
                    format!("trail for row {} is not a member of the morsel's path", trail.n),
                ));
            }
        }
        Ok(())
    }

    /// Which cell indices the scheme marks salted/unsalted, encoded as
    /// `(schema_bits, sorted_indices)`. `None` indices means the scheme
    /// needs no list (`AllSalted`/`NoneSalted`).
    fn schema_indices(&self) -> (u64, Option<Vec<u16>>) {
        match &self.salt_scheme {
            SaltScheme::AllSalted | SaltScheme::NoneSalted => (0, None),
            SaltScheme::SaltedIndices(set) => (
                SCHEMA_SALTED_IDX,
                Some(set.iter().map(|&i| i as u16).collect()),
            ),
            SaltScheme::UnsaltedIndices(set) => (
                SCHEMA_UNSALTED_IDX,
                Some(set.iter().map(|&i| i as u16).collect()),
            ),
        }
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut out = Vec::new();
        out.extend_from_slice(MORSEL_HEADER);

        // Path section (not part of the literal §4.H row-bag layout;
        // precedes it so the hash-only skip-path is always present).
        write_u32(self.path.rows().len() as u32, &mut out);
        for row in self.path.rows() {
            write_i64(row.n as i64, &mut out);
            out.extend_from_slice(row.input_hash.as_bytes());
            out.push(row.levels.len() as u8);
            for level in &row.levels {
                out.extend_from_slice(level.as_bytes());
            }
        }

        let iso_count = self
            .source_rows
            .first()
            .map(|r| r.cells.len())
            .filter(|&c| c <= 0xFF && self.source_rows.iter().all(|r| r.cells.len() == c));
        let (mut schema_code, salt_indices) = self.schema_indices();
        if iso_count.is_some() {
            schema_code |= SCHEMA_ISO_COUNT;
        }
        write_u64(schema_code, &mut out);

        if let Some(indices) = &salt_indices {
            write_u16(indices.len() as u16, &mut out);
            for &idx in indices {
                write_u16(idx, &mut out);
            }
        }

        let count_width = match iso_count {
            Some(fixed) => {
                out.push(fixed as u8);
                None
            }
            None => {
                let max_cc = self.source_rows.iter().map(|r| r.cells.len() as u64).max().unwrap_or(0);
                let width = CountWidth::smallest_for(max_cc);
                out.push(width.as_tag());
                Some(width)
            }
        };

        let max_payload = self
            .source_rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter_map(|c| match &c.value {
                CellValue::String(s) => Some(s.len() as u64),
                CellValue::Bytes(b) => Some(b.len() as u64),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let var_size_width = if max_payload <= 0xFFFF {
            CountWidth::Two
        } else if max_payload <= 0xFF_FFFF {
            CountWidth::Three
        } else {
            CountWidth::Four
        };
        out.push(var_size_width.as_tag());

        let mut sorted_rows: Vec<&SourceRow> = self.source_rows.iter().collect();
        sorted_rows.sort_by_key(|r| r.n);
        write_u32(sorted_rows.len() as u32, &mut out);

        for row in sorted_rows {
            write_i64(row.n as i64, &mut out);
            if let Some(width) = count_width {
                width.write(row.cells.len() as u64, &mut out);
            }
            let has_row_salt = row.row_salt.is_some();
            let mut flags = 0u8;
            if has_row_salt {
                flags |= ROW_FLAG_HAS_ROW_SALT;
            }
            out.push(flags);
            if let Some(salt) = row.row_salt {
                out.extend_from_slice(salt.as_bytes());
            }
            for (k, cell) in row.cells.iter().enumerate() {
                self.write_cell(cell, k, row.row_salt.as_ref(), var_size_width, &mut out)?;
            }
        }

        let mut sorted_trails: Vec<&TrailedRow> = self.trails.iter().collect();
        sorted_trails.sort_by_key(|t| t.n);
        write_u32(sorted_trails.len() as u32, &mut out);
        for trail in sorted_trails {
            write_i64(trail.n as i64, &mut out);
            write_u64(trail.crumtrail.leaf_count, &mut out);
            write_u64(trail.crumtrail.leaf_index, &mut out);
            write_u16(trail.crumtrail.chain.len() as u16, &mut out);
            for link in &trail.crumtrail.chain {
                out.extend_from_slice(link.as_bytes());
            }
            write_i64(trail.crumtrail.crum.utc, &mut out);
            out.extend_from_slice(trail.crumtrail.crum.row_hash.as_bytes());
        }

        match &self.comment {
            Some(text) => {
                out.push(1);
                write_u32(text.len() as u32, &mut out);
                out.extend_from_slice(text.as_bytes());
            }
            None => out.push(0),
        }

        write_u32(self.assets.len() as u32, &mut out);
        for (name, data) in &self.assets {
            write_u16(name.len() as u16, &mut out);
            out.extend_from_slice(name.as_bytes());
            write_u32(data.len() as u32, &mut out);
            out.extend_from_slice(data);
        }

        Ok(out)
    }

    fn write_cell(
        &self,
        cell: &Cell,
        index: usize,
        row_salt: Option<&Hash>,
        var_size_width: CountWidth,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if let CellValue::Redacted(t) = &cell.value {
            out.push(CELL_CODE_REDACTED);
            out.extend_from_slice(t.as_bytes());
            return Ok(());
        }
        if row_salt.is_none() && self.salt_scheme.is_salted(index) && cell.salt.is_none() {
            let t = cell.terminal_hash(index, &self.salt_scheme, row_salt);
            out.push(CELL_CODE_REDACTED);
            out.extend_from_slice(t.as_bytes());
            return Ok(());
        }
        match &cell.value {
            CellValue::Null => out.push(CELL_CODE_NULL),
            CellValue::Long(v) => {
                out.push(CELL_CODE_LONG);
                write_i64(*v, out);
            }
            CellValue::Double(v) => {
                out.push(CELL_CODE_DOUBLE);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            CellValue::Date(v) => {
                out.push(CELL_CODE_DATE);
                write_i64(*v, out);
            }
            CellValue::String(s) => {
                out.push(CELL_CODE_STRING);
                var_size_width.write(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            CellValue::Bytes(b) => {
                out.push(CELL_CODE_BYTES);
                var_size_width.write(b.len() as u64, out);
                out.extend_from_slice(b);
            }
            CellValue::Hash(h) => {
                out.push(CELL_CODE_HASH);
                out.extend_from_slice(h.as_bytes());
            }
            CellValue::Redacted(_) => unreachable!("handled above"),
        }
        Ok(())
    }
}

/// A parsed morsel: the path's row-hash bag, any revealed/redacted
/// source rows, any crumtrails, the comment, and the asset bundle.
#[derive(Debug, Clone)]
pub struct MorselPack {
    pub version: VersionNote,
    pub path: Path,
    pub source_rows: Vec<SourceRow>,
    pub trails: Vec<TrailedRow>,
    pub comment: Option<String>,
    pub assets: BTreeMap<String, Vec<u8>>,
}

impl MorselPack {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let version = parse_header(buf)?;
        let mut off = 10usize;

        let (path_row_count, next) = read_u32(buf, off)?;
        off = next;
        let mut path_rows = Vec::with_capacity(path_row_count as usize);
        for _ in 0..path_row_count {
            let (n, next) = read_i64(buf, off)?;
            off = next;
            if n <= 0 {
                return Err(fmt_err(off, "path row number must be positive"));
            }
            let (input_hash, next) = read_hash(buf, off)?;
            off = next;
            if off >= buf.len() {
                return Err(fmt_err(off, "truncated path row"));
            }
            let level_count = buf[off] as usize;
            off += 1;
            let mut levels = Vec::with_capacity(level_count);
            for _ in 0..level_count {
                let (level, next) = read_hash(buf, off)?;
                off = next;
                levels.push(level);
            }
            path_rows.push(PathRow {
                n: n as u64,
                input_hash,
                levels,
            });
        }
        let path = Path::new(path_rows)?;
        let covered = path.row_numbers();

        let (schema_code, next) = read_u64(buf, off)?;
        off = next;
        if schema_code >= 8 {
            return Err(fmt_err(off, format!("schema_code {schema_code} out of range")));
        }
        let iso_count = schema_code & SCHEMA_ISO_COUNT != 0;
        let salted_idx = schema_code & SCHEMA_SALTED_IDX != 0;
        let unsalted_idx = schema_code & SCHEMA_UNSALTED_IDX != 0;
        if salted_idx && unsalted_idx {
            return Err(fmt_err(off, "schema_code sets both SALTED_IDX and UNSALTED_IDX"));
        }

        let mut indices: Option<Vec<usize>> = None;
        if salted_idx || unsalted_idx {
            let (count, next) = read_u16(buf, off)?;
            off = next;
            let mut list = Vec::with_capacity(count as usize);
            let mut prev: Option<u16> = None;
            for _ in 0..count {
                let (idx, next) = read_u16(buf, off)?;
                off = next;
                if let Some(p) = prev {
                    if idx <= p {
                        return Err(fmt_err(off, "salt indices must be strictly ascending"));
                    }
                }
                prev = Some(idx);
                list.push(idx as usize);
            }
            indices = Some(list);
        }
        let scheme = if salted_idx {
            SaltScheme::SaltedIndices(indices.unwrap().into_iter().collect())
        } else if unsalted_idx {
            SaltScheme::UnsaltedIndices(indices.unwrap().into_iter().collect())
        } else {
            SaltScheme::AllSalted
        };

        if off >= buf.len() {
            return Err(fmt_err(off, "truncated cell-count header"));
        }
        let (row_count_width, cc_fixed): (Option<CountWidth>, Option<u64>) = if iso_count {
            let cc = buf[off] as u64;
            off += 1;
            (None, Some(cc))
        } else {
            let width = CountWidth::from_tag(buf[off])
                .ok_or_else(|| fmt_err(off, "unrecognized count width tag"))?;
            off += 1;
            (Some(width), None)
        };

        if off >= buf.len() {
            return Err(fmt_err(off, "truncated var_size_width"));
        }
        let var_size_width = match buf[off] {
            2 => CountWidth::Two,
            3 => CountWidth::Three,
            4 => CountWidth::Four,
            other => return Err(fmt_err(off, format!("var_size_width {other} must be 2, 3, or 4"))),
        };
        off += 1;

        let (row_count, next) = {
            let (v, next) = read_u32(buf, off)?;
            (v as i32, next)
        };
        off = next;
        if row_count <= 0 {
            return Err(fmt_err(off, "row_count must be positive"));
        }

        let mut source_rows = Vec::with_capacity(row_count as usize);
        let mut prev_n: Option<u64> = None;
        for _ in 0..row_count {
            let (n_raw, next) = read_i64(buf, off)?;
            off = next;
            if n_raw <= 0 {
                return Err(fmt_err(off, "row_no must be positive"));
            }
            let n = n_raw as u64;
            if let Some(p) = prev_n {
                if n <= p {
                    return Err(fmt_err(off, "row numbers must be strictly ascending"));
                }
            }
            prev_n = Some(n);
            if !covered.contains(&n) {
                return Err(fmt_err(off, format!("source row {n} is not a member of the morsel's path")));
            }

            let cc = match cc_fixed {
                Some(v) => v,
                None => {
                    let width = row_count_width.expect("non-iso schema always carries a width");
                    let (v, next) = width.read(buf, off).ok_or_else(|| fmt_err(off, "truncated cc"))?;
                    off = next;
                    v
                }
            };

            if off >= buf.len() {
                return Err(fmt_err(off, "truncated row_flags"));
            }
            let flags = buf[off];
            off += 1;
            let has_row_salt = flags & ROW_FLAG_HAS_ROW_SALT != 0;

            let row_salt = if has_row_salt {
                let (salt, next) = read_hash(buf, off)?;
                off = next;
                Some(salt)
            } else {
                None
            };

            let mut cells = Vec::with_capacity(cc as usize);
            for k in 0..cc as usize {
                if off >= buf.len() {
                    return Err(fmt_err(off, "truncated cell code"));
                }
                let code = buf[off];
                off += 1;
                let salted_here = scheme.is_salted(k);
                if code == CELL_CODE_REDACTED {
                    let (t, next) = read_hash(buf, off)?;
                    off = next;
                    cells.push(Cell::redacted(t));
                    continue;
                }
                if salted_here && !has_row_salt {
                    return Err(fmt_err(
                        off,
                        format!("cell {k} is salted but row {n} carries no row-salt; must be redacted"),
                    ));
                }
                let value = match code {
                    CELL_CODE_NULL => CellValue::Null,
                    CELL_CODE_LONG => {
                        let (v, next) = read_i64(buf, off)?;
                        off = next;
                        CellValue::Long(v)
                    }
                    CELL_CODE_DOUBLE => {
                        let (bits, next) = read_u64(buf, off)?;
                        off = next;
                        CellValue::Double(f64::from_bits(bits))
                    }
                    CELL_CODE_DATE => {
                        let (v, next) = read_i64(buf, off)?;
                        off = next;
                        CellValue::Date(v)
                    }
                    CELL_CODE_STRING => {
                        let (len, next) = var_size_width
                            .read(buf, off)
                            .ok_or_else(|| fmt_err(off, "truncated string length"))?;
                        off = next;
                        let (bytes, next) = read_bytes(buf, off, len as usize)?;
                        off = next;
                        let s = String::from_utf8(bytes.to_vec())
                            .map_err(|_| fmt_err(off, "string cell is not valid UTF-8"))?;
                        CellValue::String(s)
                    }
                    CELL_CODE_BYTES => {
                        let (len, next) = var_size_width
                            .read(buf, off)
                            .ok_or_else(|| fmt_err(off, "truncated bytes length"))?;
                        off = next;
                        let (bytes, next) = read_bytes(buf, off, len as usize)?;
                        off = next;
                        CellValue::Bytes(bytes.to_vec())
                    }
                    CELL_CODE_HASH => {
                        let (h, next) = read_hash(buf, off)?;
                        off = next;
                        CellValue::Hash(h)
                    }
                    other => return Err(fmt_err(off, format!("illegal cell code {other}"))),
                };
                cells.push(Cell::new(value));
            }

            source_rows.push(match row_salt {
                Some(salt) => SourceRow::with_row_salt(n, cells, salt),
                None => SourceRow::new(n, cells),
            });
        }

        let (trail_count, next) = read_u32(buf, off)?;
        off = next;
        let mut trails = Vec::with_capacity(trail_count as usize);
        for _ in 0..trail_count {
            let (n_raw, next) = read_i64(buf, off)?;
            off = next;
            if n_raw <= 0 || !covered.contains(&(n_raw as u64)) {
                return Err(fmt_err(off, "trail row number must be a positive member of the path"));
            }
            let (leaf_count, next) = read_u64(buf, off)?;
            off = next;
            let (leaf_index, next) = read_u64(buf, off)?;
            off = next;
            let (chain_len, next) = read_u16(buf, off)?;
            off = next;
            let mut chain = Vec::with_capacity(chain_len as usize);
            for _ in 0..chain_len {
                let (h, next) = read_hash(buf, off)?;
                off = next;
                chain.push(h);
            }
            let (utc, next) = read_i64(buf, off)?;
            off = next;
            let (row_hash, next) = read_hash(buf, off)?;
            off = next;
            let crumtrail = Crumtrail::new(leaf_count, leaf_index, chain, Crum { row_hash, utc })?;
            trails.push(TrailedRow {
                n: n_raw as u64,
                crumtrail,
            });
        }

        if off >= buf.len() {
            return Err(fmt_err(off, "truncated comment flag"));
        }
        let comment = if buf[off] == 1 {
            off += 1;
            let (len, next) = read_u32(buf, off)?;
            off = next;
            let (bytes, next) = read_bytes(buf, off, len as usize)?;
            off = next;
            Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| fmt_err(off, "comment is not valid UTF-8"))?,
            )
        } else {
            off += 1;
            None
        };

        let (asset_count, next) = read_u32(buf, off)?;
        off = next;
        let mut assets = BTreeMap::new();
        for _ in 0..asset_count {
            let (name_len, next) = read_u16(buf, off)?;
            off = next;
            let (name_bytes, next) = read_bytes(buf, off, name_len as usize)?;
            off = next;
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|_| fmt_err(off, "asset name is not valid UTF-8"))?;
            let (data_len, next) = read_u32(buf, off)?;
            off = next;
            let (data, next) = read_bytes(buf, off, data_len as usize)?;
            off = next;
            assets.insert(name, data.to_vec());
        }

        Ok(MorselPack {
            version,
            path,
            source_rows,
            trails,
            comment,
            assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryRowStore;
    use crate::ledger::SkipLedger;
    use std::sync::Once;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            tracing_subscriber::fmt().with_test_writer().init();
        });
    }

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    fn build_ledger() -> SkipLedger<InMemoryRowStore> {
        let mut ledger = SkipLedger::new(InMemoryRowStore::new());
        for i in 1..=10u8 {
            ledger.append(h(i)).unwrap();
        }
        ledger
    }

    /// Scenario S6: build a morsel from path [1,2,4,8], with row 4
    /// revealed and a trail for row 8; round-trip and re-verify.
    #[test]
    fn s6_morsel_round_trip() {
        let ledger = build_ledger();
        let path = Path::skip_path_from_ledger(&ledger, 1, 8).unwrap();

        let row4 = SourceRow::new(
            4,
            vec![Cell::new(CellValue::String("alpha".into()))],
        );
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

        let builder = Builder::new(path, SaltScheme::NoneSalted)
            .with_source_row(row4)
            .with_trail(trail8)
            .with_comment("audit export");
        let bytes = builder.build().unwrap();

        let parsed = MorselPack::parse(&bytes).unwrap();
        assert_eq!(parsed.version, VersionNote::Current);
        assert_eq!(parsed.source_rows.len(), 1);
        assert_eq!(parsed.trails.len(), 1);
        assert_eq!(parsed.comment.as_deref(), Some("audit export"));

        assert_eq!(
            parsed.path.get_row_hash(8).unwrap(),
            ledger.row_hash(8).unwrap()
        );
        assert!(matches!(
            parsed.path.get_row_hash(3),
            Err(SkipLedgerError::NotCovered { row: 3 })
        ));
    }

    #[test]
    fn redacted_cell_round_trips_without_salt() {
        let ledger = build_ledger();
        let path = Path::skip_path_from_ledger(&ledger, 1, 4).unwrap();
        let mut row = SourceRow::new(4, vec![Cell::new(CellValue::Long(99))]);
        row.redact_cell(0, &SaltScheme::NoneSalted);

        let bytes = Builder::new(path, SaltScheme::NoneSalted)
            .with_source_row(row.clone())
            .build()
            .unwrap();
        let parsed = MorselPack::parse(&bytes).unwrap();
        assert_eq!(parsed.source_rows[0].cells[0].value, row.cells[0].value);
    }

    #[test]
    fn unrecognized_preamble_rejected() {
        let err = MorselPack::parse(b"NOTMRSL!!xyz").unwrap_err();
        assert!(matches!(err, SkipLedgerError::FormatError { .. }));
    }

    #[test]
    fn old_version_header_parses_with_note() {
        init_test_logger();
        let mut bytes = b"MRSL  0.2 ".to_vec();
        let ledger = build_ledger();
        let path = Path::skip_path_from_ledger(&ledger, 1, 2).unwrap();
        let rest = Builder::new(path, SaltScheme::NoneSalted).build().unwrap();
        bytes.extend_from_slice(&rest[10..]);
        let parsed = MorselPack::parse(&bytes).unwrap();
        assert_eq!(parsed.version, VersionNote::Older);
    }
}
