//! Fixed 32-byte hash primitive and the tiered variable-length byte codecs
//! used by the morsel pack and offsets file.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width in bytes of every hash in this crate.
pub const HASH_WIDTH: usize = 32;

/// Opaque 32-byte digest. Equality is byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Hash(pub [u8; HASH_WIDTH]);

impl Hash {
    /// The distinguished sentinel hash (all zeros), standing in for the
    /// row-zero predecessor and the empty-tree root.
    pub const SENTINEL: Hash = Hash([0u8; HASH_WIDTH]);

    /// Wrap a caller-supplied 32-byte digest (e.g. a redacted cell's
    /// precomputed terminal hash).
    pub fn from_bytes(bytes: [u8; HASH_WIDTH]) -> Self {
        Hash(bytes)
    }

    /// Build from a byte slice, failing if it is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_WIDTH {
            return None;
        }
        let mut out = [0u8; HASH_WIDTH];
        out.copy_from_slice(bytes);
        Some(Hash(out))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_WIDTH] {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == [0u8; HASH_WIDTH]
    }

    /// URL-safe, unpadded base64 encoding of the 32 bytes (43 characters).
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse the 43-character URL-safe base64 encoding produced by
    /// [`Hash::to_base64`].
    pub fn from_base64(s: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_base64())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// Hash the concatenation of the given byte strings: `H(a ‖ b ‖ ... )`.
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_WIDTH];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Hash a single byte string: `H(data)`.
pub fn hash_bytes(data: &[u8]) -> Hash {
    hash_concat(&[data])
}

/// Tiered width selector for variable-length count fields in the morsel
/// layout (§4.H): 1-byte for ≤255, 2-byte for ≤65535, 3-byte "big short"
/// for ≤16,777,215, 4-byte otherwise. The width is chosen once, at
/// container header time, and fixed thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    One,
    Two,
    Three,
    Four,
}

impl CountWidth {
    /// Pick the narrowest width that can represent `max_value`.
    pub fn smallest_for(max_value: u64) -> Self {
        if max_value <= 0xFF {
            CountWidth::One
        } else if max_value <= 0xFFFF {
            CountWidth::Two
        } else if max_value <= 0xFF_FFFF {
            CountWidth::Three
        } else {
            CountWidth::Four
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            CountWidth::One => 1,
            CountWidth::Two => 2,
            CountWidth::Three => 3,
            CountWidth::Four => 4,
        }
    }

    pub fn as_tag(self) -> u8 {
        match self {
            CountWidth::One => 1,
            CountWidth::Two => 2,
            CountWidth::Three => 3,
            CountWidth::Four => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(CountWidth::One),
            2 => Some(CountWidth::Two),
            3 => Some(CountWidth::Three),
            4 => Some(CountWidth::Four),
            _ => None,
        }
    }

    /// Write `value` big-endian in this width. Panics if `value` does not
    /// fit — callers must have selected a width covering every count
    /// up front (the morsel builder does this before emitting any row).
    pub fn write(self, value: u64, out: &mut Vec<u8>) {
        let width = self.byte_len();
        assert!(
            value < (1u64 << (width * 8).min(63)) || width == 4,
            "value {value} does not fit in a {width}-byte field"
        );
        let be = value.to_be_bytes();
        out.extend_from_slice(&be[8 - width..]);
    }

    /// Read a value of this width from `buf` at `offset`, returning the
    /// value and the new offset.
    pub fn read(self, buf: &[u8], offset: usize) -> Option<(u64, usize)> {
        let width = self.byte_len();
        if offset + width > buf.len() {
            return None;
        }
        let mut be = [0u8; 8];
        be[8 - width..].copy_from_slice(&buf[offset..offset + width]);
        Some((u64::from_be_bytes(be), offset + width))
    }
}
