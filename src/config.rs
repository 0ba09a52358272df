//! Configuration & file-naming hooks (§4.K): the minimum contract the
//! configuration collaborator must implement, plus one concrete,
//! JSON-loadable implementation.

use crate::error::{Result, SkipLedgerError};
use crate::hash::Hash;
use std::collections::HashMap;
use std::path::PathBuf;

/// One accessor per row of the §4.K key table. Optional keys return
/// `None` when absent; required keys return a `FormatError` naming the
/// missing key, at the point they're first needed (not eagerly).
pub trait Config {
    fn base_dir(&self) -> Option<&str>;
    fn source_conn_url(&self) -> Result<&str>;
    fn source_conn_credentials(&self) -> &[(String, String)];
    fn source_driver_class(&self) -> Option<&str>;
    fn hash_conn_url(&self) -> Option<&str>;
    fn hash_table_prefix(&self) -> Result<&str>;
    fn source_size_query(&self) -> Result<&str>;
    fn source_row_by_number_query(&self) -> Result<&str>;
    /// Parsed from the required 64 hex-character key into a 32-byte seed.
    fn source_salt_seed(&self) -> Result<Hash>;
    fn comment_prefix(&self) -> Option<&str>;
    fn token_delimiters(&self) -> Option<&str>;
    /// Row-delta exponent, `0..=63`; `63` disables offsets checkpointing.
    fn dex(&self) -> u32;
    fn report_template_path(&self) -> Option<&str>;
}

fn missing(key: &str) -> SkipLedgerError {
    SkipLedgerError::FormatError {
        offset: 0,
        detail: format!("required configuration key '{key}' is not set"),
    }
}

/// A flat, `HashMap<String, String>`-backed [`Config`], serde
/// (de)serializable from a JSON file — the one concrete implementation
/// this crate ships.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StaticConfig {
    values: HashMap<String, String>,
    #[serde(default)]
    credentials: Vec<(String, String)>,
}

impl StaticConfig {
    pub fn new() -> Self {
        StaticConfig::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_credential(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.credentials.push((name.into(), value.into()));
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SkipLedgerError::FormatError {
            offset: e.column(),
            detail: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SkipLedgerError::FormatError {
            offset: 0,
            detail: e.to_string(),
        })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| missing(key))
    }

    /// Resolve a relative path against `base_dir`, if one is configured.
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        match self.base_dir() {
            Some(base) => PathBuf::from(base).join(relative),
            None => PathBuf::from(relative),
        }
    }
}

impl Config for StaticConfig {
    fn base_dir(&self) -> Option<&str> {
        self.get("base_dir")
    }

    fn source_conn_url(&self) -> Result<&str> {
        self.require("source_conn_url")
    }

    fn source_conn_credentials(&self) -> &[(String, String)] {
        &self.credentials
    }

    fn source_driver_class(&self) -> Option<&str> {
        self.get("source_driver_class")
    }

    fn hash_conn_url(&self) -> Option<&str> {
        self.get("hash_conn_url")
    }

    fn hash_table_prefix(&self) -> Result<&str> {
        self.require("hash_table_prefix")
    }

    fn source_size_query(&self) -> Result<&str> {
        self.require("source_size_query")
    }

    fn source_row_by_number_query(&self) -> Result<&str> {
        self.require("source_row_by_number_query")
    }

    fn source_salt_seed(&self) -> Result<Hash> {
        let hex_str = self.require("source_salt_seed")?;
        if hex_str.len() != 64 {
            return Err(SkipLedgerError::FormatError {
                offset: 0,
                detail: format!("source_salt_seed must be exactly 64 hex chars, got {}", hex_str.len()),
            });
        }
        let bytes = hex::decode(hex_str).map_err(|e| SkipLedgerError::FormatError {
            offset: 0,
            detail: format!("source_salt_seed is not valid hex: {e}"),
        })?;
        Hash::from_slice(&bytes).ok_or_else(|| SkipLedgerError::FormatError {
            offset: 0,
            detail: "source_salt_seed did not decode to 32 bytes".into(),
        })
    }

    fn comment_prefix(&self) -> Option<&str> {
        self.get("comment_prefix")
    }

    fn token_delimiters(&self) -> Option<&str> {
        self.get("token_delimiters")
    }

    fn dex(&self) -> u32 {
        self.get("dex").and_then(|s| s.parse().ok()).unwrap_or(63)
    }

    fn report_template_path(&self) -> Option<&str> {
        self.get("report_template_path")
    }
}
