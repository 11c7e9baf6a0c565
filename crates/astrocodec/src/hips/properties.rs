//! The `properties` file: a flat `key = value` text descriptor at the root
//! of a HiPS directory (§4.M step 9, §6 "HiPS directory").

use std::collections::BTreeMap;
use std::string::String;

use crate::error::{HipsError as Error, HipsResult as Result};

/// Required keys per §4.M step 9, plus the historical aliases HiPS readers
/// also accept (`coordsys`, `maxOrder`, `format`).
pub const REQUIRED_KEYS: &[&str] = &[
    "creator_did",
    "obs_title",
    "dataproduct_type",
    "hips_version",
    "hips_frame",
    "hips_order",
    "hips_tile_width",
    "hips_tile_format",
];

/// A parsed/builder view of a `properties` file. Keys keep insertion order
/// on write by iterating a `BTreeMap`, which also gives deterministic output
/// for golden-file comparisons.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `Properties` populated with the required keys and their
    /// standard aliases, ready to serialize.
    pub fn with_required(
        creator_did: &str,
        obs_title: &str,
        dataproduct_type: &str,
        hips_frame: &str,
        hips_order: u8,
        hips_tile_width: u32,
        hips_tile_format: &str,
    ) -> Self {
        let mut p = Self::new();
        p.set("creator_did", creator_did);
        p.set("obs_title", obs_title);
        p.set("dataproduct_type", dataproduct_type);
        p.set("hips_version", "1.4");
        p.set("hips_frame", hips_frame);
        p.set("coordsys", hips_frame);
        p.set("hips_order", &hips_order.to_string());
        p.set("maxOrder", &hips_order.to_string());
        p.set("hips_tile_width", &hips_tile_width.to_string());
        p.set("hips_tile_format", hips_tile_format);
        p.set("format", hips_tile_format);
        p
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Check that every key in [`REQUIRED_KEYS`] is present.
    pub fn validate(&self) -> Result<()> {
        for key in REQUIRED_KEYS {
            if !self.entries.contains_key(*key) {
                return Err(Error::Validation("properties file is missing a required key"));
            }
        }
        Ok(())
    }

    /// Serialize as `key = value` lines, one per entry, `#`-comments and
    /// blank lines are not emitted by the writer but are tolerated on parse.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Parse a `properties` file's text. Blank lines and lines starting with
    /// `#` are skipped; each remaining line must be `key = value` (or `key=
    /// value`; surrounding whitespace around `=` is trimmed).
    pub fn parse(text: &str) -> Result<Self> {
        let mut p = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(Error::Format("properties line missing '='"))?;
            p.set(key.trim(), value.trim());
        }
        Ok(p)
    }
}
