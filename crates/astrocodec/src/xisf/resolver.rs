//! External resource resolution for `url:`/`path:` DataBlock locations
//! (§4.H). The core never performs network or filesystem I/O directly;
//! callers supply a [`ResourceResolver`].

use std::string::String;
use std::time::Duration;
use std::vec::Vec;

use crate::error::{XisfError as Error, XisfResult as Result};

/// Resolves `url:`/`path:` DataBlock locations to bytes.
///
/// Implementations live outside the core (local filesystem, HTTP fetch,
/// browser OPFS, ...); this crate only defines the contract and the
/// `@header_dir/` substitution rule.
pub trait ResourceResolver {
    /// Fetch the bytes addressed by `path`, which has already had
    /// `@header_dir/` expanded by [`resolve_header_dir`].
    ///
    /// `timeout` is only meaningful for network-backed resolvers; a pure
    /// filesystem resolver may ignore it.
    fn resolve(&self, path: &str, timeout: Option<Duration>) -> Result<Vec<u8>>;
}

/// A resolver that always fails; used when the caller has no external
/// resources to serve (monolithic-only workloads).
pub struct NullResolver;

impl ResourceResolver for NullResolver {
    fn resolve(&self, path: &str, _timeout: Option<Duration>) -> Result<Vec<u8>> {
        Err(Error::Resource(std::format!("no resolver configured for {path}")))
    }
}

/// A resolver backed by a fixed in-memory table, keyed by resolved path.
/// Useful for tests and for units whose external blocks were pre-fetched.
#[derive(Default)]
pub struct MemoryResolver {
    entries: std::collections::HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }
}

impl ResourceResolver for MemoryResolver {
    fn resolve(&self, path: &str, _timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Resource(std::format!("no entry for {path}")))
    }
}

/// A resolver backed by the local filesystem, rooted at `header_dir`.
pub struct FsResolver {
    header_dir: std::path::PathBuf,
}

impl FsResolver {
    pub fn new(header_dir: impl Into<std::path::PathBuf>) -> Self {
        FsResolver { header_dir: header_dir.into() }
    }
}

impl ResourceResolver for FsResolver {
    fn resolve(&self, path: &str, _timeout: Option<Duration>) -> Result<Vec<u8>> {
        let resolved = resolve_header_dir(path, &self.header_dir.to_string_lossy());
        std::fs::read(&resolved).map_err(|e| Error::Resource(std::format!("{resolved}: {e}")))
    }
}

/// Expand a leading `@header_dir/` token against `header_dir`. Both
/// URL-style (`@header_dir/sub/file.bin` on a `file:///...` root) and plain
/// filesystem roots are supported: this is a textual substitution, not a
/// canonicalization, since the resolver decides how to interpret the
/// resulting string.
pub fn resolve_header_dir(path: &str, header_dir: &str) -> String {
    const TOKEN: &str = "@header_dir/";
    if let Some(rest) = path.strip_prefix(TOKEN) {
        let trimmed = header_dir.trim_end_matches('/');
        std::format!("{trimmed}/{rest}")
    } else {
        path.to_string()
    }
}
