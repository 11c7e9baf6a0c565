//! Storage target abstraction (§4.N): callers supply where bytes/text live,
//! the core never assumes a particular filesystem. A local-disk backend is
//! provided for native use; other hosts (browser OPFS, object storage) are
//! expected to implement [`StorageTarget`] outside this crate.

use std::string::String;
use std::vec::Vec;

use crate::error::{Error, Result};

/// Minimal read/write contract a storage backend must fulfill.
///
/// Paths always use forward slashes and are relative to a target-chosen
/// root; a conforming implementation creates parent directories implicitly
/// on write.
pub trait StorageTarget {
    /// Write `bytes` at `path`, creating parent directories as needed.
    fn write_binary(&mut self, path: &str, bytes: &[u8]) -> Result<()>;
    /// Write `text` at `path` as UTF-8, creating parent directories as needed.
    fn write_text(&mut self, path: &str, text: &str) -> Result<()> {
        self.write_binary(path, text.as_bytes())
    }
    /// Read the full contents of `path`.
    fn read_binary(&self, path: &str) -> Result<Vec<u8>>;
    /// Read `path` as UTF-8 text.
    fn read_text(&self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path)?;
        String::from_utf8(bytes).map_err(|_| Error::Hips(crate::error::HipsError::Format("stored text is not valid UTF-8")))
    }
    /// Whether `path` already exists.
    fn exists(&self, path: &str) -> bool;
    /// Flush any buffered state. The default no-op suits backends (like
    /// [`LocalFsTarget`]) that write through immediately.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A [`StorageTarget`] rooted at a directory on the local filesystem.
pub struct LocalFsTarget {
    root: std::path::PathBuf,
}

impl LocalFsTarget {
    /// Open (without requiring it to already exist) a target rooted at `root`.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        LocalFsTarget { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        let mut out = self.root.clone();
        for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            out.push(component);
        }
        out
    }
}

impl StorageTarget for LocalFsTarget {
    fn write_binary(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&resolved, bytes)?;
        Ok(())
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.resolve(path))?)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}

/// A [`StorageTarget`] that keeps everything in memory, for tests and for
/// callers assembling an archive (zip, tar) from the written entries.
#[derive(Default)]
pub struct MemoryTarget {
    entries: std::collections::HashMap<String, Vec<u8>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate the written entries in insertion order is not guaranteed;
    /// callers needing a deterministic archive layout should sort by path.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl StorageTarget for MemoryTarget {
    fn write_binary(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        self.entries.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        self.entries.get(path).cloned().ok_or_else(|| Error::Hips(crate::error::HipsError::Resource(std::format!("no entry for {path}"))))
    }

    fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }
}
