//! Resource loading
//!
//! CRL files and file-backed key/trust sources are read through a
//! [`ResourceLoader`], which resolves relative paths against a root directory
//! and performs a blocking read.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Path resolution and blocking file reads
pub trait ResourceLoader: Send + Sync {
    /// Resolve a possibly relative path to an absolute location
    fn resolve(&self, path: &Path) -> PathBuf;

    /// Read the whole file at an already resolved path
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Resolve then read, reporting the resolved path on failure
    fn load(&self, path: &Path) -> super::Result<Vec<u8>> {
        let resolved = self.resolve(path);
        self.read(&resolved)
            .map_err(|e| super::Error::io(resolved, e))
    }
}

/// Loader backed by the local filesystem
#[derive(Debug, Clone)]
pub struct FsResourceLoader {
    root: PathBuf,
}

impl FsResourceLoader {
    /// Resolve relative paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsResourceLoader { root: root.into() }
    }

    /// Resolve relative paths against the process working directory
    pub fn current_dir() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        FsResourceLoader { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for FsResourceLoader {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory loader keyed by path, for embedding resources
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLoader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file contents under `path`
    pub fn insert(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }
}
