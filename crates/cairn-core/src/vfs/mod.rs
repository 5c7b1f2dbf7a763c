// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte-stream providers consumed by asset load steps.
//!
//! A [`ResourceProvider`] abstracts the storage backend behind a path-keyed
//! `open` call. The registry hands its provider to every load step so that
//! kinds never touch the filesystem directly.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// A readable byte stream returned by a provider.
pub type ResourceStream = Box<dyn Read + Send>;

/// Opens byte streams by path.
pub trait ResourceProvider: Send + Sync {
    /// Opens the resource at `path`.
    ///
    /// # Errors
    /// Returns [`io::ErrorKind::NotFound`] if the resource does not exist.
    fn open(&self, path: &str) -> io::Result<ResourceStream>;

    /// Returns `true` if a resource exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Reads the whole resource at `path` into memory.
    fn read_all(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("resource '{path}' not found"))
}

/// A provider with no resources. Every `open` fails with `NotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl ResourceProvider for NullProvider {
    fn open(&self, path: &str) -> io::Result<ResourceStream> {
        Err(not_found(path))
    }

    fn exists(&self, _path: &str) -> bool {
        false
    }
}

/// An in-memory provider, mostly useful for tools and tests.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the resource at `path`.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        let bytes: Arc<[u8]> = bytes.into();
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), bytes);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl ResourceProvider for MemoryProvider {
    fn open(&self, path: &str) -> io::Result<ResourceStream> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = files.get(path).cloned().ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

/// A provider reading files below a root directory.
///
/// Paths are always relative to the root; absolute paths and `..` components
/// are rejected so that a load request cannot escape the root.
#[derive(Debug, Clone)]
pub struct FileSystemProvider {
    root: PathBuf,
}

impl FileSystemProvider {
    /// Creates a provider rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("resource path '{path}' leaves the provider root"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceProvider for FileSystemProvider {
    fn open(&self, path: &str) -> io::Result<ResourceStream> {
        let full = self.resolve(path)?;
        log::trace!("Opening '{}'", full.display());
        Ok(Box::new(File::open(full)?))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_provider_reads_inserted_bytes() {
        let provider = MemoryProvider::new().with("a.txt", b"hello".to_vec());
        assert!(provider.exists("a.txt"));
        assert_eq!(provider.read_all("a.txt").unwrap(), b"hello");
        assert_eq!(
            provider.open("missing").err().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn filesystem_provider_reads_below_root() -> io::Result<()> {
        let dir = tempdir()?;
        std::fs::create_dir(dir.path().join("textures"))?;
        std::fs::write(dir.path().join("textures/a.png"), [1u8, 2, 3])?;

        let provider = FileSystemProvider::new(dir.path());
        assert!(provider.exists("textures/a.png"));
        assert_eq!(provider.read_all("textures/a.png")?, vec![1, 2, 3]);
        assert!(!provider.exists("textures/b.png"));
        Ok(())
    }

    #[test]
    fn filesystem_provider_rejects_escaping_paths() {
        let provider = FileSystemProvider::new("/tmp/cairn");
        let err = provider.open("../etc/passwd").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn null_provider_has_nothing() {
        assert!(!NullProvider.exists("x"));
        assert!(NullProvider.open("x").is_err());
    }
}
