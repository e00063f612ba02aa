//! The narrow byte-and-metadata interface the decoder depends on.
//!
//! Any backing store — local disk, object store, in-memory fixture — plugs
//! in by implementing [`FileProvider`]; the read-path core (`stream`,
//! `volume`) only ever calls `open_input` and `file_info`. The remaining
//! methods exist so management layers above the core (not in scope here)
//! have somewhere to live, and so a provider implementation's completeness
//! can be exercised directly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no such path: {0}")]
    NotFound(String),
    #[error("path already exists: {0}")]
    AlreadyExists(String),
}

/// Metadata the core and its callers need about a path, independent of
/// which provider backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
}

/// A sequential source of raw ciphertext bytes for one open file.
///
/// Mirrors `std::io::Read` rather than the source's own `read(buf, off, n)`
/// shape, since Rust's `Read` already has the "`Ok(0)` at EOF, otherwise
/// `1..=buf.len()` bytes, loop on short reads" contract this interface
/// needs — no bespoke sentinel convention is required here the way it is
/// at the plaintext-facing `FileStream::read_legacy` boundary.
pub trait ByteSource: Read + Send {}
impl<T: Read + Send> ByteSource for T {}

impl std::fmt::Debug for dyn ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ByteSource")
    }
}

/// A sequential sink for raw bytes, used by the (out-of-scope) write path.
pub trait ByteSink: Write + Send {}
impl<T: Write + Send> ByteSink for T {}

/// The provider capability contract.
pub trait FileProvider: Send + Sync {
    fn open_input(&self, path: &str) -> Result<Box<dyn ByteSource>, ProviderError>;
    fn file_info(&self, path: &str) -> Result<FileMeta, ProviderError>;
    fn list_children(&self, path: &str) -> Result<Vec<FileMeta>, ProviderError>;

    fn exists(&self, path: &str) -> bool;
    fn is_directory(&self, path: &str) -> bool;
    fn create_file(&self, path: &str) -> Result<(), ProviderError>;
    fn mv(&self, from: &str, to: &str) -> Result<(), ProviderError>;
    fn delete(&self, path: &str) -> Result<(), ProviderError>;
    fn mkdir(&self, path: &str) -> Result<(), ProviderError>;
    fn mkdirs(&self, path: &str) -> Result<(), ProviderError>;
    fn copy(&self, from: &str, to: &str) -> Result<(), ProviderError>;
    fn open_output(&self, path: &str, expected_len: u64) -> Result<Box<dyn ByteSink>, ProviderError>;
}

/// A [`FileProvider`] backed directly by the local filesystem.
pub struct LocalFsProvider {
    root: PathBuf,
}

impl LocalFsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn meta_for(&self, full: &Path, name: String) -> Result<FileMeta, ProviderError> {
        let meta = full.metadata()?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileMeta {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            mtime,
        })
    }
}

impl FileProvider for LocalFsProvider {
    fn open_input(&self, path: &str) -> Result<Box<dyn ByteSource>, ProviderError> {
        let full = self.resolve(path);
        Ok(Box::new(File::open(&full).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProviderError::NotFound(path.to_string())
            } else {
                ProviderError::Io(e)
            }
        })?))
    }

    fn file_info(&self, path: &str) -> Result<FileMeta, ProviderError> {
        let full = self.resolve(path);
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.meta_for(&full, name)
    }

    fn list_children(&self, path: &str) -> Result<Vec<FileMeta>, ProviderError> {
        let full = self.resolve(path);
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(self.meta_for(&entry.path(), name)?);
        }
        Ok(out)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn create_file(&self, path: &str) -> Result<(), ProviderError> {
        File::create(self.resolve(path))?;
        Ok(())
    }

    fn mv(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        std::fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let full = self.resolve(path);
        if full.is_dir() {
            std::fs::remove_dir(full)?;
        } else {
            std::fs::remove_file(full)?;
        }
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<(), ProviderError> {
        std::fs::create_dir(self.resolve(path))?;
        Ok(())
    }

    fn mkdirs(&self, path: &str) -> Result<(), ProviderError> {
        std::fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        std::fs::copy(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    fn open_output(&self, path: &str, _expected_len: u64) -> Result<Box<dyn ByteSink>, ProviderError> {
        Ok(Box::new(File::create(self.resolve(path))?))
    }
}

/// An in-memory [`FileProvider`], for unit and doc tests that should not
/// touch the real filesystem.
#[derive(Default, Clone)]
pub struct MemoryProvider {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, data: Vec<u8>) {
        self.files.lock().unwrap().insert(path.into(), data);
    }
}

impl FileProvider for MemoryProvider {
    fn open_input(&self, path: &str) -> Result<Box<dyn ByteSource>, ProviderError> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn file_info(&self, path: &str) -> Result<FileMeta, ProviderError> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(path)
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))?;
        Ok(FileMeta {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            is_dir: false,
            size: data.len() as u64,
            mtime: 0,
        })
    }

    fn list_children(&self, path: &str) -> Result<Vec<FileMeta>, ProviderError> {
        let files = self.files.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| FileMeta {
                name: k.rsplit('/').next().unwrap_or(k).to_string(),
                is_dir: false,
                size: files[k].len() as u64,
                mtime: 0,
            })
            .collect())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn is_directory(&self, _path: &str) -> bool {
        false
    }

    fn create_file(&self, path: &str) -> Result<(), ProviderError> {
        self.files.lock().unwrap().entry(path.to_string()).or_default();
        Ok(())
    }

    fn mv(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let mut files = self.files.lock().unwrap();
        let data = files
            .remove(from)
            .ok_or_else(|| ProviderError::NotFound(from.to_string()))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    fn mkdir(&self, _path: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn mkdirs(&self, _path: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let mut files = self.files.lock().unwrap();
        let data = files
            .get(from)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(from.to_string()))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn open_output(&self, path: &str, _expected_len: u64) -> Result<Box<dyn ByteSink>, ProviderError> {
        Ok(Box::new(MemorySink {
            path: path.to_string(),
            buf: Vec::new(),
            files: self.files.clone(),
        }))
    }
}

struct MemorySink {
    path: String,
    buf: Vec<u8>,
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.files.lock().unwrap().insert(self.path.clone(), self.buf.clone());
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
