//! In-memory file store (simulation backend).
//!
//! Clones share the same contents, so a test keeps one handle for
//! inspection while the code under test owns another. Writes land in the
//! shared map immediately, so an aborted transfer leaves its partial file
//! visible exactly as it would on the card.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use crate::app::ports::{FileStore, StorageError};

#[derive(Debug, Default)]
struct Contents {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemFileStore {
    inner: Rc<RefCell<Contents>>,
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "",
    }
}

impl MemFileStore {
    /// An empty store with the root directory only.
    pub fn new() -> Self {
        let store = Self::default();
        store.inner.borrow_mut().dirs.insert("/".into());
        store
    }

    /// Store `data` at `path`, creating parent directories.
    pub fn insert(&self, path: &str, data: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let mut dir = parent(path);
        while !dir.is_empty() && inner.dirs.insert(dir.to_string()) {
            dir = parent(dir);
        }
        inner.files.insert(path.to_string(), data.to_vec());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.borrow().files.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.inner.borrow().files.keys().cloned().collect()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.inner.borrow().dirs.contains(path)
    }
}

/// Write handle appending straight into the shared map.
pub struct MemWriter {
    inner: Rc<RefCell<Contents>>,
    path: String,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        let file = inner
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileStore for MemFileStore {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemWriter;

    fn open(&self, path: &str) -> Result<Self::Reader, StorageError> {
        self.get(path).map(Cursor::new).ok_or(StorageError::NotFound)
    }

    fn create(&mut self, path: &str) -> Result<MemWriter, StorageError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.dirs.contains(parent(path)) {
            return Err(StorageError::NotFound);
        }
        inner.files.insert(path.to_string(), Vec::new());
        Ok(MemWriter {
            inner: Rc::clone(&self.inner),
            path: path.to_string(),
        })
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.inner.borrow_mut().files.remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.borrow().files.contains_key(path)
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        let mut dir = path.trim_end_matches('/');
        while !dir.is_empty() && inner.dirs.insert(dir.to_string()) {
            dir = parent(dir);
        }
        Ok(())
    }
}
