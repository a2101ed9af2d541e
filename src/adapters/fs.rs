//! `std::fs` file store.
//!
//! On target the SD card is mounted into the VFS, so console paths like
//! `/sd/gcodes/part.nc` are opened as-is (root `/`). On the host the same
//! paths are resolved under a scratch directory.

use std::fs::{self, File};
use std::path::PathBuf;

use crate::app::ports::{FileStore, StorageError};

pub struct StdFileStore {
    root: PathBuf,
}

impl StdFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileStore for StdFileStore {
    type Reader = File;
    type Writer = File;

    fn open(&self, path: &str) -> Result<File, StorageError> {
        Ok(File::open(self.resolve(path))?)
    }

    fn create(&mut self, path: &str) -> Result<File, StorageError> {
        Ok(File::create(self.resolve(path))?)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        Ok(fs::create_dir_all(self.resolve(path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wifilink-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_write_read_remove() {
        let root = scratch("fs-basic");
        let mut store = StdFileStore::new(&root);
        store.create_dir_all("/sd/gcodes/.md5").unwrap();
        store
            .create("/sd/gcodes/a.nc")
            .unwrap()
            .write_all(b"G0 X1\n")
            .unwrap();
        assert!(store.exists("/sd/gcodes/a.nc"));

        let mut text = String::new();
        store
            .open("/sd/gcodes/a.nc")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "G0 X1\n");

        store.remove("/sd/gcodes/a.nc").unwrap();
        store.remove("/sd/gcodes/a.nc").unwrap();
        assert!(!store.exists("/sd/gcodes/a.nc"));
        assert_eq!(
            store.open("/sd/gcodes/a.nc").unwrap_err(),
            StorageError::NotFound
        );
        let _ = fs::remove_dir_all(root);
    }
}
