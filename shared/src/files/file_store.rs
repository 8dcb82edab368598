use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
};

use log::warn;

use crate::files::error::FileTransferError;

/// Where a connection looks up files it uploads and saves files it
/// downloads
pub trait FileStore {
    fn exists(&self, name: &str) -> bool;

    fn read(&self, name: &str) -> Option<Vec<u8>>;

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), FileTransferError>;
}

/// Keeps files in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryFileStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.insert(name.to_string(), data.to_vec());
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryFileStore {
    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).cloned()
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), FileTransferError> {
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

/// Files below a root directory. Names that would escape the root are
/// treated as missing.
#[derive(Clone, Debug)]
pub struct DirectoryFileStore {
    root: PathBuf,
}

impl DirectoryFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            warn!("DirectoryFileStore: rejecting file name {:?}", name);
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl FileStore for DirectoryFileStore {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn read(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.resolve(name)?).ok()
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), FileTransferError> {
        let save_failed = || FileTransferError::SaveFailed {
            name: name.to_string(),
        };
        let path = self.resolve(name).ok_or_else(save_failed)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| save_failed())?;
        }
        fs::write(&path, data).map_err(|_| save_failed())
    }
}
