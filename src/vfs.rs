//! Virtual file handles.
//!
//! The host IDE owns the real virtual file system. The core only needs an
//! opaque handle with path identity and the four operations below.
//! `MemoryFileSystem` backs headless use and tests.

use crate::error::{Result, SyncError};
use crate::events::{FileEvent, FileEventBus};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Remote entity with content (sequential dataset, member, USS file, spool file).
    MfFile,
    /// Remote container (library, USS directory, job).
    MfDirectory,
    LocalFile,
}

/// Cheap-to-clone handle; equality and hashing use the path only.
#[derive(Clone)]
pub struct FileHandle {
    path: Arc<str>,
    kind: FileKind,
}

impl FileHandle {
    pub fn new(path: impl AsRef<str>, kind: FileKind) -> Self {
        Self {
            path: Arc::from(path.as_ref()),
            kind,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::MfDirectory
    }

    /// True when `other` lives under this handle.
    pub fn is_ancestor_of(&self, other: &FileHandle) -> bool {
        other.path.len() > self.path.len()
            && other.path.starts_with(&*self.path)
            && other.path.as_bytes()[self.path.len()] == b'/'
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileHandle {}

impl Hash for FileHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHandle({})", self.path)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

pub trait FileSystem: Send + Sync {
    fn find(&self, path: &str) -> Option<FileHandle>;

    /// Existing handle for `path`, or a new one of `kind`.
    fn get_or_create(&self, path: &str, kind: FileKind) -> FileHandle;

    /// Remove the handle and everything beneath it.
    fn delete(&self, file: &FileHandle) -> Result<()>;

    fn is_valid(&self, file: &FileHandle) -> bool;
}

// =============================================================================
// MemoryFileSystem
// =============================================================================

pub struct MemoryFileSystem {
    files: RwLock<HashMap<Arc<str>, FileHandle>>,
    events: Arc<FileEventBus>,
}

impl MemoryFileSystem {
    pub fn new(events: Arc<FileEventBus>) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> SyncError {
        SyncError::Other("file system lock poisoned".to_string())
    }
}

impl FileSystem for MemoryFileSystem {
    fn find(&self, path: &str) -> Option<FileHandle> {
        self.files.read().ok()?.get(path).cloned()
    }

    fn get_or_create(&self, path: &str, kind: FileKind) -> FileHandle {
        if let Some(existing) = self.find(path) {
            return existing;
        }
        let handle = FileHandle::new(path, kind);
        match self.files.write() {
            Ok(mut files) => files
                .entry(Arc::clone(&handle.path))
                .or_insert(handle)
                .clone(),
            Err(_) => handle,
        }
    }

    fn delete(&self, file: &FileHandle) -> Result<()> {
        let removed: Vec<FileHandle> = {
            let mut files = self.files.write().map_err(|_| Self::poisoned())?;
            let doomed: Vec<Arc<str>> = files
                .values()
                .filter(|f| *f == file || file.is_ancestor_of(f))
                .map(|f| Arc::clone(&f.path))
                .collect();
            doomed.iter().filter_map(|p| files.remove(p)).collect()
        };

        debug!(file = %file, removed = removed.len(), "deleted virtual files");
        for handle in removed {
            self.events.publish(FileEvent::Deleted(handle));
        }
        Ok(())
    }

    fn is_valid(&self, file: &FileHandle) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(file.path()))
            .unwrap_or(false)
    }
}
