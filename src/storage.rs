// Content storage for last-confirmed synchronized bytes.
//
// One blob per record id; the latest write is the only readable content.
// Disk records live in ~/.cache/mfsync/<name>/<id>.rec and are written to a
// temp file first, then persisted over the old record.

use crate::error::{Result, SyncError};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

/// Key of one record inside a `ContentStorage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u32);

impl RecordId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Backend {
    Memory(RwLock<HashMap<RecordId, Bytes>>),
    Disk { dir: PathBuf },
}

pub struct ContentStorage {
    name: String,
    backend: Backend,
    next_id: AtomicU32,
    // xxh3 of the latest write per record, to skip identical rewrites
    digests: RwLock<HashMap<RecordId, u64>>,
    writes: AtomicU64,
    write_attempts: AtomicU64,
}

impl ContentStorage {
    /// Record file extension
    const RECORD_EXT: &'static str = "rec";

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_backend(name.into(), Backend::Memory(RwLock::new(HashMap::new())))
    }

    /// Open a disk-backed storage under `base_dir/name`.
    ///
    /// Record ids are only meaningful to the process that created them, so
    /// records left over from a previous run are removed.
    pub fn open(base_dir: &Path, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let dir = base_dir.join(&name);
        if dir.exists() {
            let mut stale = 0usize;
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(Self::RECORD_EXT) {
                    fs::remove_file(&path)?;
                    stale += 1;
                }
            }
            if stale > 0 {
                debug!(storage = %name, stale, "removed stale content records");
            }
        }
        fs::create_dir_all(&dir)?;
        Ok(Self::with_backend(name, Backend::Disk { dir }))
    }

    /// Default base directory (~/.cache/mfsync)
    pub fn default_dir() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("mfsync"))
            .ok_or_else(|| SyncError::Config("Cannot determine cache directory".to_string()))
    }

    fn with_backend(name: String, backend: Backend) -> Self {
        Self {
            name,
            backend,
            next_id: AtomicU32::new(0),
            digests: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
            write_attempts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_new_record(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Replace the content of `id`.
    pub fn write(&self, id: RecordId, content: &[u8]) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::Relaxed);
        let digest = xxh3_64(content);
        if self.digest_of(id) == Some(digest) {
            trace!(storage = %self.name, record = %id, "content unchanged, skipping write");
            return Ok(());
        }

        match &self.backend {
            Backend::Memory(records) => {
                records
                    .write()
                    .map_err(|_| Self::poisoned())?
                    .insert(id, Bytes::copy_from_slice(content));
            }
            Backend::Disk { dir } => {
                let mut temp = tempfile::NamedTempFile::new_in(dir)?;
                temp.write_all(content)?;
                temp.flush()?;
                temp.persist(self.record_path(dir, id))
                    .map_err(|e| SyncError::Io(e.error))?;
            }
        }

        self.digests
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(id, digest);
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!(storage = %self.name, record = %id, len = content.len(), "record written");
        Ok(())
    }

    /// Latest content of `id`; empty if never written.
    pub fn get_bytes(&self, id: RecordId) -> Result<Bytes> {
        match &self.backend {
            Backend::Memory(records) => Ok(records
                .read()
                .map_err(|_| Self::poisoned())?
                .get(&id)
                .cloned()
                .unwrap_or_default()),
            Backend::Disk { dir } => match fs::read(self.record_path(dir, id)) {
                Ok(content) => Ok(Bytes::from(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Bytes::new()),
                Err(e) => Err(e.into()),
            },
        }
    }

    pub fn delete_record(&self, id: RecordId) -> Result<()> {
        match &self.backend {
            Backend::Memory(records) => {
                records.write().map_err(|_| Self::poisoned())?.remove(&id);
            }
            Backend::Disk { dir } => match fs::remove_file(self.record_path(dir, id)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        self.digests
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(&id);
        Ok(())
    }

    /// Number of writes that actually changed a record.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `write` calls, including the ones skipped as unchanged.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::Relaxed)
    }

    fn digest_of(&self, id: RecordId) -> Option<u64> {
        self.digests.read().ok()?.get(&id).copied()
    }

    fn record_path(&self, dir: &Path, id: RecordId) -> PathBuf {
        dir.join(format!("{}.{}", id, Self::RECORD_EXT))
    }

    fn poisoned() -> SyncError {
        SyncError::Storage("content storage lock poisoned".to_string())
    }
}

impl fmt::Debug for ContentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Disk { .. } => "disk",
        };
        f.debug_struct("ContentStorage")
            .field("name", &self.name)
            .field("backend", &kind)
            .finish()
    }
}
