//! In-memory `AttributesService`.
//!
//! A flat map from handle to record. Parents are looked up by handle, so
//! members and spool files never own their parent's record.

use crate::attributes::{AttributesService, FileAttributes};
use crate::events::{FileEvent, FileEventListener};
use crate::vfs::{FileHandle, FileSystem};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub struct AttributesRegistry {
    fs: Arc<dyn FileSystem>,
    records: RwLock<HashMap<FileHandle, FileAttributes>>,
}

impl AttributesRegistry {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttributesService for AttributesRegistry {
    fn get_attributes(&self, file: &FileHandle) -> Option<FileAttributes> {
        self.records.read().ok()?.get(file).cloned()
    }

    fn get_or_create_virtual_file(&self, attributes: FileAttributes) -> Option<FileHandle> {
        let path = attributes.virtual_path();
        let mut records = match self.records.write() {
            Ok(records) => records,
            Err(_) => {
                warn!(%path, "attributes lock poisoned");
                return None;
            }
        };

        if let Some(existing) = self.fs.find(&path).filter(|f| self.fs.is_valid(f)) {
            if let Some(old) = records.remove(&existing) {
                records.insert(existing.clone(), old.merge(attributes));
                return Some(existing);
            }
        }

        let handle = self.fs.get_or_create(&path, attributes.file_kind());
        debug!(file = %handle, category = %attributes.category(), "created virtual file");
        records.insert(handle.clone(), attributes);
        Some(handle)
    }

    fn clear_attributes(&self, file: &FileHandle) {
        if let Ok(mut records) = self.records.write() {
            records.remove(file);
        }
    }

    fn update_attributes(
        &self,
        file: &FileHandle,
        mutator: &mut dyn FnMut(&mut FileAttributes),
    ) -> bool {
        match self.records.write() {
            Ok(mut records) => match records.get_mut(file) {
                Some(record) => {
                    mutator(record);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

/// Records of deleted handles go with them.
impl FileEventListener for AttributesRegistry {
    fn on_event(&self, event: &FileEvent) {
        if let FileEvent::Deleted(file) = event {
            self.clear_attributes(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DsMask, MemberInfo, UssEntry};
    use crate::attributes::{MemberAttributes, RequestOrigin, Requester, UssAttributes};
    use crate::connection::ConnectionConfig;
    use crate::events::FileEventBus;
    use crate::vfs::MemoryFileSystem;

    fn setup() -> (Arc<FileEventBus>, Arc<MemoryFileSystem>, Arc<AttributesRegistry>) {
        let bus = Arc::new(FileEventBus::new());
        let fs = Arc::new(MemoryFileSystem::new(Arc::clone(&bus)));
        let registry = Arc::new(AttributesRegistry::new(fs.clone()));
        bus.subscribe(registry.clone());
        (bus, fs, registry)
    }

    fn uss(name: &str, conn: &str) -> FileAttributes {
        let connection = ConnectionConfig::new(conn, conn, "https://host");
        FileAttributes::UssFile(UssAttributes::new(
            "/u/user",
            UssEntry::file(name),
            "https://host",
            vec![Requester::new(connection, RequestOrigin::UssPath("/u/user".into()))],
        ))
    }

    #[test]
    fn test_get_or_create_merges_existing() {
        let (_bus, fs, registry) = setup();

        let first = registry.get_or_create_virtual_file(uss("a", "c1")).unwrap();
        let second = registry.get_or_create_virtual_file(uss("a", "c2")).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs.len(), 1);
        assert_eq!(registry.get_attributes(&first).unwrap().requesters().len(), 2);
    }

    #[test]
    fn test_update_and_clear() {
        let (_bus, _fs, registry) = setup();
        let file = registry.get_or_create_virtual_file(uss("a", "c1")).unwrap();

        let updated = registry.update_attributes(&file, &mut |attrs| {
            if let Some(requesters) = attrs.requesters_mut() {
                requesters.clear();
            }
        });
        assert!(updated);
        assert!(registry.get_attributes(&file).unwrap().requesters().is_empty());

        registry.clear_attributes(&file);
        assert!(registry.get_attributes(&file).is_none());
        assert!(!registry.update_attributes(&file, &mut |_| {}));
    }

    #[test]
    fn test_deleted_handles_drop_records() {
        let (_bus, fs, registry) = setup();
        let connection = ConnectionConfig::new("c1", "c1", "https://host");
        let mut info = crate::api::DatasetInfo::new("USER.LIB");
        info.organization = Some(crate::api::DatasetOrganization::Partitioned);
        let lib = registry
            .get_or_create_virtual_file(FileAttributes::Dataset(
                crate::attributes::DatasetAttributes::new(
                    info,
                    "https://host",
                    vec![Requester::new(connection, RequestOrigin::DatasetMask(DsMask::new("USER.*")))],
                ),
            ))
            .unwrap();
        let member = registry
            .get_or_create_virtual_file(FileAttributes::Member(MemberAttributes::new(
                MemberInfo::new("MEM1"),
                lib.clone(),
            )))
            .unwrap();
        assert_eq!(registry.len(), 2);

        fs.delete(&lib).unwrap();

        assert!(registry.get_attributes(&member).is_none());
        assert!(registry.is_empty());
    }
}
