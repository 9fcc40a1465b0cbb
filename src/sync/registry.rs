//! Lookup of the synchronizer responsible for a file.

use crate::attributes::EntityCategory;
use crate::sync::ContentSynchronizer;
use crate::vfs::FileHandle;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct SynchronizerRegistry {
    synchronizers: Vec<Arc<dyn ContentSynchronizer>>,
}

impl SynchronizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, synchronizer: Arc<dyn ContentSynchronizer>) {
        self.synchronizers.push(synchronizer);
    }

    /// First registered synchronizer that accepts `file`.
    pub fn find(&self, file: &FileHandle) -> Option<Arc<dyn ContentSynchronizer>> {
        self.synchronizers
            .iter()
            .find(|s| s.accepts(file))
            .cloned()
    }

    pub fn for_category(&self, category: EntityCategory) -> Option<Arc<dyn ContentSynchronizer>> {
        self.synchronizers
            .iter()
            .find(|s| s.category() == category)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.synchronizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synchronizers.is_empty()
    }
}
