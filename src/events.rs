//! File-level notifications.
//!
//! Editors publish `ContentChanged` when a document is edited; the file
//! system publishes `Deleted` when a handle goes away. Delivery is
//! synchronous on the publishing thread.

use crate::vfs::FileHandle;
use std::sync::{Arc, RwLock};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    ContentChanged(FileHandle),
    Deleted(FileHandle),
}

impl FileEvent {
    pub fn file(&self) -> &FileHandle {
        match self {
            FileEvent::ContentChanged(file) | FileEvent::Deleted(file) => file,
        }
    }
}

pub trait FileEventListener: Send + Sync {
    fn on_event(&self, event: &FileEvent);
}

impl<F> FileEventListener for F
where
    F: Fn(&FileEvent) + Send + Sync,
{
    fn on_event(&self, event: &FileEvent) {
        self(event)
    }
}

#[derive(Default)]
pub struct FileEventBus {
    listeners: RwLock<Vec<Arc<dyn FileEventListener>>>,
}

impl FileEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn FileEventListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn publish(&self, event: FileEvent) {
        trace!(?event, "publishing file event");
        // Snapshot so listeners may publish or subscribe re-entrantly.
        let listeners: Vec<_> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    pub fn content_changed(&self, file: &FileHandle) {
        self.publish(FileEvent::ContentChanged(file.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::FileKind;
    use std::sync::Mutex;

    #[test]
    fn test_publish_reaches_every_listener() {
        let bus = FileEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            bus.subscribe(Arc::new(move |event: &FileEvent| {
                seen.lock().unwrap().push(event.clone());
            }));
        }

        let file = FileHandle::new("host/ds/USER.TEST", FileKind::MfFile);
        bus.content_changed(&file);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].file(), &file);
    }
}
