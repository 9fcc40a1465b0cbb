//! Save strategies: upload local edits or accept the remote content.

use crate::vfs::FileHandle;
use tracing::debug;

/// Decides, on divergence, whether local content overwrites the remote.
///
/// `last_successful` is the content both sides agreed on at the previous
/// sync; `current_remote` is what was just fetched (already adapted).
/// Returning `true` means upload local, `false` means accept remote.
pub trait SaveStrategy: Send + Sync {
    fn decide(&self, file: &FileHandle, last_successful: &[u8], current_remote: &[u8]) -> bool;
}

impl<F> SaveStrategy for F
where
    F: Fn(&FileHandle, &[u8], &[u8]) -> bool + Send + Sync,
{
    fn decide(&self, file: &FileHandle, last_successful: &[u8], current_remote: &[u8]) -> bool {
        self(file, last_successful, current_remote)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysUpload;

impl SaveStrategy for AlwaysUpload {
    fn decide(&self, _: &FileHandle, _: &[u8], _: &[u8]) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptRemote;

impl SaveStrategy for AcceptRemote {
    fn decide(&self, _: &FileHandle, _: &[u8], _: &[u8]) -> bool {
        false
    }
}

/// When the sync that hit the conflict was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMoment {
    Save,
    Open,
}

/// Asks the user to settle a real conflict. `true` keeps the local version.
pub trait ConflictPrompt: Send + Sync {
    fn resolve(&self, file: &FileHandle, moment: SyncMoment) -> bool;
}

impl<F> ConflictPrompt for F
where
    F: Fn(&FileHandle, SyncMoment) -> bool + Send + Sync,
{
    fn resolve(&self, file: &FileHandle, moment: SyncMoment) -> bool {
        self(file, moment)
    }
}

/// Uploads without asking while the remote is unchanged since the last sync;
/// otherwise both sides moved and the prompt decides.
pub struct DiffAwareStrategy<P> {
    prompt: P,
    moment: SyncMoment,
}

impl<P: ConflictPrompt> DiffAwareStrategy<P> {
    pub fn on_save(prompt: P) -> Self {
        Self {
            prompt,
            moment: SyncMoment::Save,
        }
    }

    pub fn on_open(prompt: P) -> Self {
        Self {
            prompt,
            moment: SyncMoment::Open,
        }
    }
}

impl<P: ConflictPrompt> SaveStrategy for DiffAwareStrategy<P> {
    fn decide(&self, file: &FileHandle, last_successful: &[u8], current_remote: &[u8]) -> bool {
        if last_successful == current_remote {
            return true;
        }
        debug!(file = %file, moment = ?self.moment, "remote changed since last sync, asking");
        self.prompt.resolve(file, self.moment)
    }
}
