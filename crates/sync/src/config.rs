use std::time::Duration;

/// Tunables of the synchronization authority.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last edit before the document is persisted.
    /// Bursts of edits inside the window coalesce into one write.
    pub debounce_window: Duration,

    /// Drop a resident document once its room is empty and every mutation
    /// has been persisted.
    pub evict_idle_documents: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(1),
            evict_idle_documents: true,
        }
    }
}
