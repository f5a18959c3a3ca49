//! Resident documents: one replicated cell store per sheet, hydrated lazily
//! from durable storage, persisted back on a debounced timer.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gridsync_core::{CellStore, ConnectionId, SheetDoc, SheetId, Workbook};
use gridsync_storage::{DocumentStore, SheetLoad, StorageError};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::presence::PresenceTracker;
use crate::protocol::ServerMessage;

/// The durable store, shared between the registry and flush tasks.
pub type SharedDocumentStore = Arc<Mutex<dyn DocumentStore + Send>>;

/// Everything guarded by a document's lock: the store itself, cosmetic
/// metadata, the broadcast room, and presence. Merging an edit and fanning
/// it out happen under one acquisition, which is what gives peers a
/// consistent relative order of accepted edits.
pub(crate) struct DocState {
    pub store: CellStore,
    pub display_name: String,
    pub rest_tabs: Vec<SheetDoc>,
    pub room: HashMap<ConnectionId, UnboundedSender<ServerMessage>>,
    pub presence: PresenceTracker,
}

impl DocState {
    /// Canonical projection for persistence: the synced tab followed by the
    /// untouched trailing tabs.
    pub fn workbook(&self) -> Workbook {
        let mut sheets = vec![self.store.to_sheet(&self.display_name)];
        sheets.extend(self.rest_tabs.iter().cloned());
        Workbook { sheets }
    }

    /// Fan a message out to every room member except `origin`. Send failures
    /// mean the receiver is already gone; the disconnect path cleans up.
    pub fn broadcast_except(&self, origin: ConnectionId, message: ServerMessage) {
        for (conn_id, tx) in &self.room {
            if *conn_id != origin {
                let _ = tx.send(message.clone());
            }
        }
    }
}

struct FlushState {
    pending: Option<JoinHandle<()>>,
    dirty: bool,
}

/// One resident shared document.
pub struct DocumentEntry {
    sheet_id: SheetId,
    pub(crate) state: Mutex<DocState>,
    flush: Mutex<FlushState>,
}

impl DocumentEntry {
    fn hydrate(sheet_id: SheetId, load: SheetLoad) -> Result<Self, SyncError> {
        let display_name = load.record.name;
        let (store, rest_tabs) = match load.workbook {
            Some(workbook) => {
                let primary = workbook
                    .primary()
                    .cloned()
                    .unwrap_or_else(|| SheetDoc::empty(&display_name));
                (CellStore::from_sheet(&primary)?, workbook.rest().to_vec())
            }
            None => (CellStore::new(), Vec::new()),
        };
        Ok(Self {
            sheet_id,
            state: Mutex::new(DocState {
                store,
                display_name,
                rest_tabs,
                room: HashMap::new(),
                presence: PresenceTracker::new(),
            }),
            flush: Mutex::new(FlushState {
                pending: None,
                dirty: false,
            }),
        })
    }

    pub fn sheet_id(&self) -> SheetId {
        self.sheet_id
    }

    pub fn display_name(&self) -> String {
        self.state.lock().display_name.clone()
    }

    /// Unpersisted mutations outstanding?
    pub fn is_dirty(&self) -> bool {
        self.flush.lock().dirty
    }

    /// Persist the current state if dirty. Clears the dirty flag up front:
    /// an edit racing with the write re-marks it and re-arms its own timer,
    /// so nothing is lost either way.
    fn flush_now(&self, store: &SharedDocumentStore) {
        {
            let mut flush = self.flush.lock();
            flush.pending = None;
            if !flush.dirty {
                return;
            }
            flush.dirty = false;
        }

        let workbook = self.state.lock().workbook();
        let result = store.lock().save_canonical(self.sheet_id, &workbook);
        match result {
            Ok(()) => {
                debug!(sheet = %self.sheet_id, "persisted canonical document");
            }
            Err(error) => {
                // The in-memory store stays authoritative; the next edit
                // re-arms the timer and retries with then-current state.
                warn!(sheet = %self.sheet_id, %error, "canonical save failed, awaiting retry");
                self.flush.lock().dirty = true;
            }
        }
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.flush.lock().pending.take() {
            handle.abort();
        }
    }
}

/// Owns every resident document. Created at process start, torn down via
/// [`DocumentRegistry::shutdown`].
pub struct DocumentRegistry {
    store: SharedDocumentStore,
    config: SyncConfig,
    documents: DashMap<SheetId, Arc<DocumentEntry>>,
    hydrating: DashMap<SheetId, Arc<tokio::sync::Mutex<()>>>,
}

impl DocumentRegistry {
    pub fn new(store: SharedDocumentStore, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            documents: DashMap::new(),
            hydrating: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn get(&self, sheet_id: SheetId) -> Option<Arc<DocumentEntry>> {
        self.documents.get(&sheet_id).map(|doc| Arc::clone(&doc))
    }

    pub fn is_resident(&self, sheet_id: SheetId) -> bool {
        self.documents.contains_key(&sheet_id)
    }

    /// Resident entry, or hydrate from durable storage. Hydration is
    /// serialized per sheet id: concurrent joiners for an unseen sheet wait
    /// on the single in-flight load instead of racing to create two stores.
    pub async fn get_or_create(
        &self,
        sheet_id: SheetId,
    ) -> Result<Arc<DocumentEntry>, SyncError> {
        if let Some(doc) = self.get(sheet_id) {
            return Ok(doc);
        }

        let gate = self
            .hydrating
            .entry(sheet_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A coalesced joiner finds the entry the first one created.
        if let Some(doc) = self.get(sheet_id) {
            return Ok(doc);
        }

        let load = { self.store.lock().load_canonical(sheet_id)? };
        let Some(load) = load else {
            return Err(SyncError::NotFound(sheet_id));
        };

        let entry = Arc::new(DocumentEntry::hydrate(sheet_id, load)?);
        info!(sheet = %sheet_id, name = %entry.display_name(), "document hydrated");
        self.documents.insert(sheet_id, Arc::clone(&entry));
        drop(_guard);
        self.hydrating.remove(&sheet_id);
        Ok(entry)
    }

    /// Mark the document dirty and (re)arm its debounce timer. A burst of
    /// calls inside the window collapses into a single durable write after
    /// the last one.
    pub fn schedule_flush(&self, entry: &Arc<DocumentEntry>) {
        let mut flush = entry.flush.lock();
        flush.dirty = true;
        if let Some(handle) = flush.pending.take() {
            handle.abort();
        }
        let store = Arc::clone(&self.store);
        let task_entry = Arc::clone(entry);
        let window = self.config.debounce_window;
        flush.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            task_entry.flush_now(&store);
        }));
    }

    /// Cosmetic rename; merge semantics are untouched.
    pub fn update_display_name(&self, sheet_id: SheetId, name: &str) -> Result<(), SyncError> {
        let result = { self.store.lock().update_display_name(sheet_id, name) };
        match result {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => return Err(SyncError::NotFound(sheet_id)),
            Err(error) => return Err(SyncError::Persistence(error)),
        }
        if let Some(entry) = self.get(sheet_id) {
            entry.state.lock().display_name = name.to_string();
        }
        Ok(())
    }

    /// Drop a resident document once nobody is connected and nothing is
    /// unpersisted. Keeping it is always correct; this just bounds memory.
    pub fn maybe_evict(&self, entry: &Arc<DocumentEntry>) {
        if !self.config.evict_idle_documents {
            return;
        }
        let empty = entry.state.lock().room.is_empty();
        if empty && !entry.is_dirty() {
            self.documents.remove(&entry.sheet_id());
            debug!(sheet = %entry.sheet_id(), "evicted idle document");
        }
    }

    /// Cancel pending timers and persist every dirty resident document.
    pub fn shutdown(&self) {
        for item in self.documents.iter() {
            let entry = item.value();
            entry.cancel_pending();
            entry.flush_now(&self.store);
        }
        info!(resident = self.documents.len(), "registry shut down");
    }
}
