use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use gridsync_core::{Permission, SheetId, UserId, Workbook};
use gridsync_storage::{
    DocumentStore, PermissionStore, SheetLoad, SheetRecord, SqliteStore, StorageError,
};
use gridsync_sync::{Authenticator, ClientIdentity, PermissionResolver};

/// Install the test log subscriber once; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Token → identity map standing in for the external session service.
#[derive(Default)]
pub struct StaticAuth {
    tokens: Mutex<HashMap<String, ClientIdentity>>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str, user_id: UserId, display_name: &str) {
        self.tokens.lock().insert(
            token.to_string(),
            ClientIdentity {
                user_id,
                display_name: display_name.to_string(),
            },
        );
    }
}

impl Authenticator for StaticAuth {
    fn authenticate(&self, token: &str) -> Option<ClientIdentity> {
        self.tokens.lock().get(token).cloned()
    }
}

/// Permission resolver backed by the same store the server persists to,
/// plus an in-memory elevated-role set.
pub struct StoreResolver {
    store: Arc<Mutex<CountingStore>>,
    elevated: Mutex<HashSet<UserId>>,
}

impl StoreResolver {
    pub fn new(store: Arc<Mutex<CountingStore>>) -> Self {
        Self {
            store,
            elevated: Mutex::new(HashSet::new()),
        }
    }

    pub fn elevate(&self, user_id: UserId) {
        self.elevated.lock().insert(user_id);
    }
}

impl PermissionResolver for StoreResolver {
    fn resolve(&self, sheet_id: SheetId, user_id: UserId) -> Option<Permission> {
        self.store
            .lock()
            .permission_for(sheet_id, user_id)
            .ok()
            .flatten()
    }

    fn is_elevated(&self, user_id: UserId) -> bool {
        self.elevated.lock().contains(&user_id)
    }
}

/// SQLite store instrumented for tests: counts loads and successful saves,
/// and can fail the next save to exercise the retry path.
pub struct CountingStore {
    inner: SqliteStore,
    saves: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    fail_next_save: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            inner: SqliteStore::open_in_memory()?,
            saves: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
            fail_next_save: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn save_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.saves)
    }

    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    pub fn fail_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_next_save)
    }
}

impl DocumentStore for CountingStore {
    fn create_sheet(&mut self, owner: UserId, name: &str) -> Result<SheetId, StorageError> {
        self.inner.create_sheet(owner, name)
    }

    fn load_canonical(&self, sheet_id: SheetId) -> Result<Option<SheetLoad>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_canonical(sheet_id)
    }

    fn save_canonical(
        &mut self,
        sheet_id: SheetId,
        workbook: &Workbook,
    ) -> Result<(), StorageError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Serialization("injected save failure".into()));
        }
        self.inner.save_canonical(sheet_id, workbook)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_display_name(
        &mut self,
        sheet_id: SheetId,
        name: &str,
    ) -> Result<(), StorageError> {
        self.inner.update_display_name(sheet_id, name)
    }

    fn get_sheet(&self, sheet_id: SheetId) -> Result<Option<SheetRecord>, StorageError> {
        self.inner.get_sheet(sheet_id)
    }
}

impl PermissionStore for CountingStore {
    fn grant(
        &mut self,
        sheet_id: SheetId,
        user_id: UserId,
        permission: Permission,
    ) -> Result<(), StorageError> {
        self.inner.grant(sheet_id, user_id, permission)
    }

    fn revoke(&mut self, sheet_id: SheetId, user_id: UserId) -> Result<(), StorageError> {
        self.inner.revoke(sheet_id, user_id)
    }

    fn permission_for(
        &self,
        sheet_id: SheetId,
        user_id: UserId,
    ) -> Result<Option<Permission>, StorageError> {
        self.inner.permission_for(sheet_id, user_id)
    }
}
