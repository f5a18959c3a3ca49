use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use gridsync_core::{Permission, SheetId, UserId, Workbook};
use gridsync_storage::{DocumentStore, PermissionStore, SheetRecord};
use gridsync_sync::{
    Authenticator, PermissionResolver, SharedDocumentStore, SyncConfig, SyncError, SyncServer,
};

use crate::client::TestClient;
use crate::fixtures::{CountingStore, StaticAuth, StoreResolver};

/// A complete server wired to an in-memory SQLite store, a store-backed
/// permission resolver, and a static authenticator.
pub struct TestRig {
    pub server: Arc<SyncServer>,
    store: Arc<Mutex<CountingStore>>,
    auth: Arc<StaticAuth>,
    resolver: Arc<StoreResolver>,
    saves: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    fail_next_save: Arc<AtomicBool>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        crate::fixtures::init_tracing();
        let store = CountingStore::in_memory().expect("in-memory store");
        let saves = store.save_counter();
        let loads = store.load_counter();
        let fail_next_save = store.fail_flag();
        let store = Arc::new(Mutex::new(store));
        let shared: SharedDocumentStore = store.clone();

        let auth = Arc::new(StaticAuth::new());
        let resolver = Arc::new(StoreResolver::new(Arc::clone(&store)));
        let server = Arc::new(SyncServer::new(
            shared,
            Arc::clone(&resolver) as Arc<dyn PermissionResolver>,
            Arc::clone(&auth) as Arc<dyn Authenticator>,
            config,
        ));

        Self {
            server,
            store,
            auth,
            resolver,
            saves,
            loads,
            fail_next_save,
        }
    }

    pub fn register_user(&self, token: &str, user_id: u64, display_name: &str) -> UserId {
        let user_id = UserId::new(user_id);
        self.auth.register(token, user_id, display_name);
        user_id
    }

    pub fn create_sheet(&self, owner: UserId, name: &str) -> SheetId {
        self.store
            .lock()
            .create_sheet(owner, name)
            .expect("create sheet")
    }

    /// Pre-populate durable content, bypassing the live path.
    pub fn seed_content(&self, sheet_id: SheetId, workbook: &Workbook) {
        self.store
            .lock()
            .save_canonical(sheet_id, workbook)
            .expect("seed content");
    }

    pub fn grant(&self, sheet_id: SheetId, user_id: UserId, permission: Permission) {
        self.store
            .lock()
            .grant(sheet_id, user_id, permission)
            .expect("grant");
    }

    pub fn revoke(&self, sheet_id: SheetId, user_id: UserId) {
        self.store.lock().revoke(sheet_id, user_id).expect("revoke");
    }

    pub fn elevate(&self, user_id: UserId) {
        self.resolver.elevate(user_id);
    }

    pub fn connect(&self, token: &str) -> Result<TestClient, SyncError> {
        let conn = self.server.connect(token)?;
        Ok(TestClient::new(Arc::clone(&self.server), conn))
    }

    pub fn saved_workbook(&self, sheet_id: SheetId) -> Option<Workbook> {
        self.store
            .lock()
            .load_canonical(sheet_id)
            .expect("load canonical")
            .and_then(|load| load.workbook)
    }

    pub fn sheet_record(&self, sheet_id: SheetId) -> Option<SheetRecord> {
        self.store.lock().get_sheet(sheet_id).expect("get sheet")
    }

    /// Successful canonical saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Canonical loads so far (one per hydration).
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Make the next canonical save fail.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    pub fn reset_counters(&self) {
        self.saves.store(0, Ordering::SeqCst);
        self.loads.store(0, Ordering::SeqCst);
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}
