use gridsync_core::{Permission, SheetId, UserId, Workbook};

use crate::error::StorageError;

/// Row-level metadata of a persisted sheet.
#[derive(Debug, Clone)]
pub struct SheetRecord {
    pub sheet_id: SheetId,
    pub owner: UserId,
    pub name: String,
    pub updated_at_ms: u64,
}

/// A persisted sheet plus its canonical content. `workbook: None` means the
/// sheet exists but has never been saved; it hydrates as an empty document.
#[derive(Debug, Clone)]
pub struct SheetLoad {
    pub record: SheetRecord,
    pub workbook: Option<Workbook>,
}

/// Durable storage of canonical documents, keyed by sheet id. The live
/// store only ever calls load once (hydration) and save on debounced flush;
/// `create_sheet` is the boundary to the surrounding CRUD service and exists
/// for fixtures.
pub trait DocumentStore {
    fn create_sheet(&mut self, owner: UserId, name: &str) -> Result<SheetId, StorageError>;

    /// `None` when no such sheet exists.
    fn load_canonical(&self, sheet_id: SheetId) -> Result<Option<SheetLoad>, StorageError>;

    /// Replace the canonical content and bump the modification timestamp.
    fn save_canonical(
        &mut self,
        sheet_id: SheetId,
        workbook: &Workbook,
    ) -> Result<(), StorageError>;

    fn update_display_name(&mut self, sheet_id: SheetId, name: &str)
    -> Result<(), StorageError>;

    fn get_sheet(&self, sheet_id: SheetId) -> Result<Option<SheetRecord>, StorageError>;
}

/// Per-sheet access grants. The sheet's owner row implies `Owner` without an
/// explicit grant.
pub trait PermissionStore {
    fn grant(
        &mut self,
        sheet_id: SheetId,
        user_id: UserId,
        permission: Permission,
    ) -> Result<(), StorageError>;

    fn revoke(&mut self, sheet_id: SheetId, user_id: UserId) -> Result<(), StorageError>;

    /// Effective explicit permission: ownership, else the stored grant.
    fn permission_for(
        &self,
        sheet_id: SheetId,
        user_id: UserId,
    ) -> Result<Option<Permission>, StorageError>;
}
