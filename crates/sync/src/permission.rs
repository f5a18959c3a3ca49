use std::sync::Arc;

use gridsync_core::{Permission, SheetId, UserId};

use crate::error::SyncError;

/// External permission resolver: explicit per-sheet grants plus a role
/// check. `resolve` returns the explicit grant (ownership counts as an
/// explicit `Owner` grant); `is_elevated` marks users whose role grants
/// implicit owner-equivalent access when no explicit grant exists.
pub trait PermissionResolver: Send + Sync {
    fn resolve(&self, sheet_id: SheetId, user_id: UserId) -> Option<Permission>;
    fn is_elevated(&self, user_id: UserId) -> bool;
}

/// Stateless authorization check consulted before every mutation or
/// sensitive read. Nothing is cached from join time: a grant revoked
/// mid-session denies the very next message.
pub struct PermissionGate {
    resolver: Arc<dyn PermissionResolver>,
}

impl PermissionGate {
    pub fn new(resolver: Arc<dyn PermissionResolver>) -> Self {
        Self { resolver }
    }

    /// Effective permission: the explicit grant, or implicit `Owner` for an
    /// elevated user without one.
    pub fn effective(&self, sheet_id: SheetId, user_id: UserId) -> Option<Permission> {
        match self.resolver.resolve(sheet_id, user_id) {
            Some(permission) => Some(permission),
            None if self.resolver.is_elevated(user_id) => Some(Permission::Owner),
            None => None,
        }
    }

    pub fn check_read(&self, sheet_id: SheetId, user_id: UserId) -> Result<Permission, SyncError> {
        self.effective(sheet_id, user_id)
            .ok_or(SyncError::PermissionDenied)
    }

    pub fn check_write(&self, sheet_id: SheetId, user_id: UserId) -> Result<Permission, SyncError> {
        match self.effective(sheet_id, user_id) {
            Some(permission) if permission.allows_write() => Ok(permission),
            _ => Err(SyncError::PermissionDenied),
        }
    }
}
