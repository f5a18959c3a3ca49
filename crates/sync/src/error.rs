use gridsync_core::{CoreError, SheetId};
use gridsync_storage::StorageError;
use thiserror::Error;

/// Failures of the synchronization channel. All of them are terminal for the
/// offending request only: none tears down the connection, touches other
/// peers, or kills the process.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("sheet not found: {0}")]
    NotFound(SheetId),

    #[error("permission denied")]
    PermissionDenied,

    #[error("not joined to a sheet")]
    NotJoined,

    #[error("unknown connection")]
    UnknownConnection,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("corrupt delta")]
    CorruptDelta(#[source] CoreError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(#[from] CoreError),
}

impl SyncError {
    /// Stable wire code for acks.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "auth-required",
            Self::NotFound(_) => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::NotJoined => "not-joined",
            Self::UnknownConnection => "unknown-connection",
            Self::InvalidPayload(_) => "invalid-payload",
            Self::CorruptDelta(_) => "corrupt-delta",
            Self::Persistence(_) => "persistence-failure",
            Self::Internal(_) => "internal",
        }
    }
}
