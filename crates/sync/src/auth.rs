use gridsync_core::UserId;

/// Verified caller identity, produced by the external authenticator at
/// channel setup. Role resolution (elevation) is the permission resolver's
/// concern, not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_id: UserId,
    pub display_name: String,
}

/// Channel-level authentication boundary. Token verification itself (JWT or
/// otherwise) lives outside this crate; a connection without a valid
/// identity is rejected before any message is accepted.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<ClientIdentity>;
}
