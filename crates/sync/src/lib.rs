//! Realtime synchronization authority for shared sheets.
//!
//! One resident replicated document per sheet, fed by any number of
//! connections. Inbound edits follow a three-step contract: merge into the
//! cell store (pure, order-insensitive), fan the delta out verbatim to every
//! other room member, and re-arm the debounced persistence timer. Merge and
//! fan-out happen under the document's lock, so all peers observe accepted
//! edits in the same relative order; convergence itself never depends on
//! that order.

pub mod auth;
pub mod config;
pub mod error;
pub mod permission;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod server;

pub use auth::{Authenticator, ClientIdentity};
pub use config::SyncConfig;
pub use error::SyncError;
pub use permission::{PermissionGate, PermissionResolver};
pub use presence::{PresenceEntry, PresenceTracker};
pub use protocol::{Ack, Blob, ClientMessage, JoinAck, ServerMessage};
pub use registry::{DocumentEntry, DocumentRegistry, SharedDocumentStore};
pub use server::{Connection, SyncServer};
