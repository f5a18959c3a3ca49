//! The per-connection protocol handler.
//!
//! State machine per connection: `Connected` (authenticated, no room) →
//! `Joined(sheet)` → `Disconnected`. Every mutating message re-checks
//! authorization at receipt; failures are typed, terminal for the request
//! only, and never disturb other peers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use gridsync_core::{CellDelta, CellRef, ConnectionId, SheetId};

use crate::auth::{Authenticator, ClientIdentity};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::permission::{PermissionGate, PermissionResolver};
use crate::presence::PresenceEntry;
use crate::protocol::{Ack, Blob, ClientMessage, JoinAck, ServerMessage};
use crate::registry::{DocumentRegistry, SharedDocumentStore};

/// Client half of an authenticated channel: the connection id to address
/// requests with, and the mailbox server-pushed messages arrive on.
pub struct Connection {
    pub conn_id: ConnectionId,
    pub messages: UnboundedReceiver<ServerMessage>,
}

struct Session {
    identity: ClientIdentity,
    joined: Option<SheetId>,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

/// The synchronization authority: registry, permission gate, and the set of
/// live sessions.
pub struct SyncServer {
    registry: DocumentRegistry,
    gate: PermissionGate,
    auth: Arc<dyn Authenticator>,
    sessions: DashMap<ConnectionId, Session>,
}

impl SyncServer {
    pub fn new(
        store: SharedDocumentStore,
        resolver: Arc<dyn PermissionResolver>,
        auth: Arc<dyn Authenticator>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry: DocumentRegistry::new(store, config),
            gate: PermissionGate::new(resolver),
            auth,
            sessions: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Channel setup. Rejected outright unless the authenticator yields a
    /// valid identity; no message is accepted before that.
    pub fn connect(&self, token: &str) -> Result<Connection, SyncError> {
        let identity = self
            .auth
            .authenticate(token)
            .ok_or(SyncError::AuthenticationRequired)?;
        let conn_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        info!(conn = %conn_id, user = %identity.user_id, "connection authenticated");
        self.sessions.insert(
            conn_id,
            Session {
                identity,
                joined: None,
                tx,
            },
        );
        Ok(Connection {
            conn_id,
            messages: rx,
        })
    }

    /// Join a sheet room. On success the joiner receives a full-state
    /// snapshot plus a presence backfill (one join event per current
    /// member), and the rest of the room sees a presence-join. A re-join
    /// replaces the prior membership. On failure nothing changes.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        sheet_id: SheetId,
    ) -> Result<JoinAck, SyncError> {
        let (identity, tx, previous) = {
            let session = self
                .sessions
                .get(&conn_id)
                .ok_or(SyncError::UnknownConnection)?;
            (
                session.identity.clone(),
                session.tx.clone(),
                session.joined,
            )
        };

        let permission = self.gate.check_read(sheet_id, identity.user_id)?;
        let entry = self.registry.get_or_create(sheet_id).await?;

        if let Some(previous) = previous
            && previous != sheet_id
        {
            self.leave_room(conn_id, previous, &identity);
        }

        {
            let mut state = entry.state.lock();
            let snapshot = state.store.encode_state()?;
            let _ = tx.send(ServerMessage::Snapshot {
                sheet_id,
                state: Blob::new(snapshot),
            });
            // Backfill: the current member set, replayed as join events.
            for (member_conn, member) in state.presence.snapshot() {
                if member_conn == conn_id {
                    continue;
                }
                let _ = tx.send(ServerMessage::PresenceJoin {
                    user_id: member.user_id,
                    display_name: member.display_name,
                    cell: member.cell,
                });
            }
            state.broadcast_except(
                conn_id,
                ServerMessage::PresenceJoin {
                    user_id: identity.user_id,
                    display_name: identity.display_name.clone(),
                    cell: None,
                },
            );
            state.room.insert(conn_id, tx);
            state.presence.join(
                conn_id,
                PresenceEntry {
                    user_id: identity.user_id,
                    display_name: identity.display_name.clone(),
                    cell: None,
                },
            );
        }

        if let Some(mut session) = self.sessions.get_mut(&conn_id) {
            session.joined = Some(sheet_id);
        }
        info!(conn = %conn_id, sheet = %sheet_id, permission = permission.as_str(), "joined");
        Ok(JoinAck { permission })
    }

    /// Apply a peer's delta: decode, merge, fan out verbatim to every other
    /// room member (even when the merge was a no-op: peers converge on
    /// their own), then re-arm the persistence timer. Write permission is
    /// re-checked at receipt. A corrupt delta errors to the sender only.
    pub fn edit(&self, conn_id: ConnectionId, delta: &Blob) -> Result<(), SyncError> {
        let (identity, sheet_id) = {
            let session = self
                .sessions
                .get(&conn_id)
                .ok_or(SyncError::UnknownConnection)?;
            let sheet_id = session.joined.ok_or(SyncError::NotJoined)?;
            (session.identity.clone(), sheet_id)
        };
        self.gate.check_write(sheet_id, identity.user_id)?;

        let parsed = CellDelta::decode(delta.as_bytes()).map_err(SyncError::CorruptDelta)?;
        let entry = self
            .registry
            .get(sheet_id)
            .ok_or(SyncError::NotFound(sheet_id))?;

        let changed = {
            let mut state = entry.state.lock();
            let changed = state.store.merge(&parsed);
            state.broadcast_except(
                conn_id,
                ServerMessage::EditBroadcast {
                    sheet_id,
                    delta: delta.clone(),
                },
            );
            changed
        };
        self.registry.schedule_flush(&entry);

        debug!(conn = %conn_id, sheet = %sheet_id, entries = parsed.len(), changed, "edit merged");
        Ok(())
    }

    /// Cursor movement: rebroadcast to the room, not persisted, not merged.
    pub fn presence(&self, conn_id: ConnectionId, cell: Option<CellRef>) -> Result<(), SyncError> {
        let sheet_id = {
            let session = self
                .sessions
                .get(&conn_id)
                .ok_or(SyncError::UnknownConnection)?;
            session.joined.ok_or(SyncError::NotJoined)?
        };
        let entry = self
            .registry
            .get(sheet_id)
            .ok_or(SyncError::NotFound(sheet_id))?;

        let mut state = entry.state.lock();
        let updated = state
            .presence
            .update_cell(conn_id, cell)
            .ok_or(SyncError::NotJoined)?
            .clone();
        state.broadcast_except(
            conn_id,
            ServerMessage::PresenceUpdate {
                user_id: updated.user_id,
                display_name: updated.display_name,
                cell: updated.cell,
            },
        );
        Ok(())
    }

    /// Terminal. Leaves the room and announces it; the document itself is
    /// never evicted while dirty.
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let Some((_, session)) = self.sessions.remove(&conn_id) else {
            return;
        };
        if let Some(sheet_id) = session.joined {
            self.leave_room(conn_id, sheet_id, &session.identity);
        }
        info!(conn = %conn_id, "disconnected");
    }

    fn leave_room(&self, conn_id: ConnectionId, sheet_id: SheetId, identity: &ClientIdentity) {
        let Some(entry) = self.registry.get(sheet_id) else {
            return;
        };
        {
            let mut state = entry.state.lock();
            state.room.remove(&conn_id);
            if state.presence.leave(conn_id).is_some() {
                state.broadcast_except(
                    conn_id,
                    ServerMessage::PresenceLeave {
                        user_id: identity.user_id,
                        display_name: identity.display_name.clone(),
                    },
                );
            }
        }
        self.registry.maybe_evict(&entry);
    }

    /// Wire-level dispatch with the ack discipline: every request yields
    /// `{ok, permission?}` or `{error}`.
    pub async fn dispatch(&self, conn_id: ConnectionId, message: ClientMessage) -> Ack {
        match message {
            ClientMessage::Join { sheet_id } => match self.join(conn_id, sheet_id).await {
                Ok(ack) => Ack::joined(ack),
                Err(error) => Ack::error(&error),
            },
            ClientMessage::Edit { delta } => match self.edit(conn_id, &delta) {
                Ok(()) => Ack::ok(),
                Err(error) => Ack::error(&error),
            },
            ClientMessage::Presence { cell } => match self.presence(conn_id, cell) {
                Ok(()) => Ack::ok(),
                Err(error) => Ack::error(&error),
            },
        }
    }

    pub fn update_display_name(&self, sheet_id: SheetId, name: &str) -> Result<(), SyncError> {
        self.registry.update_display_name(sheet_id, name)
    }

    /// Flush every dirty document and cancel pending timers. Called once at
    /// process teardown.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}
