use std::sync::Arc;

use gridsync_core::{CellDelta, CellRef, CellStore, CellValue, ConnectionId, SheetId};
use gridsync_sync::{Blob, Connection, JoinAck, ServerMessage, SyncError, SyncServer};

/// A connected peer with its own local replica, behaving like a real
/// client: initialize from the join snapshot, merge edit broadcasts, send
/// local edits as deltas.
pub struct TestClient {
    server: Arc<SyncServer>,
    conn: Connection,
    pub replica: CellStore,
    /// Presence events seen so far, in arrival order.
    pub presence: Vec<ServerMessage>,
}

impl TestClient {
    pub(crate) fn new(server: Arc<SyncServer>, conn: Connection) -> Self {
        Self {
            server,
            conn,
            replica: CellStore::new(),
            presence: Vec::new(),
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn.conn_id
    }

    /// Join and initialize the local replica from the snapshot.
    pub async fn join(&mut self, sheet_id: SheetId) -> Result<JoinAck, SyncError> {
        let ack = self.server.join(self.conn.conn_id, sheet_id).await?;
        self.pump();
        Ok(ack)
    }

    pub fn set(&mut self, row: u32, col: u32, value: CellValue) -> Result<(), SyncError> {
        let delta = self.replica.set(CellRef::new(row, col), value)?;
        self.send_delta(&delta)
    }

    pub fn delete(&mut self, row: u32, col: u32) -> Result<(), SyncError> {
        let delta = self.replica.delete(CellRef::new(row, col))?;
        self.send_delta(&delta)
    }

    pub fn send_delta(&self, delta: &CellDelta) -> Result<(), SyncError> {
        self.server
            .edit(self.conn.conn_id, &Blob::new(delta.encode()?))
    }

    /// Ship arbitrary bytes as a delta body.
    pub fn send_raw(&self, bytes: Vec<u8>) -> Result<(), SyncError> {
        self.server.edit(self.conn.conn_id, &Blob::new(bytes))
    }

    pub fn move_cursor(&self, cell: Option<CellRef>) -> Result<(), SyncError> {
        self.server.presence(self.conn.conn_id, cell)
    }

    /// Drain the mailbox: snapshots replace the replica, broadcasts merge
    /// into it, presence events are collected. Returns messages processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.conn.messages.try_recv() {
            processed += 1;
            match message {
                ServerMessage::Snapshot { state, .. } => {
                    self.replica =
                        CellStore::decode_state(state.as_bytes()).expect("snapshot decodes");
                }
                ServerMessage::EditBroadcast { delta, .. } => {
                    let delta = CellDelta::decode(delta.as_bytes()).expect("delta decodes");
                    self.replica.merge(&delta);
                }
                presence_event => self.presence.push(presence_event),
            }
        }
        processed
    }

    /// Next raw message without applying it, for ordering assertions.
    pub fn next_message(&mut self) -> Option<ServerMessage> {
        self.conn.messages.try_recv().ok()
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.replica.get(&CellRef::new(row, col))
    }

    pub fn disconnect(self) {
        self.server.disconnect(self.conn.conn_id);
    }
}
