use std::collections::HashMap;

use gridsync_core::{CellRef, ConnectionId, UserId};

/// One connected identity in a document's room, with its last known cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub cell: Option<CellRef>,
}

/// Ephemeral per-document presence. No durability: reset whenever the last
/// connection leaves.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: HashMap<ConnectionId, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, conn_id: ConnectionId, entry: PresenceEntry) {
        self.entries.insert(conn_id, entry);
    }

    pub fn update_cell(
        &mut self,
        conn_id: ConnectionId,
        cell: Option<CellRef>,
    ) -> Option<&PresenceEntry> {
        let entry = self.entries.get_mut(&conn_id)?;
        entry.cell = cell;
        Some(entry)
    }

    pub fn leave(&mut self, conn_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries.remove(&conn_id)
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<&PresenceEntry> {
        self.entries.get(conn_id)
    }

    /// Current members in connection order (v7 ids are time-ordered), used
    /// to backfill join events to a new member.
    pub fn snapshot(&self) -> Vec<(ConnectionId, PresenceEntry)> {
        let mut members: Vec<_> = self
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();
        members.sort_by_key(|(id, _)| *id);
        members
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: u64, name: &str) -> PresenceEntry {
        PresenceEntry {
            user_id: UserId::new(user),
            display_name: name.into(),
            cell: None,
        }
    }

    #[test]
    fn join_update_leave() {
        let mut tracker = PresenceTracker::new();
        let conn = ConnectionId::new();

        tracker.join(conn, entry(1, "alice"));
        assert_eq!(tracker.len(), 1);

        let cell = Some(CellRef::new(3, 4));
        let updated = tracker.update_cell(conn, cell).unwrap();
        assert_eq!(updated.cell, cell);

        let left = tracker.leave(conn).unwrap();
        assert_eq!(left.user_id, UserId::new(1));
        assert!(tracker.is_empty());
    }

    #[test]
    fn update_for_unknown_connection_is_none() {
        let mut tracker = PresenceTracker::new();
        assert!(tracker.update_cell(ConnectionId::new(), None).is_none());
    }

    #[test]
    fn snapshot_is_in_connection_order() {
        let mut tracker = PresenceTracker::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        tracker.join(second, entry(2, "bob"));
        tracker.join(first, entry(1, "alice"));

        let members = tracker.snapshot();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, first.min(second));
    }
}
