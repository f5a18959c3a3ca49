//! The replicated cell store: a last-write-wins map from cell coordinate to
//! opaque value, with first-class tombstones.
//!
//! Merge is a pure per-key rule ([`DeltaEntry::wins`]): an entry applies iff
//! its stamp is strictly greater than the resident slot's stamp. That makes
//! merging commutative, associative, and idempotent: replicas converge for
//! any arrival order, duplication, or interleaving, with no locking or
//! central sequencing. Deletions keep their slot as a tombstone so a stale
//! concurrent set cannot resurrect a deleted cell.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::cell::{CellRef, CellValue};
use crate::clock::{HlcClock, Stamp};
use crate::document::{CellRecord, SheetDoc};
use crate::frontier::Frontier;
use crate::ids::ReplicaId;

/// Resident state of one cell: the value (`None` = tombstone) and the stamp
/// of the write that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSlot {
    pub value: Option<CellValue>,
    pub stamp: Stamp,
}

impl CellSlot {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// One replicated change: set (`value: Some`) or delete (`value: None`) of a
/// single cell, carrying the causal metadata remote replicas merge by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub cell: CellRef,
    pub value: Option<CellValue>,
    pub stamp: Stamp,
}

impl DeltaEntry {
    /// The merge rule. Pure: no clock reads, no hidden ordering.
    pub fn wins(&self, current: Option<&CellSlot>) -> bool {
        match current {
            None => true,
            Some(slot) => self.stamp > slot.stamp,
        }
    }
}

/// A compact encoding of one or more changes, sufficient for any replica to
/// merge. Produced by local edits ([`CellStore::set`] / [`CellStore::delete`])
/// and by [`CellStore::delta_since`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellDelta {
    entries: Vec<DeltaEntry>,
}

impl CellDelta {
    pub fn new(entries: Vec<DeltaEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Structural validation happens here: malformed bytes fail with
    /// [`CoreError::CorruptDelta`] before any state is touched.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::CorruptDelta(e.to_string()))
    }
}

/// Complete self-contained state: every slot (tombstones included) plus the
/// causal frontier. Enough for a fresh replica to initialize from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<DeltaEntry>,
    frontier: Frontier,
}

/// One replica of a sheet's cell map.
#[derive(Debug)]
pub struct CellStore {
    replica: ReplicaId,
    clock: HlcClock,
    slots: BTreeMap<CellRef, CellSlot>,
    frontier: Frontier,
}

impl CellStore {
    pub fn new() -> Self {
        Self {
            replica: ReplicaId::new(),
            clock: HlcClock::new(),
            slots: BTreeMap::new(),
            frontier: Frontier::new(),
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Current value of a cell. Tombstones read as absent.
    pub fn get(&self, cell: &CellRef) -> Option<&CellValue> {
        self.slots.get(cell).and_then(|slot| slot.value.as_ref())
    }

    /// Number of live (non-tombstoned) cells.
    pub fn live_len(&self) -> usize {
        self.slots.values().filter(|s| !s.is_tombstone()).count()
    }

    fn next_stamp(&mut self) -> Result<Stamp, CoreError> {
        Ok(Stamp::new(self.clock.tick()?, self.replica))
    }

    /// Local edit: write `value` at `cell`. Returns the delta carrying
    /// exactly this change; the store's frontier advances past it.
    pub fn set(&mut self, cell: CellRef, value: CellValue) -> Result<CellDelta, CoreError> {
        self.local_write(cell, Some(value))
    }

    /// Local edit: delete `cell`, leaving a tombstone.
    pub fn delete(&mut self, cell: CellRef) -> Result<CellDelta, CoreError> {
        self.local_write(cell, None)
    }

    fn local_write(
        &mut self,
        cell: CellRef,
        value: Option<CellValue>,
    ) -> Result<CellDelta, CoreError> {
        let stamp = self.next_stamp()?;
        let entry = DeltaEntry {
            cell,
            value,
            stamp,
        };
        self.apply(&entry);
        Ok(CellDelta::new(vec![entry]))
    }

    fn apply(&mut self, entry: &DeltaEntry) -> bool {
        self.clock.observe(entry.stamp.hlc);
        self.frontier.record(&entry.stamp);
        if entry.wins(self.slots.get(&entry.cell)) {
            self.slots.insert(
                entry.cell,
                CellSlot {
                    value: entry.value.clone(),
                    stamp: entry.stamp,
                },
            );
            true
        } else {
            false
        }
    }

    /// Merge an externally produced delta. Stale, duplicate, or dominated
    /// entries are per-key no-ops. Returns the number of keys that changed.
    pub fn merge(&mut self, delta: &CellDelta) -> usize {
        delta
            .entries()
            .iter()
            .filter(|entry| self.apply(entry))
            .count()
    }

    /// Minimal delta of everything the given frontier has not seen.
    pub fn delta_since(&self, since: &Frontier) -> CellDelta {
        let entries = self
            .slots
            .iter()
            .filter(|(_, slot)| !since.sees(&slot.stamp))
            .map(|(cell, slot)| DeltaEntry {
                cell: *cell,
                value: slot.value.clone(),
                stamp: slot.stamp,
            })
            .collect();
        CellDelta::new(entries)
    }

    /// Complete snapshot for initializing a new replica.
    pub fn encode_state(&self) -> Result<Vec<u8>, CoreError> {
        let snapshot = Snapshot {
            entries: self.delta_since(&Frontier::new()).entries().to_vec(),
            frontier: self.frontier.clone(),
        };
        rmp_serde::to_vec(&snapshot).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Initialize a fresh replica (fresh replica id) from a snapshot.
    pub fn decode_state(bytes: &[u8]) -> Result<Self, CoreError> {
        let snapshot: Snapshot =
            rmp_serde::from_slice(bytes).map_err(|e| CoreError::CorruptSnapshot(e.to_string()))?;
        let mut store = Self::new();
        for entry in &snapshot.entries {
            store.apply(entry);
        }
        store.frontier.merge(&snapshot.frontier);
        Ok(store)
    }

    /// Project live cells into the canonical sheet representation, in
    /// canonical (row, column) order. Tombstones are dropped.
    pub fn to_sheet(&self, name: &str) -> SheetDoc {
        let cells = self
            .slots
            .iter()
            .filter_map(|(cell, slot)| {
                slot.value.as_ref().map(|value| CellRecord {
                    row: cell.row,
                    col: cell.col,
                    value: value.clone(),
                })
            })
            .collect();
        SheetDoc {
            name: name.to_string(),
            cells,
        }
    }

    /// Hydrate a fresh store from a persisted sheet. Every cell is stamped
    /// by the new store's own clock; used once per document load.
    pub fn from_sheet(doc: &SheetDoc) -> Result<Self, CoreError> {
        let mut store = Self::new();
        for record in &doc.cells {
            store.set(CellRef::new(record.row, record.col), record.value.clone())?;
        }
        Ok(store)
    }
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> CellValue {
        CellValue::text(text)
    }

    #[test]
    fn set_get_delete() {
        let mut store = CellStore::new();
        let cell = CellRef::new(0, 0);

        store.set(cell, v("hello")).unwrap();
        assert_eq!(store.get(&cell), Some(&v("hello")));
        assert_eq!(store.live_len(), 1);

        store.delete(cell).unwrap();
        assert_eq!(store.get(&cell), None);
        assert_eq!(store.live_len(), 0);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut alice = CellStore::new();
        let mut bob = CellStore::new();

        let delta = alice.set(CellRef::new(1, 1), v("x")).unwrap();
        assert_eq!(bob.merge(&delta), 1);
        assert_eq!(bob.merge(&delta), 0);
        assert_eq!(bob.merge(&delta), 0);
        assert_eq!(bob.get(&CellRef::new(1, 1)), Some(&v("x")));
    }

    #[test]
    fn merge_is_order_insensitive() {
        let mut alice = CellStore::new();
        let d1 = alice.set(CellRef::new(0, 0), v("a")).unwrap();
        let d2 = alice.set(CellRef::new(0, 1), v("b")).unwrap();
        let d3 = alice.delete(CellRef::new(0, 0)).unwrap();

        let deltas = [d1, d2, d3];
        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let reference = alice.to_sheet("s");
        for perm in permutations {
            let mut replica = CellStore::new();
            for i in perm {
                replica.merge(&deltas[i]);
            }
            // Duplicate delivery on top.
            for d in &deltas {
                replica.merge(d);
            }
            assert_eq!(replica.to_sheet("s"), reference);
        }
    }

    #[test]
    fn concurrent_writes_resolve_deterministically() {
        let mut alice = CellStore::new();
        let mut bob = CellStore::new();
        let cell = CellRef::new(2, 2);

        let da = alice.set(cell, v("alice")).unwrap();
        let db = bob.set(cell, v("bob")).unwrap();

        alice.merge(&db);
        bob.merge(&da);

        // Both replicas picked the same winner.
        assert_eq!(alice.get(&cell), bob.get(&cell));
        let winner = [&da, &db]
            .into_iter()
            .max_by_key(|d| d.entries()[0].stamp)
            .unwrap();
        assert_eq!(alice.get(&cell), winner.entries()[0].value.as_ref());
    }

    #[test]
    fn tombstone_blocks_stale_set() {
        let mut alice = CellStore::new();
        let mut bob = CellStore::new();
        let cell = CellRef::new(2, 3);

        // Bob writes X, alice receives it, then deletes the cell.
        let set_x = bob.set(cell, v("X")).unwrap();
        alice.merge(&set_x);
        let del = alice.delete(cell).unwrap();

        // A replica that sees the delete and then the older set stays empty.
        let mut carol = CellStore::new();
        carol.merge(&del);
        carol.merge(&set_x);
        assert_eq!(carol.get(&cell), None);

        // A set created causally after the delete applies.
        bob.merge(&del);
        let set_y = bob.set(cell, v("Y")).unwrap();
        carol.merge(&set_y);
        assert_eq!(carol.get(&cell), Some(&v("Y")));
    }

    #[test]
    fn delta_since_is_minimal() {
        let mut store = CellStore::new();
        store.set(CellRef::new(0, 0), v("a")).unwrap();
        let seen = store.frontier().clone();
        store.set(CellRef::new(0, 1), v("b")).unwrap();
        store.delete(CellRef::new(0, 0)).unwrap();

        let delta = store.delta_since(&seen);
        // (0,0) was rewritten after `seen`, so both keys appear once.
        assert_eq!(delta.len(), 2);

        let full = store.delta_since(&Frontier::new());
        assert_eq!(full.len(), 2);

        // A replica at `seen` catches up from the delta alone.
        let mut replica = CellStore::new();
        replica.merge(&store.delta_since(&Frontier::new()));
        assert_eq!(replica.to_sheet("s"), store.to_sheet("s"));
    }

    #[test]
    fn snapshot_roundtrip_preserves_tombstones() {
        let mut store = CellStore::new();
        store.set(CellRef::new(0, 0), v("keep")).unwrap();
        store.set(CellRef::new(5, 5), v("gone")).unwrap();
        let del = store.delete(CellRef::new(5, 5)).unwrap();

        let bytes = store.encode_state().unwrap();
        let mut replica = CellStore::decode_state(&bytes).unwrap();

        assert_eq!(replica.get(&CellRef::new(0, 0)), Some(&v("keep")));
        assert_eq!(replica.get(&CellRef::new(5, 5)), None);

        // The tombstone survived: replaying the original delete is a no-op
        // and a stale set for (5,5) still loses.
        assert_eq!(replica.merge(&del), 0);
        assert!(replica.frontier().covers(store.frontier()));
    }

    #[test]
    fn corrupt_delta_is_rejected() {
        let mut store = CellStore::new();
        let delta = store.set(CellRef::new(0, 0), v("x")).unwrap();
        let mut bytes = delta.encode().unwrap();
        bytes.truncate(bytes.len() / 2);

        assert!(matches!(
            CellDelta::decode(&bytes),
            Err(CoreError::CorruptDelta(_))
        ));
        assert!(matches!(
            CellStore::decode_state(b"not a snapshot"),
            Err(CoreError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn sheet_projection_roundtrip() {
        let mut store = CellStore::new();
        store.set(CellRef::new(1, 0), v("b")).unwrap();
        store.set(CellRef::new(0, 0), v("a")).unwrap();
        store.set(CellRef::new(0, 3), v("c")).unwrap();
        store.delete(CellRef::new(0, 3)).unwrap();

        let sheet = store.to_sheet("Sheet1");
        assert_eq!(sheet.name, "Sheet1");
        // Canonical order, tombstones dropped.
        assert_eq!(sheet.cells.len(), 2);
        assert_eq!((sheet.cells[0].row, sheet.cells[0].col), (0, 0));
        assert_eq!((sheet.cells[1].row, sheet.cells[1].col), (1, 0));

        let rehydrated = CellStore::from_sheet(&sheet).unwrap();
        assert_eq!(rehydrated.to_sheet("Sheet1"), sheet);
    }
}
