use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{Hlc, Stamp};
use crate::ids::ReplicaId;

/// Causal frontier of a replicated store: the latest write observed from
/// each replica. Compact summary used to compute minimal deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frontier {
    entries: BTreeMap<ReplicaId, Hlc>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write stamp. Keeps the max HLC per replica.
    pub fn record(&mut self, stamp: &Stamp) {
        let entry = self.entries.entry(stamp.replica).or_insert(stamp.hlc);
        if stamp.hlc > *entry {
            *entry = stamp.hlc;
        }
    }

    /// Latest HLC observed from a replica.
    pub fn latest(&self, replica: &ReplicaId) -> Option<&Hlc> {
        self.entries.get(replica)
    }

    /// Merge another frontier into this one (max per replica).
    pub fn merge(&mut self, other: &Frontier) {
        for (replica, hlc) in &other.entries {
            self.record(&Stamp::new(*hlc, *replica));
        }
    }

    /// Whether a write carrying `stamp` has already been incorporated.
    pub fn sees(&self, stamp: &Stamp) -> bool {
        self.entries
            .get(&stamp.replica)
            .is_some_and(|hlc| *hlc >= stamp.hlc)
    }

    /// Whether this frontier has incorporated everything `other` has.
    pub fn covers(&self, other: &Frontier) -> bool {
        other
            .entries
            .iter()
            .all(|(replica, hlc)| self.sees(&Stamp::new(*hlc, *replica)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<ReplicaId, Hlc> {
        &self.entries
    }
}
