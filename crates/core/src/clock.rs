use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::ids::ReplicaId;

/// Wall-clock time as milliseconds since the Unix epoch.
fn physical_now() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::ClockUnavailable)
}

/// Hybrid logical clock timestamp: wall milliseconds plus a logical counter
/// that breaks ties within the same millisecond.
///
/// The derived ordering (wall_ms, then counter) is the causal ordering.
#[derive(
    Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, Default,
)]
pub struct Hlc {
    pub wall_ms: u64,
    pub counter: u32,
}

impl Hlc {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }
}

/// A write stamp: HLC plus the replica that produced it.
///
/// The derived ordering is the conflict rule for concurrent writes to the
/// same cell: the causally later HLC wins, and for true concurrency (equal
/// HLCs) the higher replica id wins. Deterministic on every replica.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Stamp {
    pub hlc: Hlc,
    pub replica: ReplicaId,
}

impl Stamp {
    pub fn new(hlc: Hlc, replica: ReplicaId) -> Self {
        Self { hlc, replica }
    }
}

/// Generates monotonically increasing HLC timestamps for one replica.
pub struct HlcClock {
    last: Hlc,
}

impl HlcClock {
    pub fn new() -> Self {
        Self { last: Hlc::default() }
    }

    /// Next timestamp, strictly greater than every timestamp produced or
    /// observed so far.
    pub fn tick(&mut self) -> Result<Hlc, CoreError> {
        let now = physical_now()?;
        let next = if now > self.last.wall_ms {
            Hlc::new(now, 0)
        } else {
            Hlc::new(self.last.wall_ms, self.last.counter + 1)
        };
        self.last = next;
        Ok(next)
    }

    /// Fold a remote timestamp into the clock so that every future `tick`
    /// dominates it.
    pub fn observe(&mut self, remote: Hlc) {
        if remote > self.last {
            self.last = remote;
        }
    }
}

impl Default for HlcClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HlcClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HlcClock(last: {}ms+{})", self.last.wall_ms, self.last.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_monotonicity() {
        let mut clock = HlcClock::new();
        let mut prev = clock.tick().unwrap();
        for _ in 0..100 {
            let next = clock.tick().unwrap();
            assert!(next > prev, "expected {next:?} > {prev:?}");
            prev = next;
        }
    }

    #[test]
    fn same_wall_time_increments_counter() {
        let mut clock = HlcClock::new();
        let future = Hlc::new(physical_now().unwrap() + 100_000, 0);
        clock.observe(future);

        let t1 = clock.tick().unwrap();
        assert_eq!(t1.wall_ms, future.wall_ms);
        assert_eq!(t1.counter, 1);

        let t2 = clock.tick().unwrap();
        assert_eq!(t2.wall_ms, future.wall_ms);
        assert_eq!(t2.counter, 2);
    }

    #[test]
    fn observe_lifts_clock_past_remote() {
        let mut clock = HlcClock::new();
        let remote = Hlc::new(physical_now().unwrap() + 50_000, 7);
        clock.observe(remote);
        let next = clock.tick().unwrap();
        assert!(next > remote, "expected {next:?} > {remote:?}");
    }

    #[test]
    fn observe_ignores_stale_remote() {
        let mut clock = HlcClock::new();
        let t1 = clock.tick().unwrap();
        clock.observe(Hlc::new(0, 0));
        let t2 = clock.tick().unwrap();
        assert!(t2 > t1);
    }

    #[test]
    fn stamp_orders_by_hlc_then_replica() {
        let a = ReplicaId::new();
        let b = ReplicaId::new();
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        // Same HLC: the higher replica id wins the tie.
        let s1 = Stamp::new(Hlc::new(100, 0), lo);
        let s2 = Stamp::new(Hlc::new(100, 0), hi);
        assert!(s2 > s1);

        // Later HLC beats any replica id.
        let s3 = Stamp::new(Hlc::new(100, 1), lo);
        assert!(s3 > s2);
        let s4 = Stamp::new(Hlc::new(101, 0), lo);
        assert!(s4 > s3);
    }
}
