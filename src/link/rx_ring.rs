// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed-capacity RX ring guarded by an interface's `queue_lock`
//! (spec.md §4.C, §5). `feed` is the only entry point producers may call;
//! `drain_into` is used by the uplink parser to snapshot bytes outside the
//! lock.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Byte-accounting counters required by Invariant 3 (spec.md §8): every
/// byte fed either ends up consumed or dropped, and the two plus the
/// in-flight occupancy always reconcile against `bytes_fed`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RxRingStats {
    pub bytes_fed: u64,
    pub bytes_dropped: u64,
    pub bytes_consumed: u64,
    pub max_occupancy: usize,
}

struct Inner {
    buf: VecDeque<u8>,
    capacity: usize,
    stats: RxRingStats,
}

pub struct RxRing {
    inner: Mutex<Inner>,
}

impl RxRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                stats: RxRingStats::default(),
            }),
        }
    }

    /// Appends `data`, dropping the oldest bytes first if the ring is full
    /// (bounded buffering; dropped bytes are still accounted for).
    pub fn feed(&self, data: &[u8]) {
        let mut inner = self.inner.lock().expect("rx ring lock poisoned");
        inner.stats.bytes_fed += data.len() as u64;
        for &b in data {
            if inner.buf.len() == inner.capacity {
                inner.buf.pop_front();
                inner.stats.bytes_dropped += 1;
            }
            inner.buf.push_back(b);
        }
        inner.stats.max_occupancy = inner.stats.max_occupancy.max(inner.buf.len());
    }

    /// Drains all currently buffered bytes into `scratch`, under the lock,
    /// then returns — parsing itself happens outside the lock.
    pub fn drain_into(&self, scratch: &mut Vec<u8>) {
        let mut inner = self.inner.lock().expect("rx ring lock poisoned");
        let drained = inner.buf.len();
        scratch.extend(inner.buf.drain(..));
        inner.stats.bytes_consumed += drained as u64;
    }

    pub fn stats(&self) -> RxRingStats {
        self.inner.lock().expect("rx ring lock poisoned").stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_then_drain_round_trips() {
        let ring = RxRing::new(16);
        ring.feed(&[1, 2, 3]);
        let mut scratch = Vec::new();
        ring.drain_into(&mut scratch);
        assert_eq!(scratch, vec![1, 2, 3]);
        let stats = ring.stats();
        assert_eq!(stats.bytes_fed, 3);
        assert_eq!(stats.bytes_consumed, 3);
        assert_eq!(stats.bytes_dropped, 0);
    }

    #[test]
    fn overflow_drops_oldest_and_is_accounted() {
        let ring = RxRing::new(2);
        ring.feed(&[1, 2, 3, 4]);
        let mut scratch = Vec::new();
        ring.drain_into(&mut scratch);
        assert_eq!(scratch, vec![3, 4]);
        let stats = ring.stats();
        assert_eq!(stats.bytes_fed, 4);
        assert_eq!(stats.bytes_dropped, 2);
        assert_eq!(stats.bytes_consumed, 2);
        assert_eq!(stats.bytes_fed, stats.bytes_dropped + stats.bytes_consumed);
    }

    #[test]
    fn max_occupancy_tracks_the_high_water_mark() {
        let ring = RxRing::new(8);
        ring.feed(&[1, 2, 3]);
        let mut scratch = Vec::new();
        ring.drain_into(&mut scratch);
        ring.feed(&[1]);
        assert_eq!(ring.stats().max_occupancy, 3);
    }
}
