//! Time-bounded room metadata cache.
//!
//! Entries are served while younger than the TTL and treated as absent once
//! they reach it. Time comes from an injected [`Clock`] so expiry can be
//! driven in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use recorder_types::RoomInfo;

pub const DEFAULT_ROOM_INFO_TTL: Duration = Duration::from_secs(5 * 60);

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

struct CachedRoom {
    info: RoomInfo,
    written_at: Instant,
}

pub struct RoomInfoCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<u64, CachedRoom>,
}

impl RoomInfoCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `room_id`, if any. Expired entries are dropped.
    pub fn get(&mut self, room_id: u64) -> Option<RoomInfo> {
        let now = self.clock.now();
        let fresh = match self.entries.get(&room_id) {
            Some(entry) => now.saturating_duration_since(entry.written_at) < self.ttl,
            None => return None,
        };
        if !fresh {
            self.entries.remove(&room_id);
            return None;
        }
        self.entries.get(&room_id).map(|entry| entry.info.clone())
    }

    pub fn insert(&mut self, room_id: u64, info: RoomInfo) {
        let written_at = self.clock.now();
        self.entries.insert(room_id, CachedRoom { info, written_at });
    }

    pub fn invalidate(&mut self, room_id: u64) -> bool {
        self.entries.remove(&room_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for RoomInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomInfoCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: u64, title: &str) -> RoomInfo {
        RoomInfo {
            room_id: id,
            title: Some(title.to_string()),
            ..RoomInfo::default()
        }
    }

    fn cache_with_clock(ttl: Duration) -> (RoomInfoCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RoomInfoCache::new(ttl, clock.clone()), clock)
    }

    #[test]
    fn entry_served_until_ttl_then_absent() {
        let (mut cache, clock) = cache_with_clock(Duration::from_secs(300));
        cache.insert(1, room(1, "evening stream"));

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(1), Some(room(1, "evening stream")));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn rewrite_restarts_ttl() {
        let (mut cache, clock) = cache_with_clock(Duration::from_secs(10));
        cache.insert(1, room(1, "a"));
        clock.advance(Duration::from_secs(8));
        cache.insert(1, room(1, "b"));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(1).and_then(|r| r.title), Some("b".to_string()));
    }

    #[test]
    fn invalidate_evicts_only_that_room() {
        let (mut cache, _clock) = cache_with_clock(DEFAULT_ROOM_INFO_TTL);
        cache.insert(1, room(1, "a"));
        cache.insert(2, room(2, "b"));
        assert!(cache.invalidate(1));
        assert!(!cache.invalidate(1));
        assert_eq!(cache.get(1), None);
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn zero_ttl_never_serves() {
        let (mut cache, _clock) = cache_with_clock(Duration::ZERO);
        cache.insert(3, room(3, "c"));
        assert_eq!(cache.get(3), None);
    }
}
