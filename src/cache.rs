//! Byte-bounded frame cache with added notifications.
//!
//! The cache holds captured frames keyed by slot identifiers and enforces a
//! total byte budget with least-recently-used eviction. Inserts are
//! insert-if-absent: a slot stays pinned to its first occupant until that
//! occupant is consumed or evicted.
//!
//! A successful insert fires an `added` notification synchronously to every
//! subscribed observer, carrying the key and the stored frame, so a consumer
//! can react without polling. Notifications are delivered outside the entry
//! lock; an observer may call back into the cache.
//!
//! All mutating operations are internally synchronized: `put` runs on the
//! capture-completion callback while `evict` runs on the session's decision
//! path.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::frame::Frame;
use crate::validate_slot_key;

/// Observer for cache insertions.
pub trait CacheObserver: Send + Sync {
    /// Called synchronously after a successful `put`.
    fn on_frame_added(&self, key: &str, frame: &Arc<Frame>);
}

/// Cache counters for health logging and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub resident_bytes: u64,
    pub capacity_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheInner {
    capacity_bytes: u64,
    resident_bytes: u64,
    entries: HashMap<String, Arc<Frame>>,
    /// Recency order, least-recently-used at the front.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).expect("position was valid");
            self.order.push_back(k);
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<Arc<Frame>> {
        let frame = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.resident_bytes = self.resident_bytes.saturating_sub(frame.byte_len() as u64);
        Some(frame)
    }

    /// Evict LRU entries until `incoming` fits the budget.
    fn make_room(&mut self, incoming: u64) {
        while self.resident_bytes + incoming > self.capacity_bytes {
            let Some(oldest) = self.order.front().cloned() else {
                // Oversized item against an empty cache: admit it anyway.
                // Everything else was already evicted to make room.
                break;
            };
            self.remove_entry(&oldest);
            self.evictions += 1;
            log::debug!("cache: evicted {} to make room", oldest);
        }
    }
}

/// Byte-bounded LRU frame cache.
pub struct FrameCache {
    inner: Mutex<CacheInner>,
    observers: Mutex<Vec<Arc<dyn CacheObserver>>>,
}

impl FrameCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity_bytes,
                resident_bytes: 0,
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Budget rule of thumb: one-eighth of the memory available at startup.
    pub fn recommended_capacity(available_bytes: u64) -> u64 {
        available_bytes / 8
    }

    /// Subscribe to added notifications.
    pub fn subscribe(&self, observer: Arc<dyn CacheObserver>) {
        self.observers
            .lock()
            .expect("observer list lock poisoned")
            .push(observer);
    }

    /// Insert-if-absent. Returns true when the frame was stored.
    ///
    /// A second insert under an occupied key is a no-op (the first occupant
    /// stays). On success the added notification fires synchronously, after
    /// the entry lock is released.
    pub fn put(&self, key: &str, frame: Frame) -> Result<bool> {
        validate_slot_key(key)?;
        let stored = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            if inner.entries.contains_key(key) {
                None
            } else {
                let size = frame.byte_len() as u64;
                inner.make_room(size);
                let frame = Arc::new(frame);
                inner.entries.insert(key.to_string(), frame.clone());
                inner.order.push_back(key.to_string());
                inner.resident_bytes += size;
                Some(frame)
            }
        };

        let Some(frame) = stored else {
            log::debug!("cache: put on occupied slot {} ignored", key);
            return Ok(false);
        };

        let observers = self
            .observers
            .lock()
            .expect("observer list lock poisoned")
            .clone();
        for observer in observers {
            observer.on_frame_added(key, &frame);
        }
        Ok(true)
    }

    /// Current occupant of `key`, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if let Some(frame) = inner.entries.get(key).cloned() {
            inner.touch(key);
            inner.hits += 1;
            Some(frame)
        } else {
            inner.misses += 1;
            None
        }
    }

    /// Remove `key`. Absent keys are a no-op (the eviction-race case).
    pub fn evict(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.remove_entry(key).is_some() {
            inner.evictions += 1;
        } else {
            log::debug!("cache: evict of absent slot {} (race tolerated)", key);
        }
    }

    /// Remove and return `key`'s occupant: consumption, not eviction.
    ///
    /// Used by the blur gate's accept path; does not bump the eviction stat.
    pub fn take(&self, key: &str) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.remove_entry(key)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            entries: inner.entries.len(),
            resident_bytes: inner.resident_bytes,
            capacity_bytes: inner.capacity_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
