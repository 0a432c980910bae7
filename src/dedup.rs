//! Cross-monitor deduplication of relayed headers.
//!
//! The same alert is usually heard on several receivers (and repeated by the
//! originator three times per transmission), so every monitor consults one
//! shared record before enqueueing. The record is bounded both by age and by
//! entry count.

use crate::alert::lock;
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration for the dedup record.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Entries older than this are forgotten.
    pub max_age: Duration,
    /// Oldest entries are evicted beyond this count.
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(defaults::DEDUP_MAX_AGE_SECS),
            max_entries: defaults::DEDUP_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Default)]
struct Record {
    recorded_at: HashMap<String, Instant>,
    /// Insertion order, for eviction. May hold stale keys that were re-recorded.
    order: VecDeque<(String, Instant)>,
}

impl Record {
    fn expire(&mut self, now: Instant, config: &DedupConfig) {
        while let Some((hash, at)) = self.order.front() {
            let too_old = now.saturating_duration_since(*at) >= config.max_age;
            let too_many = self.recorded_at.len() > config.max_entries;
            if !too_old && !too_many {
                break;
            }
            // Only drop the map entry if it still belongs to this queue slot
            if self.recorded_at.get(hash) == Some(at) {
                self.recorded_at.remove(hash);
            }
            self.order.pop_front();
        }
    }
}

/// Thread-safe, bounded record of already-relayed header hashes.
pub struct AlertDeduper {
    config: DedupConfig,
    record: Mutex<Record>,
    clock: Arc<dyn Clock>,
}

impl AlertDeduper {
    pub fn new(config: DedupConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a deduper with a custom clock (for deterministic testing).
    pub fn with_clock(config: DedupConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            record: Mutex::new(Record::default()),
            clock,
        }
    }

    /// True if `hash` is currently in the record.
    pub fn seen(&self, hash: &str) -> bool {
        let mut record = lock(&self.record);
        record.expire(self.clock.now(), &self.config);
        record.recorded_at.contains_key(hash)
    }

    /// Add `hash` to the record (refreshing its age if already present).
    pub fn record(&self, hash: &str) {
        let now = self.clock.now();
        let mut record = lock(&self.record);
        record.recorded_at.insert(hash.to_string(), now);
        record.order.push_back((hash.to_string(), now));
        record.expire(now, &self.config);
    }

    /// Atomic gate: records `hash` and returns `true` only if it was not seen.
    ///
    /// Monitors use this instead of `seen` + `record` so that two monitors
    /// hearing the same header at once cannot both enqueue it.
    pub fn check_and_record(&self, hash: &str) -> bool {
        let now = self.clock.now();
        let mut record = lock(&self.record);
        record.expire(now, &self.config);
        if record.recorded_at.contains_key(hash) {
            return false;
        }
        record.recorded_at.insert(hash.to_string(), now);
        record.order.push_back((hash.to_string(), now));
        record.expire(now, &self.config);
        true
    }

    /// Number of hashes currently retained.
    pub fn len(&self) -> usize {
        let mut record = lock(&self.record);
        record.expire(self.clock.now(), &self.config);
        record.recorded_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertDeduper {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}
