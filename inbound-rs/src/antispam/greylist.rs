use crate::clock::{Clock, SystemClock};
use crate::settings::{GreylistSettings, SettingsHandle};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::{secs_to_ms, GreylistDecision, GreylistEntry, GreylistKey};

/// Greylist engine for anti-spam
///
/// Sole owner of the greylist table. The table is sharded, so concurrent
/// decisions for different triples do not contend on a single lock.
pub struct GreylistEngine {
    entries: DashMap<GreylistKey, GreylistEntry>,
    clock: Arc<dyn Clock>,
    /// Epoch milliseconds of the last opportunistic purge
    last_purge_ms: AtomicI64,
}

impl GreylistEngine {
    /// Create new greylist engine on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now().timestamp_millis();
        GreylistEngine {
            entries: DashMap::new(),
            clock,
            last_purge_ms: AtomicI64::new(now_ms),
        }
    }

    /// Decide for `key` at the current clock time
    pub fn check(&self, policy: &GreylistSettings, key: GreylistKey) -> GreylistDecision {
        self.decide(policy, key, self.clock.now())
    }

    /// Decide whether the triple may proceed at `now`
    ///
    /// - first contact (or an entry past its ttl) records `now` and defers
    ///   for the full delay
    /// - a retry inside the delay defers for the remaining whole seconds
    /// - a retry after the delay is allowed, and stays allowed until the
    ///   entry expires
    pub fn decide(
        &self,
        policy: &GreylistSettings,
        key: GreylistKey,
        now: DateTime<Utc>,
    ) -> GreylistDecision {
        if !policy.enabled {
            return GreylistDecision::Allow;
        }

        let min_delay_ms = secs_to_ms(policy.min_delay_secs);

        let decision = match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                debug!("Greylisting new triple {}", vacant.key());
                vacant.insert(GreylistEntry::new(now));
                GreylistDecision::TempFail(policy.min_delay_secs)
            }
            Entry::Occupied(mut occupied) => {
                let entry = *occupied.get();
                if entry.is_expired(now, policy.ttl_secs) {
                    debug!("Greylist entry {} expired, starting over", occupied.key());
                    occupied.insert(GreylistEntry::new(now));
                    GreylistDecision::TempFail(policy.min_delay_secs)
                } else {
                    let elapsed_ms = entry.elapsed_ms(now);
                    if elapsed_ms < min_delay_ms {
                        let remaining_ms = min_delay_ms - elapsed_ms;
                        GreylistDecision::TempFail((remaining_ms.saturating_add(999) / 1000) as u64)
                    } else {
                        GreylistDecision::Allow
                    }
                }
            }
        };

        // The entry guard is released above; purging takes shard locks itself
        self.maybe_purge(policy, now);

        decision
    }

    /// Drop entries older than `ttl_secs` relative to `now`
    pub fn purge_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> usize {
        let initial_count = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now, ttl_secs));
        let removed = initial_count.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!("Purged {} expired greylist entries", removed);
        }
        removed
    }

    /// Amortized purge: at most once per sweep interval, claimed by one caller
    fn maybe_purge(&self, policy: &GreylistSettings, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_purge_ms.load(Ordering::Relaxed);

        if now_ms.saturating_sub(last) < secs_to_ms(policy.sweep_interval_secs) {
            return;
        }

        if self
            .last_purge_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired(now, policy.ttl_secs);
        }
    }

    /// Periodic sweep in the background, reading the ttl from the active
    /// snapshot on each pass
    pub fn spawn_sweeper(
        self: Arc<Self>,
        settings: Arc<SettingsHandle>,
        interval: Duration,
    ) -> JoinHandle<()> {
        info!("Starting greylist sweeper every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let ttl_secs = settings.current().greylist.ttl_secs;
                self.purge_expired(self.clock.now(), ttl_secs);
            }
        })
    }

    /// Get greylist entry count
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for GreylistEngine {
    fn default() -> Self {
        Self::new()
    }
}
