//! Injected leaderboard cache: a keyed map of computed rankings with a TTL.
//!
//! Owned by the service that uses it, never a hidden singleton, so tests can
//! supply an isolated instance. Entries are pure memos; dropping them at any
//! time is always safe.

use crate::types::{Faction, Period, RankedList};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Cache key: one entry per (stat, period, faction) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub stat_idx: u16,
    pub period: Period,
    pub faction: Option<Faction>,
}

struct CacheSlot {
    list: RankedList,
    expires_at: DateTime<Utc>,
}

/// TTL cache over computed rankings. Writes are last-writer-wins.
pub struct RankCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, CacheSlot>>,
}

impl RankCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached ranking for the key if it has not expired at `now`.
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<RankedList> {
        let slots = self.lock();
        match slots.get(key) {
            Some(slot) if now < slot.expires_at => {
                debug!(stat = key.stat_idx, period = %key.period, "leaderboard cache hit");
                Some(slot.list.clone())
            }
            _ => {
                debug!(stat = key.stat_idx, period = %key.period, "leaderboard cache miss");
                None
            }
        }
    }

    /// Store a freshly computed ranking, replacing whatever was there.
    pub fn put(&self, key: CacheKey, list: RankedList, now: DateTime<Utc>) {
        let expires_at = now + self.ttl;
        self.lock().insert(key, CacheSlot { list, expires_at });
    }

    /// Drop every entry for a stat index, returning how many were removed.
    /// Called after an accepted submission touches that stat.
    pub fn invalidate_stat(&self, stat_idx: u16) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|key, _| key.stat_idx != stat_idx);
        before - slots.len()
    }

    /// Remove entries expired at `now`, returning how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| now < slot.expires_at);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_for(stat_idx: u16, generated_at: DateTime<Utc>) -> RankedList {
        RankedList {
            stat_idx,
            stat_name: format!("Stat {stat_idx}"),
            period: Period::AllTime,
            faction: None,
            entries: Vec::new(),
            min_value: None,
            max_value: None,
            generated_at,
        }
    }

    fn key_for(stat_idx: u16) -> CacheKey {
        CacheKey { stat_idx, period: Period::AllTime, faction: None }
    }

    #[test]
    fn entries_expire_after_the_ttl() {
        let cache = RankCache::new(300);
        let now = Utc::now();
        cache.put(key_for(6), list_for(6, now), now);

        assert!(cache.get(&key_for(6), now + Duration::seconds(299)).is_some());
        assert!(cache.get(&key_for(6), now + Duration::seconds(300)).is_none());
    }

    #[test]
    fn faction_and_period_are_part_of_the_key() {
        let cache = RankCache::new(300);
        let now = Utc::now();
        cache.put(key_for(6), list_for(6, now), now);

        let faction_key = CacheKey {
            stat_idx: 6,
            period: Period::AllTime,
            faction: Some(Faction::Enlightened),
        };
        assert!(cache.get(&faction_key, now).is_none());

        let weekly_key = CacheKey { stat_idx: 6, period: Period::Weekly, faction: None };
        assert!(cache.get(&weekly_key, now).is_none());
    }

    #[test]
    fn invalidate_drops_every_entry_for_the_stat() {
        let cache = RankCache::new(300);
        let now = Utc::now();
        cache.put(key_for(6), list_for(6, now), now);
        cache.put(
            CacheKey { stat_idx: 6, period: Period::Weekly, faction: None },
            list_for(6, now),
            now,
        );
        cache.put(key_for(8), list_for(8, now), now);

        assert_eq!(cache.invalidate_stat(6), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key_for(8), now).is_some());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = RankCache::new(300);
        let now = Utc::now();
        cache.put(key_for(6), list_for(6, now), now);
        cache.put(key_for(8), list_for(8, now), now + Duration::seconds(200));

        assert_eq!(cache.sweep(now + Duration::seconds(350)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn instances_are_isolated() {
        let a = RankCache::new(300);
        let b = RankCache::new(300);
        let now = Utc::now();
        a.put(key_for(6), list_for(6, now), now);
        assert!(b.get(&key_for(6), now).is_none());
        assert!(b.is_empty());
    }
}
