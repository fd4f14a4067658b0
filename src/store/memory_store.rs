use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{BucketStore, IncrementCommit, RingrateError, store::parse_count};

#[derive(Debug, Default)]
struct MemoryEntry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`BucketStore`] backed by a [`DashMap`].
///
/// Each commit runs while holding the key's shard lock, so concurrent increments of the
/// same key serialize end to end. Expiry is lazy: an expired key is dropped the next
/// time it is touched, or by [`MemoryStore::purge_expired`].
///
/// State is process-scoped. Use `RedisStore` when several processes must share counts.
///
/// Cloning is cheap and every clone sees the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key. Returns how many keys are still live.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.entries.len()
    }

    /// Whether `key` currently exists (and has not expired).
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Raw value of one field, for diagnostics and tests.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }

        entry.fields.get(field).cloned()
    }

    /// Overwrite one field with a raw value, leaving the key's expiry untouched.
    ///
    /// Intended for diagnostics and tests, e.g. to simulate a corrupted bucket.
    pub fn set_field(&self, key: &str, field: &str, value: impl Into<String>) {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            *entry = MemoryEntry::default();
        }

        entry.fields.insert(field.to_string(), value.into());
    }

    /// Remaining time to live of `key`, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        entry
            .expires_at
            .and_then(|at| at.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn commit_increment(&self, commit: &IncrementCommit) -> Result<i64, RingrateError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(commit.key.clone()).or_default();

        if entry.is_expired(now) {
            *entry = MemoryEntry::default();
        }

        // Everything that can fail happens before the first mutation.
        let new_count = match entry.fields.get(&commit.field).and_then(|v| parse_count(v)) {
            Some(current) => current.checked_add(commit.delta).ok_or_else(|| {
                RingrateError::Store(format!(
                    "increment of field {} on {} would overflow",
                    commit.field, commit.key
                ))
            })?,
            None => commit.delta,
        };

        entry
            .fields
            .insert(commit.field.clone(), new_count.to_string());

        for field in &commit.evict {
            entry.fields.remove(field);
        }

        entry.expires_at = Some(now + commit.ttl);

        Ok(new_count)
    }

    async fn read_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, RingrateError> {
        let now = Instant::now();

        let values = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(
                fields
                    .iter()
                    .map(|field| entry.fields.get(field).cloned())
                    .collect::<Vec<_>>(),
            ),
            Some(_) => None,
            None => return Ok(vec![None; fields.len()]),
        };

        match values {
            Some(values) => Ok(values),
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                Ok(vec![None; fields.len()])
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), RingrateError> {
        self.entries.remove(key);
        Ok(())
    }
}
