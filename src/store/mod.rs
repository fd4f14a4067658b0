//! Store adapters.
//!
//! The counter never talks to a backend directly; it goes through [`BucketStore`], which
//! offers exactly three capabilities:
//!
//! - an atomic *increment + evict + expire* commit on one map-valued key,
//! - an ordered batch read of fields from that map,
//! - unconditional deletion of the key.
//!
//! Two adapters ship with the crate:
//!
//! - [`MemoryStore`]: process-local state in a [`DashMap`](dashmap::DashMap), useful for
//!   single-process deployments and tests.
//! - `RedisStore` (features `redis-tokio` / `redis-smol`): shared state in Redis, the
//!   deployment this crate is built for.

use std::time::Duration;

use async_trait::async_trait;

use crate::RingrateError;

mod memory_store;
pub use memory_store::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod redis_store;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use redis_store::*;

/// One increment transaction against a bucket map.
///
/// Adapters must apply all three effects together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementCommit {
    /// Store key, `prefix:id`.
    pub key: String,
    /// Field (bucket index) to increment.
    pub field: String,
    /// Amount to add to `field`.
    pub delta: i64,
    /// Fields (stale bucket indices) to delete.
    pub evict: Vec<String>,
    /// Expiry to set on `key`.
    pub ttl: Duration,
}

/// Capability set the counter needs from a shared key-value map store.
///
/// Implementations are shared by every counter built on them and must be safe to call
/// concurrently from many tasks and threads.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Atomically increment `commit.field`, delete `commit.evict` and set the key's expiry.
    ///
    /// A field holding a non-integer value is overwritten with `commit.delta`.
    /// Returns the new value of `commit.field`.
    async fn commit_increment(&self, commit: &IncrementCommit) -> Result<i64, RingrateError>;

    /// Read `fields` from the map at `key`, preserving order. Absent fields (or an absent
    /// key) read as `None`.
    async fn read_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, RingrateError>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), RingrateError>;
}

#[async_trait]
impl<S> BucketStore for std::sync::Arc<S>
where
    S: BucketStore + ?Sized,
{
    async fn commit_increment(&self, commit: &IncrementCommit) -> Result<i64, RingrateError> {
        (**self).commit_increment(commit).await
    }

    async fn read_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, RingrateError> {
        (**self).read_fields(key, fields).await
    }

    async fn delete(&self, key: &str) -> Result<(), RingrateError> {
        (**self).delete(key).await
    }
}

/// Parse a stored bucket value the way Redis `HINCRBY` reads a hash field: an optional
/// `-`, then base-10 digits with no leading zeros, within `i64`. `"+5"`, `"007"` and `"-0"`
/// are rejected.
pub(crate) fn parse_count(value: &str) -> Option<i64> {
    let digits = value.strip_prefix('-').unwrap_or(value);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if digits.starts_with('0') && value != "0" {
        return None;
    }

    value.parse::<i64>().ok()
}
