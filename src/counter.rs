use std::{ops::Deref, sync::Arc, time::Duration};

use crate::{
    BucketStore, Clock, IncrementCommit, RingrateError, SystemClock, Window, store::parse_count,
};

/// A validated newtype for store key prefixes.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
///
/// Colons are allowed, so namespaced prefixes such as `"app:test:count"` work as-is.
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// Create a new default prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("ringrate"))
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = RingrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(RingrateError::InvalidKeyPrefix(
                "Key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(RingrateError::InvalidKeyPrefix(
                "Key prefix must not be longer than 255 characters".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for KeyPrefix {
    type Error = RingrateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Configuration for [`Counter`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ringrate::{CounterOptions, KeyPrefix};
///
/// // Count occurrences over the last 5s, releasing every 0.5s.
/// let options = CounterOptions {
///     prefix: Some(KeyPrefix::try_from("app:pv").unwrap()), // keys: app:pv:<id>
///     period: Duration::from_secs(5),
///     interval: Duration::from_millis(500),
///     clock: None,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct CounterOptions {
    /// Optional prefix for all store keys.
    ///
    /// Keys are built as `<prefix>:<id>`. If `None`, defaults to `"ringrate"`.
    pub prefix: Option<KeyPrefix>,

    /// Trailing period the count covers. Also the TTL of every key.
    pub period: Duration,

    /// Bucket width. Must evenly divide `period`.
    pub interval: Duration,

    /// Time source used to pick the current bucket. Defaults to [`SystemClock`].
    pub clock: Option<Arc<dyn Clock>>,
}

impl CounterOptions {
    /// Options with the default prefix and the system clock.
    pub fn new(period: Duration, interval: Duration) -> Self {
        Self {
            prefix: None,
            period,
            interval,
            clock: None,
        }
    }
}

/// Approximate sliding-window occurrence counter over a shared store.
///
/// # Algorithm
///
/// Time is cut into buckets of width `interval`, hashed onto a ring of
/// `bucket_count = 2 * period / interval` slots (see [`Window`]). For one identifier the
/// store holds a single map from slot to count under the key `prefix:id`.
///
/// 1. **Increment:** one atomic commit that adds to the current slot, deletes the
///    `bucket_count / 2` slots ahead of it, and refreshes the key's TTL to `period`.
/// 2. **Read:** one batch read of the `bucket_count / 2` slots ending at the current one,
///    most recent first.
///
/// # Semantics & Limitations
///
/// **Quantized window:**
/// - An occurrence stays visible for between `(bucket_count / 2 - 1) * interval` and
///   `(bucket_count / 2) * interval`, not exactly `period`
///
/// **Ring-offset eviction:**
/// - Stale slots are derived from the current slot index only, never from wall-clock
///   bookkeeping
/// - Reads only ever sum the live half and the TTL reclaims a key idle for a full
///   period, so a slot that was not cleared in time is never counted
///
/// **Concurrency:**
/// - The store is the only synchronization point; no in-process locks are taken
/// - Concurrent increments of one id serialize inside the store's commit
/// - Reads are plain point reads and may observe any interleaving of concurrent writers
///
/// **Clocks:**
/// - Every process sharing a store must hash the same instant to the same slot, so
///   clocks are expected to be roughly in sync (well within one `interval`)
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ringrate::{Counter, CounterOptions, MemoryStore};
///
/// # futures::executor::block_on(async {
/// let counter = Counter::new(
///     MemoryStore::new(),
///     CounterOptions::new(Duration::from_secs(5), Duration::from_millis(500)),
/// )
/// .unwrap();
///
/// counter.inc("pv-home").await.unwrap();
/// counter.inc("pv-home").await.unwrap();
///
/// assert_eq!(counter.count("pv-home").await.unwrap(), 2);
/// assert_eq!(counter.histogram("pv-home").await.unwrap().len(), 10);
/// # });
/// ```
#[derive(Debug)]
pub struct Counter<S> {
    store: S,
    prefix: KeyPrefix,
    window: Window,
    clock: Arc<dyn Clock>,
}

impl<S: BucketStore> Counter<S> {
    /// Create a counter over `store`.
    ///
    /// Fails with [`RingrateError::InvalidWindow`] if `period` and `interval` do not make
    /// an exact ring.
    pub fn new(store: S, options: CounterOptions) -> Result<Self, RingrateError> {
        let window = Window::new(options.period, options.interval)?;

        Ok(Self {
            store,
            prefix: options.prefix.unwrap_or_else(KeyPrefix::default_prefix),
            window,
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    } // end constructor

    /// The ring configuration.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// The key prefix.
    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store key for `id`: `prefix:id`.
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", *self.prefix, id)
    }

    /// Record one occurrence for `id` at the current time.
    pub async fn inc(&self, id: &str) -> Result<(), RingrateError> {
        self.inc_by(id, 1).await
    }

    /// Record `delta` occurrences for `id` at the current time.
    ///
    /// Runs a single atomic commit: add `delta` to the current slot, delete the stale
    /// half of the ring, and refresh the key's TTL to `period`.
    pub async fn inc_by(&self, id: &str, delta: i64) -> Result<(), RingrateError> {
        let bucket = self.window.hash(self.clock.now());

        let commit = IncrementCommit {
            key: self.key(id),
            field: bucket.to_string(),
            delta,
            evict: self
                .window
                .stale_indices(bucket)
                .into_iter()
                .map(|index| index.to_string())
                .collect(),
            ttl: self.window.period(),
        };

        self.store
            .commit_increment(&commit)
            .await
            .inspect_err(|err| {
                tracing::error!(error = ?err, key = %commit.key, "counter.inc.error");
            })?;

        Ok(())
    } // end method inc_by

    /// Per-slot counts over the trailing period, most recent slot first.
    ///
    /// Always returns `bucket_count / 2` entries. Absent or unparseable values read as `0`.
    pub async fn histogram(&self, id: &str) -> Result<Vec<i64>, RingrateError> {
        let from = self.window.hash(self.clock.now());
        let key = self.key(id);

        let fields: Vec<String> = self
            .window
            .live_indices(from)
            .into_iter()
            .map(|index| index.to_string())
            .collect();

        let values = self
            .store
            .read_fields(&key, &fields)
            .await
            .inspect_err(|err| {
                tracing::error!(error = ?err, key = %key, "counter.histogram.error");
            })?;

        let histogram = fields
            .iter()
            .zip(values.into_iter().chain(std::iter::repeat(None)))
            .map(|(field, value)| match value {
                None => 0,
                Some(raw) => parse_count(&raw).unwrap_or_else(|| {
                    tracing::warn!(
                        key = %key,
                        field = %field,
                        value = %raw,
                        "counter.histogram.malformed_value"
                    );
                    0
                }),
            })
            .collect();

        Ok(histogram)
    } // end method histogram

    /// Total occurrences over the trailing period: the sum of [`Counter::histogram`].
    pub async fn count(&self, id: &str) -> Result<i64, RingrateError> {
        let histogram = self.histogram(id).await?;

        Ok(histogram
            .into_iter()
            .fold(0i64, |total, value| total.saturating_add(value)))
    }

    /// Delete all state for `id`. The next increment starts from an empty ring.
    pub async fn reset(&self, id: &str) -> Result<(), RingrateError> {
        let key = self.key(id);

        self.store
            .delete(&key)
            .await
            .inspect_err(|err| {
                tracing::error!(error = ?err, key = %key, "counter.reset.error");
            })?;

        tracing::debug!(key = %key, "counter.reset");

        Ok(())
    }
}
