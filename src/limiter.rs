use crate::{BucketStore, Counter, CounterOptions, RingrateError};

/// Configuration for [`Limiter`].
#[derive(Clone, Debug)]
pub struct LimiterOptions {
    /// Options for the owned counter.
    pub counter: CounterOptions,
    /// Occurrences allowed per period. A value `<= 0` means always exceeded.
    pub max: i64,
}

/// Rate limiter layered on a [`Counter`]: at most `max` occurrences per period.
///
/// The limiter owns its counter and forwards `inc`, `inc_by`, `histogram`, `count` and
/// `reset` to it unchanged. [`Limiter::remaining`] and [`Limiter::exceeded`] are derived
/// purely from [`Counter::count`].
///
/// Checking and incrementing are separate round trips, so concurrent callers can
/// overshoot `max` briefly. This is expected for an approximate window.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ringrate::{CounterOptions, Limiter, LimiterOptions, MemoryStore};
///
/// # futures::executor::block_on(async {
/// // 10 per 2s, releasing every 0.2s.
/// let limiter = Limiter::new(
///     MemoryStore::new(),
///     LimiterOptions {
///         counter: CounterOptions::new(Duration::from_secs(2), Duration::from_millis(200)),
///         max: 10,
///     },
/// )
/// .unwrap();
///
/// if !limiter.exceeded("pv-dashboard").await.unwrap() {
///     limiter.inc("pv-dashboard").await.unwrap();
/// }
///
/// assert_eq!(limiter.remaining("pv-dashboard").await.unwrap(), 9);
/// # });
/// ```
#[derive(Debug)]
pub struct Limiter<S> {
    counter: Counter<S>,
    max: i64,
}

impl<S: BucketStore> Limiter<S> {
    /// Create a limiter over `store`.
    pub fn new(store: S, options: LimiterOptions) -> Result<Self, RingrateError> {
        Ok(Self::from_counter(Counter::new(store, options.counter)?, options.max))
    }

    /// Wrap an existing counter.
    pub fn from_counter(counter: Counter<S>, max: i64) -> Self {
        Self { counter, max }
    }

    /// The owned counter.
    pub fn counter(&self) -> &Counter<S> {
        &self.counter
    }

    /// Threshold per period.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// See [`Counter::inc`].
    pub async fn inc(&self, id: &str) -> Result<(), RingrateError> {
        self.counter.inc(id).await
    }

    /// See [`Counter::inc_by`].
    pub async fn inc_by(&self, id: &str, delta: i64) -> Result<(), RingrateError> {
        self.counter.inc_by(id, delta).await
    }

    /// See [`Counter::histogram`].
    pub async fn histogram(&self, id: &str) -> Result<Vec<i64>, RingrateError> {
        self.counter.histogram(id).await
    }

    /// See [`Counter::count`].
    pub async fn count(&self, id: &str) -> Result<i64, RingrateError> {
        self.counter.count(id).await
    }

    /// See [`Counter::reset`].
    pub async fn reset(&self, id: &str) -> Result<(), RingrateError> {
        self.counter.reset(id).await
    }

    /// Occurrences left in the current window: `max - count`. May be negative.
    pub async fn remaining(&self, id: &str) -> Result<i64, RingrateError> {
        let occurrences = self.counter.count(id).await?;
        Ok(self.max.saturating_sub(occurrences))
    }

    /// Whether the limit is reached: `remaining <= 0`.
    pub async fn exceeded(&self, id: &str) -> Result<bool, RingrateError> {
        let remaining = self.remaining(id).await?;
        Ok(remaining <= 0)
    }
}
