use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    BucketStore, Counter, CounterOptions, IncrementCommit, KeyPrefix, Limiter, LimiterOptions,
    ManualClock, MemoryStore, RingrateError,
};

/// Start of a ring epoch for every window used in these tests (1000s divides evenly by
/// each interval times its bucket count).
pub(super) const BASE: Duration = Duration::from_secs(1_000);

pub(super) fn at_ms(ms: u64) -> Duration {
    BASE + Duration::from_millis(ms)
}

pub(super) fn options(period_ms: u64, interval_ms: u64, clock: &ManualClock) -> CounterOptions {
    CounterOptions {
        prefix: Some(KeyPrefix::try_from("test:count").unwrap()),
        period: Duration::from_millis(period_ms),
        interval: Duration::from_millis(interval_ms),
        clock: Some(Arc::new(clock.clone())),
    }
}

pub(super) fn counter(
    period_ms: u64,
    interval_ms: u64,
) -> (Counter<MemoryStore>, MemoryStore, ManualClock) {
    let store = MemoryStore::new();
    let clock = ManualClock::new(BASE);
    let counter = Counter::new(store.clone(), options(period_ms, interval_ms, &clock)).unwrap();

    (counter, store, clock)
}

pub(super) fn limiter(
    period_ms: u64,
    interval_ms: u64,
    max: i64,
) -> (Limiter<MemoryStore>, MemoryStore, ManualClock) {
    let store = MemoryStore::new();
    let clock = ManualClock::new(BASE);
    let limiter = Limiter::new(
        store.clone(),
        LimiterOptions {
            counter: options(period_ms, interval_ms, &clock),
            max,
        },
    )
    .unwrap();

    (limiter, store, clock)
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub(super) struct UnavailableStore;

#[async_trait]
impl BucketStore for UnavailableStore {
    async fn commit_increment(&self, _commit: &IncrementCommit) -> Result<i64, RingrateError> {
        Err(RingrateError::Store("connection refused".to_string()))
    }

    async fn read_fields(
        &self,
        _key: &str,
        _fields: &[String],
    ) -> Result<Vec<Option<String>>, RingrateError> {
        Err(RingrateError::Store("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), RingrateError> {
        Err(RingrateError::NotFound)
    }
}
