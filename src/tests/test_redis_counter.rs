use std::{env, sync::Arc, time::Duration};
use crate::clock::Clock;

use redis::AsyncCommands;

use super::support::{BASE, at_ms};
use crate::{
    Counter, CounterOptions, KeyPrefix, Limiter, ManualClock, RedisStore, RingrateError,
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> KeyPrefix {
    let n: u64 = rand::random();
    KeyPrefix::try_from(format!("ringrate_test:{n}")).unwrap()
}

async fn build_counter(
    url: &str,
    period_ms: u64,
    interval_ms: u64,
) -> (
    Counter<RedisStore>,
    redis::aio::ConnectionManager,
    ManualClock,
) {
    let client = redis::Client::open(url).unwrap();
    let cm = client.get_connection_manager().await.unwrap();
    let store = RedisStore::from_client(client, 2).await.unwrap();
    let clock = ManualClock::new(BASE);

    let counter = Counter::new(
        store,
        CounterOptions {
            prefix: Some(unique_prefix()),
            period: Duration::from_millis(period_ms),
            interval: Duration::from_millis(interval_ms),
            clock: Some(Arc::new(clock.clone())),
        },
    )
    .unwrap();

    (counter, cm, clock)
}

#[test]
fn zero_connection_count_is_rejected() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let client = redis::Client::open("redis://127.0.0.1:6379/").unwrap();
        let err = RedisStore::from_client(client, 0).await.unwrap_err();
        assert!(matches!(err, RingrateError::InvalidConnectionCount(_)));
    });
}

#[test]
fn histogram_reflects_only_the_trailing_period() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, _cm, clock) = build_counter(&url, 5_000, 500).await;
        let id = "pv-home";

        for second in 1..=4 {
            clock.set(at_ms(second * 1_000));
            counter.inc(id).await.unwrap();
        }

        clock.set(at_ms(4_500));
        assert_eq!(
            counter.histogram(id).await.unwrap(),
            vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 0]
        );
        assert_eq!(counter.count(id).await.unwrap(), 4);

        for second in 5..=10 {
            clock.set(at_ms(second * 1_000));
            counter.inc(id).await.unwrap();
        }

        clock.set(at_ms(10_500));
        assert_eq!(
            counter.histogram(id).await.unwrap(),
            vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]
        );
        assert_eq!(counter.count(id).await.unwrap(), 5);

        counter.reset(id).await.unwrap();
    });
}

#[test]
fn inc_evicts_stale_half_and_sets_pexpire() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, mut cm, clock) = build_counter(&url, 1_000, 250).await;
        let id = "k";
        let key = counter.key(id);

        clock.set(at_ms(0)); // bucket 0
        counter.inc(id).await.unwrap();
        counter.inc(id).await.unwrap();

        let value: Option<String> = cm.hget(&key, "0").await.unwrap();
        assert_eq!(value.as_deref(), Some("2"));

        let pttl: i64 = cm.pttl(&key).await.unwrap();
        assert!(pttl > 0 && pttl <= 1_000, "pttl = {pttl}");

        clock.set(at_ms(1_000)); // bucket 4, stale half 5, 6, 7, 0
        counter.inc(id).await.unwrap();

        let value: Option<String> = cm.hget(&key, "0").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(counter.histogram(id).await.unwrap(), vec![1, 0, 0, 0]);

        counter.reset(id).await.unwrap();
        let exists: bool = cm.exists(&key).await.unwrap();
        assert!(!exists);
    });
}

#[test]
fn malformed_values_are_coerced_and_overwritten() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, mut cm, clock) = build_counter(&url, 1_000, 250).await;
        let id = "k";
        let key = counter.key(id);

        clock.set(at_ms(250)); // bucket 1
        let _: () = cm.hset(&key, "1", "garbage").await.unwrap();
        let _: () = cm.hset(&key, "0", "1.5").await.unwrap();

        assert_eq!(counter.count(id).await.unwrap(), 0);

        counter.inc(id).await.unwrap();
        let value: Option<String> = cm.hget(&key, "1").await.unwrap();
        assert_eq!(value.as_deref(), Some("1"));
        assert_eq!(counter.histogram(id).await.unwrap(), vec![1, 0, 0, 0]);

        counter.reset(id).await.unwrap();
    });
}

#[test]
fn non_canonical_integers_are_overwritten_like_the_memory_store() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, mut cm, clock) = build_counter(&url, 1_000, 250).await;
        let id = "k";
        let key = counter.key(id);

        clock.set(at_ms(250)); // bucket 1

        for raw in ["007", "-0", "99999999999999999999"] {
            let _: () = cm.hset(&key, "1", raw).await.unwrap();
            assert_eq!(counter.count(id).await.unwrap(), 0, "{raw:?}");

            counter.inc_by(id, 2).await.unwrap();
            let value: Option<String> = cm.hget(&key, "1").await.unwrap();
            assert_eq!(value.as_deref(), Some("2"), "{raw:?}");
        }

        let _: () = cm.hset(&key, "1", i64::MAX).await.unwrap();
        let err = counter.inc(id).await.unwrap_err();
        assert!(matches!(err, RingrateError::Redis(_)));

        let value: Option<String> = cm.hget(&key, "1").await.unwrap();
        assert_eq!(value, Some(i64::MAX.to_string()));

        counter.reset(id).await.unwrap();
    });
}

#[test]
fn inc_evicts_a_stale_half_larger_than_one_lua_unpack() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        // 1h / 100ms => 72000 buckets, 36000 of them stale on every increment
        let (counter, mut cm, clock) = build_counter(&url, 3_600_000, 100).await;
        let id = "k";
        let key = counter.key(id);
        let bucket_count = counter.window().bucket_count();

        clock.set(at_ms(0));
        let from = counter.window().hash(clock.now());
        let previous = (from + bucket_count - 1) % bucket_count;
        let stale: Vec<String> = [1, 999, 1_000, 1_001, 8_001, 36_000]
            .into_iter()
            .map(|offset| ((from + offset) % bucket_count).to_string())
            .collect();

        let _: () = cm.hset(&key, previous.to_string(), 5).await.unwrap();
        for field in &stale {
            let _: () = cm.hset(&key, field, 9).await.unwrap();
        }

        counter.inc(id).await.unwrap();

        for field in &stale {
            let value: Option<String> = cm.hget(&key, field).await.unwrap();
            assert_eq!(value, None, "field {field}");
        }

        let histogram = counter.histogram(id).await.unwrap();
        assert_eq!(histogram.len(), 36_000);
        assert_eq!(&histogram[..2], &[1, 5]);
        assert_eq!(counter.count(id).await.unwrap(), 6);

        let pttl: i64 = cm.pttl(&key).await.unwrap();
        assert!(pttl > 0 && pttl <= 3_600_000, "pttl = {pttl}");

        counter.reset(id).await.unwrap();
    });
}

#[test]
fn concurrent_increments_from_many_tasks_are_not_lost() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, _cm, clock) = build_counter(&url, 60_000, 1_000).await;
        clock.set(at_ms(30_400));
        let counter = Arc::new(counter);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        counter.inc("hot").await.unwrap();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counter.count("hot").await.unwrap(), 400);
        counter.reset("hot").await.unwrap();
    });
}

#[test]
fn limiter_over_redis_tracks_remaining() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (counter, _cm, clock) = build_counter(&url, 2_000, 200).await;
        let limiter = Limiter::from_counter(counter, 3);
        let id = "k";

        clock.set(at_ms(200));
        for expected in [2, 1, 0] {
            limiter.inc(id).await.unwrap();
            assert_eq!(limiter.remaining(id).await.unwrap(), expected);
        }
        assert!(limiter.exceeded(id).await.unwrap());

        clock.set(at_ms(2_200));
        assert_eq!(limiter.remaining(id).await.unwrap(), 3);
        assert!(!limiter.exceeded(id).await.unwrap());

        limiter.reset(id).await.unwrap();
    });
}
