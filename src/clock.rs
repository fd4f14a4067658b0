//! Time sources for bucket hashing.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Wall-clock abstraction so bucket hashing can be driven deterministically in tests.
///
/// Every process sharing a store must hash to the same slot for the same instant, so
/// implementations report time since the UNIX epoch rather than a process-local anchor.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Time elapsed since the UNIX epoch.
    fn now(&self) -> Duration;
}

/// Clock backed by [`SystemTime::now`].
///
/// A system clock set before the epoch reads as zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same reading, so a test can hold one handle while a counter holds
/// another.
///
/// ```
/// use std::time::Duration;
/// use ringrate::{Clock, ManualClock};
///
/// let clock = ManualClock::new(Duration::from_secs(1_000));
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), Duration::from_millis(1_000_250));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start` since the epoch.
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(to_nanos(start))),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: Duration) {
        self.nanos.store(to_nanos(now), Ordering::SeqCst);
    }

    /// Move the clock forward by `by`, stopping at the largest representable reading.
    pub fn advance(&self, by: Duration) {
        let by = to_nanos(by);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(by))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
