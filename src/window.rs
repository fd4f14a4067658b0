//! Window configuration and the bucket ring arithmetic.
//!
//! A [`Window`] splits time into buckets of width `interval` and maps them onto a ring of
//! `2 * period / interval` slots. At any instant half of the ring is *live* (the slots
//! covering the trailing period) and the other half is *stale* (the slots that will be
//! reused next, and therefore must be cleared before they are written again).

use std::time::Duration;

use crate::RingrateError;

/// Validated `{period, interval}` pair and the ring it derives.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ringrate::Window;
///
/// let window = Window::new(Duration::from_secs(5), Duration::from_millis(500)).unwrap();
/// assert_eq!(window.bucket_count(), 20);
/// assert_eq!(window.live_len(), 10);
///
/// // 4.5s after the epoch falls into bucket 9.
/// assert_eq!(window.hash(Duration::from_millis(4_500)), 9);
/// assert_eq!(window.live_indices(1), vec![1, 0, 19, 18, 17, 16, 15, 14, 13, 12]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    period: Duration,
    interval: Duration,
    bucket_count: u32,
}

impl Window {
    /// Build a window, rejecting configurations whose bucket semantics would not be exact.
    ///
    /// Fails with [`RingrateError::InvalidWindow`] when either duration is zero, when
    /// `interval` does not evenly divide `period`, or when the ring would not fit in `u32`.
    pub fn new(period: Duration, interval: Duration) -> Result<Self, RingrateError> {
        if period.is_zero() {
            return Err(RingrateError::InvalidWindow(
                "period must be greater than 0".to_string(),
            ));
        }

        if interval.is_zero() {
            return Err(RingrateError::InvalidWindow(
                "interval must be greater than 0".to_string(),
            ));
        }

        if interval > period {
            return Err(RingrateError::InvalidWindow(format!(
                "interval ({interval:?}) must not be longer than period ({period:?})"
            )));
        }

        let period_ns = period.as_nanos();
        let interval_ns = interval.as_nanos();

        if period_ns % interval_ns != 0 {
            return Err(RingrateError::InvalidWindow(format!(
                "interval ({interval:?}) must evenly divide period ({period:?})"
            )));
        }

        let bucket_count = (period_ns / interval_ns)
            .checked_mul(2)
            .and_then(|count| u32::try_from(count).ok())
            .ok_or_else(|| {
                RingrateError::InvalidWindow(format!(
                    "too many buckets for period {period:?} and interval {interval:?}"
                ))
            })?;

        Ok(Self {
            period,
            interval,
            bucket_count,
        })
    }

    /// Trailing period covered by the live half of the ring.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Width of a single bucket.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of slots in the ring, always a positive even number.
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Number of live slots, `bucket_count / 2`.
    pub fn live_len(&self) -> u32 {
        self.bucket_count / 2
    }

    /// Map a timestamp (time since the UNIX epoch) to its slot:
    /// `floor(timestamp / interval) mod bucket_count`.
    pub fn hash(&self, timestamp: Duration) -> u32 {
        let slot =
            (timestamp.as_nanos() / self.interval.as_nanos()) % u128::from(self.bucket_count);
        u32::try_from(slot).unwrap_or_default()
    }

    /// Live slots relative to `from`, most recent first:
    /// `from, from - 1, ..., from - (live_len - 1)`, each modulo `bucket_count`.
    pub fn live_indices(&self, from: u32) -> Vec<u32> {
        let count = u64::from(self.bucket_count);
        let from = u64::from(from) % count;

        (0..u64::from(self.live_len()))
            .map(|offset| ((count + from - offset) % count) as u32)
            .collect()
    }

    /// Stale slots relative to `from`: `from + 1, ..., from + live_len`, each modulo
    /// `bucket_count`. These are the slots cleared by every increment.
    pub fn stale_indices(&self, from: u32) -> Vec<u32> {
        let count = u64::from(self.bucket_count);
        let from = u64::from(from) % count;

        (1..=u64::from(self.live_len()))
            .map(|offset| ((from + offset) % count) as u32)
            .collect()
    }
}
