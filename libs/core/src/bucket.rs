//! Time-bucket labels for throttle windows.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::types::TimeBucket;

/// Label used for the unbounded bucket.
pub const FOREVER_BUCKET: &str = "forever_bucket";

/// Time source consulted by the bucket calculator. Injectable so tests can
/// pin the clock.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time source used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Fixed time source for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}

/// Computes the storage label for `bucket` at the clock's current UTC time.
///
/// Windowed buckets floor the minute to the window size, inclusive on the
/// lower boundary: at `10:20:00.000` the five-minute label is `…_10:20`, at
/// `10:19:59.999` it is `…_10:15`.
pub fn bucket_label(bucket: TimeBucket, clock: &dyn Clock) -> String {
    let window: u8 = match bucket {
        TimeBucket::Forever => return FOREVER_BUCKET.to_string(),
        TimeBucket::FiveMinutes => 5,
        TimeBucket::ThirtyMinutes => 30,
    };
    let now = clock.now_utc();
    let minute = now.minute() - now.minute() % window;
    format!(
        "{:04}-{:02}-{:02}_{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        minute
    )
}
