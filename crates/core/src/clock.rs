//! Interval clock: maps wall-clock time onto fixed-width buckets counted from
//! a daily session anchor.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Bucket boundaries for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buckets {
    /// Start of the bucket containing `now`; `None` before the daily anchor.
    pub current: Option<NaiveDateTime>,
    /// Start of the following bucket.
    pub next: NaiveDateTime,
}

/// Fixed-width bucket clock anchored at a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalClock {
    width: Duration,
    anchor: NaiveTime,
}

impl IntervalClock {
    /// Creates a clock with buckets `width_minutes` wide starting at `anchor`.
    ///
    /// # Errors
    /// Returns an error if the width is zero.
    pub fn new(width_minutes: u32, anchor: NaiveTime) -> anyhow::Result<Self> {
        if width_minutes == 0 {
            anyhow::bail!("Interval width must be at least one minute");
        }
        Ok(Self {
            width: Duration::minutes(i64::from(width_minutes)),
            anchor,
        })
    }

    #[must_use]
    pub const fn width(&self) -> Duration {
        self.width
    }

    #[must_use]
    pub const fn anchor(&self) -> NaiveTime {
        self.anchor
    }

    /// Buckets for `now`, both expressed in the same local frame as `now`.
    #[must_use]
    pub fn buckets(&self, now: NaiveDateTime) -> Buckets {
        let anchor = now.date().and_time(self.anchor);
        if now < anchor {
            return Buckets {
                current: None,
                next: anchor,
            };
        }

        let width_ms = self.width.num_milliseconds();
        let elapsed_ms = (now - anchor).num_milliseconds();
        let current = anchor + Duration::milliseconds(elapsed_ms.div_euclid(width_ms) * width_ms);

        Buckets {
            current: Some(current),
            next: current + self.width,
        }
    }

    /// Start of the bucket containing `now`.
    #[must_use]
    pub fn current_bucket(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.buckets(now).current
    }

    /// Start of the bucket after the one containing `now`.
    #[must_use]
    pub fn next_bucket(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.buckets(now).next
    }
}

/// Source of exchange-local wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in a fixed exchange timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    #[must_use]
    pub const fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        local_now(self.timezone)
    }
}

/// Converts a UTC instant into exchange-local wall time.
#[must_use]
pub fn local_time(now: DateTime<Utc>, timezone: Tz) -> NaiveDateTime {
    now.with_timezone(&timezone).naive_local()
}

/// Current exchange-local wall time.
#[must_use]
pub fn local_now(timezone: Tz) -> NaiveDateTime {
    local_time(Utc::now(), timezone)
}

/// Time left until `target`, zero if it has already passed.
#[must_use]
pub fn until(target: NaiveDateTime, now: NaiveDateTime) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}
