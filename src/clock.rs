use time::{OffsetDateTime, Time, UtcOffset};

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to a single instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Midnight UTC of the calendar day containing `now`.
pub fn start_of_day_utc(now: OffsetDateTime) -> OffsetDateTime {
    now.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Seconds elapsed since midnight for a time-of-day.
pub fn seconds_since_midnight(t: Time) -> i32 {
    t.hour() as i32 * 3600 + t.minute() as i32 * 60 + t.second() as i32
}
