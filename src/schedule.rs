//! Normalization of local wake/sleep times into seconds-since-midnight UTC.
//!
//! Wake time, sleep time and the current instant must all be framed by the
//! same conversion so the batch sleep query compares like with like.

use thiserror::Error;
use time::macros::format_description;
use time::Time;

use crate::clock::seconds_since_midnight;

pub const SECONDS_PER_DAY: i32 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid local time of day: {value:?}")]
pub struct TimeOfDayError {
    value: String,
}

/// Parse a local `HH:MM` time of day. A trailing `:SS` is tolerated.
pub fn parse_local_time(value: &str) -> Result<Time, TimeOfDayError> {
    let hm = format_description!("[hour]:[minute]");
    let hms = format_description!("[hour]:[minute]:[second]");
    Time::parse(value, hm)
        .or_else(|_| Time::parse(value, hms))
        .map_err(|_| TimeOfDayError {
            value: value.to_string(),
        })
}

/// Convert a local time of day plus a whole-hour UTC offset into seconds
/// since midnight UTC, always in `[0, 86400)`. An instant landing exactly on
/// a day boundary normalizes to `0`.
pub fn to_utc_seconds_since_midnight(
    local: &str,
    utc_offset_hours: i32,
) -> Result<i32, TimeOfDayError> {
    let t = parse_local_time(local)?;
    Ok((seconds_since_midnight(t) - utc_offset_hours * 3600).rem_euclid(SECONDS_PER_DAY))
}

/// The documented sleep-window test: a user is asleep while the current
/// seconds-since-midnight sits at or before their sleep threshold, or at or
/// after their wake threshold. The window is allowed to wrap past midnight.
pub fn in_sleep_window(now_secs: i32, wake_secs: i32, sleep_secs: i32) -> bool {
    now_secs <= sleep_secs || now_secs >= wake_secs
}
