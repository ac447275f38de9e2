//! Active window evaluation
//!
//! The window is the half-open hour range `[start_hour, end_hour)` on the
//! target timezone's local clock. Minutes and seconds are ignored, and a
//! window with `start_hour >= end_hour` (e.g. 22 to 6) is never active:
//! wraparound past midnight is not supported.

use chrono::{DateTime, TimeZone, Timelike};

/// Check whether `hour` lies in `[start_hour, end_hour)`
pub fn is_hour_active(hour: u32, start_hour: u32, end_hour: u32) -> bool {
    hour >= start_hour && hour < end_hour
}

/// Check whether an already-localized timestamp lies inside the window
///
/// No timezone conversion happens here; the hour is read in whatever offset
/// `now` carries, which is the offset reported by the time source.
pub fn is_within_active_window<Tz: TimeZone>(
    now: &DateTime<Tz>,
    start_hour: u32,
    end_hour: u32,
) -> bool {
    is_hour_active(now.hour(), start_hour, end_hour)
}
