//! Clock reading for GetSystemDateAndTime

use chrono::{DateTime, Datelike, Local, NaiveDateTime, Offset, TimeZone, Utc};

#[derive(Debug, Clone)]
pub struct ClockReading {
    pub utc: DateTime<Utc>,
    pub local: NaiveDateTime,
    /// POSIX-style zone string, sign inverted: UTC+2 reads `UTC-2`
    pub tz: String,
    pub daylight_savings: bool,
}

/// Current reading in the host's local zone
pub fn now() -> ClockReading {
    reading(&Local, Local::now())
}

pub fn reading<Tz: TimeZone>(zone: &Tz, now: DateTime<Tz>) -> ClockReading {
    let offset = now.offset().fix().local_minus_utc();
    ClockReading {
        utc: now.with_timezone(&Utc),
        local: now.naive_local(),
        tz: tz_string(offset),
        daylight_savings: dst_observed(zone, &now),
    }
}

/// `local_minus_utc` is in seconds east of UTC.
pub fn tz_string(local_minus_utc: i32) -> String {
    let sign = if local_minus_utc > 0 { '-' } else { '+' };
    let minutes = local_minus_utc.unsigned_abs() / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if minutes == 0 {
        format!("UTC{}{}", sign, hours)
    } else {
        format!("UTC{}{}:{:02}", sign, hours, minutes)
    }
}

fn dst_observed<Tz: TimeZone>(zone: &Tz, now: &DateTime<Tz>) -> bool {
    let year = now.year();
    let offset_on = |month| {
        zone.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .earliest()
            .map(|d| d.offset().fix().local_minus_utc())
    };
    match (offset_on(1), offset_on(7)) {
        (Some(jan), Some(jul)) => is_dst(now.offset().fix().local_minus_utc(), jan, jul),
        _ => false,
    }
}

/// Standard time is the smaller of the two yearly extremes.
fn is_dst(current: i32, january: i32, july: i32) -> bool {
    current > january.min(july)
}
