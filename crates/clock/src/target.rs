//! Daily anchor and per-shift target computation.

use chrono::{DateTime, FixedOffset, Local, NaiveTime, Offset, TimeDelta, Utc};

/// Offset of the remote service's timezone (UTC+8, no DST).
pub const SERVICE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Hour of the UTC day at which the daily anchor falls.
const ANCHOR_UTC_HOUR: i64 = 16;

/// Timezone the remote service keeps its daily boundary in.
#[must_use]
pub fn service_timezone() -> FixedOffset {
    FixedOffset::east_opt(SERVICE_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Next trigger instant for a shift, in service-local time.
///
/// The anchor is 16:00:00.000 UTC of the current UTC day, moved one day
/// forward unless strictly in the future. The shift is subtracted from it.
#[must_use]
pub fn compute_next_target(now: DateTime<Utc>, shift_ms: i32) -> DateTime<FixedOffset> {
    let mut anchor =
        now.date_naive().and_time(NaiveTime::default()).and_utc() + TimeDelta::hours(ANCHOR_UTC_HOUR);
    if anchor <= now {
        anchor += TimeDelta::days(1);
    }

    (anchor - TimeDelta::milliseconds(i64::from(shift_ms))).with_timezone(&service_timezone())
}

/// An instant in the three references shown to operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeTriple {
    /// Caller's local timezone.
    pub local: DateTime<Local>,

    /// Service timezone.
    pub service_local: DateTime<FixedOffset>,

    /// UTC.
    pub utc: DateTime<Utc>,
}

impl From<DateTime<Utc>> for TimeTriple {
    fn from(utc: DateTime<Utc>) -> Self {
        Self {
            local: utc.with_timezone(&Local),
            service_local: utc.with_timezone(&service_timezone()),
            utc,
        }
    }
}

impl From<DateTime<FixedOffset>> for TimeTriple {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::from(value.with_timezone(&Utc))
    }
}
