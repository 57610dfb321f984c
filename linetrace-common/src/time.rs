//! Timestamp utilities
//!
//! All persisted timestamps are UTC instants. "Today" is always evaluated in
//! the configured operating timezone after conversion.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Default operating timezone for the plant
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Clock pinned to an instant, movable by tests
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.instant.lock().unwrap_or_else(|e| e.into_inner());
        *guard = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.instant.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Calendar date of an instant in the operating timezone
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Half-open UTC range `[start, end)` covering one local calendar day
pub fn local_day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_day_start(date, tz);
    let end = match date.succ_opt() {
        Some(next) => local_day_start(next, tz),
        None => start + Duration::days(1),
    };
    (start, end)
}

/// First existing local instant of `date`
///
/// Some zones (Sao Paulo until 2019) started daylight saving at midnight, so
/// local 00:00 may not exist. Walk forward until a valid local time is found.
fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut local = date.and_time(NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(instant) = tz.from_local_datetime(&local).earliest() {
            return instant.with_timezone(&Utc);
        }
        local += Duration::minutes(30);
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Compact UTC stamp used in evidence filenames (`YYYYMMDDTHHMMSSZ`)
pub fn compact_stamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 01:30 UTC is still the previous evening in Sao Paulo (UTC-3)
        let instant = Utc.with_ymd_and_hms(2026, 10, 15, 1, 30, 0).unwrap();
        assert_eq!(
            local_date(instant, DEFAULT_TIMEZONE),
            NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
        );
    }

    #[test]
    fn test_local_day_bounds_sao_paulo() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let (start, end) = local_day_bounds(date, DEFAULT_TIMEZONE);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 15, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_local_day_bounds_skip_missing_midnight() {
        // DST began at local midnight on 2018-11-04
        let date = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let (start, end) = local_day_bounds(date, DEFAULT_TIMEZONE);
        assert_eq!(start, Utc.with_ymd_and_hms(2018, 11, 4, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2018, 11, 5, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
    }

    #[test]
    fn test_compact_stamp_format() {
        let instant = Utc.with_ymd_and_hms(2026, 10, 15, 14, 5, 9).unwrap();
        assert_eq!(compact_stamp(instant), "20261015T140509Z");
    }
}
