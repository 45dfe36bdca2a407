//! Europe/Madrid time handling.
//!
//! Daily content rows are keyed by the parish-local date and calendar
//! events render in local time, but the rest of the pipeline works in
//! UTC. Madrid follows the EU rule: UTC+1, switching to UTC+2 between
//! 01:00 UTC on the last Sunday of March and 01:00 UTC on the last
//! Sunday of October.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};

/// UTC instant of the last Sunday of `month` at 01:00.
fn last_sunday_at_one(year: i32, month: u32) -> DateTime<Utc> {
    // Walk back from the last day of the month.
    let last_day = NaiveDate::from_ymd_opt(year, month + 1, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("valid date"))
        .pred_opt()
        .expect("valid date");
    let mut day = last_day;
    while day.weekday() != Weekday::Sun {
        day = day.pred_opt().expect("valid date");
    }
    Utc.from_utc_datetime(&day.and_hms_opt(1, 0, 0).expect("valid time"))
}

/// Offset in effect in Madrid at a given UTC instant.
pub fn madrid_offset(at: DateTime<Utc>) -> FixedOffset {
    let year = at.year();
    let dst_start = last_sunday_at_one(year, 3);
    let dst_end = last_sunday_at_one(year, 10);
    let hours = if at >= dst_start && at < dst_end { 2 } else { 1 };
    FixedOffset::east_opt(hours * 3600).expect("valid offset")
}

/// A UTC instant expressed in Madrid local time.
pub fn to_madrid(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&madrid_offset(at))
}

/// Today's date in Madrid, formatted `YYYY-MM-DD`. This is the key for
/// the one-row-per-date daily content tables.
pub fn today_madrid() -> String {
    to_madrid(Utc::now()).format("%Y-%m-%d").to_string()
}

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Long-form Spanish date in Madrid time: `lunes, 3 de marzo de 2025`.
pub fn format_long_es(at: DateTime<Utc>) -> String {
    let local = to_madrid(at);
    let weekday = WEEKDAYS_ES[local.weekday().num_days_from_monday() as usize];
    let month = MONTHS_ES[(local.month() - 1) as usize];
    format!(
        "{}, {} de {} de {}",
        weekday,
        local.day(),
        month,
        local.year()
    )
}

/// `HH:MM` in Madrid time.
pub fn format_time_es(at: DateTime<Utc>) -> String {
    to_madrid(at).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn winter_is_utc_plus_one() {
        assert_eq!(madrid_offset(utc(2025, 1, 15, 12, 0)).local_minus_utc(), 3600);
    }

    #[test]
    fn summer_is_utc_plus_two() {
        assert_eq!(madrid_offset(utc(2025, 7, 15, 12, 0)).local_minus_utc(), 7200);
    }

    #[test]
    fn dst_boundary_2025() {
        // 2025: DST starts Mar 30 01:00 UTC, ends Oct 26 01:00 UTC.
        assert_eq!(madrid_offset(utc(2025, 3, 30, 0, 59)).local_minus_utc(), 3600);
        assert_eq!(madrid_offset(utc(2025, 3, 30, 1, 0)).local_minus_utc(), 7200);
        assert_eq!(madrid_offset(utc(2025, 10, 26, 0, 59)).local_minus_utc(), 7200);
        assert_eq!(madrid_offset(utc(2025, 10, 26, 1, 0)).local_minus_utc(), 3600);
    }

    #[test]
    fn long_spanish_format() {
        // 2025-03-03 is a Monday.
        assert_eq!(
            format_long_es(utc(2025, 3, 3, 12, 0)),
            "lunes, 3 de marzo de 2025"
        );
    }

    #[test]
    fn time_crosses_midnight_into_local_date() {
        // 23:30 UTC in summer is 01:30 next day in Madrid.
        assert_eq!(format_time_es(utc(2025, 7, 1, 23, 30)), "01:30");
    }
}
