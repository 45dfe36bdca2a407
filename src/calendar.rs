//! Parish calendar: ICS feed client, recurrence expansion, and filters.
//!
//! The parish publishes a public Google Calendar ICS feed. Google only
//! lists each recurring VEVENT once with its RRULE, so occurrences are
//! expanded here within a bounded window (one month back, one year
//! ahead). Parsed events are cached in memory with a short TTL to keep
//! request latency off the feed host; `refresh=true` invalidates.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CalendarConfig;
use crate::models::CalendarEvent;
use crate::tz;

/// Hard cap on occurrences expanded per recurring event.
const MAX_OCCURRENCES: usize = 500;

// ============ ICS parsing ============

/// One VEVENT before expansion.
#[derive(Debug, Clone)]
struct RawEvent {
    uid: String,
    summary: Option<String>,
    location: Option<String>,
    description: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    all_day: bool,
    rrule: Option<Rrule>,
}

#[derive(Debug, Clone, PartialEq)]
struct Rrule {
    freq: Freq,
    interval: u32,
    count: Option<u32>,
    until: Option<DateTime<Utc>>,
    by_day: Vec<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Freq {
    Daily,
    Weekly,
}

/// Unfold RFC 5545 folded lines: a line starting with space or tab
/// continues the previous one.
fn unfold_lines(ics: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in ics.lines() {
        let line = raw.trim_end_matches('\r');
        if let Some(stripped) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = out.last_mut() {
                last.push_str(stripped);
                continue;
            }
        }
        out.push(line.to_string());
    }
    out
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') | Some('N') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `DTSTART;VALUE=DATE:20250301` into (name, params, value).
fn split_property(line: &str) -> Option<(String, Vec<String>, String)> {
    let colon = line.find(':')?;
    let (lhs, value) = line.split_at(colon);
    let value = &value[1..];
    let mut parts = lhs.split(';');
    let name = parts.next()?.to_uppercase();
    let params = parts.map(|p| p.to_uppercase()).collect();
    Some((name, params, value.to_string()))
}

/// Parse an ICS date or date-time value. Naive local times are read as
/// Madrid wall-clock. Returns (instant, all_day).
fn parse_ics_datetime(value: &str, params: &[String]) -> Result<(DateTime<Utc>, bool)> {
    let is_date_only = params.iter().any(|p| p == "VALUE=DATE") || value.len() == 8;

    if is_date_only {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .with_context(|| format!("invalid ICS date: {}", value))?;
        let naive = date.and_hms_opt(0, 0, 0).expect("valid time");
        // Midnight local — resolve the offset from midday to dodge the
        // DST switch hour.
        let midday = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"));
        let offset = tz::madrid_offset(midday);
        let local = offset
            .from_local_datetime(&naive)
            .single()
            .unwrap_or_else(|| offset.from_utc_datetime(&naive));
        return Ok((local.with_timezone(&Utc), true));
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = chrono::NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
            .with_context(|| format!("invalid ICS datetime: {}", value))?;
        return Ok((Utc.from_utc_datetime(&naive), false));
    }

    let naive = chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .with_context(|| format!("invalid ICS datetime: {}", value))?;
    let midday = Utc.from_utc_datetime(&naive.date().and_hms_opt(12, 0, 0).expect("valid time"));
    let offset = tz::madrid_offset(midday);
    let local = offset
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&naive));
    Ok((local.with_timezone(&Utc), false))
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_rrule(value: &str) -> Option<Rrule> {
    let mut freq = None;
    let mut interval = 1u32;
    let mut count = None;
    let mut until = None;
    let mut by_day = Vec::new();

    for part in value.split(';') {
        let mut kv = part.splitn(2, '=');
        let key = kv.next()?.to_uppercase();
        let val = kv.next().unwrap_or_default();
        match key.as_str() {
            "FREQ" => {
                freq = match val.to_uppercase().as_str() {
                    "DAILY" => Some(Freq::Daily),
                    "WEEKLY" => Some(Freq::Weekly),
                    // MONTHLY/YEARLY feeds are rare for parish
                    // activities; those events fall back to their
                    // first occurrence.
                    _ => None,
                };
            }
            "INTERVAL" => interval = val.parse().unwrap_or(1),
            "COUNT" => count = val.parse().ok(),
            "UNTIL" => {
                until = parse_ics_datetime(val, &[]).ok().map(|(dt, _)| dt);
            }
            "BYDAY" => {
                by_day = val.split(',').filter_map(parse_weekday).collect();
            }
            _ => {}
        }
    }

    freq.map(|freq| Rrule {
        freq,
        interval: interval.max(1),
        count,
        until,
        by_day,
    })
}

/// Parse all VEVENTs out of an ICS feed. Events that fail to parse are
/// skipped, not fatal — one malformed entry must not blank the parish
/// calendar.
fn parse_ics(ics: &str) -> Vec<RawEvent> {
    let lines = unfold_lines(ics);
    let mut events = Vec::new();
    let mut current: Option<HashMap<String, (Vec<String>, String)>> = None;

    for line in lines {
        if line == "BEGIN:VEVENT" {
            current = Some(HashMap::new());
            continue;
        }
        if line == "END:VEVENT" {
            if let Some(props) = current.take() {
                match build_event(&props) {
                    Ok(ev) => events.push(ev),
                    Err(e) => debug!("skipping malformed VEVENT: {}", e),
                }
            }
            continue;
        }
        if let Some(ref mut props) = current {
            if let Some((name, params, value)) = split_property(&line) {
                props.insert(name, (params, value));
            }
        }
    }

    events
}

fn build_event(props: &HashMap<String, (Vec<String>, String)>) -> Result<RawEvent> {
    let (start_params, start_value) = props
        .get("DTSTART")
        .ok_or_else(|| anyhow::anyhow!("VEVENT without DTSTART"))?;
    let (start, all_day) = parse_ics_datetime(start_value, start_params)?;

    let end = match props.get("DTEND") {
        Some((params, value)) => parse_ics_datetime(value, params)?.0,
        None if all_day => start + Duration::days(1),
        None => start + Duration::hours(1),
    };

    let uid = props
        .get("UID")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| format!("event-{}", start.timestamp()));

    let text = |key: &str| {
        props
            .get(key)
            .map(|(_, v)| unescape_text(v))
            .filter(|v| !v.is_empty())
    };

    Ok(RawEvent {
        uid,
        summary: text("SUMMARY"),
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        start,
        end,
        all_day,
        rrule: props.get("RRULE").and_then(|(_, v)| parse_rrule(v)),
    })
}

// ============ Recurrence expansion ============

/// Expand a feed's raw events into concrete occurrences within
/// [range_start, range_end]. Occurrence ids are `uid_timestamp` so each
/// instance of a weekly activity is distinct.
fn expand_events(
    raw: Vec<RawEvent>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    let mut out = Vec::new();

    for event in raw {
        match event.rrule.clone() {
            None => {
                if event.end >= range_start && event.start <= range_end {
                    out.push(to_calendar_event(&event, event.start, event.end, false));
                }
            }
            Some(rule) => {
                let duration = event.end - event.start;
                let mut emitted = 0usize;
                for start in occurrences(&event, &rule, range_end) {
                    if emitted >= MAX_OCCURRENCES {
                        break;
                    }
                    if start > range_end {
                        break;
                    }
                    let end = start + duration;
                    if end < range_start {
                        emitted += 1;
                        continue;
                    }
                    out.push(to_calendar_event(&event, start, end, true));
                    emitted += 1;
                }
            }
        }
    }

    out.sort_by(|a, b| a.start.cmp(&b.start));
    out
}

/// Occurrence starts for a recurring event, in order, honoring
/// INTERVAL, COUNT, UNTIL, and (for WEEKLY) BYDAY.
fn occurrences(
    event: &RawEvent,
    rule: &Rrule,
    hard_end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut starts = Vec::new();
    let mut produced = 0u32;

    match rule.freq {
        Freq::Daily => {
            let mut current = event.start;
            loop {
                if let Some(count) = rule.count {
                    if produced >= count {
                        break;
                    }
                }
                if let Some(until) = rule.until {
                    if current > until {
                        break;
                    }
                }
                if current > hard_end || starts.len() >= MAX_OCCURRENCES {
                    break;
                }
                starts.push(current);
                produced += 1;
                current += Duration::days(rule.interval as i64);
            }
        }
        Freq::Weekly => {
            let days = if rule.by_day.is_empty() {
                vec![event.start.weekday()]
            } else {
                rule.by_day.clone()
            };

            // Walk week by week from the event's start, emitting the
            // listed weekdays within each week.
            let week_anchor = event.start
                - Duration::days(event.start.weekday().num_days_from_monday() as i64);
            let mut week = 0i64;
            'outer: loop {
                let base = week_anchor + Duration::weeks(week * rule.interval as i64);
                if base > hard_end + Duration::weeks(1) {
                    break;
                }
                let mut day_offsets: Vec<i64> = days
                    .iter()
                    .map(|d| d.num_days_from_monday() as i64)
                    .collect();
                day_offsets.sort_unstable();
                for offset in day_offsets {
                    let current = base + Duration::days(offset);
                    if current < event.start {
                        continue;
                    }
                    if let Some(count) = rule.count {
                        if produced >= count {
                            break 'outer;
                        }
                    }
                    if let Some(until) = rule.until {
                        if current > until {
                            break 'outer;
                        }
                    }
                    if current > hard_end || starts.len() >= MAX_OCCURRENCES {
                        break 'outer;
                    }
                    starts.push(current);
                    produced += 1;
                }
                week += 1;
            }
        }
    }

    starts
}

fn to_calendar_event(
    event: &RawEvent,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    occurrence: bool,
) -> CalendarEvent {
    let id = if occurrence {
        format!("{}_{}", event.uid, start.timestamp_millis())
    } else {
        event.uid.clone()
    };
    CalendarEvent {
        id,
        title: event
            .summary
            .clone()
            .unwrap_or_else(|| "Sin título".to_string()),
        start: start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        end: end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        location: event.location.clone(),
        description: event.description.clone(),
        all_day: event.all_day,
    }
}

// ============ Timeframe filters ============

#[derive(Debug, Clone, PartialEq)]
pub enum Timeframe {
    Upcoming,
    Today,
    Tomorrow,
    Week,
    Weekend,
    NextWeek,
    Month(NaiveDate),
}

impl Timeframe {
    pub fn parse(name: &str, date: Option<&str>) -> Result<Self> {
        match name {
            "upcoming" => Ok(Self::Upcoming),
            "today" => Ok(Self::Today),
            "tomorrow" => Ok(Self::Tomorrow),
            "week" => Ok(Self::Week),
            "weekend" => Ok(Self::Weekend),
            "next_week" => Ok(Self::NextWeek),
            "month" => {
                let d = date.ok_or_else(|| anyhow::anyhow!("month filter requires a date"))?;
                let parsed = NaiveDate::parse_from_str(&format!("{}-01", &d[..7.min(d.len())]), "%Y-%m-%d")
                    .or_else(|_| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
                    .with_context(|| format!("invalid month date: {}", d))?;
                Ok(Self::Month(parsed))
            }
            other => bail!("unknown timeframe: {}", other),
        }
    }
}

fn event_start(event: &CalendarEvent) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&event.start)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn event_end(event: &CalendarEvent) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&event.end)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Drop ended events, then apply the timeframe window. Day boundaries
/// are Madrid-local. `limit` applies to `Upcoming` only.
pub fn filter_events(
    events: &[CalendarEvent],
    timeframe: &Timeframe,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<CalendarEvent> {
    let today = tz::to_madrid(now).date_naive();

    let alive: Vec<&CalendarEvent> = events
        .iter()
        .filter(|e| event_end(e) >= now || event_start(e) >= now)
        .collect();

    let local_date = |e: &CalendarEvent| tz::to_madrid(event_start(e)).date_naive();

    let selected: Vec<CalendarEvent> = match timeframe {
        Timeframe::Upcoming => alive.into_iter().take(limit).cloned().collect(),
        Timeframe::Today => alive
            .into_iter()
            .filter(|e| local_date(e) == today)
            .cloned()
            .collect(),
        Timeframe::Tomorrow => {
            let tomorrow = today + Duration::days(1);
            alive
                .into_iter()
                .filter(|e| local_date(e) == tomorrow)
                .cloned()
                .collect()
        }
        Timeframe::Week => {
            let end = today + Duration::days(6);
            alive
                .into_iter()
                .filter(|e| {
                    let d = local_date(e);
                    d >= today && d <= end
                })
                .cloned()
                .collect()
        }
        Timeframe::Weekend => {
            // Upcoming Saturday and Sunday (or the current weekend).
            let days_to_sat = (Weekday::Sat.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            let saturday = today + Duration::days(days_to_sat);
            let sunday = saturday + Duration::days(1);
            alive
                .into_iter()
                .filter(|e| {
                    let d = local_date(e);
                    d == saturday || d == sunday || (d == today && days_to_sat == 0)
                })
                .cloned()
                .collect()
        }
        Timeframe::NextWeek => {
            let start = today + Duration::days(7 - today.weekday().num_days_from_monday() as i64);
            let end = start + Duration::days(6);
            alive
                .into_iter()
                .filter(|e| {
                    let d = local_date(e);
                    d >= start && d <= end
                })
                .cloned()
                .collect()
        }
        Timeframe::Month(anchor) => {
            let first = NaiveDate::from_ymd_opt(anchor.year(), anchor.month(), 1)
                .unwrap_or(*anchor);
            let next_month = if anchor.month() == 12 {
                NaiveDate::from_ymd_opt(anchor.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(anchor.year(), anchor.month() + 1, 1)
            }
            .unwrap_or(first);
            alive
                .into_iter()
                .filter(|e| {
                    let d = local_date(e);
                    d >= first && d < next_month
                })
                .cloned()
                .collect()
        }
    };

    selected
}

/// Markdown rendering for the chat tool: current-date header plus one
/// block per event with Madrid-local date and time.
pub fn render_events_markdown(events: &[CalendarEvent], timeframe_name: &str, now: DateTime<Utc>) -> String {
    let header = format!("[Fecha actual: {}]", tz::format_long_es(now));

    if events.is_empty() {
        return format!(
            "{}\n\nNo hay eventos programados para {}.",
            header, timeframe_name
        );
    }

    let blocks: Vec<String> = events
        .iter()
        .map(|event| {
            let start = event_start(event);
            let mut date_line = tz::format_long_es(start);
            if event.all_day {
                date_line.push_str(" (todo el día)");
            } else {
                let end = event_end(event);
                date_line.push_str(&format!(
                    " de {} a {}",
                    tz::format_time_es(start),
                    tz::format_time_es(end)
                ));
            }

            let mut block = format!("**{}**\n📅 {}", event.title, date_line);
            if let Some(ref location) = event.location {
                block.push_str(&format!("\n📍 {}", location));
            }
            if let Some(ref description) = event.description {
                block.push_str(&format!("\n📝 {}", description));
            }
            block
        })
        .collect();

    format!(
        "{}\n\nEncontré {} evento(s):\n\n{}",
        header,
        events.len(),
        blocks.join("\n\n---\n\n")
    )
}

// ============ Feed store ============

/// Cached ICS feed. Shared between the HTTP handler and the chat tool.
pub struct CalendarStore {
    config: CalendarConfig,
    client: reqwest::Client,
    cached: Mutex<Option<(Instant, Vec<CalendarEvent>)>>,
}

impl CalendarStore {
    pub fn new(config: CalendarConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// All expanded events, from cache when fresh.
    pub async fn events(&self, force_refresh: bool) -> Result<Vec<CalendarEvent>> {
        let url = self
            .config
            .ics_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("calendar.ics_url is not configured"))?;

        let ttl = std::time::Duration::from_secs(self.config.cache_ttl_secs);

        let mut guard = self.cached.lock().await;
        if !force_refresh {
            if let Some((fetched, ref events)) = *guard {
                if fetched.elapsed() < ttl {
                    return Ok(events.clone());
                }
            }
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| "Failed to fetch calendar feed")?;
        if !response.status().is_success() {
            bail!("Calendar feed returned {}", response.status());
        }
        let ics = response.text().await?;

        let now = Utc::now();
        let events = expand_events(
            parse_ics(&ics),
            now - Duration::days(30),
            now + Duration::days(365),
        );

        *guard = Some((Instant::now(), events.clone()));
        Ok(events)
    }

    /// Whether the last answer came from cache (for response metadata).
    pub async fn is_cached(&self) -> bool {
        let guard = self.cached.lock().await;
        match *guard {
            Some((fetched, _)) => {
                fetched.elapsed() < std::time::Duration::from_secs(self.config.cache_ttl_secs)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ICS: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:misa-1\r\nSUMMARY:Misa dominical\r\nLOCATION:Parroquia de la Soledad\r\nDTSTART:20250706T100000Z\r\nDTEND:20250706T110000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn parses_simple_event() {
        let events = parse_ics(SAMPLE_ICS);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.uid, "misa-1");
        assert_eq!(e.summary.as_deref(), Some("Misa dominical"));
        assert!(!e.all_day);
        assert_eq!(e.end - e.start, Duration::hours(1));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Retiro de\r\n  Adviento\r\nDTSTART:20251201T180000Z\r\nEND:VEVENT\r\nEND:VCALENDAR";
        let events = parse_ics(ics);
        assert_eq!(events[0].summary.as_deref(), Some("Retiro de Adviento"));
    }

    #[test]
    fn unescapes_text_values() {
        assert_eq!(unescape_text("línea\\nuna\\, dos"), "línea\nuna, dos");
    }

    #[test]
    fn date_only_start_is_all_day() {
        let ics = "BEGIN:VEVENT\r\nUID:d\r\nSUMMARY:Fiesta parroquial\r\nDTSTART;VALUE=DATE:20250715\r\nEND:VEVENT";
        let events = parse_ics(ics);
        assert!(events[0].all_day);
        assert_eq!(events[0].end - events[0].start, Duration::days(1));
    }

    #[test]
    fn missing_dtstart_is_skipped() {
        let ics = "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Sin fecha\r\nEND:VEVENT";
        assert!(parse_ics(ics).is_empty());
    }

    #[test]
    fn weekly_rrule_expands_with_count() {
        let ics = "BEGIN:VEVENT\r\nUID:rosario\r\nSUMMARY:Rosario\r\nDTSTART:20250702T170000Z\r\nDTEND:20250702T180000Z\r\nRRULE:FREQ=WEEKLY;COUNT=4\r\nEND:VEVENT";
        let raw = parse_ics(ics);
        let range_start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let range_end = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let events = expand_events(raw, range_start, range_end);
        assert_eq!(events.len(), 4);
        // Weekly cadence: 7 days apart, ids unique.
        assert_ne!(events[0].id, events[1].id);
        let first = event_start(&events[0]);
        let second = event_start(&events[1]);
        assert_eq!(second - first, Duration::days(7));
    }

    #[test]
    fn weekly_rrule_until_bounds_expansion() {
        let ics = "BEGIN:VEVENT\r\nUID:u\r\nSUMMARY:Catequesis\r\nDTSTART:20250901T170000Z\r\nDTEND:20250901T180000Z\r\nRRULE:FREQ=WEEKLY;UNTIL=20250915T170000Z\r\nEND:VEVENT";
        let raw = parse_ics(ics);
        let events = expand_events(
            raw,
            Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
        );
        assert_eq!(events.len(), 3); // Sep 1, 8, 15
    }

    #[test]
    fn rrule_parser_reads_byday() {
        let rule = parse_rrule("FREQ=WEEKLY;BYDAY=MO,WE;INTERVAL=2").unwrap();
        assert_eq!(rule.freq, Freq::Weekly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.by_day, vec![Weekday::Mon, Weekday::Wed]);
    }

    fn mk_event(id: &str, start: DateTime<Utc>, hours: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Evento {}", id),
            start: start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            end: (start + Duration::hours(hours)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            location: None,
            description: None,
            all_day: false,
        }
    }

    #[test]
    fn filter_drops_past_events() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let events = vec![
            mk_event("past", now - Duration::days(2), 1),
            mk_event("future", now + Duration::days(1), 1),
        ];
        let kept = filter_events(&events, &Timeframe::Upcoming, now, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "future");
    }

    #[test]
    fn filter_upcoming_respects_limit() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let events: Vec<CalendarEvent> = (0..8)
            .map(|i| mk_event(&format!("e{}", i), now + Duration::days(i + 1), 1))
            .collect();
        let kept = filter_events(&events, &Timeframe::Upcoming, now, 5);
        assert_eq!(kept.len(), 5);
    }

    #[test]
    fn filter_today_uses_madrid_day() {
        // 22:30 UTC on Jul 10 is 00:30 Jul 11 in Madrid (UTC+2): not today.
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let late = mk_event("late", Utc.with_ymd_and_hms(2025, 7, 10, 22, 30, 0).unwrap(), 1);
        let noon = mk_event("noon", Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap(), 1);
        let kept = filter_events(&[late, noon], &Timeframe::Today, now, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "noon");
    }

    #[test]
    fn filter_week_spans_seven_days() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 8, 0, 0).unwrap();
        let inside = mk_event("in", now + Duration::days(5), 1);
        let outside = mk_event("out", now + Duration::days(9), 1);
        let kept = filter_events(&[inside, outside], &Timeframe::Week, now, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "in");
    }

    #[test]
    fn render_empty_has_no_events_line() {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        let text = render_events_markdown(&[], "today", now);
        assert!(text.contains("No hay eventos"));
        assert!(text.contains("lunes, 3 de marzo de 2025"));
    }

    #[test]
    fn render_includes_location_and_times() {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        let mut event = mk_event("m", Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap(), 1);
        event.title = "Misa".to_string();
        event.location = Some("Capilla".to_string());
        let text = render_events_markdown(&[event], "tomorrow", now);
        assert!(text.contains("**Misa**"));
        assert!(text.contains("📍 Capilla"));
        assert!(text.contains("de 19:00 a 20:00")); // Madrid is UTC+1 in March
    }

    #[test]
    fn timeframe_parse_rejects_unknown() {
        assert!(Timeframe::parse("someday", None).is_err());
        assert_eq!(Timeframe::parse("today", None).unwrap(), Timeframe::Today);
    }
}
