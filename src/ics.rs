//! iCalendar parsing: VEVENT records with recurrence and override data.
//!
//! MIT License
//!
//! Copyright (c) 2026 66f94eae
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy
//! of this software and associated documentation files (the "Software"), to deal
//! in the Software without restriction, including without limitation the rights
//! to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//! copies of the Software, and to permit persons to whom the Software is
//! furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all
//! copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//! IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//! AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//! LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//! OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//! SOFTWARE.

use std::io::BufRead;

use chrono::{Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;
use ical::property::Property;

/// iCalendar property key for the event identifier
const KEY_UID: &str = "UID";
/// iCalendar property key for event summary
const KEY_SUMMARY: &str = "SUMMARY";
/// iCalendar property key for event start time
const KEY_DTSTART: &str = "DTSTART";
/// iCalendar property key for event end time
const KEY_DTEND: &str = "DTEND";
/// iCalendar property key for event description
const KEY_DESCRIPTION: &str = "DESCRIPTION";
/// iCalendar property key for the recurrence rule
const KEY_RRULE: &str = "RRULE";
/// iCalendar property key for excluded occurrence starts
const KEY_EXDATE: &str = "EXDATE";
/// iCalendar property key marking an override of one occurrence
const KEY_RECURRENCE_ID: &str = "RECURRENCE-ID";

/// iCalendar datetime format: YYYYMMDDTHHMMSS
const DT_FMT: &str = "%Y%m%dT%H%M%S";

/// Recurrence frequency understood by the downstream expander
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Freq {
    Daily,
    Weekly,
    /// Recorded but never expanded; the series is dropped with a warning
    Unsupported(String),
}

/// Parsed RRULE, limited to the parts the host semantics use
#[derive(Clone, Debug, PartialEq)]
pub struct RRule {
    pub freq: Freq,
    pub interval: u32,
    pub byday: Vec<Weekday>,
    pub until: Option<NaiveDateTime>,
    pub count: Option<u32>,
}

impl RRule {
    /// Parses the raw semicolon-separated rule parts.
    ///
    /// UNTIL is accepted in three forms: `YYYYMMDD` (read as the end of
    /// that day), `YYYYMMDDTHHMMSSZ` (converted to host wall-clock) and
    /// floating `YYYYMMDDTHHMMSS`.
    fn parse(raw: &str, host: Tz) -> RRule {
        let mut rule = RRule {
            freq: Freq::Unsupported(String::new()),
            interval: 1,
            byday: Vec::new(),
            until: None,
            count: None,
        };
        for part in raw.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.to_uppercase().as_str() {
                "FREQ" => {
                    rule.freq = match value.to_uppercase().as_str() {
                        "DAILY" => Freq::Daily,
                        "WEEKLY" => Freq::Weekly,
                        other => Freq::Unsupported(other.to_string()),
                    };
                }
                "INTERVAL" => {
                    rule.interval = value.parse::<u32>().unwrap_or(1).max(1);
                }
                "BYDAY" => {
                    rule.byday = value
                        .split(',')
                        .filter_map(|token| {
                            // Ordinal prefixes (1MO, -1SU) carry no meaning
                            // for DAILY/WEEKLY rules; keep the weekday part
                            let token = token.trim();
                            let day = &token[token.len().saturating_sub(2)..];
                            byday_token(day)
                        })
                        .collect();
                }
                "UNTIL" => {
                    rule.until = parse_until(value, host);
                }
                "COUNT" => {
                    rule.count = value.parse::<u32>().ok();
                }
                _ => {}
            }
        }
        rule
    }
}

fn byday_token(token: &str) -> Option<Weekday> {
    match token.to_uppercase().as_str() {
        "SU" => Some(Weekday::Sun),
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        _ => None,
    }
}

fn parse_until(value: &str, host: Tz) -> Option<NaiveDateTime> {
    let value = value.trim().to_uppercase();
    if value.len() == 8 {
        // Date-only UNTIL covers the whole final day
        let padded = format!("{value}T235959");
        return NaiveDateTime::parse_from_str(&padded, DT_FMT).ok();
    }
    if let Some(stripped) = value.strip_suffix('Z') {
        let utc = NaiveDateTime::parse_from_str(stripped, DT_FMT).ok()?;
        return Some(utc.and_utc().with_timezone(&host).naive_local());
    }
    NaiveDateTime::parse_from_str(&value, DT_FMT).ok()
}

/// Individual calendar event record
#[derive(Clone, Debug)]
pub struct Event {
    /// Event identifier; shared between a recurring base and its overrides
    pub uid: String,
    /// Event title, used to resolve the media target
    pub summary: String,
    /// Optional free-text description carrying the metadata block
    pub description: Option<String>,
    /// Start, host wall-clock
    pub dtstart: NaiveDateTime,
    /// End, host wall-clock
    pub dtend: NaiveDateTime,
    /// DATE-valued starts mark all-day events
    pub all_day: bool,
    /// Recurrence rule, when present
    pub rrule: Option<RRule>,
    /// Occurrence starts excluded from expansion
    pub exdates: Vec<NaiveDateTime>,
    /// Start of the base occurrence this event replaces
    pub recurrence_id: Option<NaiveDateTime>,
}

impl Event {
    /// Whether this event replaces one occurrence of a recurring series
    pub fn is_override(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// Scheduled duration of the event
    pub fn duration(&self) -> Duration {
        self.dtend - self.dtstart
    }
}

/// Parses iCalendar text into event records.
///
/// Malformed VEVENTs (missing UID or unparseable DTSTART) are skipped;
/// parsing itself never fails. Non-recurring events that are neither
/// overrides nor inside the horizon are dropped early.
///
/// # Arguments
/// * `reader` - buffered reader over the calendar text
/// * `host` - host timezone every wall-clock value is converted into
/// * `horizon` - optional `[start, end]` window for early filtering
pub fn parse_events<T: BufRead>(
    reader: T,
    host: Tz,
    horizon: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Vec<Event> {
    let mut events = Vec::new();
    let parser = ical::IcalParser::new(reader);

    for calendar in parser.flatten() {
        for vevent in calendar.events {
            let mut uid = None;
            let mut summary = String::new();
            let mut description = None;
            let mut dtstart = None;
            let mut dtend = None;
            let mut all_day = false;
            let mut rrule = None;
            let mut exdates = Vec::new();
            let mut recurrence_id = None;

            for prop in vevent.properties {
                match prop.name.as_str() {
                    KEY_UID => {
                        uid = prop.value.clone();
                    }
                    KEY_SUMMARY => {
                        summary = prop.value.clone().unwrap_or_default();
                    }
                    KEY_DESCRIPTION => {
                        description = prop.value.clone().map(unescape_text);
                    }
                    KEY_DTSTART => {
                        if let Ok((dt, is_date)) = parse_datetime(&prop, true, host) {
                            dtstart = Some(dt);
                            all_day = is_date;
                        }
                    }
                    KEY_DTEND => {
                        if let Ok((dt, _)) = parse_datetime(&prop, false, host) {
                            dtend = Some(dt);
                        }
                    }
                    KEY_RRULE => {
                        if let Some(raw) = &prop.value {
                            rrule = Some(RRule::parse(raw, host));
                        }
                    }
                    KEY_EXDATE => {
                        exdates.extend(parse_datetime_list(&prop, host));
                    }
                    KEY_RECURRENCE_ID => {
                        if let Ok((dt, _)) = parse_datetime(&prop, true, host) {
                            recurrence_id = Some(dt);
                        }
                    }
                    _ => {}
                }
            }

            // A usable record needs an identifier and a start
            let (Some(uid), Some(dtstart)) = (uid, dtstart) else {
                continue;
            };

            // Events with no explicit end run for no time at all
            let dtend = dtend.unwrap_or(dtstart);

            let event = Event {
                uid,
                summary,
                description,
                dtstart,
                dtend,
                all_day,
                rrule,
                exdates,
                recurrence_id,
            };

            // Early horizon filter applies only to plain one-shot events;
            // recurring bases and overrides are judged during expansion
            if let Some((from, to)) = horizon {
                if event.rrule.is_none()
                    && !event.is_override()
                    && (event.dtend < from || event.dtstart > to)
                {
                    continue;
                }
            }

            events.push(event);
        }
    }
    events
}

/// Parses an iCalendar datetime property into host wall-clock time.
///
/// # Arguments
/// * `prop` - property containing the datetime value
/// * `is_dt_start` - DTSTART (true) or DTEND (false); drives all-day fill
///   and the pick for ambiguous local times
/// * `host` - host timezone for the wall-clock result
///
/// # Returns
/// * `(datetime, is_date_only)` or an error message
///
/// # Supported Forms
/// * YYYYMMDD (all-day)
/// * YYYYMMDDTHHMMSS (floating, taken as host-local)
/// * YYYYMMDDTHHMMSSZ (UTC)
/// * YYYYMMDDTHHMMSS with TZID parameter
fn parse_datetime(
    prop: &Property,
    is_dt_start: bool,
    host: Tz,
) -> Result<(NaiveDateTime, bool), &'static str> {
    let Some(value) = &prop.value else {
        return Err("Missing datetime value");
    };

    let mut value = value.to_uppercase();
    let date_only = value.len() == 8 || has_param(prop, "VALUE", "DATE");

    if date_only {
        // All-day values carry no time; fill to the edge of the day
        let fill_with = if is_dt_start { "T000000" } else { "T235959" };
        if value.len() == 8 {
            value.push_str(fill_with);
        }
        return NaiveDateTime::parse_from_str(&value, DT_FMT)
            .map(|dt| (dt, true))
            .map_err(|_| "Invalid datetime format");
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(stripped, DT_FMT)
            .map(|dt| (dt.and_utc().with_timezone(&host).naive_local(), false))
            .map_err(|_| "Invalid datetime format");
    }

    // TZID-qualified local time: interpret there, then shift to host
    if let Some(params) = &prop.params {
        for (name, field) in params {
            if name.to_uppercase() == "TZID" && !field.is_empty() {
                let Ok(tz) = field[0].parse::<Tz>() else {
                    return Err("Invalid timezone identifier");
                };
                let Ok(dt) = NaiveDateTime::parse_from_str(&value, DT_FMT) else {
                    return Err("Invalid datetime format");
                };
                let dt_result = tz.with_ymd_and_hms(
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                );
                return match dt_result {
                    chrono::offset::LocalResult::Single(tz_dt) => {
                        Ok((tz_dt.with_timezone(&host).naive_local(), false))
                    }
                    chrono::offset::LocalResult::Ambiguous(early, later) => {
                        let tz_dt = if is_dt_start { early } else { later };
                        Ok((tz_dt.with_timezone(&host).naive_local(), false))
                    }
                    chrono::offset::LocalResult::None => Err("Invalid datetime for timezone"),
                };
            }
        }
    }

    // Floating time is already host wall-clock
    NaiveDateTime::parse_from_str(&value, DT_FMT)
        .map(|dt| (dt, false))
        .map_err(|_| "Invalid datetime format")
}

/// Parses a comma-separated datetime list property (EXDATE)
fn parse_datetime_list(prop: &Property, host: Tz) -> Vec<NaiveDateTime> {
    let Some(value) = &prop.value else {
        return Vec::new();
    };
    value
        .split(',')
        .filter_map(|single| {
            let sub = Property {
                name: prop.name.clone(),
                params: prop.params.clone(),
                value: Some(single.trim().to_string()),
            };
            parse_datetime(&sub, true, host).ok().map(|(dt, _)| dt)
        })
        .collect()
}

fn has_param(prop: &Property, name: &str, value: &str) -> bool {
    let Some(params) = &prop.params else {
        return false;
    };
    params.iter().any(|(n, fields)| {
        n.to_uppercase() == name && fields.iter().any(|f| f.to_uppercase() == value)
    })
}

/// Undoes RFC 5545 text escaping in DESCRIPTION values
fn unescape_text(value: String) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
