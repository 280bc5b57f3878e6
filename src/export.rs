//! ICS export of unmanaged scheduler entries for calendar round-trips.
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

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::{
    diff,
    envfile::EnvInfo,
    identity,
    meta::{self, MetaMap, MetaValue},
    semantics::{self, Repeat, StopType, SymbolicTime},
    suntime,
};

/// Product identifier stamped on every export
const PRODID: &str = "-//fppcal//FPP Schedule Export//EN";
/// RRULE UNTIL values are clamped this many days out for client
/// compatibility
const UNTIL_CLAMP_DAYS: i64 = 366;
/// VTIMEZONE coverage: one year back, six forward
const TZ_YEARS_BACK: i32 = 1;
const TZ_YEARS_FORWARD: i32 = 6;

/// Renders the unmanaged entries of a scheduler file as an RFC 5545
/// calendar.
///
/// Managed entries are skipped (they round-trip through the source
/// calendar already). Each remaining entry becomes one VEVENT with a
/// TZID-qualified window, an RRULE derived from its day selector, and
/// EXDATEs for the dates on which an entry higher in the file claims the
/// same playlist.
pub fn export_unmanaged(entries: &[Value], env: &EnvInfo, now_utc: DateTime<Utc>) -> String {
    let tz = env.tz();
    let current_year = now_utc.with_timezone(&tz).year();

    let mut lines: Vec<String> = Vec::new();
    lines.push("BEGIN:VCALENDAR".to_string());
    lines.push(format!("PRODID:{PRODID}"));
    lines.push("VERSION:2.0".to_string());
    lines.push("CALSCALE:GREGORIAN".to_string());
    lines.push("METHOD:PUBLISH".to_string());
    lines.push(format!("X-WR-TIMEZONE:{}", tz.name()));
    lines.extend(vtimezone_lines(tz, current_year));

    for (index, entry) in entries.iter().enumerate() {
        if diff::is_managed(entry) {
            continue;
        }
        if let Some(event_lines) =
            vevent_lines(entry, index, entries, env, tz, now_utc, current_year)
        {
            lines.extend(event_lines);
        }
    }

    lines.push("END:VCALENDAR".to_string());

    let folded: Vec<String> = lines.iter().map(|l| fold_line(l)).collect();
    folded.join("\r\n") + "\r\n"
}

/// A practical VTIMEZONE: one sub-block per UTC-offset transition in the
/// covered span, no recurrence rules
fn vtimezone_lines(tz: Tz, current_year: i32) -> Vec<String> {
    let mut lines = vec!["BEGIN:VTIMEZONE".to_string(), format!("TZID:{}", tz.name())];

    let from = NaiveDate::from_ymd_opt(current_year - TZ_YEARS_BACK, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
        .and_utc();
    let to = NaiveDate::from_ymd_opt(current_year + TZ_YEARS_FORWARD, 12, 31)
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
        .and_utc();

    let mut cursor = from;
    let mut prior = tz.offset_from_utc_datetime(&cursor.naive_utc());
    let mut emitted_any = false;

    while cursor < to {
        let next = cursor + Duration::hours(1);
        let offset = tz.offset_from_utc_datetime(&next.naive_utc());
        if offset.fix() != prior.fix() {
            let local = (next.naive_utc()
                + Duration::seconds(i64::from(offset.fix().local_minus_utc())))
            .format("%Y%m%dT%H%M%S");
            let kind = if offset.dst_offset().is_zero() {
                "STANDARD"
            } else {
                "DAYLIGHT"
            };
            lines.push(format!("BEGIN:{kind}"));
            lines.push(format!("DTSTART:{local}"));
            lines.push(format!("TZOFFSETFROM:{}", offset_label(prior.fix().local_minus_utc())));
            lines.push(format!("TZOFFSETTO:{}", offset_label(offset.fix().local_minus_utc())));
            lines.push(format!(
                "TZNAME:{}",
                next.with_timezone(&tz).format("%Z")
            ));
            lines.push(format!("END:{kind}"));
            emitted_any = true;
        }
        prior = offset;
        cursor = next;
    }

    // Fixed-offset zones still need one block for clients that insist
    // on a non-empty VTIMEZONE
    if !emitted_any {
        let offset = tz.offset_from_utc_datetime(&from.naive_utc());
        let label = offset_label(offset.fix().local_minus_utc());
        lines.push("BEGIN:STANDARD".to_string());
        lines.push(format!("DTSTART:{}", from.format("%Y%m%dT%H%M%S")));
        lines.push(format!("TZOFFSETFROM:{label}"));
        lines.push(format!("TZOFFSETTO:{label}"));
        lines.push(format!("TZNAME:{}", from.with_timezone(&tz).format("%Z")));
        lines.push("END:STANDARD".to_string());
    }

    lines.push("END:VTIMEZONE".to_string());
    lines
}

fn offset_label(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.abs();
    format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

#[allow(clippy::too_many_arguments)]
fn vevent_lines(
    entry: &Value,
    index: usize,
    all: &[Value],
    env: &EnvInfo,
    tz: Tz,
    now_utc: DateTime<Utc>,
    current_year: i32,
) -> Option<Vec<String>> {
    let start_date = semantics::resolve_date_token(
        entry["startDate"].as_str().unwrap_or_default(),
        current_year,
    )?;
    let end_date = semantics::resolve_date_token(
        entry["endDate"].as_str().unwrap_or_default(),
        current_year,
    )
    .unwrap_or(start_date);

    let start_time = resolve_entry_time(
        entry["startTime"].as_str().unwrap_or_default(),
        identity::as_int(&entry["startTimeOffset"]).unwrap_or(0),
        start_date,
        env,
        tz,
    )?;
    let raw_end = entry["endTime"].as_str().unwrap_or_default();
    let crosses_midnight = raw_end == "24:00:00";
    let end_time = if crosses_midnight {
        NaiveTime::MIN
    } else {
        resolve_entry_time(
            raw_end,
            identity::as_int(&entry["endTimeOffset"]).unwrap_or(0),
            start_date,
            env,
            tz,
        )?
    };

    let dtstart = start_date.and_time(start_time);
    let mut dtend = start_date.and_time(end_time);
    if crosses_midnight || dtend <= dtstart {
        dtend += Duration::days(1);
    }

    let summary = {
        let playlist = entry["playlist"].as_str().unwrap_or_default();
        let command = entry["command"].as_str().unwrap_or_default();
        if playlist.is_empty() {
            if command.is_empty() {
                return None;
            }
            format!("cmd: {command}")
        } else {
            playlist.to_string()
        }
    };

    let mut lines = vec!["BEGIN:VEVENT".to_string()];
    lines.push(format!("UID:{}", entry_uid(entry)));
    lines.push(format!("DTSTAMP:{}", now_utc.format("%Y%m%dT%H%M%SZ")));
    lines.push(format!(
        "DTSTART;TZID={}:{}",
        tz.name(),
        dtstart.format("%Y%m%dT%H%M%S")
    ));
    lines.push(format!(
        "DTEND;TZID={}:{}",
        tz.name(),
        dtend.format("%Y%m%dT%H%M%S")
    ));

    if end_date > start_date {
        if let Some(rrule) = rrule_line(entry, dtstart, end_date, crosses_midnight, tz, now_utc) {
            lines.push(rrule);
        }
        for exdate in precedence_exdates(entry, index, all, start_date, end_date, current_year) {
            lines.push(format!(
                "EXDATE;TZID={}:{}",
                tz.name(),
                exdate.and_time(start_time).format("%Y%m%dT%H%M%S")
            ));
        }
    }

    lines.push(format!("SUMMARY:{}", escape_text(&summary)));
    let description = description_yaml(entry);
    if !description.is_empty() {
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
    }
    lines.push("END:VEVENT".to_string());
    Some(lines)
}

/// Wall-clock time of an entry boundary; symbolic tokens resolve through
/// the sun-time estimator when coordinates are available
fn resolve_entry_time(
    token: &str,
    offset_minutes: i64,
    date: NaiveDate,
    env: &EnvInfo,
    tz: Tz,
) -> Option<NaiveTime> {
    if token == "24:00:00" {
        return Some(NaiveTime::MIN);
    }
    if let Ok(time) = NaiveTime::parse_from_str(token, semantics::TIME_FMT) {
        return Some(time);
    }
    let symbolic = SymbolicTime::parse(token)?;
    let (lat, lon) = (env.latitude?, env.longitude?);
    let utc_offset = tz
        .offset_from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .fix()
        .local_minus_utc()
        / 60;
    let base = suntime::estimate(date, lat, lon, utc_offset).get(symbolic)?;
    Some(base + Duration::minutes(offset_minutes))
}

/// RRULE derived from the day selector, UNTIL clamped for compatibility.
///
/// When the event crosses midnight the clamped UNTIL is rewritten to
/// DTSTART's wall-clock time so the final occurrence is not dropped by
/// clients that compare UNTIL against occurrence starts.
fn rrule_line(
    entry: &Value,
    dtstart: NaiveDateTime,
    end_date: NaiveDate,
    crosses_midnight: bool,
    tz: Tz,
    now_utc: DateTime<Utc>,
) -> Option<String> {
    let day = u8::try_from(identity::as_int(&entry["day"]).unwrap_or(7)).ok()?;
    let tokens = semantics::day_code_tokens(day)?;

    let freq = if day == 7 {
        "FREQ=DAILY".to_string()
    } else {
        let byday: Vec<String> = semantics::days_to_weekdays(tokens)
            .iter()
            .map(|d| {
                semantics::weekday_token(*d).to_uppercase()
            })
            .collect();
        format!("FREQ=WEEKLY;BYDAY={}", byday.join(","))
    };

    let clamp = (now_utc + Duration::days(UNTIL_CLAMP_DAYS)).naive_utc().date();
    let until_date = end_date.min(clamp);
    let until_local = if crosses_midnight {
        until_date.and_time(dtstart.time())
    } else {
        until_date.and_hms_opt(23, 59, 59).unwrap_or(dtstart)
    };
    // Express UNTIL in UTC as clients expect
    let until_utc = until_local
        - Duration::seconds(i64::from(
            tz.offset_from_utc_datetime(&until_local).fix().local_minus_utc(),
        ));

    Some(format!(
        "RRULE:{freq};UNTIL={}Z",
        until_utc.format("%Y%m%dT%H%M%S")
    ))
}

/// Dates on which an entry higher in the file shadows this one for the
/// same playlist
fn precedence_exdates(
    entry: &Value,
    index: usize,
    all: &[Value],
    start_date: NaiveDate,
    end_date: NaiveDate,
    current_year: i32,
) -> Vec<NaiveDate> {
    let playlist = entry["playlist"].as_str().unwrap_or_default();
    if playlist.is_empty() {
        return Vec::new();
    }
    let own_days = active_weekdays(entry);

    let mut dates = Vec::new();
    let scan_end = end_date.min(start_date + Duration::days(UNTIL_CLAMP_DAYS));
    for above in all.iter().take(index) {
        if above["playlist"].as_str().unwrap_or_default() != playlist {
            continue;
        }
        let Some(above_start) = semantics::resolve_date_token(
            above["startDate"].as_str().unwrap_or_default(),
            current_year,
        ) else {
            continue;
        };
        let above_end = semantics::resolve_date_token(
            above["endDate"].as_str().unwrap_or_default(),
            current_year,
        )
        .unwrap_or(above_start);
        let above_days = active_weekdays(above);

        let mut day = above_start.max(start_date);
        let last = above_end.min(scan_end);
        while day <= last {
            if own_days.contains(&day.weekday()) && above_days.contains(&day.weekday()) {
                dates.push(day);
            }
            day += Duration::days(1);
        }
    }
    dates.sort();
    dates.dedup();
    dates
}

fn active_weekdays(entry: &Value) -> Vec<chrono::Weekday> {
    u8::try_from(identity::as_int(&entry["day"]).unwrap_or(7))
        .ok()
        .and_then(semantics::day_code_tokens)
        .map(semantics::days_to_weekdays)
        .unwrap_or_default()
}

/// Metadata block serialized back into the DESCRIPTION slot
fn description_yaml(entry: &Value) -> String {
    let mut map = MetaMap::new();
    if let Some(stop) = identity::as_int(&entry["stopType"]) {
        if stop != 0 {
            let label = match StopType::from_code(stop) {
                StopType::Graceful => "graceful",
                StopType::Hard => "hard",
                StopType::GracefulLoop => "graceful_loop",
            };
            map.insert("stopType".to_string(), MetaValue::Str(label.to_string()));
        }
    }
    if let Some(repeat) = identity::as_int(&entry["repeat"]) {
        match Repeat::from_value(repeat) {
            Repeat::Immediate => {}
            Repeat::None => {
                map.insert("repeat".to_string(), MetaValue::Str("none".to_string()));
            }
            Repeat::Minutes(n) => {
                map.insert("repeat".to_string(), MetaValue::Int(i64::from(n)));
            }
        }
    }
    if identity::as_int(&entry["enabled"]) == Some(0) {
        map.insert("enabled".to_string(), MetaValue::Bool(false));
    }
    if map.is_empty() {
        String::new()
    } else {
        meta::to_yaml(&map).trim_end().to_string()
    }
}

/// Deterministic UID from the entry's canonical form
fn entry_uid(entry: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity::canonical_json(entry).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("fpp-{}@fppcal", &digest[..16])
}

/// RFC 5545 text escaping for SUMMARY/DESCRIPTION values
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Folds a content line at 75 octets; continuations begin with a space
fn fold_line(line: &str) -> String {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return line.to_string();
    }
    let mut out = String::new();
    let mut count = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if count + len > LIMIT {
            out.push_str("\r\n ");
            count = 1;
        }
        out.push(c);
        count += len;
    }
    out
}
