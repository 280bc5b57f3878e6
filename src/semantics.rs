//! Host scheduler semantics: enums, day codes, sentinel dates, time labels.
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

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Date format used everywhere in the scheduler file (YYYY-MM-DD)
pub const DATE_FMT: &str = "%Y-%m-%d";
/// Time format used everywhere in the scheduler file (HH:MM:SS)
pub const TIME_FMT: &str = "%H:%M:%S";
/// Combined wall-clock format carried on intent templates
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Two-letter weekday tokens in host order (Sunday first)
pub const DAY_TOKENS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
/// Seven-day sentinel: every weekday selected
pub const EVERY_DAY: &str = "SuMoTuWeThFrSa";

/// Number of years past the current one covered by the guard date
pub const GUARD_YEARS: i32 = 5;

/// Kind of media artifact a schedule entry runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A playlist directory or json file under `playlists/`
    Playlist,
    /// An `.fseq` sequence under `sequences/`, stored without extension
    Sequence,
    /// A host command, carried in the command slot
    Command,
}

impl TargetKind {
    /// Canonical lower-case label as it appears in identities
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Playlist => "playlist",
            TargetKind::Sequence => "sequence",
            TargetKind::Command => "command",
        }
    }

    /// Normalizes a free-form type label (case-insensitive)
    pub fn normalize(label: &str) -> Option<TargetKind> {
        match label.trim().to_ascii_lowercase().as_str() {
            "playlist" => Some(TargetKind::Playlist),
            "sequence" => Some(TargetKind::Sequence),
            "command" => Some(TargetKind::Command),
            _ => None,
        }
    }
}

/// How the host scheduler ends a running entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StopType {
    /// Let the current iteration finish (code 0)
    #[default]
    Graceful,
    /// Stop immediately (code 1)
    Hard,
    /// Finish the current loop (code 2)
    GracefulLoop,
}

impl StopType {
    /// Host enum code
    pub fn code(&self) -> u8 {
        match self {
            StopType::Graceful => 0,
            StopType::Hard => 1,
            StopType::GracefulLoop => 2,
        }
    }

    /// Parses a case-insensitive label: graceful | hard | graceful_loop
    pub fn from_label(label: &str) -> Option<StopType> {
        match label.trim().to_ascii_lowercase().as_str() {
            "graceful" => Some(StopType::Graceful),
            "hard" => Some(StopType::Hard),
            "graceful_loop" => Some(StopType::GracefulLoop),
            _ => None,
        }
    }

    /// Accepts an already-encoded integer, clamped into the valid range
    pub fn from_code(code: i64) -> StopType {
        match code.clamp(0, 2) {
            1 => StopType::Hard,
            2 => StopType::GracefulLoop,
            _ => StopType::Graceful,
        }
    }
}

/// Repeat behavior of a schedule entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Repeat {
    /// Play once (code 0)
    None,
    /// Restart immediately when finished (code 1)
    #[default]
    Immediate,
    /// Restart every n minutes (encoded as n * 100)
    Minutes(u32),
}

impl Repeat {
    /// Host integer encoding: none=0, immediate=1, minutes=n*100
    pub fn encode(&self) -> i64 {
        match self {
            Repeat::None => 0,
            Repeat::Immediate => 1,
            Repeat::Minutes(n) => i64::from(*n) * 100,
        }
    }

    /// Parses a label: none | immediate | integer minutes.
    ///
    /// Integers at or above 100 are treated as already encoded and pass
    /// through unchanged.
    pub fn from_label(label: &str) -> Option<Repeat> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Repeat::None),
            "immediate" => Some(Repeat::Immediate),
            other => other.parse::<i64>().ok().map(Repeat::from_value),
        }
    }

    /// Interprets an integer the way the host does
    pub fn from_value(value: i64) -> Repeat {
        match value {
            v if v <= 0 => Repeat::None,
            1 => Repeat::Immediate,
            v if v >= 100 => Repeat::Minutes((v / 100) as u32),
            v => Repeat::Minutes(v as u32),
        }
    }
}

/// Solar reference points resolvable by the sun-time estimator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolicTime {
    Dawn,
    SunRise,
    SunSet,
    Dusk,
}

impl SymbolicTime {
    /// Canonical token as it appears in scheduler entries
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolicTime::Dawn => "Dawn",
            SymbolicTime::SunRise => "SunRise",
            SymbolicTime::SunSet => "SunSet",
            SymbolicTime::Dusk => "Dusk",
        }
    }

    /// Parses a token, case-insensitive
    pub fn parse(token: &str) -> Option<SymbolicTime> {
        match token.trim().to_ascii_lowercase().as_str() {
            "dawn" => Some(SymbolicTime::Dawn),
            "sunrise" => Some(SymbolicTime::SunRise),
            "sunset" => Some(SymbolicTime::SunSet),
            "dusk" => Some(SymbolicTime::Dusk),
            _ => None,
        }
    }
}

/// A schedule boundary time: a fixed wall-clock value or a solar token
/// plus an offset in minutes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeSpec {
    Absolute(NaiveTime),
    Symbolic(SymbolicTime, i32),
}

impl TimeSpec {
    /// Token written into the startTime/endTime slot of an entry
    pub fn token(&self) -> String {
        match self {
            TimeSpec::Absolute(t) => t.format(TIME_FMT).to_string(),
            TimeSpec::Symbolic(s, _) => s.as_str().to_string(),
        }
    }

    /// Minute offset written into the matching offset slot
    pub fn offset(&self) -> i32 {
        match self {
            TimeSpec::Absolute(_) => 0,
            TimeSpec::Symbolic(_, off) => *off,
        }
    }
}

/// Upper bound on every emitted schedule: Dec 31 of (year + GUARD_YEARS).
///
/// # Arguments
/// * `current_year` - calendar year the run executes in
pub fn guard_date(current_year: i32) -> NaiveDate {
    // Dec 31 exists in every year
    NaiveDate::from_ymd_opt(current_year + GUARD_YEARS, 12, 31)
        .unwrap_or(NaiveDate::MAX)
}

/// Two-letter token for a weekday, host order
pub fn weekday_token(day: Weekday) -> &'static str {
    DAY_TOKENS[day.num_days_from_sunday() as usize]
}

/// Parses a compact day token string ("MoWeFr") into weekdays.
///
/// # Returns
/// * Weekdays in Su..Sa order; empty when any chunk is unrecognized
pub fn days_to_weekdays(days: &str) -> Vec<Weekday> {
    const ORDER: [Weekday; 7] = [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ];
    if days.len() % 2 != 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for chunk in days.as_bytes().chunks(2) {
        let token = match std::str::from_utf8(chunk) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        match DAY_TOKENS.iter().position(|d| *d == token) {
            Some(idx) => out.push(ORDER[idx]),
            None => return Vec::new(),
        }
    }
    out.sort_by_key(|d| d.num_days_from_sunday());
    out.dedup();
    out
}

/// Maps a day token string to the host day selector enum (0..13).
///
/// Single days map to 0..6 (Sunday first); the recognized preset
/// combinations map to 7..13. Unrecognized combinations fall back to the
/// weekday of the event's first start.
///
/// # Arguments
/// * `days` - compact token concatenation in Su..Sa order
/// * `fallback` - DTSTART's weekday, used when the combination is unknown
pub fn day_code(days: &str, fallback: Weekday) -> u8 {
    if let Some(idx) = DAY_TOKENS.iter().position(|d| *d == days) {
        return idx as u8;
    }
    match days {
        "SuMoTuWeThFrSa" => 7,
        "MoTuWeThFr" => 8,
        "SuSa" => 9,
        "MoWeFr" => 10,
        "TuTh" => 11,
        "SuMoTuWeTh" => 12,
        "FrSa" => 13,
        _ => fallback.num_days_from_sunday() as u8,
    }
}

/// Reverse of [`day_code`]: the token string selected by a host day code
pub fn day_code_tokens(code: u8) -> Option<&'static str> {
    match code {
        0..=6 => Some(DAY_TOKENS[code as usize]),
        7 => Some("SuMoTuWeThFrSa"),
        8 => Some("MoTuWeThFr"),
        9 => Some("SuSa"),
        10 => Some("MoWeFr"),
        11 => Some("TuTh"),
        12 => Some("SuMoTuWeTh"),
        13 => Some("FrSa"),
        _ => None,
    }
}

/// Resolves a date token to a concrete date.
///
/// Accepts absolute `YYYY-MM-DD` values and the host sentinel form
/// `0000-MM-DD`, which means "this month/day in the current year".
pub fn resolve_date_token(token: &str, current_year: i32) -> Option<NaiveDate> {
    let token = token.trim();
    if let Some(rest) = token.strip_prefix("0000-") {
        let mut parts = rest.splitn(2, '-');
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        return NaiveDate::from_ymd_opt(current_year, month, day);
    }
    NaiveDate::parse_from_str(token, DATE_FMT).ok()
}

/// Formats an end time, applying the 24:00:00 rollover: an end that lands
/// on midnight of the day after its start renders as "24:00:00" so the
/// host treats the window as running to the end of the start day.
pub fn end_time_label(start: NaiveDateTime, end: NaiveDateTime) -> String {
    if end.time() == NaiveTime::MIN && end.date() == start.date().succ_opt().unwrap_or(end.date()) {
        return "24:00:00".to_string();
    }
    end.format(TIME_FMT).to_string()
}

/// Minute-of-day for a time label, honoring the 24:00:00 sentinel.
///
/// # Returns
/// * 0..=1440, or None for symbolic tokens and malformed labels
pub fn time_label_minutes(label: &str) -> Option<u32> {
    if label == "24:00:00" {
        return Some(24 * 60);
    }
    NaiveTime::parse_from_str(label, TIME_FMT)
        .ok()
        .map(|t| t.hour() * 60 + t.minute())
}
