//! Series assembly: fetch, parse, expand and resolve calendar events.
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

use std::{
    collections::BTreeMap,
    io::Cursor,
};

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use tracing::debug;

use crate::{
    conf::Conf,
    envfile::EnvInfo,
    fetch::fetch_ics,
    ics::{self, Event, Freq},
    meta::{self, MetaMap},
    semantics,
    target::{Target, TargetResolver},
};

/// One concrete run of a series within the horizon
#[derive(Clone, Debug)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// True when an override instance supplied this occurrence
    pub is_override: bool,
    /// Recurrence-id key for overrides
    pub key: Option<NaiveDateTime>,
    /// Metadata governing this occurrence
    pub yaml: MetaMap,
}

/// Per-UID aggregation of a base event, its overrides and the expanded
/// occurrence list
#[derive(Clone, Debug)]
pub struct Series {
    pub uid: String,
    /// Base event, or the first override when no base exists
    pub reference: Event,
    /// Override instances keyed by the occurrence start they replace
    pub overrides: BTreeMap<NaiveDateTime, Event>,
    pub target: Target,
    pub yaml_base: MetaMap,
    pub occurrences: Vec<Occurrence>,
}

/// Runner result: series records plus accumulated warnings
#[derive(Debug, Default)]
pub struct RunOutput {
    pub series: Vec<Series>,
    pub warnings: Vec<String>,
}

/// Fetches and expands the configured calendar into series records.
///
/// The horizon runs from the midnight of `now` (so today's already
/// started occurrences still count) to the end of the guard year.
pub async fn collect_series(conf: &Conf, env: &EnvInfo, now: NaiveDateTime) -> RunOutput {
    let horizon = run_horizon(now);
    let text = fetch_ics(conf.ics_url()).await;
    let mut out = RunOutput::default();
    if text.is_empty() {
        if !conf.ics_url().trim().is_empty() {
            out.warnings.push("calendar fetch returned no data".to_string());
        }
        return out;
    }

    let events = ics::parse_events(Cursor::new(text), env.tz(), Some(horizon));
    let resolver = TargetResolver::new(conf.media_root());
    assemble_series(events, &resolver, horizon)
}

/// Expansion window for a run starting at `now`
pub fn run_horizon(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let start = now.date().and_time(NaiveTime::MIN);
    let end = semantics::guard_date(now.year())
        .and_hms_opt(23, 59, 59)
        .unwrap_or(NaiveDateTime::MAX);
    (start, end)
}

/// Groups parsed events by UID, resolves targets and expands occurrences.
///
/// Series are dropped (with a warning) when the event is all-day, the
/// target does not resolve, or the recurrence frequency is unsupported.
pub fn assemble_series(
    events: Vec<Event>,
    resolver: &TargetResolver,
    horizon: (NaiveDateTime, NaiveDateTime),
) -> RunOutput {
    let mut out = RunOutput::default();

    // Group per UID, separating the base from its overrides
    let mut grouped: BTreeMap<String, (Option<Event>, BTreeMap<NaiveDateTime, Event>)> =
        BTreeMap::new();
    for event in events {
        let slot = grouped.entry(event.uid.clone()).or_default();
        match event.recurrence_id {
            Some(key) => {
                slot.1.insert(key, event);
            }
            None => {
                // First base wins; later duplicates are feed noise
                if slot.0.is_none() {
                    slot.0 = Some(event);
                }
            }
        }
    }

    for (uid, (base, overrides)) in grouped {
        let reference = match &base {
            Some(event) => event.clone(),
            None => match overrides.values().next() {
                Some(event) => event.clone(),
                None => continue,
            },
        };

        if reference.all_day {
            out.warnings.push(format!("{uid}: all-day events are not schedulable, skipped"));
            continue;
        }

        if let Some(rule) = &reference.rrule {
            if let Freq::Unsupported(freq) = &rule.freq {
                out.warnings
                    .push(format!("{uid}: unsupported recurrence frequency {freq}, skipped"));
                continue;
            }
        }

        let yaml_base = reference
            .description
            .as_deref()
            .map(meta::parse_description)
            .unwrap_or_default();

        // A command descriptor in the metadata outranks the summary probe;
        // a declared type only hints the probe order
        let target = match meta::command_spec(&yaml_base) {
            Some((name, _)) => Some(Target {
                kind: semantics::TargetKind::Command,
                name,
            }),
            None => {
                let hint = meta::get_str(&yaml_base, "type")
                    .and_then(|label| semantics::TargetKind::normalize(&label));
                resolver.resolve(&reference.summary, hint)
            }
        };
        let Some(target) = target else {
            out.warnings
                .push(format!("{uid}: no playlist, sequence or command matches \"{}\"", reference.summary));
            continue;
        };

        let occurrences = expand_occurrences(&reference, &overrides, &yaml_base, horizon);
        debug!(uid, occurrences = occurrences.len(), "expanded series");

        out.series.push(Series {
            uid,
            reference,
            overrides,
            target,
            yaml_base,
            occurrences,
        });
    }

    out
}

/// Expands a base event and its overrides into concrete occurrences.
///
/// Overrides inside the horizon are always emitted with their own times.
/// Generated occurrences take the base duration and skip any slot that is
/// excluded (EXDATE) or replaced by an override.
pub fn expand_occurrences(
    base: &Event,
    overrides: &BTreeMap<NaiveDateTime, Event>,
    yaml_base: &MetaMap,
    horizon: (NaiveDateTime, NaiveDateTime),
) -> Vec<Occurrence> {
    let (from, to) = horizon;
    let mut occurrences = Vec::new();

    for (key, event) in overrides {
        if event.all_day || event.dtstart < from || event.dtstart > to {
            continue;
        }
        let yaml = event
            .description
            .as_deref()
            .map(meta::parse_description)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| yaml_base.clone());
        occurrences.push(Occurrence {
            start: event.dtstart,
            end: event.dtend,
            is_override: true,
            key: Some(*key),
            yaml,
        });
    }

    match &base.rrule {
        None => {
            let replaced = overrides.contains_key(&base.dtstart);
            if !replaced && base.dtstart >= from && base.dtstart <= to {
                occurrences.push(generated(base, base.dtstart, yaml_base));
            }
        }
        Some(rule) => match rule.freq {
            Freq::Daily => {
                expand_daily(base, rule, overrides, yaml_base, horizon, &mut occurrences);
            }
            Freq::Weekly => {
                expand_weekly(base, rule, overrides, yaml_base, horizon, &mut occurrences);
            }
            Freq::Unsupported(_) => {}
        },
    }

    occurrences.sort_by_key(|o| o.start);
    occurrences
}

fn generated(base: &Event, start: NaiveDateTime, yaml_base: &MetaMap) -> Occurrence {
    Occurrence {
        start,
        end: start + base.duration(),
        is_override: false,
        key: None,
        yaml: yaml_base.clone(),
    }
}

fn slot_taken(base: &Event, overrides: &BTreeMap<NaiveDateTime, Event>, slot: NaiveDateTime) -> bool {
    base.exdates.contains(&slot) || overrides.contains_key(&slot)
}

fn expand_daily(
    base: &Event,
    rule: &ics::RRule,
    overrides: &BTreeMap<NaiveDateTime, Event>,
    yaml_base: &MetaMap,
    (from, to): (NaiveDateTime, NaiveDateTime),
    occurrences: &mut Vec<Occurrence>,
) {
    let step = Duration::days(i64::from(rule.interval));
    let mut cursor = base.dtstart;
    let mut emitted: u32 = 0;

    while cursor <= to {
        if let Some(until) = rule.until {
            if cursor > until {
                break;
            }
        }
        if let Some(count) = rule.count {
            if emitted >= count {
                break;
            }
        }
        // Every rule slot consumes COUNT, visible in the horizon or not
        emitted += 1;
        if cursor >= from && !slot_taken(base, overrides, cursor) {
            occurrences.push(generated(base, cursor, yaml_base));
        }
        cursor += step;
    }
}

fn expand_weekly(
    base: &Event,
    rule: &ics::RRule,
    overrides: &BTreeMap<NaiveDateTime, Event>,
    yaml_base: &MetaMap,
    (from, to): (NaiveDateTime, NaiveDateTime),
    occurrences: &mut Vec<Occurrence>,
) {
    let mut weekdays: Vec<Weekday> = if rule.byday.is_empty() {
        vec![base.dtstart.weekday()]
    } else {
        rule.byday.clone()
    };
    weekdays.sort_by_key(|d| d.num_days_from_sunday());
    weekdays.dedup();

    // Weeks anchor on the Sunday of DTSTART's week, host day order
    let anchor = base.dtstart.date()
        - Duration::days(i64::from(base.dtstart.weekday().num_days_from_sunday()));
    let time_of_day = base.dtstart.time();
    let mut emitted: u32 = 0;

    let mut week: i64 = 0;
    'weeks: loop {
        let week_start = anchor + Duration::weeks(week * i64::from(rule.interval));
        if week_start.and_time(NaiveTime::MIN) > to {
            break;
        }
        for weekday in &weekdays {
            let date = week_start + Duration::days(i64::from(weekday.num_days_from_sunday()));
            let slot = date.and_time(time_of_day);
            if slot < base.dtstart {
                continue;
            }
            if let Some(until) = rule.until {
                if slot > until {
                    break 'weeks;
                }
            }
            if let Some(count) = rule.count {
                if emitted >= count {
                    break 'weeks;
                }
            }
            emitted += 1;
            if slot > to {
                break 'weeks;
            }
            if slot >= from && !slot_taken(base, overrides, slot) {
                occurrences.push(generated(base, slot, yaml_base));
            }
        }
        week += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    fn event(uid: &str, start: &str, end: &str) -> Event {
        Event {
            uid: uid.to_string(),
            summary: "Show".to_string(),
            description: None,
            dtstart: dt(start),
            dtend: dt(end),
            all_day: false,
            rrule: None,
            exdates: Vec::new(),
            recurrence_id: None,
        }
    }

    fn daily(mut e: Event, until: Option<&str>, count: Option<u32>) -> Event {
        e.rrule = Some(ics::RRule {
            freq: Freq::Daily,
            interval: 1,
            byday: Vec::new(),
            until: until.map(dt),
            count,
        });
        e
    }

    const HORIZON: (&str, &str) = ("2025-01-01 00:00:00", "2030-12-31 23:59:59");

    fn horizon() -> (NaiveDateTime, NaiveDateTime) {
        (dt(HORIZON.0), dt(HORIZON.1))
    }

    #[test]
    fn single_event_emits_one_occurrence() {
        let base = event("u1", "2025-06-01 18:00:00", "2025-06-01 23:00:00");
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].start, dt("2025-06-01 18:00:00"));
        assert!(!occ[0].is_override);
    }

    #[test]
    fn single_event_outside_horizon_is_silent() {
        let base = event("u1", "2024-06-01 18:00:00", "2024-06-01 23:00:00");
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        assert!(occ.is_empty());
    }

    #[test]
    fn daily_until_expansion_respects_exdate_and_duration() {
        let mut base = daily(
            event("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00"),
            Some("2025-01-05 23:59:59"),
            None,
        );
        base.exdates.push(dt("2025-01-03 18:00:00"));
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        assert_eq!(occ.len(), 4); // Jan 1,2,4,5
        assert!(occ.iter().all(|o| o.end - o.start == Duration::hours(5)));
        assert!(!occ.iter().any(|o| o.start == dt("2025-01-03 18:00:00")));
    }

    #[test]
    fn daily_count_counts_excluded_slots() {
        let mut base = daily(
            event("u1", "2025-01-01 18:00:00", "2025-01-01 19:00:00"),
            None,
            Some(3),
        );
        base.exdates.push(dt("2025-01-02 18:00:00"));
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        // COUNT=3 covers Jan 1..3; the EXDATE on Jan 2 leaves two
        assert_eq!(occ.len(), 2);
        assert_eq!(occ.last().map(|o| o.start), Some(dt("2025-01-03 18:00:00")));
    }

    #[test]
    fn weekly_byday_emits_each_listed_weekday() {
        // 2025-01-06 is a Monday
        let mut base = event("u1", "2025-01-06 19:00:00", "2025-01-06 21:00:00");
        base.rrule = Some(ics::RRule {
            freq: Freq::Weekly,
            interval: 1,
            byday: vec![Weekday::Mon, Weekday::Fri],
            until: Some(dt("2025-01-17 23:59:59")),
            count: None,
        });
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        let starts: Vec<_> = occ.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![
                dt("2025-01-06 19:00:00"),
                dt("2025-01-10 19:00:00"),
                dt("2025-01-13 19:00:00"),
                dt("2025-01-17 19:00:00"),
            ]
        );
    }

    #[test]
    fn weekly_defaults_to_dtstart_weekday() {
        let mut base = event("u1", "2025-01-07 19:00:00", "2025-01-07 20:00:00");
        base.rrule = Some(ics::RRule {
            freq: Freq::Weekly,
            interval: 2,
            byday: Vec::new(),
            until: None,
            count: Some(3),
        });
        let occ = expand_occurrences(&base, &BTreeMap::new(), &MetaMap::new(), horizon());
        let starts: Vec<_> = occ.iter().map(|o| o.start).collect();
        // Tuesdays, every other week
        assert_eq!(
            starts,
            vec![
                dt("2025-01-07 19:00:00"),
                dt("2025-01-21 19:00:00"),
                dt("2025-02-04 19:00:00"),
            ]
        );
    }

    #[test]
    fn override_replaces_its_slot_and_keeps_own_times() {
        let base = daily(
            event("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00"),
            Some("2025-01-03 23:59:59"),
            None,
        );
        let mut replacement = event("u1", "2025-01-02 20:00:00", "2025-01-02 22:00:00");
        replacement.recurrence_id = Some(dt("2025-01-02 18:00:00"));
        let mut overrides = BTreeMap::new();
        overrides.insert(dt("2025-01-02 18:00:00"), replacement);

        let occ = expand_occurrences(&base, &overrides, &MetaMap::new(), horizon());
        assert_eq!(occ.len(), 3);
        let replaced: Vec<_> = occ.iter().filter(|o| o.is_override).collect();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].start, dt("2025-01-02 20:00:00"));
        assert_eq!(replaced[0].end, dt("2025-01-02 22:00:00"));
        // The base slot it replaced is not regenerated
        assert!(!occ.iter().any(|o| o.start == dt("2025-01-02 18:00:00")));
    }

    #[test]
    fn assemble_drops_all_day_and_unresolved() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("playlists/Show")).expect("mkdir");
        std::fs::write(dir.path().join("playlists/Show/playlist.json"), "{}").expect("write");
        let resolver = TargetResolver::new(dir.path());

        let good = event("good", "2025-06-01 18:00:00", "2025-06-01 23:00:00");
        let mut allday = event("allday", "2025-06-01 00:00:00", "2025-06-01 23:59:59");
        allday.all_day = true;
        let mut missing = event("missing", "2025-06-01 18:00:00", "2025-06-01 23:00:00");
        missing.summary = "No Such Playlist".to_string();

        let out = assemble_series(vec![good, allday, missing], &resolver, horizon());
        assert_eq!(out.series.len(), 1);
        assert_eq!(out.series[0].uid, "good");
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn command_metadata_outranks_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = TargetResolver::new(dir.path());

        let mut e = event("c1", "2025-06-01 18:00:00", "2025-06-01 18:30:00");
        e.description = Some("command:\n  name: Volume Set\n  args: \"70\"".to_string());
        let out = assemble_series(vec![e], &resolver, horizon());
        assert_eq!(out.series.len(), 1);
        assert_eq!(out.series[0].target.kind, semantics::TargetKind::Command);
        assert_eq!(out.series[0].target.name, "Volume Set");
    }

    #[test]
    fn unsupported_frequency_drops_series_with_warning() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("playlists/Show")).expect("mkdir");
        std::fs::write(dir.path().join("playlists/Show/playlist.json"), "{}").expect("write");
        let resolver = TargetResolver::new(dir.path());

        let mut e = event("m1", "2025-06-01 18:00:00", "2025-06-01 23:00:00");
        e.rrule = Some(ics::RRule {
            freq: Freq::Unsupported("MONTHLY".to_string()),
            interval: 1,
            byday: Vec::new(),
            until: None,
            count: None,
        });
        let out = assemble_series(vec![e], &resolver, horizon());
        assert!(out.series.is_empty());
        assert!(out.warnings[0].contains("MONTHLY"));
    }
}
