//! Schedule planning: series to ordered bundles to desired entries.
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

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde_json::Value;

use crate::{
    error::{SyncError, SyncResult},
    holiday::HolidayResolver,
    ics::Freq,
    identity::{self, IdentitySource},
    meta::{self, MetaMap},
    runner::Series,
    semantics::{self, Repeat, StopType, TargetKind, TimeSpec},
};

/// Hard cap on managed entries the host scheduler will accept
pub const MAX_MANAGED_ENTRIES: usize = 100;
/// Upper bound on precedence-ordering passes
const MAX_ORDER_PASSES: usize = 50;

/// What one entry should play and how
#[derive(Clone, Debug)]
pub struct Template {
    pub summary: String,
    pub kind: TargetKind,
    pub target: String,
    /// Wall-clock start of the representative occurrence
    pub start: NaiveDateTime,
    /// Wall-clock end of the representative occurrence
    pub end: NaiveDateTime,
    pub stop_type: StopType,
    pub repeat: Repeat,
    pub enabled: bool,
    pub is_override: bool,
    /// Symbolic boundary overrides from the event metadata
    pub start_spec: Option<TimeSpec>,
    pub end_spec: Option<TimeSpec>,
    pub command_args: Vec<String>,
}

/// When an entry is active: a date span plus a day-of-week selection
#[derive(Clone, Debug, PartialEq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Compact two-letter day tokens in Su..Sa order
    pub days: String,
}

/// One schedule the planner wants the host to carry
#[derive(Clone, Debug)]
pub struct Intent {
    pub uid: String,
    pub template: Template,
    pub range: DateRange,
}

/// A base schedule and the override instances that shadow it; moves as a
/// unit during ordering
#[derive(Clone, Debug)]
pub struct Bundle {
    pub base: Intent,
    pub overrides: Vec<Intent>,
}

/// Planner output: ordered bundles and the flattened desired entry list
#[derive(Debug, Default)]
pub struct Plan {
    pub bundles: Vec<Bundle>,
    /// Host entries (with `_manifest` sidecars) in final file order
    pub desired: Vec<Value>,
    pub warnings: Vec<String>,
}

/// Projects series into an ordered, capped desired entry list.
///
/// Owns the per-run scratch state: the guard date and the holiday cache
/// used for identity derivation.
pub struct Planner {
    now: NaiveDateTime,
    guard: NaiveDate,
    holiday: HolidayResolver,
}

impl Planner {
    pub fn new(now: NaiveDateTime) -> Self {
        Planner {
            now,
            guard: semantics::guard_date(now.year()),
            holiday: HolidayResolver::new(),
        }
    }

    /// Year sentinel dates resolve into for this run
    pub fn current_year(&self) -> i32 {
        self.now.year()
    }

    pub fn holiday(&self) -> &HolidayResolver {
        &self.holiday
    }

    /// Runs the full projection: bundle, clamp, order, flatten, cap.
    pub fn plan(&self, series: &[Series]) -> SyncResult<Plan> {
        let mut plan = Plan::default();

        for s in series {
            match self.bundle_series(s, &mut plan.warnings) {
                Some(bundle) => plan.bundles.push(bundle),
                None => continue,
            }
        }

        order_bundles(&mut plan.bundles);
        self.flatten(&mut plan)?;
        Ok(plan)
    }

    /// Builds the bundle for one series, or None when it falls outside
    /// the guard window or has nothing to schedule
    fn bundle_series(&self, series: &Series, warnings: &mut Vec<String>) -> Option<Bundle> {
        if series.occurrences.is_empty() {
            return None;
        }

        let reference = &series.reference;
        let range_start = reference.dtstart.date();
        let range_end = self.range_end(series);

        if range_start >= self.guard {
            warnings.push(format!(
                "{}: starts past the guard date {}, skipped",
                series.uid, self.guard
            ));
            return None;
        }
        let range_end = range_end.min(self.guard);
        if range_end < range_start {
            warnings.push(format!("{}: empty date range after clamping, skipped", series.uid));
            return None;
        }

        let base = Intent {
            uid: series.uid.clone(),
            template: self.template_for(series, reference.dtstart, reference.dtend, &series.yaml_base, false),
            range: DateRange {
                start: range_start,
                end: range_end,
                days: self.derive_days(series),
            },
        };

        let mut overrides = Vec::new();
        for occ in series.occurrences.iter().filter(|o| o.is_override) {
            let date = occ.start.date();
            if date >= self.guard {
                continue;
            }
            overrides.push(Intent {
                uid: series.uid.clone(),
                template: self.template_for(series, occ.start, occ.end, &occ.yaml, true),
                range: DateRange {
                    start: date,
                    end: date,
                    days: semantics::weekday_token(date.weekday()).to_string(),
                },
            });
        }

        Some(Bundle { base, overrides })
    }

    fn template_for(
        &self,
        series: &Series,
        start: NaiveDateTime,
        end: NaiveDateTime,
        yaml: &MetaMap,
        is_override: bool,
    ) -> Template {
        let stop_type = meta::get_str(yaml, "stopType")
            .and_then(|label| StopType::from_label(&label))
            .or_else(|| {
                yaml.get("stopType")
                    .and_then(|v| match v {
                        meta::MetaValue::Int(i) => Some(StopType::from_code(*i)),
                        _ => None,
                    })
            })
            .unwrap_or_default();
        let repeat = meta::get_str(yaml, "repeat")
            .and_then(|label| Repeat::from_label(&label))
            .unwrap_or_default();
        let enabled = meta::get_bool(yaml, "enabled").unwrap_or(true);
        let command_args = meta::command_spec(yaml)
            .map(|(_, args)| args)
            .unwrap_or_default();

        Template {
            summary: series.reference.summary.clone(),
            kind: series.target.kind,
            target: series.target.name.clone(),
            start,
            end,
            stop_type,
            repeat,
            enabled,
            is_override,
            start_spec: meta::time_spec(yaml, "start"),
            end_spec: meta::time_spec(yaml, "end"),
            command_args,
        }
    }

    /// Last active date of a series.
    ///
    /// An UNTIL earlier in the day than the series start time excludes
    /// the final day, so the date rolls back one. COUNT-limited series
    /// end on their last expanded occurrence; unbounded recurrences run
    /// to the guard date.
    fn range_end(&self, series: &Series) -> NaiveDate {
        let reference = &series.reference;
        match &reference.rrule {
            None => reference.dtstart.date(),
            Some(rule) => {
                if let Some(until) = rule.until {
                    if until.time() < reference.dtstart.time() {
                        return until.date().pred_opt().unwrap_or(until.date());
                    }
                    return until.date();
                }
                if rule.count.is_some() {
                    return series
                        .occurrences
                        .iter()
                        .map(|o| o.start.date())
                        .max()
                        .unwrap_or(reference.dtstart.date());
                }
                self.guard
            }
        }
    }

    /// Day token derivation: DAILY covers the week, WEEKLY follows
    /// BYDAY, everything else pins to the start weekday
    fn derive_days(&self, series: &Series) -> String {
        let reference = &series.reference;
        match &reference.rrule {
            Some(rule) if rule.freq == Freq::Daily => semantics::EVERY_DAY.to_string(),
            Some(rule) if rule.freq == Freq::Weekly && !rule.byday.is_empty() => {
                let mut days: Vec<Weekday> = rule.byday.clone();
                days.sort_by_key(|d| d.num_days_from_sunday());
                days.dedup();
                days.iter().map(|d| semantics::weekday_token(*d)).collect()
            }
            _ => semantics::weekday_token(reference.dtstart.weekday()).to_string(),
        }
    }

    /// Flattens ordered bundles into desired entries, overrides above
    /// their base, attaching manifest sidecars; enforces the entry cap
    fn flatten(&self, plan: &mut Plan) -> SyncResult<()> {
        let mut desired = Vec::new();
        let mut attempted = 0usize;

        for bundle in &plan.bundles {
            for intent in bundle.overrides.iter().chain(std::iter::once(&bundle.base)) {
                attempted += 1;
                let entry = match crate::sync::intent_to_entry(intent) {
                    Ok(entry) => entry,
                    Err(e) => {
                        plan.warnings.push(format!("{}: {e}", intent.uid));
                        continue;
                    }
                };
                let mut payload = serde_json::to_value(&entry)?;

                let src = self.identity_source(intent, &payload);
                let Some(identity) = identity::build_identity(&src, &self.holiday) else {
                    plan.warnings.push(format!(
                        "{}: identity incomplete for {}, entry dropped",
                        intent.uid, intent.template.target
                    ));
                    continue;
                };
                payload["_manifest"] = identity::sidecar(&identity, &payload, &intent.uid);
                desired.push(payload);
            }
        }

        if attempted > MAX_MANAGED_ENTRIES {
            return Err(SyncError::EntryLimitExceeded {
                limit: MAX_MANAGED_ENTRIES,
                attempted,
            });
        }

        plan.desired = desired;
        Ok(())
    }

    fn identity_source(&self, intent: &Intent, payload: &Value) -> IdentitySource {
        let end_date = if intent.template.kind == TargetKind::Command {
            intent.range.start
        } else {
            intent.range.end
        };
        IdentitySource {
            kind: intent.template.kind.as_str().to_string(),
            target: intent.template.target.clone(),
            days: intent.range.days.clone(),
            start_time: (
                payload["startTime"].as_str().unwrap_or_default().to_string(),
                identity::as_int(&payload["startTimeOffset"]).unwrap_or(0),
            ),
            end_time: (
                payload["endTime"].as_str().unwrap_or_default().to_string(),
                identity::as_int(&payload["endTimeOffset"]).unwrap_or(0),
            ),
            start_date: intent.range.start.format(semantics::DATE_FMT).to_string(),
            end_date: end_date.format(semantics::DATE_FMT).to_string(),
            current_year: self.current_year(),
        }
    }
}

/// Seeds chronological order, then bubbles more-specific bundles above
/// the bundles they dominate until stable
fn order_bundles(bundles: &mut Vec<Bundle>) {
    bundles.sort_by_key(|b| (b.base.range.start, window(&b.base).0));

    let mut passes = 0;
    loop {
        let mut moved = false;
        let mut i = 0;
        while i < bundles.len() {
            let mut j = i + 1;
            while j < bundles.len() {
                if overlaps(&bundles[i].base, &bundles[j].base)
                    && must_be_above(&bundles[j].base, &bundles[i].base)
                {
                    let lifted = bundles.remove(j);
                    bundles.insert(i, lifted);
                    moved = true;
                }
                j += 1;
            }
            i += 1;
        }
        passes += 1;
        if !moved || passes >= MAX_ORDER_PASSES {
            break;
        }
    }
}

/// Daily time window in minutes: (start, end), end may exceed 1440 for
/// windows that wrap midnight
fn window(intent: &Intent) -> (u32, u32) {
    let start = intent.template.start.time();
    let start_min = start.hour() * 60 + start.minute();
    let span = (intent.template.end - intent.template.start)
        .num_minutes()
        .clamp(1, 24 * 60) as u32;
    (start_min, start_min + span)
}

/// Whether two bundles can be active in the same minute: date ranges,
/// day selections and daily windows must all intersect
fn overlaps(a: &Intent, b: &Intent) -> bool {
    if a.range.start > b.range.end || b.range.start > a.range.end {
        return false;
    }

    let days_a = semantics::days_to_weekdays(&a.range.days);
    let days_b = semantics::days_to_weekdays(&b.range.days);
    if !days_a.iter().any(|d| days_b.contains(d)) {
        return false;
    }

    windows_intersect(window(a), window(b))
}

fn windows_intersect(a: (u32, u32), b: (u32, u32)) -> bool {
    const DAY: u32 = 24 * 60;
    let segments = |(start, end): (u32, u32)| {
        if end > DAY {
            vec![(start, DAY), (0, end - DAY)]
        } else {
            vec![(start, end)]
        }
    };
    for (s1, e1) in segments(a) {
        for (s2, e2) in segments(b) {
            if s1 < e2 && s2 < e1 {
                return true;
            }
        }
    }
    false
}

/// Host precedence: must `b` sit above `a`?
///
/// Containment beats window size beats later start: the host evaluates
/// top-down per minute, so the more specific schedule has to come first.
fn must_be_above(b: &Intent, a: &Intent) -> bool {
    let a_contains_b = a.range.start <= b.range.start
        && a.range.end >= b.range.end
        && (a.range.start, a.range.end) != (b.range.start, b.range.end);
    let b_contains_a = b.range.start <= a.range.start
        && b.range.end >= a.range.end
        && (a.range.start, a.range.end) != (b.range.start, b.range.end);
    if a_contains_b {
        return true;
    }
    if b_contains_a {
        return false;
    }

    let (a_start, a_end) = window(a);
    let (b_start, b_end) = window(b);
    let a_span = a_end - a_start;
    let b_span = b_end - b_start;
    if b_span != a_span {
        return b_span < a_span;
    }

    b_start > a_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ics::{Event, RRule}, runner, target::Target};
    use std::collections::BTreeMap;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    const NOW: &str = "2025-01-01 12:00:00";

    fn daily_series(uid: &str, start: &str, end: &str, until: &str) -> Series {
        let event = Event {
            uid: uid.to_string(),
            summary: "Show".to_string(),
            description: None,
            dtstart: dt(start),
            dtend: dt(end),
            all_day: false,
            rrule: Some(RRule {
                freq: Freq::Daily,
                interval: 1,
                byday: Vec::new(),
                until: Some(dt(until)),
                count: None,
            }),
            exdates: Vec::new(),
            recurrence_id: None,
        };
        let horizon = runner::run_horizon(dt(NOW));
        let occurrences =
            runner::expand_occurrences(&event, &BTreeMap::new(), &MetaMap::new(), horizon);
        Series {
            uid: uid.to_string(),
            reference: event,
            overrides: BTreeMap::new(),
            target: Target {
                kind: TargetKind::Playlist,
                name: "Show".to_string(),
            },
            yaml_base: MetaMap::new(),
            occurrences,
        }
    }

    fn range_of(series: &Series) -> (String, String) {
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(std::slice::from_ref(series)).expect("plan");
        let e = &plan.desired[plan.desired.len() - 1];
        (
            e["startDate"].as_str().unwrap_or_default().to_string(),
            e["endDate"].as_str().unwrap_or_default().to_string(),
        )
    }

    #[test]
    fn daily_series_produces_expected_entry() {
        let series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2025-12-31 23:59:59");
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[series]).expect("plan");
        assert_eq!(plan.desired.len(), 1);
        let e = &plan.desired[0];
        assert_eq!(e["day"], 7);
        assert_eq!(e["startTime"], "18:00:00");
        assert_eq!(e["endTime"], "23:00:00");
        assert_eq!(e["startDate"], "2025-01-01");
        assert_eq!(e["endDate"], "2025-12-31");
        assert_eq!(e["playlist"], "Show");
        assert_eq!(e["stopType"], 0);
        assert_eq!(e["repeat"], 1);
        assert_eq!(e["enabled"], 1);
        assert!(e["_manifest"]["id"].as_str().is_some());
    }

    #[test]
    fn until_before_start_time_rolls_back_a_day() {
        let series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2025-06-30 12:00:00");
        let (_, end) = range_of(&series);
        // 12:00 is before the 18:00 series start, so Jun 30 has no run
        assert_eq!(end, "2025-06-29");

        let series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2025-06-30 18:00:00");
        let (_, end) = range_of(&series);
        assert_eq!(end, "2025-06-30");
    }

    #[test]
    fn unbounded_recurrence_clamps_to_guard() {
        let mut series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2031-06-30 23:00:00");
        // Push UNTIL past the guard so clamping decides
        if let Some(rule) = &mut series.reference.rrule {
            rule.until = Some(dt("2031-06-30 23:00:00"));
        }
        let (_, end) = range_of(&series);
        assert_eq!(end, "2030-12-31");
    }

    #[test]
    fn bundle_starting_on_guard_date_is_dropped() {
        // 2030-12-31 is the guard date for a 2025 run; a range starting
        // there is already out of bounds
        let series = daily_series("u1", "2030-12-31 18:00:00", "2030-12-31 23:00:00", "2031-06-30 23:00:00");
        assert!(!series.occurrences.is_empty());
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[series]).expect("plan");
        assert!(plan.desired.is_empty());
        assert!(plan.warnings.iter().any(|w| w.contains("guard")));
    }

    #[test]
    fn containment_puts_specific_bundle_first() {
        let season = daily_series("a", "2025-11-01 18:00:00", "2025-11-01 23:00:00", "2025-12-31 23:59:59");
        let christmas = daily_series("b", "2025-12-24 19:00:00", "2025-12-24 22:00:00", "2025-12-26 23:59:59");
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[season, christmas]).expect("plan");
        let uids: Vec<_> = plan
            .desired
            .iter()
            .map(|e| e["_manifest"]["uid"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(uids, vec!["b", "a"]);
    }

    #[test]
    fn narrower_window_wins_without_containment() {
        let wide = daily_series("wide", "2025-06-01 17:00:00", "2025-06-01 23:00:00", "2025-08-31 23:59:59");
        let narrow = daily_series("narrow", "2025-07-01 19:00:00", "2025-07-01 21:00:00", "2025-09-15 23:59:59");
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[wide, narrow]).expect("plan");
        let uids: Vec<_> = plan
            .desired
            .iter()
            .map(|e| e["_manifest"]["uid"].as_str().unwrap_or_default().to_string())
            .collect();
        // Ranges overlap but neither contains the other; the 2h window
        // must sit above the 6h window
        assert_eq!(uids, vec!["narrow", "wide"]);
    }

    #[test]
    fn equal_windows_order_by_later_start() {
        let early = daily_series("early", "2025-06-01 18:00:00", "2025-06-01 20:00:00", "2025-08-31 23:59:59");
        let late = daily_series("late", "2025-07-01 19:00:00", "2025-07-01 21:00:00", "2025-09-15 23:59:59");
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[early, late]).expect("plan");
        let uids: Vec<_> = plan
            .desired
            .iter()
            .map(|e| e["_manifest"]["uid"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(uids, vec!["late", "early"]);
    }

    #[test]
    fn disjoint_bundles_keep_chronological_order() {
        let b = daily_series("b", "2025-07-01 18:00:00", "2025-07-01 23:00:00", "2025-07-31 23:59:59");
        let a = daily_series("a", "2025-06-01 18:00:00", "2025-06-01 23:00:00", "2025-06-30 23:59:59");
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[b, a]).expect("plan");
        let uids: Vec<_> = plan
            .desired
            .iter()
            .map(|e| e["_manifest"]["uid"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(uids, vec!["a", "b"]);
    }

    #[test]
    fn overrides_flatten_above_their_base() {
        let mut series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2025-01-10 23:59:59");
        let mut replacement = series.reference.clone();
        replacement.dtstart = dt("2025-01-05 20:00:00");
        replacement.dtend = dt("2025-01-05 22:00:00");
        replacement.recurrence_id = Some(dt("2025-01-05 18:00:00"));
        series
            .overrides
            .insert(dt("2025-01-05 18:00:00"), replacement);
        let horizon = runner::run_horizon(dt(NOW));
        series.occurrences = runner::expand_occurrences(
            &series.reference,
            &series.overrides,
            &series.yaml_base,
            horizon,
        );

        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[series]).expect("plan");
        assert_eq!(plan.desired.len(), 2);
        // Override first: single-day entry above the recurring base
        assert_eq!(plan.desired[0]["startDate"], "2025-01-05");
        assert_eq!(plan.desired[0]["endDate"], "2025-01-05");
        assert_eq!(plan.desired[0]["startTime"], "20:00:00");
        assert_eq!(plan.desired[1]["startDate"], "2025-01-01");
    }

    #[test]
    fn entry_cap_fails_the_run_with_attempt_count() {
        let mut all = Vec::new();
        for i in 0..101 {
            let day = 1 + (i % 28);
            let month = 1 + (i / 28) as u32;
            let start = format!("2025-{:02}-{:02} 18:00:00", month, day);
            let end = format!("2025-{:02}-{:02} 19:00:00", month, day);
            let mut s = daily_series(&format!("u{i}"), &start, &end, &end);
            s.reference.rrule = None;
            let horizon = runner::run_horizon(dt(NOW));
            s.occurrences = runner::expand_occurrences(
                &s.reference,
                &BTreeMap::new(),
                &MetaMap::new(),
                horizon,
            );
            all.push(s);
        }
        let planner = Planner::new(dt(NOW));
        match planner.plan(&all) {
            Err(SyncError::EntryLimitExceeded { limit, attempted }) => {
                assert_eq!(limit, 100);
                assert_eq!(attempted, 101);
            }
            other => panic!("expected limit error, got {other:?}"),
        }
    }

    #[test]
    fn yaml_metadata_shapes_the_entry() {
        let mut series = daily_series("u1", "2025-01-01 18:00:00", "2025-01-01 23:00:00", "2025-03-31 23:59:59");
        series.yaml_base = meta::parse_description(
            "stopType: hard\nrepeat: none\nenabled: false\nstart:\n  time: SunSet\n  offset: -30",
        );
        // Re-expand so occurrences carry the metadata
        let horizon = runner::run_horizon(dt(NOW));
        series.occurrences = runner::expand_occurrences(
            &series.reference,
            &BTreeMap::new(),
            &series.yaml_base,
            horizon,
        );
        let planner = Planner::new(dt(NOW));
        let plan = planner.plan(&[series]).expect("plan");
        let e = &plan.desired[0];
        assert_eq!(e["stopType"], 1);
        assert_eq!(e["repeat"], 0);
        assert_eq!(e["enabled"], 0);
        assert_eq!(e["startTime"], "SunSet");
        assert_eq!(e["startTimeOffset"], -30);
    }

    #[test]
    fn window_wraps_midnight() {
        assert!(windows_intersect((23 * 60, 25 * 60), (0, 60)));
        assert!(!windows_intersect((23 * 60, 24 * 60), (0, 60)));
    }
}
