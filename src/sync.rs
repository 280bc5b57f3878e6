//! Scheduler file mechanics: intent mapping and atomic schedule.json I/O.
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
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use chrono::{Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{SyncError, SyncResult},
    planner::Intent,
    semantics::{self, TargetKind},
};

/// A host scheduler entry as written to `schedule.json`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Entry {
    pub enabled: u8,
    pub sequence: u8,
    pub day: u8,
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    #[serde(rename = "startTimeOffset")]
    pub start_time_offset: i32,
    #[serde(rename = "endTimeOffset")]
    pub end_time_offset: i32,
    pub repeat: i64,
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    #[serde(rename = "stopType")]
    pub stop_type: u8,
    pub playlist: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Maps a planner intent to a host scheduler entry.
///
/// Pure; no I/O and no retained state. Playlists and sequences ride the
/// playlist slot (sequences flagged with `sequence = 1`); commands ride
/// the command slot, run for one minute and pin `endDate` to
/// `startDate`.
pub fn intent_to_entry(intent: &Intent) -> SyncResult<Entry> {
    let template = &intent.template;
    if template.target.trim().is_empty() {
        return Err(SyncError::InvalidIntent("empty target".to_string()));
    }

    let start = template.start;
    let end = match template.kind {
        TargetKind::Command => start + Duration::minutes(1),
        _ => template.end,
    };
    if end < start {
        return Err(SyncError::InvalidIntent(format!(
            "{}: end precedes start",
            template.target
        )));
    }

    let start_date = intent.range.start.format(semantics::DATE_FMT).to_string();
    let end_date = match template.kind {
        TargetKind::Command => start_date.clone(),
        _ => intent.range.end.format(semantics::DATE_FMT).to_string(),
    };

    let (start_time, start_time_offset) = match &template.start_spec {
        Some(spec) => (spec.token(), spec.offset()),
        None => (start.time().format(semantics::TIME_FMT).to_string(), 0),
    };
    let (end_time, end_time_offset) = match (&template.kind, &template.end_spec) {
        (TargetKind::Command, _) => (end.time().format(semantics::TIME_FMT).to_string(), 0),
        (_, Some(spec)) => (spec.token(), spec.offset()),
        (_, None) => (semantics::end_time_label(start, end), 0),
    };

    let (playlist, sequence, command, args) = match template.kind {
        TargetKind::Playlist => (template.target.clone(), 0, String::new(), Vec::new()),
        TargetKind::Sequence => (template.target.clone(), 1, String::new(), Vec::new()),
        TargetKind::Command => (
            String::new(),
            0,
            template.target.clone(),
            template.command_args.clone(),
        ),
    };

    Ok(Entry {
        enabled: u8::from(template.enabled),
        sequence,
        day: semantics::day_code(&intent.range.days, start.weekday()),
        start_time,
        end_time,
        start_time_offset,
        end_time_offset,
        repeat: template.repeat.encode(),
        start_date,
        end_date,
        stop_type: template.stop_type.code(),
        playlist,
        command,
        args,
    })
}

/// Reads the scheduler file, treating every failure as an empty file.
///
/// Used for planning and diffing, where a missing or corrupt file just
/// means "nothing is scheduled yet". The warning, if any, is surfaced in
/// the run report.
pub fn read_lenient(path: &Path) -> (Vec<Value>, Option<String>) {
    match read_strict(path) {
        Ok(entries) => (entries, None),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "scheduler file unreadable, treating as empty");
            (Vec::new(), Some(e.to_string()))
        }
    }
}

/// Reads the scheduler file, failing on anything but a missing file.
///
/// Apply uses this: refusing to rewrite a file we cannot parse keeps a
/// corrupt-but-recoverable file out of the blast radius.
pub fn read_strict(path: &Path) -> SyncResult<Vec<Value>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SyncError::ScheduleUnreadable(e.to_string())),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(_) => Err(SyncError::ScheduleUnreadable(
            "top-level value is not an array".to_string(),
        )),
        Err(e) => Err(SyncError::ScheduleUnreadable(e.to_string())),
    }
}

/// Copies the scheduler file aside before a rewrite.
///
/// # Returns
/// * The backup path, or None when there was nothing to back up
pub fn backup(path: &Path) -> SyncResult<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let backup_path = PathBuf::from(format!("{}.bak-{stamp}", path.display()));
    fs::copy(path, &backup_path)?;
    Ok(Some(backup_path))
}

/// Atomically replaces the scheduler file.
///
/// Pretty JSON with a trailing newline is encoded into a pid-stamped
/// temp file held under an exclusive lock, given the prior file's
/// permissions, then renamed into place. A failed rename unlinks the
/// temp file so no debris survives.
pub fn write_atomic(path: &Path, entries: &[Value]) -> SyncResult<()> {
    let mut body = serde_json::to_string_pretty(&Value::Array(entries.to_vec()))?;
    body.push('\n');

    let tmp = PathBuf::from(format!("{}.tmp-{}", path.display(), std::process::id()));
    let result = (|| -> SyncResult<()> {
        let mut file = fs::File::create(&tmp)?;
        file.lock()?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;

        if let Ok(prior) = fs::metadata(path) {
            fs::set_permissions(&tmp, prior.permissions())?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Post-write verification: every expected managed id must be present
/// and every deleted id absent.
pub fn verify(path: &Path, expected: &[String], deleted: &[String]) -> SyncResult<()> {
    let entries = read_strict(path)?;
    let present: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["_manifest"]["id"].as_str())
        .collect();

    for id in expected {
        if !present.contains(&id.as_str()) {
            return Err(SyncError::VerifyFailed(format!(
                "expected entry {id} missing after write"
            )));
        }
    }
    for id in deleted {
        if present.contains(&id.as_str()) {
            return Err(SyncError::VerifyFailed(format!(
                "deleted entry {id} still present after write"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        planner::{DateRange, Template},
        semantics::{Repeat, StopType, SymbolicTime, TimeSpec},
    };
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn intent(kind: TargetKind, target: &str) -> Intent {
        Intent {
            uid: "u1".to_string(),
            template: Template {
                summary: target.to_string(),
                kind,
                target: target.to_string(),
                start: dt("2025-01-01 18:00:00"),
                end: dt("2025-01-01 23:00:00"),
                stop_type: StopType::Graceful,
                repeat: Repeat::Immediate,
                enabled: true,
                is_override: false,
                start_spec: None,
                end_spec: None,
                command_args: Vec::new(),
            },
            range: DateRange {
                start: date("2025-01-01"),
                end: date("2025-12-31"),
                days: "SuMoTuWeThFrSa".to_string(),
            },
        }
    }

    #[test]
    fn playlist_mapping() {
        let e = intent_to_entry(&intent(TargetKind::Playlist, "Show")).expect("entry");
        assert_eq!(e.playlist, "Show");
        assert_eq!(e.command, "");
        assert_eq!(e.sequence, 0);
        assert_eq!(e.day, 7);
        assert_eq!(e.start_time, "18:00:00");
        assert_eq!(e.end_time, "23:00:00");
        assert_eq!(e.start_date, "2025-01-01");
        assert_eq!(e.end_date, "2025-12-31");
    }

    #[test]
    fn sequence_rides_playlist_slot_flagged() {
        let e = intent_to_entry(&intent(TargetKind::Sequence, "Glow")).expect("entry");
        assert_eq!(e.playlist, "Glow");
        assert_eq!(e.sequence, 1);
        assert_eq!(e.command, "");
    }

    #[test]
    fn command_runs_one_minute_same_day() {
        let mut i = intent(TargetKind::Command, "Volume Set");
        i.template.command_args = vec!["70".to_string()];
        let e = intent_to_entry(&i).expect("entry");
        assert_eq!(e.command, "Volume Set");
        assert_eq!(e.playlist, "");
        assert_eq!(e.args, vec!["70".to_string()]);
        assert_eq!(e.end_time, "18:01:00");
        assert_eq!(e.end_date, e.start_date);
    }

    #[test]
    fn symbolic_specs_override_clock_times() {
        let mut i = intent(TargetKind::Playlist, "Show");
        i.template.start_spec = Some(TimeSpec::Symbolic(SymbolicTime::SunSet, -30));
        i.template.end_spec = Some(TimeSpec::Symbolic(SymbolicTime::Dusk, 15));
        let e = intent_to_entry(&i).expect("entry");
        assert_eq!(e.start_time, "SunSet");
        assert_eq!(e.start_time_offset, -30);
        assert_eq!(e.end_time, "Dusk");
        assert_eq!(e.end_time_offset, 15);
    }

    #[test]
    fn midnight_end_renders_as_24() {
        let mut i = intent(TargetKind::Playlist, "Show");
        i.template.start = dt("2025-12-25 17:00:00");
        i.template.end = dt("2025-12-26 00:00:00");
        let e = intent_to_entry(&i).expect("entry");
        assert_eq!(e.end_time, "24:00:00");
    }

    #[test]
    fn empty_target_is_rejected() {
        let mut i = intent(TargetKind::Playlist, "Show");
        i.template.target = "  ".to_string();
        assert!(matches!(
            intent_to_entry(&i),
            Err(SyncError::InvalidIntent(_))
        ));
    }

    #[test]
    fn atomic_write_is_pretty_with_trailing_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        let entries = vec![json!({"playlist": "Show", "enabled": 1})];
        write_atomic(&path, &entries).expect("write");

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.ends_with('\n'));
        assert!(text.contains("  \"playlist\""));
        let (reread, warning) = read_lenient(&path);
        assert_eq!(reread, entries);
        assert!(warning.is_none());
        // No temp debris left behind
        assert_eq!(fs::read_dir(dir.path()).expect("dir").count(), 1);
    }

    #[test]
    fn lenient_read_swallows_corruption_strict_does_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        fs::write(&path, "{not json").expect("write");

        let (entries, warning) = read_lenient(&path);
        assert!(entries.is_empty());
        assert!(warning.is_some());
        assert!(matches!(
            read_strict(&path),
            Err(SyncError::ScheduleUnreadable(_))
        ));
    }

    #[test]
    fn missing_file_reads_as_empty_in_both_modes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        assert!(read_strict(&path).expect("strict").is_empty());
        let (entries, warning) = read_lenient(&path);
        assert!(entries.is_empty());
        assert!(warning.is_none());
    }

    #[test]
    fn backup_copies_with_timestamp_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        fs::write(&path, "[]\n").expect("write");

        let backup_path = backup(&path).expect("backup").expect("created");
        assert!(backup_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("schedule.json.bak-"))
            .unwrap_or(false));
        assert_eq!(fs::read_to_string(&backup_path).expect("read"), "[]\n");

        let missing = dir.path().join("absent.json");
        assert!(backup(&missing).expect("backup").is_none());
    }

    #[test]
    fn verify_checks_presence_and_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        let entries = vec![json!({"playlist": "Show", "_manifest": {"id": "abc"}})];
        write_atomic(&path, &entries).expect("write");

        verify(&path, &["abc".to_string()], &["gone".to_string()]).expect("verify");
        assert!(verify(&path, &["missing".to_string()], &[]).is_err());
        assert!(verify(&path, &[], &["abc".to_string()]).is_err());
    }
}
