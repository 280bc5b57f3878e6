//! Plan execution: preview, apply and single-step rollback.
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

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::{
    conf::Conf,
    diff::{self, Diff},
    envfile::{self, EnvInfo},
    error::SyncResult,
    manifest::{self, ManifestStore, Snapshot},
    planner::{Plan, Planner},
    runner, sync,
};

/// Run counts surfaced to the status endpoints: the shape of the plan
/// (series, bundles, desired entries) plus the change sets it produced
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Counts {
    pub series: usize,
    pub bundles: usize,
    pub desired: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl Counts {
    /// Full run counts for a computed preview
    pub fn from_preview(preview: &Preview) -> Counts {
        let (creates, updates, deletes) = preview.diff.counts();
        Counts {
            series: preview.series_count,
            bundles: preview.plan.bundles.len(),
            desired: preview.plan.desired.len(),
            creates,
            updates,
            deletes,
        }
    }
}

/// Everything a plan run produced, up to but not including any write
pub struct Preview {
    pub series_count: usize,
    pub plan: Plan,
    pub existing: Vec<Value>,
    pub diff: Diff,
    pub warnings: Vec<String>,
}

/// Result of an apply invocation
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub ok: bool,
    pub dry_run: bool,
    pub noop: bool,
    pub counts: Counts,
    pub backup: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Host wall-clock "now" derived from the exported environment
pub fn host_now(env: &EnvInfo) -> NaiveDateTime {
    Utc::now().with_timezone(&env.tz()).naive_local()
}

/// Loads the exported environment, or defaults (UTC, no coordinates)
pub fn load_env(conf: &Conf) -> EnvInfo {
    envfile::load(&conf.env_file_path()).unwrap_or_default()
}

/// Computes the full plan and diff without touching any file.
pub async fn preview(conf: &Conf) -> SyncResult<Preview> {
    let env = load_env(conf);
    let now = host_now(&env);
    preview_at(conf, &env, now).await
}

/// Deterministic preview with an injected clock
pub async fn preview_at(conf: &Conf, env: &EnvInfo, now: NaiveDateTime) -> SyncResult<Preview> {
    let mut run = runner::collect_series(conf, env, now).await;
    let planner = Planner::new(now);
    let mut plan = planner.plan(&run.series)?;

    let (existing, read_warning) = sync::read_lenient(&conf.schedule_path());
    let diff = diff::compute(&plan.desired, &existing, planner.current_year(), planner.holiday());

    let mut warnings = Vec::new();
    warnings.append(&mut run.warnings);
    warnings.append(&mut plan.warnings);
    warnings.extend(read_warning);

    Ok(Preview {
        series_count: run.series.len(),
        plan,
        existing,
        diff,
        warnings,
    })
}

/// Executes the computed plan against `schedule.json`.
///
/// The sole write boundary. The plan is recomputed from config so the
/// applied change matches a preview taken under the same inputs. With
/// dry-run configured the plan is returned unwritten.
pub async fn apply(conf: &Conf) -> SyncResult<ApplyReport> {
    let env = load_env(conf);
    let now = host_now(&env);
    apply_at(conf, &env, now).await
}

/// Deterministic apply with an injected clock
pub async fn apply_at(conf: &Conf, env: &EnvInfo, now: NaiveDateTime) -> SyncResult<ApplyReport> {
    let preview = preview_at(conf, env, now).await?;
    let counts = Counts::from_preview(&preview);
    let mut warnings = preview.warnings;

    if conf.dry_run() {
        warnings.push("Apply blocked while dry-run enabled".to_string());
        return Ok(ApplyReport {
            ok: true,
            dry_run: true,
            noop: false,
            counts,
            backup: None,
            warnings,
        });
    }

    if preview.diff.is_noop() {
        return Ok(ApplyReport {
            ok: true,
            dry_run: false,
            noop: true,
            counts,
            backup: None,
            warnings,
        });
    }

    let schedule_path = conf.schedule_path();
    // Strict read: a corrupt file must abort before any write
    let existing = sync::read_strict(&schedule_path)?;
    let planner = Planner::new(now);

    let desired = &preview.plan.desired;
    let desired_ids: Vec<String> = desired
        .iter()
        .filter_map(|e| e["_manifest"]["id"].as_str().map(str::to_string))
        .collect();
    let by_id: HashMap<&str, &Value> = desired
        .iter()
        .filter_map(|e| e["_manifest"]["id"].as_str().map(|id| (id, e)))
        .collect();
    let adopted_ids: HashSet<String> = preview
        .diff
        .updates
        .iter()
        .filter(|(existing, _)| !diff::is_managed(existing))
        .filter_map(|(_, desired)| desired["_manifest"]["id"].as_str().map(str::to_string))
        .collect();

    // Walk the file in order: unmanaged entries stay put (unless they
    // were adopted), managed entries are substituted or dropped, new
    // entries append in planner order
    let mut next_file: Vec<Value> = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();
    for entry in &existing {
        match diff::managed_id(entry, planner.current_year(), planner.holiday()) {
            Some(id) => {
                if let Some(desired_entry) = by_id.get(id.as_str()) {
                    if placed.insert(id.clone()) {
                        next_file.push((*desired_entry).clone());
                    }
                    // A second occurrence of the same id is stale noise
                }
                // Not desired anymore: dropped
            }
            None => {
                // Adoption consumes the unmanaged slot in place
                let adopted = crate::identity::identity_from_entry(
                    entry,
                    planner.current_year(),
                    planner.holiday(),
                )
                .map(|identity| crate::identity::identity_id(&identity))
                .filter(|id| adopted_ids.contains(id) && !placed.contains(id))
                .and_then(|id| by_id.get(id.as_str()).map(|e| (id, *e)));
                match adopted {
                    Some((id, desired_entry)) => {
                        placed.insert(id);
                        next_file.push(desired_entry.clone());
                    }
                    None => next_file.push(entry.clone()),
                }
            }
        }
    }
    for (id, entry) in desired_ids.iter().zip(desired.iter()) {
        if placed.insert(id.clone()) {
            next_file.push(entry.clone());
        }
    }

    let backup = sync::backup(&schedule_path)?;
    sync::write_atomic(&schedule_path, &next_file)?;

    let deleted_ids: Vec<String> = preview
        .diff
        .deletes
        .iter()
        .filter_map(|e| {
            diff::managed_id(e, planner.current_year(), planner.holiday())
        })
        .filter(|id| !placed.contains(id))
        .collect();
    sync::verify(&schedule_path, &desired_ids, &deleted_ids)?;

    // The scheduler file is live; a manifest failure from here on is a
    // warning, not a rollback
    let applied_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let snapshot = manifest::snapshot_from_desired(&applied_at, desired);
    let store = ManifestStore::new(conf.manifest_path());
    if let Err(e) = store.commit(conf.ics_url(), snapshot) {
        warnings.push(format!("manifest commit failed after apply: {e}"));
    }

    info!(
        creates = counts.creates,
        updates = counts.updates,
        deletes = counts.deletes,
        "schedule applied"
    );

    Ok(ApplyReport {
        ok: true,
        dry_run: false,
        noop: false,
        counts,
        backup,
        warnings,
    })
}

/// Restores the scheduler file to the previous applied snapshot.
///
/// Managed entries are rewritten from the snapshot payloads; unmanaged
/// entries keep their current state and order. One undo level only.
pub fn rollback(conf: &Conf) -> SyncResult<ApplyReport> {
    let store = ManifestStore::new(conf.manifest_path());
    let snapshot = store.rollback()?;

    let schedule_path = conf.schedule_path();
    let existing = sync::read_strict(&schedule_path)?;
    let next_file = rebuild_from_snapshot(&existing, &snapshot);

    let backup = sync::backup(&schedule_path)?;
    sync::write_atomic(&schedule_path, &next_file)?;
    sync::verify(&schedule_path, &snapshot.order, &[])?;

    Ok(ApplyReport {
        ok: true,
        dry_run: false,
        noop: false,
        counts: Counts::default(),
        backup,
        warnings: Vec::new(),
    })
}

/// In-place walk substituting snapshot payloads for managed entries
fn rebuild_from_snapshot(existing: &[Value], snapshot: &Snapshot) -> Vec<Value> {
    let by_id: HashMap<&str, &Value> = snapshot
        .entries
        .iter()
        .map(|e| (e.id.as_str(), &e.payload))
        .collect();

    let mut next_file: Vec<Value> = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();
    for entry in existing {
        match entry["_manifest"]["id"].as_str() {
            Some(id) => {
                if let Some(payload) = by_id.get(id) {
                    if placed.insert(id.to_string()) {
                        next_file.push((*payload).clone());
                    }
                }
            }
            None => next_file.push(entry.clone()),
        }
    }
    for id in &snapshot.order {
        if let Some(payload) = by_id.get(id.as_str()) {
            if placed.insert(id.clone()) {
                next_file.push((*payload).clone());
            }
        }
    }
    next_file
}
