//! Status payloads consumed by the host UI.
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

use serde_json::{Value, json};

use crate::{
    apply::{self, Counts},
    conf::Conf,
};

/// Plan summary: the run shape (series, bundles, desired) and change
/// counts, nothing else.
pub async fn plan_status(conf: &Conf) -> Value {
    match apply::preview(conf).await {
        Ok(preview) => json!({
            "ok": true,
            "counts": Counts::from_preview(&preview),
            "warnings": preview.warnings,
        }),
        Err(e) => json!({ "ok": false, "error": e.to_status_json() }),
    }
}

/// Full diff payload: change sets plus the raw inputs they were computed
/// from.
pub async fn plan_diff(conf: &Conf) -> Value {
    match apply::preview(conf).await {
        Ok(preview) => {
            let updates: Vec<Value> = preview
                .diff
                .updates
                .iter()
                .map(|(existing, desired)| json!({ "existing": existing, "desired": desired }))
                .collect();
            json!({
                "ok": true,
                "counts": Counts::from_preview(&preview),
                "diff": {
                    "creates": preview.diff.creates,
                    "updates": updates,
                    "deletes": preview.diff.deletes,
                    "desiredEntries": preview.plan.desired,
                    "existingRaw": preview.existing,
                },
                "warnings": preview.warnings,
            })
        }
        Err(e) => json!({ "ok": false, "error": e.to_status_json() }),
    }
}

/// Apply outcome in the shape the UI expects.
pub async fn apply_status(conf: &Conf) -> Value {
    match apply::apply(conf).await {
        Ok(report) => {
            let mut out = json!({
                "ok": true,
                "counts": report.counts,
                "warnings": report.warnings,
            });
            if report.dry_run {
                out["dryRun"] = json!(true);
            }
            if report.noop {
                out["noop"] = json!(true);
            }
            if let Some(backup) = &report.backup {
                out["backup"] = json!(backup.display().to_string());
            }
            out
        }
        Err(e) => json!({ "ok": false, "error": e.to_status_json() }),
    }
}
