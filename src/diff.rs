//! Change-set computation between desired and existing scheduler entries.
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

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::{holiday::HolidayResolver, identity};

/// Legacy managed marker carried in an entry's `args` array
const LEGACY_TAG_PREFIX: &str = "|M|GCS:v1|";

/// Field set the comparator judges equality over
const COMPARE_FIELDS: [&str; 10] = [
    "startDate",
    "endDate",
    "day",
    "startTime",
    "endTime",
    "playlist",
    "sequence",
    "repeat",
    "stopType",
    "command",
];

/// Computed change sets. Sets, not sequences: apply preserves planner
/// order on its own.
#[derive(Debug, Default)]
pub struct Diff {
    pub creates: Vec<Value>,
    /// (existing, desired) pairs
    pub updates: Vec<(Value, Value)>,
    pub deletes: Vec<Value>,
}

impl Diff {
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// (creates, updates, deletes) for status payloads
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.creates.len(), self.updates.len(), self.deletes.len())
    }
}

/// Whether an existing entry is owned by this system
pub fn is_managed(entry: &Value) -> bool {
    if entry["_manifest"]["id"].as_str().is_some() {
        return true;
    }
    has_legacy_tag(entry)
}

fn has_legacy_tag(entry: &Value) -> bool {
    entry["args"]
        .as_array()
        .map(|args| {
            args.iter()
                .filter_map(Value::as_str)
                .any(|a| a.starts_with(LEGACY_TAG_PREFIX))
        })
        .unwrap_or(false)
}

/// Manifest id of a managed entry.
///
/// Sidecar-tagged entries carry it directly; legacy-tagged entries get
/// it re-derived from their fields. None means the entry cannot be
/// matched and is left alone (treated as unmanaged).
pub fn managed_id(entry: &Value, current_year: i32, holiday: &HolidayResolver) -> Option<String> {
    if let Some(id) = entry["_manifest"]["id"].as_str() {
        return Some(id.to_string());
    }
    if has_legacy_tag(entry) {
        return identity::identity_from_entry(entry, current_year, holiday)
            .map(|identity| identity::identity_id(&identity));
    }
    None
}

/// Computes CREATE/UPDATE/DELETE between the desired entry list and the
/// current scheduler file.
///
/// Unmanaged entries are untouched unless adopted: a desired entry with
/// no managed counterpart scans the unmanaged pool for one whose derived
/// identity id matches exactly, and claims it as an UPDATE. Adoption
/// needs a planner UID on the desired side; without one the entry is a
/// plain CREATE. Duplicate desired ids keep the first occurrence.
pub fn compute(
    desired: &[Value],
    existing: &[Value],
    current_year: i32,
    holiday: &HolidayResolver,
) -> Diff {
    let mut diff = Diff::default();

    // Partition the file: managed indexed by id, unmanaged as an
    // adoption pool
    let mut managed: BTreeMap<String, &Value> = BTreeMap::new();
    let mut unmanaged: Vec<(usize, &Value)> = Vec::new();
    for (idx, entry) in existing.iter().enumerate() {
        match managed_id(entry, current_year, holiday) {
            Some(id) => {
                // First occurrence of an id wins; duplicates are stale
                managed.entry(id).or_insert(entry);
            }
            None => unmanaged.push((idx, entry)),
        }
    }

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in desired {
        let Some(id) = entry["_manifest"]["id"].as_str() else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }

        if let Some(current) = managed.get(id) {
            // The comparator misses behavior-only fields (enabled, the
            // time offsets); the behavioral hash catches those
            let hash_changed = match (
                current["_manifest"]["hash"].as_str(),
                entry["_manifest"]["hash"].as_str(),
            ) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            };
            if hash_changed || !entries_equal(current, entry) {
                diff.updates.push(((*current).clone(), entry.clone()));
            }
            continue;
        }

        // Adoption requires a stable planner UID to avoid aliasing
        let has_uid = entry["_manifest"]["uid"].as_str().is_some();
        let adopted = has_uid
            .then(|| {
                unmanaged.iter().find(|(idx, candidate)| {
                    !consumed.contains(idx)
                        && identity::identity_from_entry(candidate, current_year, holiday)
                            .map(|identity| identity::identity_id(&identity) == id)
                            .unwrap_or(false)
                })
            })
            .flatten();

        match adopted {
            Some((idx, candidate)) => {
                consumed.insert(*idx);
                diff.updates.push(((*candidate).clone(), entry.clone()));
            }
            None => diff.creates.push(entry.clone()),
        }
    }

    for (id, entry) in &managed {
        if !seen.contains(id) {
            diff.deletes.push((*entry).clone());
        }
    }

    diff
}

/// Canonical-field equality between two scheduler entries.
///
/// Derived type/target plus the shared field set, with numerics coerced
/// so `"1"` and `1` compare equal regardless of who wrote the file.
pub fn entries_equal(a: &Value, b: &Value) -> bool {
    if derived_type(a) != derived_type(b) {
        return false;
    }
    COMPARE_FIELDS.iter().all(|field| {
        let (va, vb) = (&a[*field], &b[*field]);
        match (identity::as_int(va), identity::as_int(vb)) {
            (Some(ia), Some(ib)) => ia == ib,
            _ => normalized_str(va) == normalized_str(vb),
        }
    })
}

/// (type, target) as the identity model sees an entry
fn derived_type(entry: &Value) -> (String, String) {
    let playlist = entry["playlist"].as_str().unwrap_or_default();
    let command = entry["command"].as_str().unwrap_or_default();
    if !command.is_empty() {
        ("command".to_string(), command.to_string())
    } else if identity::as_int(&entry["sequence"]).unwrap_or(0) == 1 {
        ("sequence".to_string(), playlist.to_string())
    } else {
        ("playlist".to_string(), playlist.to_string())
    }
}

fn normalized_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn holiday() -> HolidayResolver {
        HolidayResolver::new()
    }

    fn desired_entry(id: &str, uid: Option<&str>) -> Value {
        let mut manifest = json!({"id": id, "identity": {}, "hash": "h"});
        if let Some(uid) = uid {
            manifest["uid"] = json!(uid);
        }
        json!({
            "enabled": 1,
            "sequence": 0,
            "day": 7,
            "startTime": "18:00:00",
            "endTime": "23:00:00",
            "startTimeOffset": 0,
            "endTimeOffset": 0,
            "repeat": 1,
            "startDate": "2025-01-01",
            "endDate": "2025-12-31",
            "stopType": 0,
            "playlist": "Show",
            "command": "",
            "_manifest": manifest,
        })
    }

    #[test]
    fn fresh_desired_entries_are_creates() {
        let desired = vec![desired_entry("id1", Some("u1"))];
        let diff = compute(&desired, &[], 2025, &holiday());
        assert_eq!(diff.counts(), (1, 0, 0));
    }

    #[test]
    fn matching_managed_entry_is_a_noop() {
        let desired = vec![desired_entry("id1", Some("u1"))];
        let existing = vec![desired_entry("id1", Some("u1"))];
        let diff = compute(&desired, &existing, 2025, &holiday());
        assert!(diff.is_noop());
    }

    #[test]
    fn changed_managed_entry_is_an_update() {
        let desired = vec![desired_entry("id1", Some("u1"))];
        let mut existing = desired_entry("id1", Some("u1"));
        existing["endTime"] = json!("22:00:00");
        let diff = compute(&desired, &[existing], 2025, &holiday());
        assert_eq!(diff.counts(), (0, 1, 0));
    }

    #[test]
    fn behavior_only_change_surfaces_through_the_hash() {
        // enabled is outside the comparator field set; only the
        // behavioral hash distinguishes these two
        let mut desired = desired_entry("id1", Some("u1"));
        desired["enabled"] = json!(0);
        desired["_manifest"]["hash"] = json!("h-disabled");
        let existing = desired_entry("id1", Some("u1"));
        let diff = compute(&[desired], &[existing], 2025, &holiday());
        assert_eq!(diff.counts(), (0, 1, 0));
    }

    #[test]
    fn vanished_managed_entry_is_a_delete() {
        let existing = vec![desired_entry("id1", Some("u1"))];
        let diff = compute(&[], &existing, 2025, &holiday());
        assert_eq!(diff.counts(), (0, 0, 1));
    }

    #[test]
    fn unmanaged_entries_are_left_alone() {
        let existing = vec![json!({"playlist": "Hand Made", "day": 7, "startTime": "10:00:00"})];
        let diff = compute(&[], &existing, 2025, &holiday());
        assert!(diff.is_noop());
    }

    #[test]
    fn adoption_claims_identity_equal_unmanaged_entry() {
        // Hand-written entry: concrete Christmas date, no sidecar
        let existing = json!({
            "enabled": 1,
            "sequence": 0,
            "day": 7,
            "startTime": "17:00:00",
            "endTime": "24:00:00",
            "startTimeOffset": 0,
            "endTimeOffset": 0,
            "repeat": 1,
            "startDate": "2025-12-25",
            "endDate": "2025-12-25",
            "stopType": 0,
            "playlist": "Christmas",
            "command": "",
        });
        // Desired twin computed from the calendar
        let derived = identity::identity_from_entry(&existing, 2025, &holiday())
            .expect("identity");
        let id = identity::identity_id(&derived);
        let mut desired = existing.clone();
        desired["_manifest"] = json!({"id": id, "identity": derived, "hash": "h", "uid": "u1"});

        let diff = compute(&[desired], &[existing], 2025, &holiday());
        assert_eq!(diff.counts(), (0, 1, 0));
    }

    #[test]
    fn adoption_requires_planner_uid() {
        let existing = json!({
            "day": 7,
            "startTime": "17:00:00",
            "endTime": "24:00:00",
            "startDate": "2025-12-25",
            "endDate": "2025-12-25",
            "playlist": "Christmas",
            "command": "",
        });
        let derived = identity::identity_from_entry(&existing, 2025, &holiday())
            .expect("identity");
        let id = identity::identity_id(&derived);
        let mut desired = existing.clone();
        desired["_manifest"] = json!({"id": id, "identity": derived, "hash": "h"});

        let diff = compute(&[desired], &[existing], 2025, &holiday());
        // No UID: the unmanaged entry stays and the desired one is created
        assert_eq!(diff.counts(), (1, 0, 0));
    }

    #[test]
    fn legacy_tagged_entries_count_as_managed() {
        let mut existing = desired_entry("ignored", None);
        existing
            .as_object_mut()
            .expect("object")
            .remove("_manifest");
        existing["args"] = json!(["|M|GCS:v1|u1"]);
        assert!(is_managed(&existing));
        // With nothing desired, the legacy entry is deleted
        let diff = compute(&[], &[existing], 2025, &holiday());
        assert_eq!(diff.counts(), (0, 0, 1));
    }

    #[test]
    fn duplicate_desired_ids_keep_first() {
        let first = desired_entry("id1", Some("u1"));
        let mut second = desired_entry("id1", Some("u2"));
        second["playlist"] = json!("Other");
        let diff = compute(&[first.clone(), second], &[], 2025, &holiday());
        assert_eq!(diff.counts(), (1, 0, 0));
        assert_eq!(diff.creates[0]["playlist"], "Show");
    }

    #[test]
    fn comparator_coerces_numeric_notation() {
        let a = desired_entry("id1", Some("u1"));
        let mut b = desired_entry("id1", Some("u1"));
        b["repeat"] = json!("1");
        b["day"] = json!(7.0);
        assert!(entries_equal(&a, &b));

        let mut c = desired_entry("id1", Some("u1"));
        c["stopType"] = json!(2);
        assert!(!entries_equal(&a, &c));
    }

    #[test]
    fn comparator_distinguishes_sequence_from_playlist() {
        let a = desired_entry("id1", Some("u1"));
        let mut b = desired_entry("id1", Some("u1"));
        b["sequence"] = json!(1);
        assert!(!entries_equal(&a, &b));
    }
}
