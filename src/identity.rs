//! Manifest identity: stable ids and behavioral hashes for schedule entries.
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

use serde_json::{Map, Value, json};
use sha2::{Digest as _, Sha256};

use crate::{holiday::HolidayResolver, semantics};

/// Behavior projection: the fields whose change must flip the hash.
///
/// Everything else on a payload is presentation-only or UID-carrying
/// (_manifest, uid, args, summary, description, range, template,
/// resolved, yaml, gcs, order, appliedAt) and never enters the hash;
/// iterating this allowlist keeps all of those out by construction.
const BEHAVIOR_KEYS: [&str; 6] = [
    "enabled",
    "day",
    "repeat",
    "startTimeOffset",
    "endTimeOffset",
    "stopType",
];

/// Raw material for one entry's identity
#[derive(Clone, Debug)]
pub struct IdentitySource {
    /// Canonical type label: playlist | sequence | command
    pub kind: String,
    pub target: String,
    /// Compact day token concatenation
    pub days: String,
    /// Start boundary: (token, minute offset)
    pub start_time: (String, i64),
    /// End boundary: (token, minute offset)
    pub end_time: (String, i64),
    /// Raw date token: absolute, sentinel or holiday short-name
    pub start_date: String,
    pub end_date: String,
    /// Year sentinels resolve into
    pub current_year: i32,
}

/// Builds the canonical identity object for an entry.
///
/// Dates carry dual tokens: the hard `YYYY-MM-DD` form and, when one is
/// derivable, the holiday short-name. A holiday-name input stays
/// symbolic-only. Commands have no duration, so their end time is forced
/// to the start time before the identity is taken.
///
/// # Returns
/// * None when any required field is missing or a date has no tokens
pub fn build_identity(src: &IdentitySource, holiday: &HolidayResolver) -> Option<Value> {
    if src.kind.is_empty() || src.target.is_empty() || src.days.is_empty() {
        return None;
    }
    if src.start_time.0.is_empty() || src.end_time.0.is_empty() {
        return None;
    }

    let end_time = if src.kind == "command" {
        src.start_time.clone()
    } else {
        src.end_time.clone()
    };

    let start_date = date_tokens(&src.start_date, src.current_year, holiday)?;
    let end_date = date_tokens(&src.end_date, src.current_year, holiday)?;

    Some(json!({
        "type": src.kind,
        "target": src.target,
        "days": src.days,
        "startTime": { "token": src.start_time.0, "offset": src.start_time.1 },
        "endTime": { "token": end_time.0, "offset": end_time.1 },
        "startDate": start_date,
        "endDate": end_date,
    }))
}

/// Dual-token form of a raw date token
fn date_tokens(raw: &str, current_year: i32, holiday: &HolidayResolver) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(date) = semantics::resolve_date_token(raw, current_year) {
        let hard = date.format(semantics::DATE_FMT).to_string();
        let symbolic = holiday.date_to_holiday(date).map(str::to_string);
        let mut tokens: Vec<String> = std::iter::once(hard.clone())
            .chain(symbolic.clone())
            .collect();
        tokens.sort();
        tokens.dedup();
        let mut obj = Map::new();
        obj.insert("tokens".to_string(), json!(tokens));
        obj.insert("hard".to_string(), json!(hard));
        if let Some(sym) = symbolic {
            obj.insert("symbolic".to_string(), json!(sym));
        }
        return Some(Value::Object(obj));
    }

    if holiday.is_holiday_name(raw) {
        return Some(json!({
            "tokens": [raw],
            "symbolic": raw,
        }));
    }

    None
}

/// Stable id of an identity: SHA-256 over the symbolic-first key.
///
/// The key collapses each date to a single token, preferring the
/// symbolic form, so a holiday-named entry and its concrete-date twin
/// produce the same id across years.
pub fn identity_id(identity: &Value) -> String {
    let key = json!({
        "type": identity["type"],
        "target": identity["target"],
        "days": identity["days"],
        "startTime": stable_time(&identity["startTime"]),
        "endTime": stable_time(&identity["endTime"]),
        "startDate": symbolic_first(&identity["startDate"]),
        "endDate": symbolic_first(&identity["endDate"]),
    });
    sha256_hex(&canonical_json(&key))
}

/// Behavioral hash: the full identity (dual-date token arrays intact)
/// plus the normalized behavior projection of the entry payload
pub fn behavior_hash(identity: &Value, payload: &Value) -> String {
    let mut behavior = Map::new();
    if let Value::Object(fields) = payload {
        for key in BEHAVIOR_KEYS {
            if let Some(value) = fields.get(key) {
                if let Some(norm) = normalize_scalar(value) {
                    behavior.insert(key.to_string(), norm);
                }
            }
        }
    }
    let input = json!({
        "identity": identity,
        "behavior": Value::Object(behavior),
    });
    sha256_hex(&canonical_json(&input))
}

/// Builds the `_manifest` sidecar carried on a desired entry.
///
/// The planner UID rides inside the sidecar; adoption of unmanaged
/// entries is only attempted when it is present.
pub fn sidecar(identity: &Value, payload: &Value, uid: &str) -> Value {
    let mut out = json!({
        "id": identity_id(identity),
        "identity": identity,
        "hash": behavior_hash(identity, payload),
    });
    if !uid.is_empty() {
        out["uid"] = json!(uid);
    }
    out
}

/// Derives an identity from a raw scheduler-file entry.
///
/// Used for adoption: an unmanaged entry whose derived id equals a
/// desired entry's id is the same schedule under a different notation.
pub fn identity_from_entry(
    entry: &Value,
    current_year: i32,
    holiday: &HolidayResolver,
) -> Option<Value> {
    let playlist = entry["playlist"].as_str().unwrap_or_default();
    let command = entry["command"].as_str().unwrap_or_default();
    let (kind, target) = if !command.is_empty() {
        ("command", command)
    } else if !playlist.is_empty() {
        if as_int(&entry["sequence"]).unwrap_or(0) == 1 {
            ("sequence", playlist)
        } else {
            ("playlist", playlist)
        }
    } else {
        return None;
    };

    let day = as_int(&entry["day"]).unwrap_or(-1);
    let days = u8::try_from(day)
        .ok()
        .and_then(semantics::day_code_tokens)?;

    let src = IdentitySource {
        kind: kind.to_string(),
        target: target.to_string(),
        days: days.to_string(),
        start_time: (
            entry["startTime"].as_str().unwrap_or_default().to_string(),
            as_int(&entry["startTimeOffset"]).unwrap_or(0),
        ),
        end_time: (
            entry["endTime"].as_str().unwrap_or_default().to_string(),
            as_int(&entry["endTimeOffset"]).unwrap_or(0),
        ),
        start_date: entry["startDate"].as_str().unwrap_or_default().to_string(),
        end_date: entry["endDate"].as_str().unwrap_or_default().to_string(),
        current_year,
    };
    build_identity(&src, holiday)
}

fn stable_time(time: &Value) -> Value {
    let token = time["token"].as_str().unwrap_or_default();
    let offset = as_int(&time["offset"]).unwrap_or(0);
    Value::String(format!("{token}@{offset}"))
}

fn symbolic_first(date: &Value) -> Value {
    if let Some(sym) = date["symbolic"].as_str() {
        return Value::String(sym.to_string());
    }
    date["hard"].clone()
}

/// Strips empties and coerces numerics the way the hash input expects
fn normalize_scalar(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => match s.parse::<i64>() {
            Ok(i) => Some(json!(i)),
            Err(_) => Some(value.clone()),
        },
        Value::Number(n) => Some(json!(n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f as i64).unwrap_or(0)
        }))),
        Value::Bool(b) => Some(json!(i64::from(*b))),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

/// Integer view of a JSON scalar, tolerating string-encoded numbers
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Canonical JSON: object keys sorted, compact separators, stable across
/// feature flags of the JSON library
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
