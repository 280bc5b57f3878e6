//! Event-description metadata: a restricted YAML block carried per event.
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

use std::collections::BTreeMap;

use chrono::NaiveTime;

use crate::semantics::{SymbolicTime, TIME_FMT, TimeSpec};

/// Fence opening a YAML block inside a description
const FENCE_OPEN: &str = "```yaml";
/// Fence closing any block
const FENCE_CLOSE: &str = "```";

/// Scalar or one-level-nested metadata value
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// String form of a scalar; maps have none
    pub fn as_str(&self) -> Option<String> {
        match self {
            MetaValue::Str(s) => Some(s.clone()),
            MetaValue::Int(i) => Some(i.to_string()),
            MetaValue::Bool(b) => Some(b.to_string()),
            MetaValue::Map(_) => None,
        }
    }
}

/// Parsed metadata block: flat keys plus one nested level
pub type MetaMap = BTreeMap<String, MetaValue>;

/// Extracts and parses the metadata block of an event description.
///
/// Two source shapes are accepted: a fenced ```yaml block anywhere in the
/// description, or a contiguous run of `key:` lines at the top. Parsing
/// never fails; unrecognized syntax yields the empty map and keys with
/// unsupported shapes (sequences, deeper nesting) are dropped while the
/// rest of the block is kept.
pub fn parse_description(description: &str) -> MetaMap {
    let Some(block) = extract_block(description) else {
        return MetaMap::new();
    };
    let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&block) else {
        return MetaMap::new();
    };
    convert_mapping(&value, true).unwrap_or_default()
}

/// Serializes a metadata map back to YAML text (used by the ICS export)
pub fn to_yaml(map: &MetaMap) -> String {
    serde_yaml::to_string(&to_yaml_value(map)).unwrap_or_default()
}

fn to_yaml_value(map: &MetaMap) -> serde_yaml::Value {
    let mut out = serde_yaml::Mapping::new();
    for (key, value) in map {
        let v = match value {
            MetaValue::Str(s) => serde_yaml::Value::String(s.clone()),
            MetaValue::Int(i) => serde_yaml::Value::Number((*i).into()),
            MetaValue::Bool(b) => serde_yaml::Value::Bool(*b),
            MetaValue::Map(m) => to_yaml_value(m),
        };
        out.insert(serde_yaml::Value::String(key.clone()), v);
    }
    serde_yaml::Value::Mapping(out)
}

/// Locates the YAML source text within a description
fn extract_block(description: &str) -> Option<String> {
    if let Some(open) = description.find(FENCE_OPEN) {
        let body_start = open + FENCE_OPEN.len();
        let body = &description[body_start..];
        let end = body.find(FENCE_CLOSE)?;
        return Some(body[..end].to_string());
    }

    // Contiguous run of bare `key:` lines (plus indented children) at the top
    let mut lines = Vec::new();
    for line in description.lines() {
        let is_child = line.starts_with(' ') || line.starts_with('\t');
        if is_child && !lines.is_empty() {
            lines.push(line);
            continue;
        }
        if is_plain_key_line(line) {
            lines.push(line);
            continue;
        }
        break;
    }
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

fn is_plain_key_line(line: &str) -> bool {
    let Some(colon) = line.find(':') else {
        return false;
    };
    let key = &line[..colon];
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Converts a parsed YAML value into the restricted map shape.
///
/// `allow_nested` permits exactly one further mapping level.
fn convert_mapping(value: &serde_yaml::Value, allow_nested: bool) -> Option<MetaMap> {
    let mapping = value.as_mapping()?;
    let mut out = MetaMap::new();
    for (k, v) in mapping {
        let Some(key) = k.as_str() else { continue };
        match convert_scalar(v) {
            Some(scalar) => {
                out.insert(key.to_string(), scalar);
            }
            None => {
                if allow_nested {
                    if let Some(nested) = convert_mapping(v, false) {
                        out.insert(key.to_string(), MetaValue::Map(nested));
                    }
                }
                // Sequences, nulls and deeper nesting are dropped
            }
        }
    }
    Some(out)
}

fn convert_scalar(value: &serde_yaml::Value) -> Option<MetaValue> {
    match value {
        serde_yaml::Value::String(s) => Some(MetaValue::Str(s.clone())),
        serde_yaml::Value::Bool(b) => Some(MetaValue::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(MetaValue::Int(i))
            } else {
                // Floats are outside the subset; keep the text form
                Some(MetaValue::Str(n.to_string()))
            }
        }
        _ => None,
    }
}

/// Looks up a scalar as a string
pub fn get_str(map: &MetaMap, key: &str) -> Option<String> {
    map.get(key).and_then(MetaValue::as_str)
}

/// Looks up a boolean, accepting bool, 0/1 and textual true/false
pub fn get_bool(map: &MetaMap, key: &str) -> Option<bool> {
    match map.get(key)? {
        MetaValue::Bool(b) => Some(*b),
        MetaValue::Int(i) => Some(*i != 0),
        MetaValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        MetaValue::Map(_) => None,
    }
}

/// Looks up a nested map
pub fn get_map<'a>(map: &'a MetaMap, key: &str) -> Option<&'a MetaMap> {
    match map.get(key)? {
        MetaValue::Map(m) => Some(m),
        _ => None,
    }
}

/// Reads a schedule boundary descriptor under `key` ("start" or "end").
///
/// Accepted shapes:
/// * a plain scalar: `start: SunSet` or `start: "18:30:00"`
/// * a nested map: `start: {time: SunSet, offset: -30}`
pub fn time_spec(map: &MetaMap, key: &str) -> Option<TimeSpec> {
    match map.get(key)? {
        MetaValue::Str(s) => spec_from_token(s, 0),
        MetaValue::Map(m) => {
            let token = get_str(m, "time")?;
            let offset = match m.get("offset") {
                Some(MetaValue::Int(i)) => *i as i32,
                Some(MetaValue::Str(s)) => s.trim().parse().ok()?,
                _ => 0,
            };
            spec_from_token(&token, offset)
        }
        _ => None,
    }
}

fn spec_from_token(token: &str, offset: i32) -> Option<TimeSpec> {
    if let Some(sym) = SymbolicTime::parse(token) {
        return Some(TimeSpec::Symbolic(sym, offset));
    }
    NaiveTime::parse_from_str(token.trim(), TIME_FMT)
        .ok()
        .map(TimeSpec::Absolute)
}

/// Reads the `command` descriptor: name plus comma-separated args
pub fn command_spec(map: &MetaMap) -> Option<(String, Vec<String>)> {
    let cmd = get_map(map, "command")?;
    let name = get_str(cmd, "name")?;
    let args = get_str(cmd, "args")
        .map(|raw| {
            raw.split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some((name, args))
}
