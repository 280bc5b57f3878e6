//! Host environment export: timezone, coordinates and locale.
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

use std::{fs, path::Path};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Exit code: export succeeded with a complete environment
pub const EXIT_OK: i32 = 0;
/// Exit code: export succeeded but lat/lon/timezone were missing
pub const EXIT_WARNINGS: i32 = 1;
/// Exit code: the environment file could not be written
pub const EXIT_IO_FAILURE: i32 = 2;

/// Published host environment, consumed read-only by the pipeline
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct EnvInfo {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: u32,
    /// Where the values came from (the settings file path)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(rename = "rawLocale", default)]
    pub raw_locale: Option<String>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnvInfo {
    /// Host timezone, defaulting to UTC when unset or unparseable
    pub fn tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::UTC)
    }
}

/// Loads a previously exported environment file.
///
/// Unknown keys are ignored; a missing or corrupt file yields None and
/// the caller falls back to UTC without coordinates.
pub fn load(path: &Path) -> Option<EnvInfo> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<EnvInfo>(&text) {
        Ok(env) => Some(env),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "environment file unreadable");
            None
        }
    }
}

/// Scrapes the host key=value settings file and writes the environment
/// export.
///
/// # Arguments
/// * `settings_path` - host settings file (`Key = "value"` lines)
/// * `out_path` - destination for the JSON export
///
/// # Returns
/// * process exit code per the export contract: 0 complete, 1 exported
///   with missing fields, 2 write failure
pub fn export(settings_path: &Path, out_path: &Path) -> i32 {
    let mut env = scrape_settings(settings_path);

    let complete = env.timezone.is_some() && env.latitude.is_some() && env.longitude.is_some();
    env.ok = complete;
    if !complete && env.error.is_none() {
        env.error = Some("missing latitude, longitude or timezone".to_string());
    }

    match write_env(out_path, &env) {
        Ok(()) => {
            if complete {
                EXIT_OK
            } else {
                EXIT_WARNINGS
            }
        }
        Err(e) => {
            warn!(path = %out_path.display(), error = %e, "failed to write environment file");
            EXIT_IO_FAILURE
        }
    }
}

fn write_env(path: &Path, env: &EnvInfo) -> std::io::Result<()> {
    let mut body = serde_json::to_string_pretty(env).map_err(std::io::Error::other)?;
    body.push('\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Reads the settings file into an environment record; missing file is a
/// warning case, not an error
fn scrape_settings(path: &Path) -> EnvInfo {
    let mut env = EnvInfo {
        schema_version: 1,
        source: path.display().to_string(),
        ..EnvInfo::default()
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            env.error = Some(format!("settings unreadable: {e}"));
            return env;
        }
    };

    for line in text.lines() {
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = raw.trim().trim_matches('"').trim();
        if value.is_empty() {
            continue;
        }
        match key {
            "Latitude" => env.latitude = value.parse().ok(),
            "Longitude" => env.longitude = value.parse().ok(),
            "TimeZone" => env.timezone = Some(value.to_string()),
            "Locale" => env.raw_locale = Some(value.to_string()),
            _ => {}
        }
    }
    env
}
