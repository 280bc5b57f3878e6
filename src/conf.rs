//! Configuration module for the calendar sync pipeline.
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

use std::path::PathBuf;

use serde::Deserialize;

/// Default host media directory
const DEFAULT_MEDIA_ROOT: &str = "/home/fpp/media";

/// Main configuration structure.
///
/// Loaded from TOML. Unknown sections (notably the `sync` status block
/// that a UI collaborator maintains) are tolerated and ignored.
#[derive(Deserialize, Clone, Default)]
pub struct Conf {
    /// Config schema version; currently always 1
    #[serde(default)]
    version: u32,
    /// Calendar source settings
    #[serde(default)]
    calendar: Calendar,
    /// Runtime behavior switches
    #[serde(default)]
    runtime: Runtime,
    /// Host filesystem layout
    #[serde(default)]
    paths: Paths,
}

/// Calendar source configuration
#[derive(Deserialize, Clone, Default)]
struct Calendar {
    /// Remote iCalendar feed; empty means "no managed schedules"
    #[serde(default)]
    ics_url: String,
}

/// Runtime behavior switches
#[derive(Deserialize, Clone)]
struct Runtime {
    /// When true (the default), apply returns the plan without writing
    #[serde(default = "default_dry_run")]
    dry_run: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime { dry_run: default_dry_run() }
    }
}

fn default_dry_run() -> bool {
    true
}

/// Host filesystem layout; every path has a conventional default under
/// the media root
#[derive(Deserialize, Clone, Default)]
struct Paths {
    media_root: Option<PathBuf>,
    schedule: Option<PathBuf>,
    manifest: Option<PathBuf>,
    env_file: Option<PathBuf>,
    settings: Option<PathBuf>,
}

impl Conf {
    /// Parses a TOML document into a configuration
    pub fn from_toml(text: &str) -> Result<Conf, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config schema version as declared in the file
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Remote calendar URL; may be empty
    pub fn ics_url(&self) -> &str {
        &self.calendar.ics_url
    }

    /// Whether apply is blocked from writing
    pub fn dry_run(&self) -> bool {
        self.runtime.dry_run
    }

    /// Host media directory holding `playlists/` and `sequences/`
    pub fn media_root(&self) -> PathBuf {
        self.paths
            .media_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT))
    }

    /// Path of the host scheduler file
    pub fn schedule_path(&self) -> PathBuf {
        self.paths
            .schedule
            .clone()
            .unwrap_or_else(|| self.media_root().join("config").join("schedule.json"))
    }

    /// Path of the applied-snapshot manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.paths
            .manifest
            .clone()
            .unwrap_or_else(|| self.media_root().join("config").join("manifest.json"))
    }

    /// Path of the exported environment file
    pub fn env_file_path(&self) -> PathBuf {
        self.paths
            .env_file
            .clone()
            .unwrap_or_else(|| self.media_root().join("config").join("fpp-env.json"))
    }

    /// Path of the host key=value settings file
    pub fn settings_path(&self) -> PathBuf {
        self.paths
            .settings
            .clone()
            .unwrap_or_else(|| self.media_root().join("settings"))
    }

    /// Builder constructor with every path rooted in one directory
    pub fn for_root(root: impl Into<PathBuf>, ics_url: &str, dry_run: bool) -> Conf {
        let root = root.into();
        Conf {
            version: 1,
            calendar: Calendar { ics_url: ics_url.to_string() },
            runtime: Runtime { dry_run },
            paths: Paths {
                media_root: Some(root),
                schedule: None,
                manifest: None,
                env_file: None,
                settings: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_parses() {
        let conf = Conf::from_toml(
            r#"
version = 1

[calendar]
ics_url = "https://example.test/basic.ics"

[runtime]
dry_run = false

[paths]
media_root = "/srv/fpp"
"#,
        )
        .expect("parse");
        assert_eq!(conf.version(), 1);
        assert_eq!(conf.ics_url(), "https://example.test/basic.ics");
        assert!(!conf.dry_run());
        assert_eq!(conf.media_root(), PathBuf::from("/srv/fpp"));
        assert_eq!(
            conf.schedule_path(),
            PathBuf::from("/srv/fpp/config/schedule.json")
        );
    }

    #[test]
    fn dry_run_defaults_to_true() {
        let conf = Conf::from_toml("[calendar]\nics_url = \"\"\n").expect("parse");
        assert!(conf.dry_run());
    }

    #[test]
    fn unknown_sections_are_tolerated() {
        let conf = Conf::from_toml(
            "[sync]\nlast_run = \"2025-01-01T00:00:00Z\"\nlast_status = \"ok\"\n",
        )
        .expect("parse");
        assert!(conf.ics_url().is_empty());
    }

    #[test]
    fn empty_document_yields_defaults() {
        let conf = Conf::from_toml("").expect("parse");
        assert!(conf.dry_run());
        assert_eq!(conf.media_root(), PathBuf::from(DEFAULT_MEDIA_ROOT));
    }
}
