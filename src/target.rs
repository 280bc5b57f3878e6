//! Media target resolution: event summary to playlist, sequence or command.
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

use crate::semantics::TargetKind;

/// Prefixes marking a command target in the event summary
const COMMAND_PREFIXES: [&str; 2] = ["cmd:", "command:"];

/// A resolved media target
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub name: String,
}

/// Resolves event summaries against the host media tree.
///
/// Resolution order: a `cmd:`/`command:` prefix wins outright; then a
/// playlist directory or json file under `playlists/`; then a sequence
/// file under `sequences/` (stored without the `.fseq` extension).
/// Anything else is unresolved and drops the series.
pub struct TargetResolver {
    media_root: PathBuf,
}

impl TargetResolver {
    /// # Arguments
    /// * `media_root` - host media directory holding `playlists/` and `sequences/`
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        TargetResolver {
            media_root: media_root.into(),
        }
    }

    /// Maps a summary to a target, or None when nothing matches.
    ///
    /// # Arguments
    /// * `summary` - event title naming the artifact
    /// * `hint` - declared type from the event metadata; a sequence hint
    ///   lets a `.fseq` win over a playlist of the same name
    pub fn resolve(&self, summary: &str, hint: Option<TargetKind>) -> Option<Target> {
        let summary = summary.trim();
        if summary.is_empty() {
            return None;
        }

        for prefix in COMMAND_PREFIXES {
            if let Some(rest) = strip_prefix_ci(summary, prefix) {
                let name = rest.trim();
                if name.is_empty() {
                    return None;
                }
                return Some(Target {
                    kind: TargetKind::Command,
                    name: name.to_string(),
                });
            }
        }

        if hint == Some(TargetKind::Sequence) {
            if let Some(target) = self.probe_sequence(summary) {
                return Some(target);
            }
        }
        self.probe_playlist(summary)
            .or_else(|| self.probe_sequence(summary))
    }

    fn probe_playlist(&self, summary: &str) -> Option<Target> {
        let playlist_dir = self
            .media_root
            .join("playlists")
            .join(summary)
            .join("playlist.json");
        let playlist_file = self
            .media_root
            .join("playlists")
            .join(format!("{summary}.json"));
        if playlist_dir.is_file() || playlist_file.is_file() {
            return Some(Target {
                kind: TargetKind::Playlist,
                name: summary.to_string(),
            });
        }
        None
    }

    fn probe_sequence(&self, summary: &str) -> Option<Target> {
        let sequence = self
            .media_root
            .join("sequences")
            .join(format!("{summary}.fseq"));
        if sequence.is_file() {
            return Some(Target {
                kind: TargetKind::Sequence,
                name: summary.to_string(),
            });
        }
        None
    }
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}
