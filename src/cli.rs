//! Command-line interface for the calendar sync pipeline.
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

use std::{fs::File, io::Read, path::PathBuf};

use clap::{Parser, Subcommand, builder::TypedValueParser};

use crate::conf::Conf;

/// Command-line interface structure
#[derive(Parser)]
#[command(
    version(env!("CARGO_PKG_VERSION")),
    author(env!("CARGO_PKG_AUTHORS")),
    about(env!("CARGO_PKG_DESCRIPTION")),
    long_about = "Synchronizes a Falcon Player schedule.json with a remote \
                 iCalendar feed: plan, preview the diff, apply it atomically, \
                 undo the last apply, and export hand-written entries back \
                 to a calendar."
)]
pub struct Cli {
    /// Configuration file path
    ///
    /// TOML configuration file naming the calendar URL, dry-run mode
    /// and host paths.
    #[arg(
        long,
        short,
        required = true,
        value_parser = ConfParser,
        help = "Path to TOML configuration file"
    )]
    conf: Conf,

    #[command(subcommand)]
    command: Command,
}

/// Pipeline operations
#[derive(Subcommand, Clone)]
pub enum Command {
    /// Compute the plan and print change counts
    Plan,
    /// Compute the plan and print the full diff payload
    Diff,
    /// Apply the computed plan to schedule.json (honors dry-run)
    Apply,
    /// Restore the previous applied snapshot
    Undo,
    /// Export unmanaged scheduler entries as an ICS calendar
    Export {
        /// Write the calendar here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Scrape host settings and write the environment file
    Env,
}

impl Cli {
    /// Returns a reference to the parsed configuration
    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    /// Returns the requested operation
    pub fn command(&self) -> &Command {
        &self.command
    }
}

/// Custom parser for configuration file loading
#[derive(Clone)]
struct ConfParser;

impl TypedValueParser for ConfParser {
    type Value = Conf;

    /// Parses the configuration file path and loads the configuration
    ///
    /// # Errors
    /// * File not found or permission denied
    /// * Invalid TOML format
    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let Some(file_path) = value.to_str() else {
            return Err(clap::Error::new(clap::error::ErrorKind::DisplayHelp));
        };

        // Open configuration file
        let mut file = File::open(file_path).map_err(|e| {
            let error_msg = match e.kind() {
                std::io::ErrorKind::NotFound => {
                    format!("Configuration file '{}' not found", file_path)
                }
                std::io::ErrorKind::PermissionDenied => {
                    format!("Permission denied for '{}'", file_path)
                }
                _ => format!("Cannot access configuration file '{}': {}", file_path, e),
            };
            clap::Error::raw(clap::error::ErrorKind::InvalidValue, error_msg)
        })?;

        // Read file contents
        let mut config_content = String::new();
        file.read_to_string(&mut config_content).map_err(|e| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                format!("Failed to read configuration file '{}': {}", file_path, e),
            )
        })?;

        // Parse TOML configuration
        Conf::from_toml(&config_content).map_err(|e| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                format!("Invalid configuration in '{}': {}", file_path, e),
            )
        })
    }
}
