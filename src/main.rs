//! Falcon Player calendar sync entry point.
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

use chrono::Utc;
use clap::Parser;
use fppcal::{apply, cli, envfile, export, status, sync};
use tracing_subscriber::EnvFilter;

/// Main entry point for the calendar sync tool
///
/// # Usage Examples
/// ```bash
/// # Preview change counts
/// fppcal -c config.toml plan
///
/// # Apply the plan (config must set runtime.dry_run = false)
/// fppcal -c config.toml apply
///
/// # Export hand-written entries for a calendar import
/// fppcal -c config.toml export --out unmanaged.ics
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments; the config loads as part of parsing
    let cli = cli::Cli::parse();
    let conf = cli.conf();

    let exit_code = match cli.command() {
        cli::Command::Plan => {
            let payload = status::plan_status(conf).await;
            println!("{}", serde_json::to_string_pretty(&payload)?);
            i32::from(payload["ok"] != true)
        }
        cli::Command::Diff => {
            let payload = status::plan_diff(conf).await;
            println!("{}", serde_json::to_string_pretty(&payload)?);
            i32::from(payload["ok"] != true)
        }
        cli::Command::Apply => {
            let payload = status::apply_status(conf).await;
            println!("{}", serde_json::to_string_pretty(&payload)?);
            i32::from(payload["ok"] != true)
        }
        cli::Command::Undo => match apply::rollback(conf) {
            Ok(report) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "ok": true,
                        "backup": report.backup.map(|p| p.display().to_string()),
                    }))?
                );
                0
            }
            Err(e) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "ok": false,
                        "error": e.to_status_json(),
                    }))?
                );
                1
            }
        },
        cli::Command::Export { out } => {
            let (entries, _) = sync::read_lenient(&conf.schedule_path());
            let env = apply::load_env(conf);
            let text = export::export_unmanaged(&entries, &env, Utc::now());
            match out {
                Some(path) => std::fs::write(path, text)?,
                None => print!("{text}"),
            }
            0
        }
        cli::Command::Env => envfile::export(&conf.settings_path(), &conf.env_file_path()),
    };

    std::process::exit(exit_code);
}
