//! Remote calendar retrieval over HTTP.
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

use std::time::Duration;

use tracing::warn;

/// Total request budget; the host UI blocks on the sync run
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrieves raw iCalendar text.
///
/// HTTP sources get a single GET with a bounded total timeout;
/// certificate verification is disabled because the field appliances
/// this runs on routinely sit behind interception proxies with private
/// CAs. Anything that is not an HTTP URL is read as a local file. Any
/// failure (build, connect, status, body, read) logs a warning and
/// returns empty text, which the caller treats as "calendar has no
/// events".
///
/// # Arguments
/// * `url` - calendar address; empty input short-circuits to empty output
pub async fn fetch_ics(url: &str) -> String {
    if url.trim().is_empty() {
        return String::new();
    }

    if !url.starts_with("http") {
        return match std::fs::read_to_string(url) {
            Ok(text) => text,
            Err(e) => {
                warn!(url, error = %e, "local calendar unreadable");
                String::new()
            }
        };
    }

    let client = match reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build HTTP client");
            return String::new();
        }
    };

    match client.get(url).send().await {
        Ok(resp) => {
            if !resp.status().is_success() {
                warn!(url, status = %resp.status(), "calendar fetch returned non-success status");
                return String::new();
            }
            match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(url, error = %e, "failed to read calendar body");
                    String::new()
                }
            }
        }
        Err(e) => {
            warn!(url, error = %e, "calendar fetch failed");
            String::new()
        }
    }
}
