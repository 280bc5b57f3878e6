//! Falcon Player schedule synchronization from a remote iCalendar feed.
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
//!
//! The pipeline runs plan → diff → apply: calendar events are expanded
//! into per-UID series, projected into precedence-ordered bundles,
//! diffed against the existing scheduler file via stable manifest
//! identities, and applied with backup, atomic write and post-write
//! verification. Hand-written scheduler entries are never touched and
//! can be exported back to a calendar.

pub mod apply;
pub mod cli;
pub mod conf;
pub mod diff;
pub mod envfile;
pub mod error;
pub mod export;
pub mod fetch;
pub mod holiday;
pub mod ics;
pub mod identity;
pub mod manifest;
pub mod meta;
pub mod planner;
pub mod runner;
pub mod semantics;
pub mod status;
pub mod suntime;
pub mod sync;
pub mod target;
