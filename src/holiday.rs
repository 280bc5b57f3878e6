//! Holiday short-name resolution for symbolic schedule dates.
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

use std::{cell::RefCell, collections::HashMap};

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// How a holiday's concrete date is derived for a given year
#[derive(Clone, Copy, Debug)]
enum Rule {
    /// Same month/day every year
    Fixed { month: u32, day: u32 },
    /// Days relative to Easter Sunday (negative = before)
    EasterOffset(i64),
    /// nth occurrence of a weekday within a month (1-based)
    NthWeekday { month: u32, weekday: Weekday, nth: u32 },
    /// Last occurrence of a weekday within a month
    LastWeekday { month: u32, weekday: Weekday },
}

/// Host-locale holiday table (short name, derivation rule)
const HOLIDAYS: [(&str, Rule); 18] = [
    ("NewYearsDay", Rule::Fixed { month: 1, day: 1 }),
    ("ValentinesDay", Rule::Fixed { month: 2, day: 14 }),
    ("StPatricksDay", Rule::Fixed { month: 3, day: 17 }),
    ("Independence", Rule::Fixed { month: 7, day: 4 }),
    ("Halloween", Rule::Fixed { month: 10, day: 31 }),
    ("Veterans", Rule::Fixed { month: 11, day: 11 }),
    ("ChristmasEve", Rule::Fixed { month: 12, day: 24 }),
    ("Christmas", Rule::Fixed { month: 12, day: 25 }),
    ("NewYearsEve", Rule::Fixed { month: 12, day: 31 }),
    ("Easter", Rule::EasterOffset(0)),
    ("GoodFriday", Rule::EasterOffset(-2)),
    ("MLK", Rule::NthWeekday { month: 1, weekday: Weekday::Mon, nth: 3 }),
    ("Presidents", Rule::NthWeekday { month: 2, weekday: Weekday::Mon, nth: 3 }),
    ("MothersDay", Rule::NthWeekday { month: 5, weekday: Weekday::Sun, nth: 2 }),
    ("FathersDay", Rule::NthWeekday { month: 6, weekday: Weekday::Sun, nth: 3 }),
    ("LaborDay", Rule::NthWeekday { month: 9, weekday: Weekday::Mon, nth: 1 }),
    ("Columbus", Rule::NthWeekday { month: 10, weekday: Weekday::Mon, nth: 2 }),
    ("Thanksgiving", Rule::NthWeekday { month: 11, weekday: Weekday::Thu, nth: 4 }),
];

/// Memorial Day is the only last-weekday holiday in the table; keeping it
/// apart keeps the const table literal.
const MEMORIAL_DAY: (&str, Rule) = (
    "MemorialDay",
    Rule::LastWeekday { month: 5, weekday: Weekday::Mon },
);

/// Resolves holiday short-names to concrete dates and back.
///
/// Per-year tables are computed once and cached for the lifetime of the
/// resolver (one planner run).
pub struct HolidayResolver {
    cache: RefCell<HashMap<i32, Vec<(&'static str, NaiveDate)>>>,
}

impl Default for HolidayResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HolidayResolver {
    pub fn new() -> Self {
        HolidayResolver {
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Concrete date of a holiday in a given year.
    ///
    /// # Arguments
    /// * `name` - short name, matched case-insensitively
    /// * `year` - calendar year to resolve into
    pub fn holiday_to_date(&self, name: &str, year: i32) -> Option<NaiveDate> {
        self.ensure_year(year);
        let cache = self.cache.borrow();
        let table = cache.get(&year)?;
        table
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(_, d)| *d)
    }

    /// Short name of the holiday falling on a concrete date, if any
    pub fn date_to_holiday(&self, date: NaiveDate) -> Option<&'static str> {
        self.ensure_year(date.year());
        let cache = self.cache.borrow();
        let table = cache.get(&date.year())?;
        table.iter().find(|(_, d)| *d == date).map(|(n, _)| *n)
    }

    /// Whether a token names a known holiday
    pub fn is_holiday_name(&self, token: &str) -> bool {
        let token = token.trim();
        HOLIDAYS
            .iter()
            .chain(std::iter::once(&MEMORIAL_DAY))
            .any(|(n, _)| n.eq_ignore_ascii_case(token))
    }

    fn ensure_year(&self, year: i32) {
        let mut cache = self.cache.borrow_mut();
        cache.entry(year).or_insert_with(|| {
            HOLIDAYS
                .iter()
                .chain(std::iter::once(&MEMORIAL_DAY))
                .filter_map(|(name, rule)| resolve_rule(*rule, year).map(|d| (*name, d)))
                .collect()
        });
    }
}

fn resolve_rule(rule: Rule, year: i32) -> Option<NaiveDate> {
    match rule {
        Rule::Fixed { month, day } => NaiveDate::from_ymd_opt(year, month, day),
        Rule::EasterOffset(days) => Some(easter(year)? + Duration::days(days)),
        Rule::NthWeekday { month, weekday, nth } => nth_weekday(year, month, weekday, nth),
        Rule::LastWeekday { month, weekday } => last_weekday(year, month, weekday),
    }
}

/// Easter Sunday via the anonymous Gregorian computus
fn easter(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let shift = (7 + weekday.num_days_from_sunday() - first.weekday().num_days_from_sunday()) % 7;
    let date = first + Duration::days(i64::from(shift) + 7 * (i64::from(nth) - 1));
    (date.month() == month).then_some(date)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = next_month.pred_opt()?;
    let shift = (7 + last.weekday().num_days_from_sunday() - weekday.num_days_from_sunday()) % 7;
    Some(last - Duration::days(i64::from(shift)))
}
