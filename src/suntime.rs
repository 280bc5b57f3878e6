//! Deterministic solar-time estimation for symbolic schedule times.
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

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::semantics::SymbolicTime;

/// Solar zenith angle for sunrise/sunset, including refraction (degrees)
const ZENITH_OFFICIAL: f64 = 90.833;
/// Solar zenith angle for civil dawn/dusk (degrees)
const ZENITH_CIVIL: f64 = 96.0;

/// Estimated local solar event times for one date and location.
///
/// Any event may be absent at polar latitudes where the sun does not
/// cross the corresponding zenith that day.
#[derive(Clone, Copy, Debug, Default)]
pub struct SunTimes {
    pub dawn: Option<NaiveTime>,
    pub sunrise: Option<NaiveTime>,
    pub sunset: Option<NaiveTime>,
    pub dusk: Option<NaiveTime>,
}

impl SunTimes {
    /// Picks the event matching a symbolic token
    pub fn get(&self, which: SymbolicTime) -> Option<NaiveTime> {
        match which {
            SymbolicTime::Dawn => self.dawn,
            SymbolicTime::SunRise => self.sunrise,
            SymbolicTime::SunSet => self.sunset,
            SymbolicTime::Dusk => self.dusk,
        }
    }
}

/// Estimates solar event times for a date and location.
///
/// NOAA-style low-precision series: fractional year drives the equation
/// of time and solar declination; the hour angle at the requested zenith
/// gives the event's UTC minute, shifted into local time by the caller's
/// UTC offset. Accuracy is within a couple of minutes, which is all the
/// display-time resolution needs.
///
/// # Arguments
/// * `date` - local calendar date
/// * `latitude` / `longitude` - degrees, east and north positive
/// * `utc_offset_minutes` - local offset from UTC on that date
pub fn estimate(date: NaiveDate, latitude: f64, longitude: f64, utc_offset_minutes: i32) -> SunTimes {
    SunTimes {
        dawn: event_minutes(date, latitude, longitude, ZENITH_CIVIL, true)
            .map(|m| to_local_time(m, utc_offset_minutes)),
        sunrise: event_minutes(date, latitude, longitude, ZENITH_OFFICIAL, true)
            .map(|m| to_local_time(m, utc_offset_minutes)),
        sunset: event_minutes(date, latitude, longitude, ZENITH_OFFICIAL, false)
            .map(|m| to_local_time(m, utc_offset_minutes)),
        dusk: event_minutes(date, latitude, longitude, ZENITH_CIVIL, false)
            .map(|m| to_local_time(m, utc_offset_minutes)),
    }
}

/// UTC minute-of-day of the event, or None when the sun never crosses
/// the zenith on that date
fn event_minutes(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    zenith: f64,
    rising: bool,
) -> Option<f64> {
    let doy = f64::from(date.ordinal());
    // Fractional year at solar noon, radians
    let gamma = 2.0 * std::f64::consts::PI / 365.0 * (doy - 1.0 + 0.5);

    // Equation of time (minutes) and declination (radians)
    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let lat_rad = latitude.to_radians();
    let cos_ha = (zenith.to_radians().cos() - lat_rad.sin() * decl.sin())
        / (lat_rad.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let ha_deg = cos_ha.acos().to_degrees();
    let ha = if rising { ha_deg } else { -ha_deg };

    Some(720.0 - 4.0 * (longitude + ha) - eqtime)
}

fn to_local_time(utc_minutes: f64, utc_offset_minutes: i32) -> NaiveTime {
    let mut total = utc_minutes + f64::from(utc_offset_minutes);
    total = total.rem_euclid(24.0 * 60.0);
    let hour = (total / 60.0).floor() as u32;
    let minute = (total % 60.0).floor() as u32;
    let second = ((total % 1.0) * 60.0).floor() as u32;
    NaiveTime::from_hms_opt(hour.min(23), minute.min(59), second.min(59))
        .unwrap_or(NaiveTime::MIN)
}
