//! Virtual simulation time.

use shared::{ACCELERATION_MAX, ACCELERATION_MIN};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SECONDS_PER_MINUTE: f64 = 60.0;
pub const SECONDS_PER_HOUR: f64 = 60.0 * SECONDS_PER_MINUTE;
pub const SECONDS_PER_DAY: f64 = 24.0 * SECONDS_PER_HOUR;
pub const SECONDS_PER_YEAR: f64 = 365.0 * SECONDS_PER_DAY;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StampError {
    #[error("stamp {0:?} has no ':' separator")]
    MissingSeparator(String),
    #[error("invalid years in stamp {0:?}")]
    Years(String),
    #[error("invalid seconds in stamp {0:?}")]
    Seconds(String),
}

/// Result of [`SimulationClock::set_acceleration`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acceleration {
    Accepted(f64),
    Clamped(f64),
}

impl Acceleration {
    pub fn value(self) -> f64 {
        match self {
            Acceleration::Accepted(value) | Acceleration::Clamped(value) => value,
        }
    }

    pub fn was_clamped(self) -> bool {
        matches!(self, Acceleration::Clamped(_))
    }
}

/// Simulated calendar time: whole years plus seconds into the current year.
///
/// Years have 365 days. The clock only advances while it is active.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    active: bool,
    acceleration: f64,
    seconds: f64,
    years: u32,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            active: false,
            acceleration: 1.0,
            seconds: 0.0,
            years: 0,
        }
    }
}

impl SimulationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resets the calendar and starts it. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.seconds = 0.0;
        self.years = 0;
        true
    }

    /// Stops the calendar, keeping the current time. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    /// Advances by `seconds` of simulated time if active.
    pub fn advance(&mut self, seconds: f64) {
        if !self.active || !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.seconds += seconds;
        if self.seconds >= SECONDS_PER_YEAR {
            let whole = (self.seconds / SECONDS_PER_YEAR).floor();
            self.years = self.years.saturating_add(whole as u32);
            self.seconds -= whole * SECONDS_PER_YEAR;
        }
    }

    /// Stores the acceleration factor, clamped into the accepted interval.
    pub fn set_acceleration(&mut self, requested: f64) -> Acceleration {
        let clamped = requested.clamp(ACCELERATION_MIN, ACCELERATION_MAX);
        self.acceleration = clamped;
        if clamped == requested {
            Acceleration::Accepted(clamped)
        } else {
            Acceleration::Clamped(clamped)
        }
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    /// Seconds into the current year.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn total_seconds(&self) -> f64 {
        f64::from(self.years) * SECONDS_PER_YEAR + self.seconds
    }

    pub fn day_of_year(&self) -> u32 {
        (self.seconds / SECONDS_PER_DAY) as u32
    }

    pub fn hour_of_day(&self) -> u32 {
        ((self.seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR) as u32
    }

    pub fn minute_of_hour(&self) -> u32 {
        ((self.seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE) as u32
    }

    pub fn second_of_minute(&self) -> f64 {
        self.seconds % SECONDS_PER_MINUTE
    }

    /// Renders the time as `"<years>:<seconds>"`.
    pub fn to_stamp(&self) -> String {
        format!("{}:{:.6}", self.years, self.seconds)
    }

    /// Restores the time from a stamp produced by [`SimulationClock::to_stamp`].
    ///
    /// Activity and acceleration are left untouched.
    pub fn from_stamp(&mut self, stamp: &str) -> Result<(), StampError> {
        let (years, seconds) = stamp
            .split_once(':')
            .ok_or_else(|| StampError::MissingSeparator(stamp.to_string()))?;
        let years = u32::from_str(years.trim()).map_err(|_| StampError::Years(stamp.to_string()))?;
        let seconds = f64::from_str(seconds.trim())
            .ok()
            .filter(|s| s.is_finite() && *s >= 0.0 && *s < SECONDS_PER_YEAR)
            .ok_or_else(|| StampError::Seconds(stamp.to_string()))?;
        self.years = years;
        self.seconds = seconds;
        Ok(())
    }
}

impl fmt::Display for SimulationClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year {} day {} {:02}:{:02}:{:02.0}",
            self.years,
            self.day_of_year(),
            self.hour_of_day(),
            self.minute_of_hour(),
            self.second_of_minute().floor()
        )
    }
}
