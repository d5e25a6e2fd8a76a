use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::TimeDelta;
use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Access window length written as `<int><unit>` groups, e.g. `1d12h` or `90m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessDuration {
    seconds: u64,
}

impl AccessDuration {
    /// Shortest grant the system issues.
    pub const MIN: Self = Self::from_seconds(15 * SECONDS_PER_MINUTE);
    /// Longest grant the system issues.
    pub const MAX: Self = Self::from_seconds(7 * SECONDS_PER_DAY);
    /// Default window when the requester names none.
    pub const DEFAULT: Self = Self::from_seconds(SECONDS_PER_HOUR);
    /// Cloud provider ceiling for one session.
    pub const SESSION_CEILING: Self = Self::from_seconds(8 * SECONDS_PER_HOUR);

    /// Creates a duration from whole seconds.
    #[must_use]
    pub const fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Parses the `d/h/m/s` grammar without applying policy bounds.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("duration must not be empty".to_owned()));
        }

        let mut total: u64 = 0;
        let mut digits = String::new();
        for character in trimmed.chars() {
            if character.is_ascii_digit() {
                digits.push(character);
                continue;
            }

            let unit = match character {
                'd' => SECONDS_PER_DAY,
                'h' => SECONDS_PER_HOUR,
                'm' => SECONDS_PER_MINUTE,
                's' => 1,
                _ => {
                    return Err(AppError::Validation(format!(
                        "duration '{trimmed}' contains unknown unit '{character}'"
                    )));
                }
            };
            if digits.is_empty() {
                return Err(AppError::Validation(format!(
                    "duration '{trimmed}' has a unit without a number"
                )));
            }

            let amount = digits.parse::<u64>().map_err(|_| {
                AppError::Validation(format!("duration '{trimmed}' is out of range"))
            })?;
            total = amount
                .checked_mul(unit)
                .and_then(|seconds| total.checked_add(seconds))
                .ok_or_else(|| {
                    AppError::Validation(format!("duration '{trimmed}' is out of range"))
                })?;
            digits.clear();
        }

        if !digits.is_empty() {
            return Err(AppError::Validation(format!(
                "duration '{trimmed}' must end with a unit (d, h, m or s)"
            )));
        }

        Ok(Self::from_seconds(total))
    }

    /// Parses and enforces the `[MIN, MAX]` window.
    pub fn parse_bounded(value: &str) -> AppResult<Self> {
        let duration = Self::parse(value)?;
        duration.ensure_within(Self::MAX)?;
        Ok(duration)
    }

    /// Fails unless `MIN <= self <= ceiling`.
    pub fn ensure_within(&self, ceiling: Self) -> AppResult<()> {
        if *self < Self::MIN {
            return Err(AppError::Validation(format!(
                "duration {self} is shorter than the minimum of {}",
                Self::MIN
            )));
        }

        if *self > ceiling {
            return Err(AppError::Validation(format!(
                "duration {self} exceeds the maximum of {ceiling}"
            )));
        }

        Ok(())
    }

    /// Returns the total number of seconds.
    #[must_use]
    pub fn as_seconds(&self) -> u64 {
        self.seconds
    }

    /// Converts into a chrono delta.
    pub fn to_time_delta(&self) -> AppResult<TimeDelta> {
        i64::try_from(self.seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| AppError::Validation(format!("duration {self} is out of range")))
    }
}

impl Display for AccessDuration {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        if self.seconds == 0 {
            return formatter.write_str("0s");
        }

        let mut remaining = self.seconds;
        for (unit, label) in [
            (SECONDS_PER_DAY, 'd'),
            (SECONDS_PER_HOUR, 'h'),
            (SECONDS_PER_MINUTE, 'm'),
            (1, 's'),
        ] {
            let amount = remaining / unit;
            if amount > 0 {
                write!(formatter, "{amount}{label}")?;
                remaining %= unit;
            }
        }

        Ok(())
    }
}

impl FromStr for AccessDuration {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for AccessDuration {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<AccessDuration> for String {
    fn from(value: AccessDuration) -> Self {
        value.to_string()
    }
}
