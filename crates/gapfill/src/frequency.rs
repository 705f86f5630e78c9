// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Frequency parsing and validation against the series time domain.
//!
//! A frequency is either an integer step (integer time columns only) or one
//! of a fixed vocabulary of calendar intervals. Calendar intervals are fixed
//! durations: a month is 30 days, a quarter 90 days and a year 365 days.

use std::fmt;

use crate::config::FrequencyValue;
use crate::error::{GapFillError, Result};
use crate::time::{TimeDomain, TimeDomainKind};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Named calendar intervals accepted as frequencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarInterval {
    ThirtyMinutes,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl CalendarInterval {
    /// Look up a token, ignoring case and surrounding whitespace
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let upper = token.trim().to_ascii_uppercase();
        let interval = match upper.as_str() {
            "1D" | "1DAY" => CalendarInterval::Day,
            "30M" | "30MIN" | "30MINUTE" | "30MINUTES" => CalendarInterval::ThirtyMinutes,
            "1H" | "1HOUR" | "1HOURS" => CalendarInterval::Hour,
            "1W" | "1WEEK" | "1WEEKS" => CalendarInterval::Week,
            "1MO" | "1MONTH" | "1MONTHS" => CalendarInterval::Month,
            "1Q" | "1QUARTER" | "1QUARTERS" => CalendarInterval::Quarter,
            "1Y" | "1YEAR" | "1YEARS" => CalendarInterval::Year,
            _ => return None,
        };
        Some(interval)
    }

    /// Fixed duration in seconds
    #[must_use]
    pub fn seconds(self) -> i64 {
        match self {
            CalendarInterval::ThirtyMinutes => 30 * MINUTE,
            CalendarInterval::Hour => HOUR,
            CalendarInterval::Day => DAY,
            CalendarInterval::Week => 7 * DAY,
            CalendarInterval::Month => 30 * DAY,
            CalendarInterval::Quarter => 90 * DAY,
            CalendarInterval::Year => 365 * DAY,
        }
    }

    #[must_use]
    pub fn is_sub_day(self) -> bool {
        self.seconds() < DAY
    }

    /// Canonical short token
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            CalendarInterval::ThirtyMinutes => "30m",
            CalendarInterval::Hour => "1h",
            CalendarInterval::Day => "1d",
            CalendarInterval::Week => "1w",
            CalendarInterval::Month => "1mo",
            CalendarInterval::Quarter => "1q",
            CalendarInterval::Year => "1y",
        }
    }
}

/// A validated frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    IntegerStep(i64),
    Calendar(CalendarInterval),
}

impl Frequency {
    /// Step size in the key units of `domain`
    pub fn step(&self, domain: &TimeDomain) -> Result<i64> {
        match self {
            Frequency::IntegerStep(step) => Ok(*step),
            Frequency::Calendar(interval) => domain.calendar_step(interval.seconds()),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::IntegerStep(step) => write!(f, "{step}"),
            Frequency::Calendar(interval) => write!(f, "{}", interval.token()),
        }
    }
}

/// Resolves raw frequency values against a time domain
#[derive(Debug, Clone, Copy)]
pub struct FrequencyResolver {
    default_to_daily_on_unknown_token: bool,
}

impl Default for FrequencyResolver {
    fn default() -> Self {
        Self {
            default_to_daily_on_unknown_token: true,
        }
    }
}

impl FrequencyResolver {
    #[must_use]
    pub fn new(default_to_daily_on_unknown_token: bool) -> Self {
        Self {
            default_to_daily_on_unknown_token,
        }
    }

    /// Resolve `value` for `domain`. A missing value, a blank string or a
    /// non-positive step is a configuration error; blank strings do not
    /// fall back to `1d` even under the lenient token policy.
    pub fn resolve(&self, value: Option<&FrequencyValue>, domain: &TimeDomain) -> Result<Frequency> {
        let value =
            value.ok_or_else(|| GapFillError::config("frequency is required and cannot be null"))?;

        let frequency = match value {
            FrequencyValue::Integer(step) => {
                if *step <= 0 {
                    return Err(GapFillError::config(format!(
                        "integer frequency must be positive, got {step}"
                    )));
                }
                Frequency::IntegerStep(*step)
            }
            FrequencyValue::Text(text) => {
                if text.trim().is_empty() {
                    return Err(GapFillError::config("frequency cannot be empty"));
                }
                Frequency::Calendar(self.calendar_token(text)?)
            }
        };

        validate_compatibility(&frequency, domain)?;
        Ok(frequency)
    }

    fn calendar_token(&self, text: &str) -> Result<CalendarInterval> {
        if let Some(interval) = CalendarInterval::from_token(text) {
            return Ok(interval);
        }
        if !self.default_to_daily_on_unknown_token {
            return Err(GapFillError::config(format!(
                "unrecognized frequency '{text}'; expected one of 1d, 30m, 1h, 1w, 1mo, 1q, 1y"
            )));
        }
        diagnostics::warn!(
            "Unrecognized frequency {text}, falling back to 1d",
            text: text.to_string()
        );
        Ok(CalendarInterval::Day)
    }
}

fn validate_compatibility(frequency: &Frequency, domain: &TimeDomain) -> Result<()> {
    match (frequency, domain.kind()) {
        (Frequency::IntegerStep(_), TimeDomainKind::Integer) => Ok(()),
        (Frequency::IntegerStep(_), kind) => Err(GapFillError::config(format!(
            "{kind} time column cannot use an integer frequency; use a calendar interval such as '1d'"
        ))),
        (Frequency::Calendar(_), TimeDomainKind::Integer) => Err(GapFillError::config(
            "integer time column can only use an integer frequency, not a calendar interval",
        )),
        (Frequency::Calendar(interval), _) if interval.is_sub_day() && !domain.has_time_of_day() => {
            Err(GapFillError::config(format!(
                "date column cannot use sub-day interval '{}'; use '1d' or larger",
                interval.token()
            )))
        }
        (Frequency::Calendar(_), _) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, TimeUnit};

    fn domain(dt: DataType) -> TimeDomain {
        TimeDomain::from_data_type(&dt).unwrap()
    }

    fn text(s: &str) -> FrequencyValue {
        FrequencyValue::Text(s.to_string())
    }

    #[test]
    fn test_vocabulary_and_synonyms() {
        let cases = [
            ("1d", CalendarInterval::Day),
            ("1DAY", CalendarInterval::Day),
            (" 30min ", CalendarInterval::ThirtyMinutes),
            ("1hour", CalendarInterval::Hour),
            ("1weeks", CalendarInterval::Week),
            ("1mo", CalendarInterval::Month),
            ("1Quarter", CalendarInterval::Quarter),
            ("1y", CalendarInterval::Year),
        ];
        for (token, expected) in cases {
            assert_eq!(CalendarInterval::from_token(token), Some(expected), "{token}");
        }
        assert_eq!(CalendarInterval::from_token("2d"), None);
        assert_eq!(CalendarInterval::Month.seconds(), 30 * 86_400);
        assert_eq!(CalendarInterval::Year.seconds(), 365 * 86_400);
    }

    #[test]
    fn test_missing_empty_and_non_positive_fail() {
        let resolver = FrequencyResolver::default();
        let int = domain(DataType::Int64);
        assert!(resolver.resolve(None, &int).unwrap_err().is_configuration());
        assert!(resolver.resolve(Some(&FrequencyValue::Integer(0)), &int).is_err());
        assert!(resolver.resolve(Some(&FrequencyValue::Integer(-3)), &int).is_err());

        let date = domain(DataType::Date32);
        assert!(resolver.resolve(Some(&text("")), &date).is_err());
        assert!(resolver.resolve(Some(&text("   ")), &date).is_err());
    }

    #[test]
    fn test_domain_compatibility() {
        let resolver = FrequencyResolver::default();
        let date = domain(DataType::Date32);
        let ts = domain(DataType::Timestamp(TimeUnit::Microsecond, None));
        let int = domain(DataType::Int32);

        assert!(resolver.resolve(Some(&FrequencyValue::Integer(1)), &date).is_err());
        assert!(resolver.resolve(Some(&FrequencyValue::Integer(1)), &ts).is_err());
        assert!(resolver.resolve(Some(&text("1d")), &int).is_err());

        assert!(resolver.resolve(Some(&text("30m")), &date).is_err());
        assert!(resolver.resolve(Some(&text("1h")), &date).is_err());
        assert_eq!(
            resolver.resolve(Some(&text("1d")), &date).unwrap(),
            Frequency::Calendar(CalendarInterval::Day)
        );
        assert_eq!(
            resolver.resolve(Some(&text("30m")), &ts).unwrap(),
            Frequency::Calendar(CalendarInterval::ThirtyMinutes)
        );
        assert_eq!(
            resolver.resolve(Some(&FrequencyValue::Integer(2)), &int).unwrap(),
            Frequency::IntegerStep(2)
        );
    }

    #[test]
    fn test_unknown_token_policy() {
        let date = domain(DataType::Date32);

        let lenient = FrequencyResolver::default();
        assert_eq!(
            lenient.resolve(Some(&text("fortnight")), &date).unwrap(),
            Frequency::Calendar(CalendarInterval::Day)
        );

        let strict = FrequencyResolver::new(false);
        let err = strict.resolve(Some(&text("fortnight")), &date).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("fortnight"));
    }

    #[test]
    fn test_step_in_domain_units() {
        let week = Frequency::Calendar(CalendarInterval::Week);
        assert_eq!(week.step(&domain(DataType::Date32)).unwrap(), 7);
        assert_eq!(
            week.step(&domain(DataType::Timestamp(TimeUnit::Second, None)))
                .unwrap(),
            604_800
        );
        assert_eq!(Frequency::IntegerStep(5).step(&domain(DataType::Int64)).unwrap(), 5);
    }
}
