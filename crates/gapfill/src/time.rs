//! Time domains of the time column.
//!
//! Every supported Arrow time type is mapped onto an `i64` time key in the
//! column's native unit: the raw value for integer columns, days for
//! `Date32`, milliseconds for `Date64`, and the declared unit for
//! timestamps. Grids are computed on keys and converted back to the
//! original Arrow type when a page is materialized.

use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Int16Type, Int32Type, Int64Type, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::TargetTime;
use crate::error::{GapFillError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Broad classification used by frequency validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDomainKind {
    /// Discrete integer time axis (Int16, Int32, Int64)
    Integer,
    /// Calendar dates without time of day (Date32, Date64)
    Date,
    /// Calendar timestamps with time of day
    Timestamp,
}

impl fmt::Display for TimeDomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeDomainKind::Integer => write!(f, "integer"),
            TimeDomainKind::Date => write!(f, "date"),
            TimeDomainKind::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// The time domain of a series, derived from the Arrow type of its time column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDomain {
    data_type: DataType,
    kind: TimeDomainKind,
}

impl TimeDomain {
    pub fn from_data_type(data_type: &DataType) -> Result<Self> {
        let kind = match data_type {
            DataType::Int16 | DataType::Int32 | DataType::Int64 => TimeDomainKind::Integer,
            DataType::Date32 | DataType::Date64 => TimeDomainKind::Date,
            DataType::Timestamp(_, _) => TimeDomainKind::Timestamp,
            other => {
                return Err(GapFillError::config(format!(
                    "time column must be an integer, date, or timestamp column, found {other}"
                )));
            }
        };
        Ok(Self {
            data_type: data_type.clone(),
            kind,
        })
    }

    #[must_use]
    pub fn kind(&self) -> TimeDomainKind {
        self.kind
    }

    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Whether values in this domain carry a time of day
    #[must_use]
    pub fn has_time_of_day(&self) -> bool {
        self.kind == TimeDomainKind::Timestamp
    }

    /// Number of key units in one calendar day, `None` for integer domains
    #[must_use]
    pub fn units_per_day(&self) -> Option<i64> {
        match &self.data_type {
            DataType::Date32 => Some(1),
            DataType::Date64 => Some(SECONDS_PER_DAY * 1_000),
            DataType::Timestamp(unit, _) => Some(SECONDS_PER_DAY * units_per_second(unit)),
            _ => None,
        }
    }

    /// Convert a calendar duration in seconds into a step in key units
    pub fn calendar_step(&self, seconds: i64) -> Result<i64> {
        let step = match &self.data_type {
            DataType::Date32 => {
                if seconds % SECONDS_PER_DAY != 0 {
                    return Err(GapFillError::config(
                        "date column cannot use sub-day intervals; use '1d' or larger",
                    ));
                }
                seconds / SECONDS_PER_DAY
            }
            DataType::Date64 => seconds.saturating_mul(1_000),
            DataType::Timestamp(unit, _) => seconds.saturating_mul(units_per_second(unit)),
            other => {
                return Err(GapFillError::config(format!(
                    "calendar intervals are not valid for {other} time columns"
                )));
            }
        };
        Ok(step)
    }

    /// Extract time keys from a column of this domain. Nulls stay `None`.
    pub fn keys(&self, array: &dyn Array) -> Result<Vec<Option<i64>>> {
        match &self.data_type {
            DataType::Int16 => primitive_keys::<Int16Type>(array, &self.data_type),
            DataType::Int32 => primitive_keys::<Int32Type>(array, &self.data_type),
            DataType::Int64 => primitive_keys::<Int64Type>(array, &self.data_type),
            DataType::Date32 => primitive_keys::<Date32Type>(array, &self.data_type),
            DataType::Date64 => primitive_keys::<Date64Type>(array, &self.data_type),
            DataType::Timestamp(TimeUnit::Second, _) => {
                primitive_keys::<TimestampSecondType>(array, &self.data_type)
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                primitive_keys::<TimestampMillisecondType>(array, &self.data_type)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                primitive_keys::<TimestampMicrosecondType>(array, &self.data_type)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                primitive_keys::<TimestampNanosecondType>(array, &self.data_type)
            }
            other => Err(GapFillError::SchemaMismatch(format!(
                "unsupported time column type {other}"
            ))),
        }
    }

    /// Build a time column of the original Arrow type from keys
    pub fn build_array(&self, keys: &[i64]) -> Result<ArrayRef> {
        let array: ArrayRef = match &self.data_type {
            DataType::Int16 => Arc::new(narrow_array::<Int16Type>(keys, &self.data_type)?),
            DataType::Int32 => Arc::new(narrow_array::<Int32Type>(keys, &self.data_type)?),
            DataType::Int64 => Arc::new(narrow_array::<Int64Type>(keys, &self.data_type)?),
            DataType::Date32 => Arc::new(narrow_array::<Date32Type>(keys, &self.data_type)?),
            DataType::Date64 => Arc::new(narrow_array::<Date64Type>(keys, &self.data_type)?),
            DataType::Timestamp(TimeUnit::Second, _) => Arc::new(
                narrow_array::<TimestampSecondType>(keys, &self.data_type)?,
            ),
            DataType::Timestamp(TimeUnit::Millisecond, _) => Arc::new(
                narrow_array::<TimestampMillisecondType>(keys, &self.data_type)?,
            ),
            DataType::Timestamp(TimeUnit::Microsecond, _) => Arc::new(
                narrow_array::<TimestampMicrosecondType>(keys, &self.data_type)?,
            ),
            DataType::Timestamp(TimeUnit::Nanosecond, _) => Arc::new(
                narrow_array::<TimestampNanosecondType>(keys, &self.data_type)?,
            ),
            other => {
                return Err(GapFillError::SchemaMismatch(format!(
                    "unsupported time column type {other}"
                )));
            }
        };
        Ok(array)
    }

    /// Convert a target time literal into a key of this domain
    pub fn parse_target(&self, target: &TargetTime) -> Result<i64> {
        let conversion = |reason: String| GapFillError::Conversion {
            target: target.to_string(),
            domain: self.data_type.to_string(),
            reason,
        };

        let key = match (self.kind, target) {
            (TimeDomainKind::Integer, TargetTime::Integer(v)) => *v,
            (TimeDomainKind::Integer, TargetTime::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| conversion(e.to_string()))?,
            (_, TargetTime::Integer(_)) => {
                return Err(conversion(
                    "integer targets are only valid for integer time columns".to_string(),
                ));
            }
            (_, TargetTime::Text(s)) => {
                let datetime = parse_datetime_literal(s).map_err(conversion)?;
                self.datetime_key(&datetime).map_err(conversion)?
            }
        };

        let (lo, hi) = self.key_range();
        if key < lo || key > hi {
            return Err(conversion(format!(
                "value {key} is outside the range of the column type"
            )));
        }
        Ok(key)
    }

    fn datetime_key(&self, datetime: &NaiveDateTime) -> std::result::Result<i64, String> {
        let utc = datetime.and_utc();
        match &self.data_type {
            // Dates keep only the date part of a timestamp literal
            DataType::Date32 => Ok(utc.timestamp().div_euclid(SECONDS_PER_DAY)),
            DataType::Date64 => Ok(utc.timestamp().div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY * 1_000),
            DataType::Timestamp(TimeUnit::Second, _) => Ok(utc.timestamp()),
            DataType::Timestamp(TimeUnit::Millisecond, _) => Ok(utc.timestamp_millis()),
            DataType::Timestamp(TimeUnit::Microsecond, _) => Ok(utc.timestamp_micros()),
            DataType::Timestamp(TimeUnit::Nanosecond, _) => utc
                .timestamp_nanos_opt()
                .ok_or_else(|| "timestamp out of range for nanosecond precision".to_string()),
            other => Err(format!("{other} is not a calendar type")),
        }
    }

    fn key_range(&self) -> (i64, i64) {
        match &self.data_type {
            DataType::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
            DataType::Int32 | DataType::Date32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            _ => (i64::MIN, i64::MAX),
        }
    }
}

fn units_per_second(unit: &TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => 1,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    }
}

fn primitive_keys<T>(array: &dyn Array, expected: &DataType) -> Result<Vec<Option<i64>>>
where
    T: ArrowPrimitiveType,
    T::Native: Into<i64>,
{
    let values = array.as_primitive_opt::<T>().ok_or_else(|| {
        GapFillError::SchemaMismatch(format!(
            "expected time column of type {expected}, found {}",
            array.data_type()
        ))
    })?;
    Ok(values.iter().map(|v| v.map(Into::into)).collect())
}

fn narrow_array<T>(keys: &[i64], data_type: &DataType) -> Result<PrimitiveArray<T>>
where
    T: ArrowPrimitiveType,
    T::Native: TryFrom<i64>,
{
    let values = keys
        .iter()
        .map(|&key| {
            T::Native::try_from(key).map_err(|_| {
                GapFillError::Execution(format!("time key {key} does not fit in {data_type}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PrimitiveArray::<T>::from_iter_values(values).with_data_type(data_type.clone()))
}

/// Parse a date or timestamp literal. Offsets are normalized to UTC; a bare
/// date means midnight.
pub fn parse_datetime_literal(text: &str) -> std::result::Result<NaiveDateTime, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty literal".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }

    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| format!("not a date or timestamp literal: {e}"))?;
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| "invalid midnight".to_string())
}
