// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Gap-fill configuration.
//!
//! `FillOptions` is the user-facing, serde-deserializable form. It is
//! validated once against the input schema into `ResolvedOptions`, which the
//! operator uses for its whole lifetime.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::error::{GapFillError, Result};
use crate::frequency::{Frequency, FrequencyResolver};
use crate::time::TimeDomain;

/// Rows per output page when not configured
pub const DEFAULT_PAGE_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Fill gaps between each group's first and last observation
    Gaps,
    /// Extend each group from its first observation up to a target time
    Forward,
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillMode::Gaps => write!(f, "gaps"),
            FillMode::Forward => write!(f, "forward"),
        }
    }
}

/// Raw frequency value: an integer step or a calendar token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencyValue {
    Integer(i64),
    Text(String),
}

impl FrequencyValue {
    /// Interpret command-line text; anything that parses as an integer is a step
    #[must_use]
    pub fn from_cli(text: &str) -> Self {
        match text.trim().parse::<i64>() {
            Ok(step) => FrequencyValue::Integer(step),
            Err(_) => FrequencyValue::Text(text.to_string()),
        }
    }
}

impl From<i64> for FrequencyValue {
    fn from(step: i64) -> Self {
        FrequencyValue::Integer(step)
    }
}

impl From<&str> for FrequencyValue {
    fn from(token: &str) -> Self {
        FrequencyValue::Text(token.to_string())
    }
}

impl From<String> for FrequencyValue {
    fn from(token: String) -> Self {
        FrequencyValue::Text(token)
    }
}

/// Raw forward-extension target: an integer or a date/timestamp literal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetTime {
    Integer(i64),
    Text(String),
}

impl fmt::Display for TargetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetTime::Integer(v) => write!(f, "{v}"),
            TargetTime::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for TargetTime {
    fn from(v: i64) -> Self {
        TargetTime::Integer(v)
    }
}

impl From<&str> for TargetTime {
    fn from(s: &str) -> Self {
        TargetTime::Text(s.to_string())
    }
}

impl From<String> for TargetTime {
    fn from(s: String) -> Self {
        TargetTime::Text(s)
    }
}

fn default_true() -> bool {
    true
}

/// Gap-fill configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillOptions {
    pub mode: FillMode,
    pub group_column: String,
    pub time_column: String,
    pub value_column: String,
    #[serde(default)]
    pub frequency: Option<FrequencyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default = "default_true")]
    pub default_to_daily_on_unknown_token: bool,
}

impl FillOptions {
    pub fn gaps(
        group_column: impl Into<String>,
        time_column: impl Into<String>,
        value_column: impl Into<String>,
        frequency: impl Into<FrequencyValue>,
    ) -> Self {
        Self {
            mode: FillMode::Gaps,
            group_column: group_column.into(),
            time_column: time_column.into(),
            value_column: value_column.into(),
            frequency: Some(frequency.into()),
            target: None,
            page_size: None,
            default_to_daily_on_unknown_token: true,
        }
    }

    pub fn forward(
        group_column: impl Into<String>,
        time_column: impl Into<String>,
        value_column: impl Into<String>,
        target: impl Into<TargetTime>,
        frequency: impl Into<FrequencyValue>,
    ) -> Self {
        Self {
            mode: FillMode::Forward,
            target: Some(target.into()),
            ..Self::gaps(group_column, time_column, value_column, frequency)
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn with_default_to_daily_on_unknown_token(mut self, enabled: bool) -> Self {
        self.default_to_daily_on_unknown_token = enabled;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| GapFillError::ConfigFile(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GapFillError::ConfigFile(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| GapFillError::ConfigFile(e.to_string()))
    }
}

/// Options validated against a concrete input schema
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub mode: FillMode,
    pub group_index: usize,
    pub time_index: usize,
    pub value_index: usize,
    pub domain: TimeDomain,
    pub frequency: Frequency,
    /// Grid step in time-key units
    pub step: i64,
    /// Converted only when input ends
    pub target: Option<TargetTime>,
    pub page_size: usize,
}

impl ResolvedOptions {
    pub fn resolve(schema: &Schema, options: &FillOptions) -> Result<Self> {
        let group_index = column_index(schema, &options.group_column)?;
        let time_index = column_index(schema, &options.time_column)?;
        let value_index = column_index(schema, &options.value_column)?;

        if group_index == time_index || group_index == value_index || time_index == value_index {
            return Err(GapFillError::config(format!(
                "group, time and value columns must be distinct (got '{}', '{}', '{}')",
                options.group_column, options.time_column, options.value_column
            )));
        }

        let value_type = schema.field(value_index).data_type();
        if !value_type.is_numeric() {
            return Err(GapFillError::config(format!(
                "value column '{}' must be numeric, found {value_type}",
                options.value_column
            )));
        }

        let domain = TimeDomain::from_data_type(schema.field(time_index).data_type())?;
        let frequency = FrequencyResolver::new(options.default_to_daily_on_unknown_token)
            .resolve(options.frequency.as_ref(), &domain)?;
        let step = frequency.step(&domain)?;
        if step <= 0 {
            return Err(GapFillError::config(format!(
                "frequency {frequency} yields a non-positive step"
            )));
        }

        let target = match (options.mode, &options.target) {
            (FillMode::Gaps, None) => None,
            (FillMode::Gaps, Some(_)) => {
                return Err(GapFillError::config(
                    "a target time is only valid in forward mode",
                ));
            }
            (FillMode::Forward, None) => {
                return Err(GapFillError::config("forward mode requires a target time"));
            }
            (FillMode::Forward, Some(TargetTime::Text(s))) if s.trim().is_empty() => {
                return Err(GapFillError::config("target time cannot be empty"));
            }
            (FillMode::Forward, Some(target)) => Some(target.clone()),
        };

        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(GapFillError::config("page size must be positive"));
        }

        Ok(Self {
            mode: options.mode,
            group_index,
            time_index,
            value_index,
            domain,
            frequency,
            step,
            target,
            page_size,
        })
    }

    /// The input schema with value and passthrough columns made nullable
    #[must_use]
    pub fn output_schema(&self, input: &Schema) -> SchemaRef {
        let fields: Vec<Field> = input
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                if idx == self.group_index || idx == self.time_index {
                    field.as_ref().clone()
                } else {
                    field.as_ref().clone().with_nullable(true)
                }
            })
            .collect();
        Arc::new(Schema::new_with_metadata(fields, input.metadata().clone()))
    }
}

fn column_index(schema: &Schema, name: &str) -> Result<usize> {
    if name.trim().is_empty() {
        return Err(GapFillError::config("column names cannot be empty"));
    }
    schema
        .index_of(name)
        .map_err(|_| GapFillError::MissingColumn(name.to_string()))
}
