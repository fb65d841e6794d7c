//! Filter descriptors
//!
//! A filter turns a runtime request value into a predicate. Empty values are a
//! no-op; malformed values are rejected as invalid conditions.

use chrono::{Days, NaiveDate};
use runtara_dsl::ConditionExpression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column::{label_from_key, truthiness};
use crate::condition;
use crate::error::SourceError;
use crate::record::{is_blank, value_to_text};

/// One choice of a select filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterOption {
    pub value: Value,
    pub label: String,
}

impl FilterOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Filter kind; decides how a runtime value becomes a predicate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Equality against one value, or membership when given a list
    Select {
        #[serde(default)]
        options: Vec<FilterOption>,
    },
    /// Substring match
    Text,
    /// true/false/1/0/yes/no
    Boolean,
    /// Same calendar day
    Date,
    /// `{from?, to?}`, both ends inclusive
    DateRange,
    /// `{min?, max?}`, both ends inclusive
    NumberRange,
}

/// Named predicate applied when the request carries a value for its key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FilterKind,
}

impl Filter {
    pub fn new(kind: FilterKind, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: label_from_key(&key),
            key,
            kind,
        }
    }

    pub fn select(key: impl Into<String>, options: Vec<FilterOption>) -> Self {
        Self::new(FilterKind::Select { options }, key)
    }

    pub fn text(key: impl Into<String>) -> Self {
        Self::new(FilterKind::Text, key)
    }

    pub fn boolean(key: impl Into<String>) -> Self {
        Self::new(FilterKind::Boolean, key)
    }

    pub fn date(key: impl Into<String>) -> Self {
        Self::new(FilterKind::Date, key)
    }

    pub fn date_range(key: impl Into<String>) -> Self {
        Self::new(FilterKind::DateRange, key)
    }

    pub fn number_range(key: impl Into<String>) -> Self {
        Self::new(FilterKind::NumberRange, key)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Predicate for `value`, or `None` when the value is empty
    pub fn apply(&self, value: &Value) -> Result<Option<ConditionExpression>, SourceError> {
        if is_blank(value) {
            return Ok(None);
        }

        let key = self.key.as_str();
        let predicate = match &self.kind {
            FilterKind::Select { .. } => Some(match value {
                Value::Array(values) => condition::in_list(key, values.clone()),
                other => condition::eq(key, other.clone()),
            }),
            FilterKind::Text => Some(condition::contains(key, value_to_text(value))),
            FilterKind::Boolean => {
                let flag = truthiness(value).ok_or_else(|| {
                    SourceError::invalid_condition(format!(
                        "Filter '{}' expects a boolean, got {}",
                        key, value
                    ))
                })?;
                Some(condition::eq(key, Value::Bool(flag)))
            }
            FilterKind::Date => {
                let day = parse_day(key, value)?;
                day_window(key, Some(day), Some(day))
            }
            FilterKind::DateRange => match value {
                Value::Object(map) => {
                    let from = bound(map.get("from"), |v| parse_day(key, v))?;
                    let to = bound(map.get("to"), |v| parse_day(key, v))?;
                    day_window(key, from, to)
                }
                Value::Array(items) => {
                    let from = bound(items.first(), |v| parse_day(key, v))?;
                    let to = bound(items.get(1), |v| parse_day(key, v))?;
                    day_window(key, from, to)
                }
                single => {
                    let day = parse_day(key, single)?;
                    day_window(key, Some(day), Some(day))
                }
            },
            FilterKind::NumberRange => {
                let map = value.as_object().ok_or_else(|| {
                    SourceError::invalid_condition(format!(
                        "Filter '{}' expects {{min, max}}, got {}",
                        key, value
                    ))
                })?;
                let min = bound(map.get("min"), |v| parse_number(key, v))?;
                let max = bound(map.get("max"), |v| parse_number(key, v))?;

                let mut parts = Vec::new();
                if let Some(min) = min {
                    parts.push(condition::gte(key, min));
                }
                if let Some(max) = max {
                    parts.push(condition::lte(key, max));
                }
                all_of(parts)
            }
        };

        Ok(predicate)
    }
}

fn bound<T>(
    value: Option<&Value>,
    parse: impl Fn(&Value) -> Result<T, SourceError>,
) -> Result<Option<T>, SourceError> {
    match value {
        Some(v) if !is_blank(v) => parse(v).map(Some),
        _ => Ok(None),
    }
}

fn parse_day(key: &str, value: &Value) -> Result<NaiveDate, SourceError> {
    let raw = value.as_str().unwrap_or_default();
    // Accept full timestamps by looking at the date part only
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        SourceError::invalid_condition(format!(
            "Filter '{}' expects a YYYY-MM-DD date, got {}",
            key, value
        ))
    })
}

fn parse_number(key: &str, value: &Value) -> Result<Value, SourceError> {
    let number = match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(serde_json::Number::from)
            .ok()
            .or_else(|| {
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
            }),
        _ => None,
    };
    number.map(Value::Number).ok_or_else(|| {
        SourceError::invalid_condition(format!(
            "Filter '{}' expects a number, got {}",
            key, value
        ))
    })
}

fn all_of(mut parts: Vec<ConditionExpression>) -> Option<ConditionExpression> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(condition::and(parts)),
    }
}

/// `[from 00:00, to + 1 day)` on the text form of the field
fn day_window(
    key: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Option<ConditionExpression> {
    let mut parts = Vec::new();
    if let Some(from) = from {
        parts.push(condition::gte(key, Value::String(from.to_string())));
    }
    if let Some(to) = to {
        let end = to.checked_add_days(Days::new(1)).unwrap_or(to);
        parts.push(condition::lt(key, Value::String(end.to_string())));
    }
    all_of(parts)
}
