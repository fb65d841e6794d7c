//! Column descriptors
//!
//! A column is a tagged kind plus display flags. Kind-specific behaviour
//! (cell rendering, extra descriptor fields) is dispatched on [`ColumnKind`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Column Kinds
// ============================================================================

/// Column kind with kind-specific display settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnKind {
    /// Plain text
    Text,

    /// E-mail address
    Email,

    /// Numeric value
    Number,

    /// Link
    Url,

    /// Calendar date or timestamp, rendered with a chrono format string
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },

    /// Flag rendered as one of two labels
    Boolean {
        #[serde(default = "default_true_text")]
        true_text: String,
        #[serde(default = "default_false_text")]
        false_text: String,
    },
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_true_text() -> String {
    "Yes".to_string()
}

fn default_false_text() -> String {
    "No".to_string()
}

impl ColumnKind {
    /// Date kind with the default `%Y-%m-%d` format
    pub fn date() -> Self {
        ColumnKind::Date {
            format: default_date_format(),
        }
    }

    /// Boolean kind with the default Yes/No labels
    pub fn boolean() -> Self {
        ColumnKind::Boolean {
            true_text: default_true_text(),
            false_text: default_false_text(),
        }
    }

    /// Resolve a kind tag; unknown tags render as text
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "text" | "string" => ColumnKind::Text,
            "email" => ColumnKind::Email,
            "number" | "integer" | "decimal" => ColumnKind::Number,
            "url" | "link" => ColumnKind::Url,
            "date" | "datetime" | "timestamp" => ColumnKind::date(),
            "boolean" | "bool" => ColumnKind::boolean(),
            other => {
                tracing::warn!(kind = other, "unknown column kind, rendering as text");
                ColumnKind::Text
            }
        }
    }

    /// Tag used in serialized descriptors
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Email => "email",
            ColumnKind::Number => "number",
            ColumnKind::Url => "url",
            ColumnKind::Date { .. } => "date",
            ColumnKind::Boolean { .. } => "boolean",
        }
    }

    /// Render a raw cell value for display
    pub fn render(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }

        match self {
            ColumnKind::Boolean {
                true_text,
                false_text,
            } => match truthiness(value) {
                Some(true) => Value::String(true_text.clone()),
                Some(false) => Value::String(false_text.clone()),
                None => value.clone(),
            },
            ColumnKind::Date { format } => value
                .as_str()
                .and_then(|s| format_date(s, format))
                .map(Value::String)
                .unwrap_or_else(|| value.clone()),
            ColumnKind::Number => match value {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            ColumnKind::Text | ColumnKind::Email | ColumnKind::Url => value.clone(),
        }
    }
}

/// Interpret a JSON value as a flag, accepting the usual string spellings
pub(crate) fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn format_date(raw: &str, format: &str) -> Option<String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format(format).to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.format(format).to_string());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format(format).to_string())
}

// ============================================================================
// Column
// ============================================================================

/// Descriptor for one displayed field of a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    /// Field key, dotted for related data (`user.name`)
    pub key: String,

    /// Header label
    pub label: String,

    /// Kind with kind-specific settings
    #[serde(flatten)]
    pub kind: ColumnKind,

    #[serde(default)]
    pub sortable: bool,

    #[serde(default)]
    pub searchable: bool,

    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Column {
    /// Create a column; the label is derived from the key
    pub fn new(kind: ColumnKind, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: label_from_key(&key),
            key,
            kind,
            sortable: false,
            searchable: false,
            visible: true,
        }
    }

    pub fn text(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::Text, key)
    }

    pub fn email(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::Email, key)
    }

    pub fn number(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::Number, key)
    }

    pub fn url(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::Url, key)
    }

    pub fn date(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::date(), key)
    }

    pub fn boolean(key: impl Into<String>) -> Self {
        Self::new(ColumnKind::boolean(), key)
    }

    /// Override the derived label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Hide the column unless a view lists it
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Set the chrono format of a date column; ignored for other kinds
    pub fn format(mut self, format: impl Into<String>) -> Self {
        if let ColumnKind::Date { format: f } = &mut self.kind {
            *f = format.into();
        }
        self
    }

    /// Set the labels of a boolean column; ignored for other kinds
    pub fn labels(mut self, true_text: impl Into<String>, false_text: impl Into<String>) -> Self {
        if let ColumnKind::Boolean {
            true_text: t,
            false_text: f,
        } = &mut self.kind
        {
            *t = true_text.into();
            *f = false_text.into();
        }
        self
    }

    /// Whether the key reaches into related data
    pub fn is_relation(&self) -> bool {
        self.key.contains('.')
    }
}

/// `created_at` -> `Created at`, `user.name` -> `User name`
pub fn label_from_key(key: &str) -> String {
    let spaced = key.replace(['_', '.'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
