//! Configuration for table construction and response assembly
//!
//! Provides a builder pattern for configuring tables, plus TOML loading.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};

/// Wire shape selected by the host when rendering a [`ResponsePayload`](crate::ResponsePayload)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseFormat {
    /// Structured page for page visits, raw JSON otherwise
    #[default]
    Auto,
    /// `{"component": .., "props": {"table": ..}}` envelope
    StructuredPage,
    /// The payload as-is
    RawJson,
    /// The payload without its `meta` block
    PlainObject,
}

impl ResponseFormat {
    /// Parse a configuration value; unknown values are rejected
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "structured-page" | "structured_page" | "inertia" => Some(Self::StructuredPage),
            "raw-json" | "raw_json" | "json" => Some(Self::RawJson),
            "plain-object" | "plain_object" | "array" => Some(Self::PlainObject),
            _ => None,
        }
    }
}

/// Configuration shared by every table built from it
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Page size when neither the request nor the view names one (default: 25)
    pub default_per_page: u32,
    /// Upper bound for any page size (default: 100)
    pub max_per_page: u32,
    /// Response wire shape (default: auto)
    pub response_format: ResponseFormat,
    /// Search terms shorter than this are ignored (default: 1)
    pub search_min_length: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig::builder().build()
    }
}

impl TableConfig {
    /// Create a new configuration builder
    pub fn builder() -> TableConfigBuilder {
        TableConfigBuilder::new()
    }

    /// Load configuration from a TOML document
    ///
    /// ```toml
    /// [table]
    /// default_per_page = 25
    /// max_per_page = 100
    /// search_min_length = 2
    ///
    /// [response]
    /// format = "raw-json"
    /// ```
    ///
    /// Missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut builder = TableConfig::builder();

        if let Some(max) = file.table.max_per_page {
            builder = builder.max_per_page(max);
        }
        if let Some(default) = file.table.default_per_page {
            builder = builder.default_per_page(default);
        }
        if let Some(min) = file.table.search_min_length {
            builder = builder.search_min_length(min);
        }
        if let Some(value) = file.response.format {
            let format = ResponseFormat::parse(&value).ok_or_else(|| {
                TableError::Configuration(format!("Unknown response format: {}", value))
            })?;
            builder = builder.response_format(format);
        }

        Ok(builder.build())
    }

    /// Clamp a requested page size into `[1, max_per_page]`
    pub fn clamp_per_page(&self, per_page: u32) -> u32 {
        per_page.clamp(1, self.max_per_page)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    table: TableSection,
    #[serde(default)]
    response: ResponseSection,
}

#[derive(Debug, Default, Deserialize)]
struct TableSection {
    default_per_page: Option<u32>,
    max_per_page: Option<u32>,
    search_min_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseSection {
    format: Option<String>,
}

/// Builder for TableConfig
#[derive(Debug)]
pub struct TableConfigBuilder {
    default_per_page: u32,
    max_per_page: u32,
    response_format: ResponseFormat,
    search_min_length: usize,
}

impl Default for TableConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            default_per_page: 25,
            max_per_page: 100,
            response_format: ResponseFormat::Auto,
            search_min_length: 1,
        }
    }

    /// Set the default page size (default: 25)
    pub fn default_per_page(mut self, per_page: u32) -> Self {
        self.default_per_page = per_page;
        self
    }

    /// Set the maximum page size (default: 100)
    pub fn max_per_page(mut self, max: u32) -> Self {
        self.max_per_page = max;
        self
    }

    /// Set the response wire shape (default: auto)
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Set the minimum search term length (default: 1)
    pub fn search_min_length(mut self, len: usize) -> Self {
        self.search_min_length = len;
        self
    }

    /// Build the configuration
    ///
    /// `max_per_page` is at least 1 and `default_per_page` never exceeds it.
    pub fn build(self) -> TableConfig {
        let max_per_page = self.max_per_page.max(1);
        TableConfig {
            default_per_page: self.default_per_page.clamp(1, max_per_page),
            max_per_page,
            response_format: self.response_format,
            search_min_length: self.search_min_length,
        }
    }
}
