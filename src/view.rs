//! Named view presets
//!
//! A view bundles column visibility, sort, filter presets and page size. The
//! first view added is the default unless one is marked explicitly.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TableError};
use crate::query::{Sort, SortDirection};

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// `"Active Users (EU)"` -> `"active-users-eu"`
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Named preset selectable at request time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct View {
    pub name: String,
    pub key: String,
    /// Columns shown while this view is active; `None` keeps every visible column
    #[serde(rename = "columns", skip_serializing_if = "Option::is_none")]
    pub visible_columns: Option<Vec<String>>,
    /// Filter values applied unless the request names the same filter
    #[serde(rename = "filters", default)]
    pub filter_presets: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(rename = "per_page", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(rename = "default", default)]
    pub is_default: bool,
}

impl View {
    /// Create a view keyed by the slug of its name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: slugify(&name),
            name,
            visible_columns: None,
            filter_presets: BTreeMap::new(),
            sort: None,
            page_size: None,
            is_default: false,
        }
    }

    /// Override the derived key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_presets.insert(key.into(), value.into());
        self
    }

    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort::new(column, direction));
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.page_size = Some(per_page);
        self
    }

    /// Mark this view as the default, overriding the first-added rule
    pub fn default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Ordered set of views with at most one default
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    views: Vec<View>,
    explicit_default: Option<usize>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view
    ///
    /// Fails on a duplicate key or on a second explicitly marked default.
    pub fn add(&mut self, view: View) -> Result<()> {
        if self.views.iter().any(|v| v.key == view.key) {
            return Err(TableError::duplicate_key("view", view.key));
        }
        if view.is_default {
            if let Some(existing) = self.explicit_default {
                return Err(TableError::configuration(format!(
                    "views '{}' and '{}' are both marked default",
                    self.views[existing].key, view.key
                )));
            }
            self.explicit_default = Some(self.views.len());
        }

        self.views.push(view);

        let default_index = self.explicit_default.unwrap_or(0);
        for (i, v) in self.views.iter_mut().enumerate() {
            v.is_default = i == default_index;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&View> {
        self.views.iter().find(|v| v.key == key)
    }

    pub fn default_view(&self) -> Option<&View> {
        self.views.iter().find(|v| v.is_default)
    }

    /// View for a request; unknown or missing keys fall back to the default
    pub fn select(&self, key: Option<&str>) -> Option<&View> {
        key.and_then(|k| self.get(k))
            .or_else(|| self.default_view())
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Active Users"), "active-users");
        assert_eq!(slugify("  Top 10 -- (EU) "), "top-10-eu");
        assert_eq!(slugify("plain"), "plain");
    }

    #[test]
    fn test_view_builder() {
        let view = View::new("Recent Signups")
            .columns(["name", "email"])
            .filter("status", "active")
            .sort("created_at", SortDirection::Desc)
            .per_page(10);

        assert_eq!(view.key, "recent-signups");
        assert_eq!(
            view.visible_columns,
            Some(vec!["name".to_string(), "email".to_string()])
        );
        assert_eq!(view.filter_presets.get("status"), Some(&json!("active")));
        assert_eq!(view.sort.as_ref().unwrap().column, "created_at");
        assert_eq!(view.page_size, Some(10));
        assert!(!view.is_default);
    }

    #[test]
    fn test_first_view_is_implicit_default() {
        let mut views = ViewRegistry::new();
        views.add(View::new("All")).unwrap();
        views.add(View::new("Active")).unwrap();

        assert_eq!(views.default_view().unwrap().key, "all");
        assert_eq!(views.iter().filter(|v| v.is_default).count(), 1);
    }

    #[test]
    fn test_explicit_default_overrides_first() {
        let mut views = ViewRegistry::new();
        views.add(View::new("All")).unwrap();
        views.add(View::new("Active").default()).unwrap();
        views.add(View::new("Archived")).unwrap();

        assert_eq!(views.default_view().unwrap().key, "active");
        assert_eq!(views.iter().filter(|v| v.is_default).count(), 1);
    }

    #[test]
    fn test_two_explicit_defaults_rejected() {
        let mut views = ViewRegistry::new();
        views.add(View::new("All").default()).unwrap();
        let err = views.add(View::new("Active").default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_view_key_rejected() {
        let mut views = ViewRegistry::new();
        views.add(View::new("Active")).unwrap();
        let err = views.add(View::new("ACTIVE")).unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { kind: "view", .. }));
    }

    #[test]
    fn test_select_falls_back_to_default() {
        let mut views = ViewRegistry::new();
        views.add(View::new("All")).unwrap();
        views.add(View::new("Active")).unwrap();

        assert_eq!(views.select(Some("active")).unwrap().key, "active");
        assert_eq!(views.select(Some("stale-key")).unwrap().key, "all");
        assert_eq!(views.select(None).unwrap().key, "all");
        assert!(ViewRegistry::new().select(Some("all")).is_none());
    }

    #[test]
    fn test_view_serialization() {
        let view = View::new("Active").filter("status", "active").default();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["key"], "active");
        assert_eq!(json["filters"]["status"], "active");
        assert_eq!(json["default"], true);
        assert!(json.get("columns").is_none());
    }
}
