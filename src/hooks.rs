//! Optional collaborators
//!
//! Column suggestions, realtime broadcasts and analytics are registered
//! explicitly on a table and absent by default. Their failures are logged and
//! otherwise ignored: they never fail a build, a response or an action.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::column::{Column, ColumnKind};
use crate::error::HookError;
use crate::record::Record;

/// Most sample rows ever handed to a [`ColumnSuggester`]
pub const MAX_SAMPLE_ROWS: usize = 5;

// ============================================================================
// Column Suggestions
// ============================================================================

/// Column proposed by a [`ColumnSuggester`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSuggestion {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Kind tag; unknown tags become text
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub searchable: bool,
}

impl ColumnSuggestion {
    pub fn into_column(self) -> Column {
        let mut column = Column::new(ColumnKind::parse(&self.kind), self.key);
        if let Some(label) = self.label.filter(|l| !l.trim().is_empty()) {
            column.label = label;
        }
        column.sortable = self.sortable;
        column.searchable = self.searchable;
        column
    }
}

/// Proposes columns from sample rows
#[async_trait]
pub trait ColumnSuggester: Send + Sync {
    async fn suggest_columns(
        &self,
        sample: &[Record],
        context: &str,
    ) -> Result<Vec<ColumnSuggestion>, HookError>;
}

// ============================================================================
// Realtime
// ============================================================================

/// Change notification published after a committed mutating action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEvent {
    pub action: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TableEvent {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Channel a table's events are published on
pub fn table_channel(table_id: &str) -> String {
    format!("table.{}", table_id)
}

/// Publishes table events to subscribers
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, channel: &str, event: &TableEvent) -> Result<(), HookError>;
}

// ============================================================================
// Analytics
// ============================================================================

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub component_type: String,
    pub component_name: String,
    pub event_type: String,
    pub event_data: Value,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn table(table_id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            component_type: "table".to_string(),
            component_name: table_id.into(),
            event_type: event_type.into(),
            event_data: data,
            timestamp: Utc::now(),
        }
    }

    pub fn table_viewed(table_id: impl Into<String>, data: Value) -> Self {
        Self::table(table_id, "table_viewed", data)
    }

    pub fn action_executed(table_id: impl Into<String>, data: Value) -> Self {
        Self::table(table_id, "action_executed", data)
    }
}

/// Receives analytics events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), HookError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Collaborators registered on a table; all absent by default
#[derive(Clone, Default)]
pub struct Hooks {
    pub suggester: Option<Arc<dyn ColumnSuggester>>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
    pub analytics: Option<Arc<dyn AnalyticsSink>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("suggester", &self.suggester.is_some())
            .field("broadcaster", &self.broadcaster.is_some())
            .field("analytics", &self.analytics.is_some())
            .finish()
    }
}

impl Hooks {
    /// Suggestions for the first few sample rows; failures read as none
    pub async fn suggest_columns(&self, sample: &[Record], context: &str) -> Vec<ColumnSuggestion> {
        let Some(suggester) = &self.suggester else {
            return Vec::new();
        };
        let sample = &sample[..sample.len().min(MAX_SAMPLE_ROWS)];
        match suggester.suggest_columns(sample, context).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                tracing::warn!(error = %e, "column suggestions failed, continuing without");
                Vec::new()
            }
        }
    }

    pub async fn broadcast(&self, table_id: &str, event: TableEvent) {
        let Some(broadcaster) = &self.broadcaster else {
            return;
        };
        let channel = table_channel(table_id);
        if let Err(e) = broadcaster.broadcast(&channel, &event).await {
            tracing::warn!(channel = %channel, action = %event.action, error = %e, "broadcast failed");
        }
    }

    pub async fn record(&self, event: AnalyticsEvent) {
        let Some(analytics) = &self.analytics else {
            return;
        };
        let event_type = event.event_type.clone();
        if let Err(e) = analytics.record(event).await {
            tracing::warn!(event_type = %event_type, error = %e, "analytics event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct Failing;

    #[async_trait]
    impl ColumnSuggester for Failing {
        async fn suggest_columns(
            &self,
            _sample: &[Record],
            _context: &str,
        ) -> Result<Vec<ColumnSuggestion>, HookError> {
            Err(HookError::new("completion API unavailable"))
        }
    }

    #[async_trait]
    impl Broadcaster for Failing {
        async fn broadcast(&self, _channel: &str, _event: &TableEvent) -> Result<(), HookError> {
            Err(HookError::new("socket closed"))
        }
    }

    #[derive(Default)]
    struct SampleSize(Mutex<Vec<usize>>);

    #[async_trait]
    impl ColumnSuggester for SampleSize {
        async fn suggest_columns(
            &self,
            sample: &[Record],
            _context: &str,
        ) -> Result<Vec<ColumnSuggestion>, HookError> {
            self.0.lock().await.push(sample.len());
            Ok(vec![ColumnSuggestion {
                key: "email".to_string(),
                label: None,
                kind: "email".to_string(),
                sortable: true,
                searchable: true,
            }])
        }
    }

    #[tokio::test]
    async fn test_absent_hooks_are_noops() {
        let hooks = Hooks::default();
        assert!(hooks.suggest_columns(&[json!({})], "").await.is_empty());
        hooks.broadcast("users", TableEvent::new("delete", json!({}))).await;
        hooks
            .record(AnalyticsEvent::table_viewed("users", json!({})))
            .await;
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let hooks = Hooks {
            suggester: Some(Arc::new(Failing)),
            broadcaster: Some(Arc::new(Failing)),
            analytics: None,
        };
        assert!(hooks.suggest_columns(&[json!({})], "").await.is_empty());
        hooks.broadcast("users", TableEvent::new("delete", json!({}))).await;
    }

    #[tokio::test]
    async fn test_sample_is_truncated() {
        let suggester = Arc::new(SampleSize::default());
        let hooks = Hooks {
            suggester: Some(suggester.clone() as Arc<dyn ColumnSuggester>),
            ..Hooks::default()
        };
        let rows: Vec<Record> = (0..8).map(|i| json!({"id": i})).collect();
        let suggestions = hooks.suggest_columns(&rows, "users").await;

        assert_eq!(suggestions.len(), 1);
        assert_eq!(*suggester.0.lock().await, vec![MAX_SAMPLE_ROWS]);
    }

    #[test]
    fn test_suggestion_into_column() {
        let column = ColumnSuggestion {
            key: "signup_score".to_string(),
            label: Some(" ".to_string()),
            kind: "sparkline".to_string(),
            sortable: true,
            searchable: false,
        }
        .into_column();

        assert_eq!(column.kind, ColumnKind::Text);
        assert_eq!(column.label, "Signup score");
        assert!(column.sortable);
    }

    #[test]
    fn test_analytics_event_shape() {
        let event = AnalyticsEvent::action_executed("users", json!({"action": "delete"}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["component_type"], "table");
        assert_eq!(json["component_name"], "users");
        assert_eq!(json["event_type"], "action_executed");
        assert!(json["id"].is_string());
        assert_eq!(table_channel("users"), "table.users");
    }
}
