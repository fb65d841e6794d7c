//! # tablekit
//!
//! A backend-agnostic list query engine.
//!
//! A table is declared once from columns, filters, actions and views. Each
//! incoming request is resolved into a [`QuerySpec`], executed against a
//! [`DataSource`] adapter and assembled into a serializable [`ResponsePayload`].
//!
//! ## Features
//!
//! - **Typed Descriptors**: Tagged column, filter and action kinds with display metadata
//! - **Views**: Named presets for visible columns, sort, filters and page size
//! - **Lenient Request Parsing**: Nested JSON, dotted keys, bracketed query strings
//! - **Pluggable Sources**: In-memory records or PostgreSQL through `sqlx`
//! - **Relation-Aware Search and Sort**: Dotted column keys are resolved by the adapter
//! - **Atomic Actions**: Row and bulk handlers run in one source transaction
//! - **Optional Collaborators**: Column suggestions, realtime broadcasts and analytics
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use tablekit::{
//!     Action, ColumnKind, Filter, FilterOption, MemorySource, RequestParams, TableBuilder, View,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = TableBuilder::new("users")
//!         .add_column(ColumnKind::Text, "name")
//!         .sortable()
//!         .searchable()
//!         .add_column(ColumnKind::Email, "email")
//!         .searchable()
//!         .add_column(ColumnKind::boolean(), "active")
//!         .filter(Filter::select(
//!             "status",
//!             vec![FilterOption::new("active", "Active")],
//!         ))
//!         .action(Action::delete())
//!         .action(Action::bulk_delete())
//!         .view(View::new("All"))
//!         .with_pagination(10)
//!         .build()?;
//!
//!     let source = MemorySource::new(vec![
//!         json!({"id": 1, "name": "Ada", "email": "ada@example.com", "active": true}),
//!         json!({"id": 2, "name": "Bob", "email": "bob@example.com", "active": false}),
//!     ]);
//!
//!     let params = RequestParams::from_query_string("search=ada&sort[column]=name");
//!     let payload = table.respond(&source, &params).await?;
//!     assert_eq!(payload.data.len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Tables share a [`TableConfig`], built in code or loaded from TOML:
//!
//! ```rust
//! use tablekit::{ResponseFormat, TableConfig};
//!
//! let config = TableConfig::builder()
//!     .default_per_page(25)                        // Page size without request/view override
//!     .max_per_page(100)                           // Upper bound for any page size
//!     .response_format(ResponseFormat::RawJson)    // Wire shape chosen by the host
//!     .search_min_length(2)                        // Shorter search terms are ignored
//!     .build();
//! ```
//!
//! ## Errors
//!
//! Duplicate keys and other definition mistakes fail [`TableBuilder::build`].
//! Adapter failures surface as [`TableError::QueryExecution`]. Action failures
//! roll back and are reported as an unsuccessful [`ActionOutcome`]. Failures of
//! optional collaborators are logged through `tracing` and otherwise ignored.

pub mod action;
pub mod column;
pub mod condition;
pub mod config;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod query;
pub mod record;
pub mod response;
pub mod source;
pub mod sql;
pub mod table;
pub mod view;

// Re-export main types for convenience
pub use action::{
    Action, ActionContext, ActionHandler, ActionKind, ActionOutcome, ActionTarget, CloneRecord,
    DeleteRecords, ExportRecords, HttpMethod, Redirect, UpdateRecords,
};
pub use column::{Column, ColumnKind};
pub use config::{ResponseFormat, TableConfig, TableConfigBuilder};
pub use error::{HookError, Result, SourceError, TableError};
pub use filter::{Filter, FilterKind, FilterOption};
pub use hooks::{
    AnalyticsEvent, AnalyticsSink, Broadcaster, ColumnSuggester, ColumnSuggestion, Hooks,
    TableEvent,
};
pub use query::{QuerySpec, RequestParams, Sort, SortDirection};
pub use record::Record;
pub use response::{RenderHints, ResponsePayload};
pub use source::memory::MemorySource;
pub use source::postgres::{
    AggregateFn, PgSource, RelationAggregate, RelationKind, Trashed,
};
pub use source::{DataSource, FieldRef, ListQuery, Mutations};
pub use table::{ResultPage, Table, TableBuilder};
pub use view::{View, ViewRegistry};

// Re-export ConditionExpression types from runtara-dsl for convenience
pub use runtara_dsl::{
    ConditionArgument, ConditionExpression, ConditionOperation, ConditionOperator,
};

// Re-export SQL utilities for advanced users
pub use sql::{build_condition_clause, quote_identifier, validate_identifier};
