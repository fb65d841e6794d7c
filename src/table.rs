//! Table - declarative list definition and its request cycle
//!
//! A [`Table`] owns the columns, filters, actions and views assembled once by
//! a [`TableBuilder`]. It is immutable after `build` and can be shared across
//! requests; every request resolves its own [`QuerySpec`] and [`ResultPage`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::{
    Acknowledge, Action, ActionContext, ActionHandler, ActionKind, ActionOutcome, ActionTarget,
};
use crate::column::{Column, ColumnKind};
use crate::config::TableConfig;
use crate::error::{Result, SourceError, TableError};
use crate::filter::Filter;
use crate::hooks::{
    AnalyticsEvent, AnalyticsSink, Broadcaster, ColumnSuggester, Hooks, TableEvent,
};
use crate::query::{QuerySpec, RequestParams, Sort};
use crate::record::Record;
use crate::response::{RenderHints, ResponsePayload};
use crate::source::{DataSource, FieldRef, ListQuery};
use crate::view::{View, ViewRegistry};

// ============================================================================
// Result Page
// ============================================================================

/// One page of records plus pagination bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<Record>,
    pub total: u64,
    pub page_size: u32,
    pub current_page: u32,
    pub last_page: u32,
}

impl ResultPage {
    pub fn new(items: Vec<Record>, total: u64, page_size: u32, current_page: u32) -> Self {
        let page_size = page_size.max(1);
        let pages = total.div_ceil(u64::from(page_size)).max(1);
        Self {
            items,
            total,
            page_size,
            current_page: current_page.max(1),
            last_page: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }

    /// Every match on one page
    pub fn unpaginated(items: Vec<Record>) -> Self {
        let total = items.len() as u64;
        let page_size = u32::try_from(items.len()).unwrap_or(u32::MAX);
        Self::new(items, total, page_size, 1)
    }

    /// 1-based position of the first item, `None` on an empty page
    pub fn from(&self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        Some(u64::from(self.current_page - 1) * u64::from(self.page_size) + 1)
    }

    /// 1-based position of the last item, `None` on an empty page
    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Table`]
///
/// Column flag setters (`sortable`, `searchable`, `hidden`, `label`) act on the
/// most recently added column, so they chain right after `add_column`:
///
/// ```
/// use tablekit::{ColumnKind, TableBuilder};
///
/// let table = TableBuilder::new("users")
///     .add_column(ColumnKind::Text, "name")
///     .sortable()
///     .searchable()
///     .add_column(ColumnKind::Email, "email")
///     .build()
///     .unwrap();
///
/// assert_eq!(table.columns().len(), 2);
/// assert!(table.column("name").unwrap().sortable);
/// ```
#[derive(Debug)]
pub struct TableBuilder {
    id: String,
    config: TableConfig,
    columns: Vec<Column>,
    filters: Vec<Filter>,
    actions: Vec<Action>,
    views: Vec<View>,
    per_page: Option<u32>,
    paginate: bool,
    hooks: Hooks,
}

impl TableBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: TableConfig::default(),
            columns: Vec::new(),
            filters: Vec::new(),
            actions: Vec::new(),
            views: Vec::new(),
            per_page: None,
            paginate: true,
            hooks: Hooks::default(),
        }
    }

    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a prepared column
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a column of `kind`; the label is derived from the key
    pub fn add_column(self, kind: ColumnKind, key: impl Into<String>) -> Self {
        self.column(Column::new(kind, key))
    }

    fn last_column(mut self, update: impl FnOnce(&mut Column)) -> Self {
        match self.columns.last_mut() {
            Some(column) => update(column),
            None => tracing::warn!(table = %self.id, "column setter called before any column was added"),
        }
        self
    }

    pub fn sortable(self) -> Self {
        self.last_column(|c| c.sortable = true)
    }

    pub fn searchable(self) -> Self {
        self.last_column(|c| c.searchable = true)
    }

    pub fn hidden(self) -> Self {
        self.last_column(|c| c.visible = false)
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.last_column(|c| c.label = label)
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Page size used when neither the request nor the active view names one
    pub fn with_pagination(mut self, per_page: u32) -> Self {
        self.paginate = true;
        self.per_page = Some(per_page);
        self
    }

    /// Return every match on a single page
    pub fn without_pagination(mut self) -> Self {
        self.paginate = false;
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn suggester(mut self, suggester: impl ColumnSuggester + 'static) -> Self {
        self.hooks.suggester = Some(Arc::new(suggester));
        self
    }

    pub fn broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.hooks.broadcaster = Some(Arc::new(broadcaster));
        self
    }

    pub fn analytics(mut self, analytics: impl AnalyticsSink + 'static) -> Self {
        self.hooks.analytics = Some(Arc::new(analytics));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TableError::configuration("table id must not be empty"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.key.is_empty() {
                return Err(TableError::configuration("column key must not be empty"));
            }
            if !seen.insert(column.key.as_str()) {
                return Err(TableError::duplicate_key("column", column.key.clone()));
            }
        }

        let mut seen = HashSet::new();
        for filter in &self.filters {
            if !seen.insert(filter.key.as_str()) {
                return Err(TableError::duplicate_key("filter", filter.key.clone()));
            }
        }

        // Row and bulk actions live in separate namespaces
        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert((action.kind, action.name.as_str())) {
                return Err(TableError::duplicate_key("action", action.name.clone()));
            }
        }

        Ok(())
    }

    /// Validate and freeze the definition
    ///
    /// Duplicate column, filter, action or view keys are rejected here, never
    /// at request time.
    pub fn build(self) -> Result<Table> {
        self.validate()?;

        let mut views = ViewRegistry::new();
        for view in self.views {
            if let Some(unknown) = view
                .visible_columns
                .iter()
                .flatten()
                .find(|key| !self.columns.iter().any(|c| &c.key == *key))
            {
                return Err(TableError::configuration(format!(
                    "view '{}' shows unknown column '{}'",
                    view.key, unknown
                )));
            }
            views.add(view)?;
        }

        Ok(Table {
            id: self.id,
            config: self.config,
            columns: self.columns,
            filters: self.filters,
            actions: self.actions,
            views,
            per_page: self.per_page,
            paginate: self.paginate,
            hooks: self.hooks,
        })
    }

    /// Merge column suggestions for `sample`, then build
    ///
    /// Without a registered suggester, or when it fails, this is `build`.
    /// Suggestions whose key is already taken are skipped.
    pub async fn build_with_suggestions(mut self, sample: &[Record], context: &str) -> Result<Table> {
        for suggestion in self.hooks.suggest_columns(sample, context).await {
            if self.columns.iter().any(|c| c.key == suggestion.key) {
                continue;
            }
            tracing::debug!(table = %self.id, column = %suggestion.key, "adding suggested column");
            self.columns.push(suggestion.into_column());
        }
        self.build()
    }
}

// ============================================================================
// Table
// ============================================================================

/// Immutable table definition
#[derive(Debug)]
pub struct Table {
    id: String,
    config: TableConfig,
    columns: Vec<Column>,
    filters: Vec<Filter>,
    actions: Vec<Action>,
    views: ViewRegistry,
    per_page: Option<u32>,
    paginate: bool,
    hooks: Hooks,
}

impl Table {
    pub fn builder(id: impl Into<String>) -> TableBuilder {
        TableBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, kind: ActionKind, name: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.kind == kind && a.name == name)
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn is_paginated(&self) -> bool {
        self.paginate
    }

    /// Sort that execution will actually apply; unsortable columns read as unsorted
    pub fn applied_sort(&self, sort: &Sort) -> Sort {
        match self.column(&sort.column) {
            Some(column) if column.sortable => sort.clone(),
            _ => Sort::default(),
        }
    }

    /// Merge the selected (or default) view into a request spec
    ///
    /// Request values win over view presets; view presets win over the table
    /// and config defaults. The result always carries a clamped page size and
    /// the key of the view that was applied, if any.
    pub fn effective_spec(&self, spec: &QuerySpec) -> QuerySpec {
        let view = self.views.select(spec.view.as_deref());
        let mut effective = spec.clone();
        effective.page = spec.page.max(1);
        effective.view = view.map(|v| v.key.clone());

        if let Some(view) = view {
            if !effective.sort.is_set() {
                if let Some(sort) = &view.sort {
                    effective.sort = sort.clone();
                }
            }
            for (key, value) in &view.filter_presets {
                effective
                    .filters
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        let per_page = spec
            .per_page
            .or_else(|| view.and_then(|v| v.page_size))
            .or(self.per_page)
            .unwrap_or(self.config.default_per_page);
        effective.per_page = Some(self.config.clamp_per_page(per_page));

        effective
    }

    // =========================================================================
    // Query Execution
    // =========================================================================

    /// Run `spec` against `source`
    ///
    /// Adapter failures, including malformed filter values, surface as
    /// [`TableError::QueryExecution`] with no partial data.
    pub async fn execute<S: DataSource>(&self, source: &S, spec: &QuerySpec) -> Result<ResultPage> {
        let effective = self.effective_spec(spec);
        self.run(source, &effective).await
    }

    async fn run<S: DataSource>(&self, source: &S, spec: &QuerySpec) -> Result<ResultPage> {
        let mut query = source.query();

        let term = spec.search.trim();
        if !term.is_empty() && term.chars().count() >= self.config.search_min_length {
            let fields: Vec<FieldRef> = self
                .columns
                .iter()
                .filter(|c| c.searchable)
                .map(|c| FieldRef::parse(&c.key))
                .collect();
            if !fields.is_empty() {
                query.search(&fields, term)?;
            }
        }

        for filter in &self.filters {
            let Some(value) = spec.filters.get(&filter.key) else {
                continue;
            };
            if let Some(condition) = filter.apply(value)? {
                query.filter(condition)?;
            }
        }

        if spec.sort.is_set() {
            match self.column(&spec.sort.column) {
                Some(column) if column.sortable => {
                    query.sort(&FieldRef::parse(&column.key), spec.sort.direction)?;
                }
                _ => {
                    tracing::debug!(table = %self.id, column = %spec.sort.column, "ignoring sort on non-sortable column");
                }
            }
        }

        let page = if self.paginate {
            let per_page = spec
                .per_page
                .unwrap_or(self.config.default_per_page);
            let per_page = self.config.clamp_per_page(per_page);
            let (items, total) = query.paginate(spec.page, per_page).await?;
            ResultPage::new(items, total, per_page, spec.page)
        } else {
            ResultPage::unpaginated(query.all().await?)
        };

        tracing::debug!(
            table = %self.id,
            search = %spec.search,
            sort = %spec.sort.column,
            filters = spec.filters.len(),
            page = page.current_page,
            total = page.total,
            "executed list query"
        );

        Ok(page)
    }

    // =========================================================================
    // Request Cycle
    // =========================================================================

    /// Serializable payload for an executed page
    pub fn assemble(&self, page: &ResultPage, spec: &QuerySpec) -> ResponsePayload {
        ResponsePayload::assemble(self, page, &self.effective_spec(spec))
    }

    /// Resolve `params`, execute them and assemble the response
    ///
    /// Records a `table_viewed` analytics event on success.
    pub async fn respond<S: DataSource>(
        &self,
        source: &S,
        params: &RequestParams,
    ) -> Result<ResponsePayload> {
        let spec = self.effective_spec(&QuerySpec::resolve(params));
        tracing::debug!(table = %self.id, ?spec, "resolved request");

        let page = self.run(source, &spec).await?;
        let payload = ResponsePayload::assemble(self, &page, &spec);

        self.hooks
            .record(AnalyticsEvent::table_viewed(
                &self.id,
                json!({
                    "search": spec.search,
                    "sort": spec.sort,
                    "filters": spec.filters,
                    "view": spec.view,
                    "page": page.current_page,
                    "total": page.total,
                }),
            ))
            .await;

        Ok(payload)
    }

    /// Render a payload in the configured wire shape
    pub fn render(
        &self,
        payload: &ResponsePayload,
        hints: RenderHints,
    ) -> serde_json::Result<Value> {
        payload.render(self.config.response_format, hints)
    }

    // =========================================================================
    // Action Dispatch
    // =========================================================================

    /// Run the action `name` against `target` inside one source transaction
    ///
    /// A single id selects a row action, a list of ids a bulk action. Handler
    /// failures roll the transaction back and are reported as an unsuccessful
    /// outcome; only an unknown action name is an error.
    pub async fn dispatch_action<S: DataSource>(
        &self,
        source: &S,
        name: &str,
        target: ActionTarget,
    ) -> Result<ActionOutcome> {
        let kind = target.kind();
        let action = self.action(kind, name).ok_or_else(|| {
            TableError::UnknownAction(format!("{} action '{}'", kind_name(kind), name))
        })?;

        if target.is_empty() && action.requires_selection {
            return Ok(ActionOutcome::failed("No items selected.", "empty selection"));
        }

        let ctx = ActionContext {
            table_id: self.id.clone(),
            action: action.name.clone(),
            primary_key: source.primary_key().to_string(),
            target,
        };
        let count = ctx.target.len();

        let data = match self.run_action(source, action, &ctx).await {
            Ok(data) => data,
            Err(source_err) => {
                let message = format!("Action failed: {}", source_err);
                let cause = source_err.to_string();
                let err = TableError::ActionExecution {
                    action: action.name.clone(),
                    source: source_err,
                };
                tracing::warn!(table = %self.id, error = %err, "action rolled back");
                return Ok(ActionOutcome::failed(message, cause));
            }
        };

        tracing::info!(table = %self.id, action = %action.name, count, "action committed");

        if action.mutating {
            self.hooks
                .broadcast(
                    &self.id,
                    TableEvent::new(
                        action.name.clone(),
                        json!({"ids": ctx.target.ids(), "result": data}),
                    ),
                )
                .await;
        }
        self.hooks
            .record(AnalyticsEvent::action_executed(
                &self.id,
                json!({"action": action.name, "type": action.kind, "count": count}),
            ))
            .await;

        Ok(ActionOutcome::succeeded(action.success_message(count), data))
    }

    async fn run_action<S: DataSource>(
        &self,
        source: &S,
        action: &Action,
        ctx: &ActionContext,
    ) -> std::result::Result<Value, SourceError> {
        let mut tx = source.begin().await?;

        let result = match action.handler_ref() {
            Some(handler) => handler.handle(&mut tx, ctx).await,
            None => Acknowledge.handle(&mut tx, ctx).await,
        };

        match result {
            Ok(data) => {
                source.commit(tx).await?;
                Ok(data)
            }
            Err(err) => {
                if let Err(rollback_err) = source.rollback(tx).await {
                    tracing::warn!(table = %self.id, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn kind_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Row => "row",
        ActionKind::Bulk => "bulk",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;
    use crate::filter::FilterOption;
    use crate::hooks::ColumnSuggestion;
    use crate::query::SortDirection;
    use crate::source::MemorySource;
    use async_trait::async_trait;

    fn people() -> MemorySource {
        MemorySource::new(vec![
            json!({"id": 1, "name": "Ada", "status": "active", "age": 36}),
            json!({"id": 2, "name": "Bob", "status": "inactive", "age": 25}),
            json!({"id": 3, "name": "Cy", "status": "active", "age": 51}),
            json!({"id": 4, "name": "Dee", "status": "active", "age": 19}),
        ])
    }

    fn names(page: &ResultPage) -> Vec<&str> {
        page.items
            .iter()
            .map(|r| r["name"].as_str().unwrap_or_default())
            .collect()
    }

    fn table() -> TableBuilder {
        TableBuilder::new("people")
            .add_column(ColumnKind::Number, "id")
            .sortable()
            .add_column(ColumnKind::Text, "name")
            .sortable()
            .searchable()
            .add_column(ColumnKind::Text, "status")
            .add_column(ColumnKind::Number, "age")
            .sortable()
            .filter(Filter::select(
                "status",
                vec![
                    FilterOption::new("active", "Active"),
                    FilterOption::new("inactive", "Inactive"),
                ],
            ))
            .filter(Filter::number_range("age"))
    }

    // =========================================================================
    // Builder Tests
    // =========================================================================

    #[test]
    fn test_chained_column_flags() {
        let table = table().label("Age (years)").hidden().build().unwrap();
        let age = table.column("age").unwrap();
        assert_eq!(age.label, "Age (years)");
        assert!(!age.visible);
        assert!(table.column("name").unwrap().searchable);
        assert!(!table.column("status").unwrap().sortable);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = table()
            .add_column(ColumnKind::Email, "name")
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { kind: "column", .. }));

        let err = table().filter(Filter::text("status")).build().unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { kind: "filter", .. }));

        let err = table()
            .action(Action::delete())
            .action(Action::row("delete"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { kind: "action", .. }));
    }

    #[test]
    fn test_row_and_bulk_actions_share_names() {
        let table = table()
            .action(Action::delete())
            .action(Action::bulk_delete())
            .build()
            .unwrap();
        assert!(table.action(ActionKind::Row, "delete").is_some());
        assert!(table.action(ActionKind::Bulk, "delete").is_some());
    }

    #[test]
    fn test_view_with_unknown_column_rejected() {
        let err = table()
            .view(View::new("Short").columns(["name", "nickname"]))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(TableBuilder::new(" ").build().unwrap_err().is_configuration());
    }

    // =========================================================================
    // Effective Spec Tests
    // =========================================================================

    #[test]
    fn test_view_presets_seed_spec() {
        let table = table()
            .with_pagination(10)
            .view(
                View::new("Active")
                    .filter("status", "active")
                    .sort("age", SortDirection::Desc)
                    .per_page(2),
            )
            .build()
            .unwrap();

        let effective = table.effective_spec(&QuerySpec::new());
        assert_eq!(effective.view.as_deref(), Some("active"));
        assert_eq!(effective.filters.get("status"), Some(&json!("active")));
        assert_eq!(effective.sort, Sort::new("age", SortDirection::Desc));
        assert_eq!(effective.per_page, Some(2));
    }

    #[test]
    fn test_request_values_override_view() {
        let table = table()
            .view(View::new("Active").filter("status", "active").per_page(2))
            .build()
            .unwrap();

        let spec = QuerySpec::new()
            .filter("status", "")
            .sort("name", SortDirection::Asc)
            .per_page(3);
        let effective = table.effective_spec(&spec);
        assert_eq!(effective.filters.get("status"), Some(&json!("")));
        assert_eq!(effective.sort.column, "name");
        assert_eq!(effective.per_page, Some(3));
    }

    #[test]
    fn test_page_size_falls_back_and_clamps() {
        let table = table()
            .config(TableConfig::builder().default_per_page(7).max_per_page(20).build())
            .build()
            .unwrap();
        assert_eq!(table.effective_spec(&QuerySpec::new()).per_page, Some(7));
        assert_eq!(
            table.effective_spec(&QuerySpec::new().per_page(500)).per_page,
            Some(20)
        );
    }

    // =========================================================================
    // Execution Tests
    // =========================================================================

    #[tokio::test]
    async fn test_execute_search_filter_sort() {
        let table = table().build().unwrap();
        let source = people();

        let spec = QuerySpec::new()
            .filter("status", "active")
            .sort("age", SortDirection::Desc);
        let page = table.execute(&source, &spec).await.unwrap();
        assert_eq!(names(&page), vec!["Cy", "Ada", "Dee"]);
        assert_eq!(page.total, 3);

        let page = table
            .execute(&source, &QuerySpec::new().search("b"))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Bob"]);
    }

    #[tokio::test]
    async fn test_search_ignores_unsearchable_columns() {
        let table = table().build().unwrap();
        let page = table
            .execute(&people(), &QuerySpec::new().search("inactive"))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_short_search_terms_are_ignored() {
        let table = table()
            .config(TableConfig::builder().search_min_length(3).build())
            .build()
            .unwrap();
        let page = table
            .execute(&people(), &QuerySpec::new().search("bo"))
            .await
            .unwrap();
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_malformed_filter_value_is_query_error() {
        let table = table().build().unwrap();
        let err = table
            .execute(&people(), &QuerySpec::new().filter("age", json!({"min": "old"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::QueryExecution(SourceError::InvalidCondition(_))
        ));
    }

    #[tokio::test]
    async fn test_without_pagination_returns_everything() {
        let table = table().with_pagination(1).without_pagination().build().unwrap();
        let page = table
            .execute(&people(), &QuerySpec::new().page(3))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.last_page, 1);
    }

    #[tokio::test]
    async fn test_render_uses_configured_format() {
        let table = table().build().unwrap();
        let payload = table.respond(&people(), &RequestParams::new()).await.unwrap();
        let visit = table.render(&payload, RenderHints::page_visit()).unwrap();
        assert_eq!(visit["component"], table.id());

        let config = TableConfig::builder()
            .response_format(crate::config::ResponseFormat::PlainObject)
            .build();
        let table = table().config(config).build().unwrap();
        let payload = table.respond(&people(), &RequestParams::new()).await.unwrap();
        let plain = table.render(&payload, RenderHints::page_visit()).unwrap();
        assert!(plain.get("component").is_none());
        assert!(plain.get("meta").is_none());
        assert_eq!(plain["data"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn test_result_page_bounds() {
        let page = ResultPage::new(vec![json!({}), json!({})], 5, 2, 2);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from(), Some(3));
        assert_eq!(page.to(), Some(4));

        let empty = ResultPage::new(Vec::new(), 0, 10, 1);
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.from(), None);
    }

    // =========================================================================
    // Dispatch Tests
    // =========================================================================

    #[tokio::test]
    async fn test_dispatch_bulk_update_commits() {
        let table = table()
            .action(Action::bulk_update("archive", json!({"status": "archived"})))
            .build()
            .unwrap();
        let source = people();

        let outcome = table
            .dispatch_action(&source, "archive", ActionTarget::Many(vec![json!(1), json!(2)]))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Successfully archived 2 items.");

        let records = source.records().await;
        assert_eq!(records[0]["status"], "archived");
        assert_eq!(records[1]["status"], "archived");
        assert_eq!(records[2]["status"], "active");
    }

    #[tokio::test]
    async fn test_dispatch_failure_rolls_back() {
        let table = table()
            .action(Action::bulk_update("archive", json!({"status": "archived"})))
            .build()
            .unwrap();
        let source = people();

        let outcome = table
            .dispatch_action(&source, "archive", ActionTarget::Many(vec![json!(1), json!(99)]))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Action failed: "));
        assert!(outcome.cause.is_some());
        assert_eq!(source.records().await[0]["status"], "active");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let table = table().action(Action::delete()).build().unwrap();
        let err = table
            .dispatch_action(&people(), "delete", ActionTarget::Many(vec![json!(1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn test_dispatch_empty_selection() {
        let table = table().action(Action::bulk_delete()).build().unwrap();
        let outcome = table
            .dispatch_action(&people(), "delete", ActionTarget::Many(Vec::new()))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No items selected.");
    }

    #[tokio::test]
    async fn test_dispatch_custom_action_without_handler() {
        let table = table().action(Action::row("ping")).build().unwrap();
        let outcome = table
            .dispatch_action(&people(), "ping", ActionTarget::Single(json!(3)))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Action completed successfully.");
        assert_eq!(outcome.data["processed_count"], 1);
    }

    // =========================================================================
    // Suggestion Tests
    // =========================================================================

    struct Suggests;

    #[async_trait]
    impl ColumnSuggester for Suggests {
        async fn suggest_columns(
            &self,
            _sample: &[Record],
            _context: &str,
        ) -> std::result::Result<Vec<ColumnSuggestion>, HookError> {
            Ok(vec![
                ColumnSuggestion {
                    key: "name".to_string(),
                    label: Some("Dup".to_string()),
                    kind: "text".to_string(),
                    sortable: false,
                    searchable: false,
                },
                ColumnSuggestion {
                    key: "joined_at".to_string(),
                    label: None,
                    kind: "date".to_string(),
                    sortable: true,
                    searchable: false,
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_build_with_suggestions_skips_existing_keys() {
        let table = table()
            .suggester(Suggests)
            .build_with_suggestions(&[json!({"id": 1})], "people")
            .await
            .unwrap();

        assert_eq!(table.columns().len(), 5);
        assert_eq!(table.column("name").unwrap().label, "Name");
        assert!(table.column("joined_at").unwrap().sortable);
    }

    #[tokio::test]
    async fn test_build_with_suggestions_without_suggester() {
        let table = table()
            .build_with_suggestions(&[json!({"id": 1})], "people")
            .await
            .unwrap();
        assert_eq!(table.columns().len(), 4);
    }
}
