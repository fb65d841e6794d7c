//! Response assembly
//!
//! A [`ResponsePayload`] is a plain serializable snapshot of one executed
//! request: rows, descriptors and request metadata. Handlers never reach it;
//! only action descriptors do. Mapping it to a wire shape is [`ResponsePayload::render`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::action::{Action, ActionKind};
use crate::column::Column;
use crate::config::ResponseFormat;
use crate::filter::Filter;
use crate::query::{QuerySpec, Sort};
use crate::record::{Record, crosses_array, values_at_path};
use crate::table::{ResultPage, Table};
use crate::view::View;

/// Filter descriptor plus the value the request applied
#[derive(Debug, Clone, Serialize)]
pub struct FilterState {
    #[serde(flatten)]
    pub filter: Filter,
    pub value: Option<Value>,
}

/// Action descriptors split by kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionGroups {
    pub row: Vec<Action>,
    pub bulk: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub per_page: u32,
    pub current_page: u32,
    pub last_page: u32,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMeta {
    pub search: String,
    pub sort: Sort,
    pub current_view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Hints from the host used by [`ResponseFormat::Auto`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderHints {
    /// The request is a full page visit rather than a data fetch
    pub page_visit: bool,
}

impl RenderHints {
    pub fn page_visit() -> Self {
        Self { page_visit: true }
    }
}

/// Transport-neutral response for one request
#[derive(Debug, Clone, Serialize)]
pub struct ResponsePayload {
    #[serde(skip)]
    pub table_id: String,
    /// Raw records
    pub data: Vec<Record>,
    /// Rendered cells of the visible columns, one map per record
    pub display: Vec<Map<String, Value>>,
    pub columns: Vec<Column>,
    pub filters: Vec<FilterState>,
    pub actions: ActionGroups,
    pub views: Vec<View>,
    pub meta: ResponseMeta,
}

impl ResponsePayload {
    /// Assemble a payload from an executed page
    ///
    /// `spec` is the effective spec (view already merged). Column visibility
    /// follows the active view when it lists columns, else each column's own
    /// flag.
    pub fn assemble(table: &Table, page: &ResultPage, spec: &QuerySpec) -> Self {
        let view = spec.view.as_deref().and_then(|key| table.views().get(key));

        let columns: Vec<Column> = table
            .columns()
            .iter()
            .map(|column| {
                let mut column = column.clone();
                if let Some(visible) = view.and_then(|v| v.visible_columns.as_ref()) {
                    column.visible = visible.contains(&column.key);
                }
                column
            })
            .collect();

        let display = page
            .items
            .iter()
            .map(|record| display_row(&columns, record))
            .collect();

        let filters = table
            .filters()
            .iter()
            .map(|filter| FilterState {
                filter: filter.clone(),
                value: spec.filters.get(&filter.key).cloned(),
            })
            .collect();

        let mut actions = ActionGroups::default();
        for action in table.actions() {
            match action.kind {
                ActionKind::Row => actions.row.push(action.clone()),
                ActionKind::Bulk => actions.bulk.push(action.clone()),
            }
        }

        let pagination = table.is_paginated().then(|| Pagination {
            total: page.total,
            per_page: page.page_size,
            current_page: page.current_page,
            last_page: page.last_page,
            from: page.from(),
            to: page.to(),
        });

        Self {
            table_id: table.id().to_string(),
            data: page.items.clone(),
            display,
            columns,
            filters,
            actions,
            views: table.views().iter().cloned().collect(),
            meta: ResponseMeta {
                search: spec.search.clone(),
                sort: table.applied_sort(&spec.sort),
                current_view: spec.view.clone(),
                pagination,
            },
        }
    }

    /// Map the payload to the wire shape selected by `format`
    pub fn render(&self, format: ResponseFormat, hints: RenderHints) -> serde_json::Result<Value> {
        let format = match format {
            ResponseFormat::Auto if hints.page_visit => ResponseFormat::StructuredPage,
            ResponseFormat::Auto => ResponseFormat::RawJson,
            other => other,
        };

        let mut payload = serde_json::to_value(self)?;
        Ok(match format {
            ResponseFormat::StructuredPage => json!({
                "component": self.table_id,
                "props": {"table": payload},
            }),
            ResponseFormat::PlainObject => {
                if let Some(fields) = payload.as_object_mut() {
                    fields.remove("meta");
                }
                payload
            }
            ResponseFormat::RawJson | ResponseFormat::Auto => payload,
        })
    }

    /// Visible column keys in display order
    pub fn visible_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.key.as_str())
            .collect()
    }

    /// Filter values that were applied, keyed by filter key
    pub fn applied_filters(&self) -> BTreeMap<&str, &Value> {
        self.filters
            .iter()
            .filter_map(|f| f.value.as_ref().map(|v| (f.filter.key.as_str(), v)))
            .collect()
    }
}

fn display_row(columns: &[Column], record: &Record) -> Map<String, Value> {
    columns
        .iter()
        .filter(|c| c.visible)
        .map(|column| {
            let values = values_at_path(record, &column.key);
            let cell = if crosses_array(record, &column.key) {
                Value::Array(values.into_iter().map(|v| column.kind.render(v)).collect())
            } else {
                values
                    .first()
                    .map(|v| column.kind.render(v))
                    .unwrap_or(Value::Null)
            };
            (column.key.clone(), cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnKind;
    use crate::query::SortDirection;
    use crate::table::TableBuilder;

    fn table() -> Table {
        TableBuilder::new("users")
            .add_column(ColumnKind::Text, "name")
            .sortable()
            .add_column(ColumnKind::boolean(), "active")
            .add_column(ColumnKind::Text, "team.name")
            .add_column(ColumnKind::Text, "notes")
            .hidden()
            .filter(Filter::boolean("active"))
            .action(Action::edit("/users/{id}/edit"))
            .action(Action::bulk_delete())
            .view(View::new("All"))
            .view(View::new("Compact").columns(["name"]))
            .build()
            .unwrap()
    }

    fn page() -> ResultPage {
        ResultPage::new(
            vec![
                json!({"id": 1, "name": "Ada", "active": true, "team": {"name": "Core"}}),
                json!({"id": 2, "name": "Bob", "active": false, "team": null}),
            ],
            12,
            2,
            3,
        )
    }

    #[test]
    fn test_assemble_payload() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new().filter("active", "yes").page(3));
        let payload = ResponsePayload::assemble(&table, &page(), &spec);

        assert_eq!(payload.data.len(), 2);
        assert_eq!(payload.visible_columns(), vec!["name", "active", "team.name"]);
        assert_eq!(payload.display[0]["active"], json!("Yes"));
        assert_eq!(payload.display[0]["team.name"], json!("Core"));
        assert_eq!(payload.display[1]["team.name"], Value::Null);
        assert!(payload.display[0].get("notes").is_none());
        assert_eq!(payload.actions.row.len(), 1);
        assert_eq!(payload.actions.bulk.len(), 1);
        assert_eq!(payload.applied_filters().get("active"), Some(&&json!("yes")));
        assert_eq!(payload.meta.current_view.as_deref(), Some("all"));

        let pagination = payload.meta.pagination.as_ref().unwrap();
        assert_eq!(pagination.last_page, 6);
        assert_eq!(pagination.from, Some(5));
        assert_eq!(pagination.to, Some(6));
    }

    #[test]
    fn test_display_lists_to_many_values() {
        let table = TableBuilder::new("orders")
            .add_column(ColumnKind::Text, "number")
            .add_column(ColumnKind::Number, "items.qty")
            .build()
            .unwrap();
        let page = ResultPage::unpaginated(vec![
            json!({"number": "A1", "items": [{"qty": "2"}, {"qty": 5}]}),
            json!({"number": "A2", "items": []}),
        ]);
        let spec = table.effective_spec(&QuerySpec::new());
        let payload = ResponsePayload::assemble(&table, &page, &spec);

        assert_eq!(payload.display[0]["items.qty"], json!([2.0, 5]));
        assert_eq!(payload.display[1]["items.qty"], json!([]));
    }

    #[test]
    fn test_view_recomputes_visibility() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new().view("compact"));
        let payload = ResponsePayload::assemble(&table, &page(), &spec);

        assert_eq!(payload.visible_columns(), vec!["name"]);
        assert_eq!(payload.display[0].len(), 1);
    }

    #[test]
    fn test_meta_drops_unapplied_sort() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new().sort("active", SortDirection::Desc));
        let payload = ResponsePayload::assemble(&table, &page(), &spec);
        assert!(!payload.meta.sort.is_set());

        let spec = table.effective_spec(&QuerySpec::new().sort("name", SortDirection::Desc));
        let payload = ResponsePayload::assemble(&table, &page(), &spec);
        assert_eq!(payload.meta.sort, Sort::new("name", SortDirection::Desc));
    }

    // =========================================================================
    // Render Tests
    // =========================================================================

    #[test]
    fn test_render_formats() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new());
        let payload = ResponsePayload::assemble(&table, &page(), &spec);

        let raw = payload.render(ResponseFormat::RawJson, RenderHints::default()).unwrap();
        assert!(raw.get("meta").is_some());
        assert!(raw.get("table_id").is_none());
        assert!(raw["actions"]["bulk"][0].get("handler").is_none());

        let plain = payload.render(ResponseFormat::PlainObject, RenderHints::default()).unwrap();
        assert!(plain.get("meta").is_none());
        assert_eq!(plain["data"], raw["data"]);

        let page = payload
            .render(ResponseFormat::StructuredPage, RenderHints::default())
            .unwrap();
        assert_eq!(page["component"], "users");
        assert_eq!(page["props"]["table"], raw);
    }

    #[test]
    fn test_render_auto_follows_hints() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new());
        let payload = ResponsePayload::assemble(&table, &page(), &spec);

        let visit = payload.render(ResponseFormat::Auto, RenderHints::page_visit()).unwrap();
        assert_eq!(visit["component"], "users");

        let fetch = payload.render(ResponseFormat::Auto, RenderHints::default()).unwrap();
        assert!(fetch.get("component").is_none());
        assert!(fetch.get("data").is_some());
    }

    #[test]
    fn test_filter_state_serialization() {
        let table = table();
        let spec = table.effective_spec(&QuerySpec::new());
        let payload = ResponsePayload::assemble(&table, &page(), &spec);
        let json = serde_json::to_value(&payload.filters[0]).unwrap();
        assert_eq!(json["key"], "active");
        assert_eq!(json["type"], "boolean");
        assert_eq!(json["value"], Value::Null);
    }
}
