//! Row and bulk actions
//!
//! An action is a serializable descriptor plus an optional handler. Handlers
//! run inside one data-source transaction opened by
//! [`Table::dispatch_action`](crate::Table::dispatch_action); only the
//! descriptor ever reaches a response.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::column::label_from_key;
use crate::error::SourceError;
use crate::record::value_to_text;
use crate::source::Mutations;

/// Whether an action targets one record or a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Row,
    Bulk,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Record or records an action runs against
///
/// Deserializes from a bare id or from a list of ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionTarget {
    Many(Vec<Value>),
    Single(Value),
}

impl ActionTarget {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionTarget::Single(_) => ActionKind::Row,
            ActionTarget::Many(_) => ActionKind::Bulk,
        }
    }

    pub fn ids(&self) -> &[Value] {
        match self {
            ActionTarget::Single(id) => std::slice::from_ref(id),
            ActionTarget::Many(ids) => ids,
        }
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

/// What a handler sees besides the transaction
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub table_id: String,
    pub action: String,
    pub primary_key: String,
    pub target: ActionTarget,
}

/// Executes an action against the records of one transaction
///
/// Returning an error rolls the whole transaction back.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, tx: &mut dyn Mutations, ctx: &ActionContext)
    -> Result<Value, SourceError>;
}

/// Result of dispatching an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    /// Underlying error when the action failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            cause: None,
        }
    }

    pub fn failed(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
            cause: Some(cause.into()),
        }
    }
}

// ============================================================================
// Action Descriptor
// ============================================================================

const ROW_CONFIRM_TEXT: &str = "Are you sure?";
const BULK_CONFIRM_TEXT: &str = "Are you sure you want to perform this action on selected items?";

/// Action descriptor with its handler
#[derive(Clone, Serialize)]
pub struct Action {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Link template; `{id}` is replaced with the record key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub method: HttpMethod,
    pub confirm: bool,
    pub confirm_text: String,
    pub requires_selection: bool,
    pub open_in_new_tab: bool,
    /// Changes data; committed runs are broadcast
    #[serde(skip)]
    pub mutating: bool,
    #[serde(skip)]
    handler: Option<Arc<dyn ActionHandler>>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("confirm", &self.confirm)
            .field("mutating", &self.mutating)
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl Action {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let (method, confirm, confirm_text, requires_selection) = match kind {
            ActionKind::Row => (HttpMethod::Get, false, ROW_CONFIRM_TEXT, false),
            ActionKind::Bulk => (HttpMethod::Post, true, BULK_CONFIRM_TEXT, true),
        };
        Self {
            label: label_from_key(&name),
            name,
            kind,
            icon: None,
            tooltip: None,
            url: None,
            endpoint: None,
            method,
            confirm,
            confirm_text: confirm_text.to_string(),
            requires_selection,
            open_in_new_tab: false,
            mutating: true,
            handler: None,
        }
    }

    /// Custom row action
    pub fn row(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Row, name)
    }

    /// Custom bulk action
    pub fn bulk(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Bulk, name)
    }

    /// Redirect to the edit page of a record
    pub fn edit(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::row("edit")
            .icon("pencil")
            .tooltip("Edit this record")
            .url(url.clone())
            .read_only()
            .handler(Redirect { url })
    }

    /// Redirect to the detail page of a record
    pub fn view(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::row("view")
            .icon("eye")
            .tooltip("View this record")
            .url(url.clone())
            .read_only()
            .handler(Redirect { url })
    }

    pub fn delete() -> Self {
        Self::row("delete")
            .icon("trash")
            .tooltip("Delete this record")
            .method(HttpMethod::Delete)
            .confirm("Are you sure you want to delete this record? This action cannot be undone.")
            .handler(DeleteRecords)
    }

    /// Copy a record under a fresh key
    pub fn clone_record() -> Self {
        Self::row("clone")
            .icon("copy")
            .method(HttpMethod::Post)
            .handler(CloneRecord)
    }

    /// Set `active = true`
    pub fn activate() -> Self {
        Self::row("activate")
            .method(HttpMethod::Post)
            .handler(UpdateRecords::new(json!({"active": true})))
    }

    /// Set `active = false`
    pub fn deactivate() -> Self {
        Self::row("deactivate")
            .method(HttpMethod::Post)
            .handler(UpdateRecords::new(json!({"active": false})))
    }

    /// Delete every selected record, or none
    pub fn bulk_delete() -> Self {
        Self::bulk("delete")
            .method(HttpMethod::Delete)
            .confirm("Are you sure you want to delete the selected items?")
            .handler(DeleteRecords)
    }

    /// Return the selected records
    pub fn bulk_export() -> Self {
        Self::bulk("export")
            .method(HttpMethod::Get)
            .confirm("Export selected items?")
            .read_only()
            .handler(ExportRecords)
    }

    /// Merge `patch` into every selected record (`activate`, `archive`, ..)
    pub fn bulk_update(name: impl Into<String>, patch: Value) -> Self {
        Self::bulk(name).handler(UpdateRecords::new(patch))
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Ask for confirmation with `text`
    pub fn confirm(mut self, text: impl Into<String>) -> Self {
        self.confirm = true;
        self.confirm_text = text.into();
        self
    }

    pub fn without_confirmation(mut self) -> Self {
        self.confirm = false;
        self
    }

    pub fn requires_selection(mut self, requires: bool) -> Self {
        self.requires_selection = requires;
        self
    }

    pub fn open_in_new_tab(mut self) -> Self {
        self.open_in_new_tab = true;
        self
    }

    /// Mark as not changing data
    pub fn read_only(mut self) -> Self {
        self.mutating = false;
        self
    }

    /// Run `handler` when the action is dispatched
    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub(crate) fn handler_ref(&self) -> Option<&Arc<dyn ActionHandler>> {
        self.handler.as_ref()
    }

    /// The URL template with `{id}` filled in
    pub fn url_for(&self, id: &Value) -> Option<String> {
        self.url
            .as_ref()
            .map(|template| template.replace("{id}", &value_to_text(id)))
    }

    /// Message reported after a committed run over `count` records
    pub fn success_message(&self, count: usize) -> String {
        match self.kind {
            ActionKind::Row => match self.name.as_str() {
                "edit" => "Redirecting to edit page...".to_string(),
                "view" => "Redirecting to view page...".to_string(),
                "delete" => "Record deleted successfully.".to_string(),
                "clone" => "Record cloned successfully.".to_string(),
                "activate" => "Record activated successfully.".to_string(),
                "deactivate" => "Record deactivated successfully.".to_string(),
                _ => "Action completed successfully.".to_string(),
            },
            ActionKind::Bulk => {
                let verb = match self.name.as_str() {
                    "delete" => "deleted",
                    "activate" => "activated",
                    "deactivate" => "deactivated",
                    "archive" => "archived",
                    "export" => "exported",
                    _ => "processed",
                };
                format!("Successfully {} {} items.", verb, count)
            }
        }
    }
}

// ============================================================================
// Built-in Handlers
// ============================================================================

fn ids_json(ctx: &ActionContext) -> Value {
    Value::Array(ctx.target.ids().to_vec())
}

/// Delete every target; a missing record fails the whole run
#[derive(Debug, Clone, Copy)]
pub struct DeleteRecords;

#[async_trait]
impl ActionHandler for DeleteRecords {
    async fn handle(
        &self,
        tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        for id in ctx.target.ids() {
            tx.delete(id).await?;
        }
        Ok(json!({"deleted_count": ctx.target.len(), "ids": ids_json(ctx)}))
    }
}

/// Merge a fixed patch into every target
#[derive(Debug, Clone)]
pub struct UpdateRecords {
    patch: Value,
}

impl UpdateRecords {
    pub fn new(patch: Value) -> Self {
        Self { patch }
    }
}

#[async_trait]
impl ActionHandler for UpdateRecords {
    async fn handle(
        &self,
        tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        for id in ctx.target.ids() {
            tx.update(id, &self.patch).await?;
        }
        Ok(json!({"updated_count": ctx.target.len(), "ids": ids_json(ctx)}))
    }
}

/// Insert a copy of each target without its primary key
#[derive(Debug, Clone, Copy)]
pub struct CloneRecord;

#[async_trait]
impl ActionHandler for CloneRecord {
    async fn handle(
        &self,
        tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        let mut new_ids = Vec::with_capacity(ctx.target.len());
        for id in ctx.target.ids() {
            let mut record = tx
                .find(id)
                .await?
                .ok_or_else(|| SourceError::record_not_found(value_to_text(id)))?;
            if let Some(fields) = record.as_object_mut() {
                fields.remove(&ctx.primary_key);
            }
            new_ids.push(tx.insert(record).await?);
        }

        Ok(match ctx.target {
            ActionTarget::Single(_) => json!({"new_id": new_ids.pop()}),
            ActionTarget::Many(_) => json!({"new_ids": new_ids}),
        })
    }
}

/// Read every target; a missing record fails the export
#[derive(Debug, Clone, Copy)]
pub struct ExportRecords;

#[async_trait]
impl ActionHandler for ExportRecords {
    async fn handle(
        &self,
        tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        let mut records = Vec::with_capacity(ctx.target.len());
        for id in ctx.target.ids() {
            let record = tx
                .find(id)
                .await?
                .ok_or_else(|| SourceError::record_not_found(value_to_text(id)))?;
            records.push(record);
        }
        Ok(json!({"exported_count": records.len(), "records": records}))
    }
}

/// Resolve the redirect target of an existing record
#[derive(Debug, Clone)]
pub struct Redirect {
    url: String,
}

#[async_trait]
impl ActionHandler for Redirect {
    async fn handle(
        &self,
        tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        let id = match &ctx.target {
            ActionTarget::Single(id) => id,
            ActionTarget::Many(_) => {
                return Err(SourceError::unsupported("Redirects target a single record"));
            }
        };
        if tx.find(id).await?.is_none() {
            return Err(SourceError::record_not_found(value_to_text(id)));
        }
        Ok(json!({
            "action": "redirect",
            "url": self.url.replace("{id}", &value_to_text(id)),
            "method": "get",
        }))
    }
}

/// Default for custom actions without a handler
#[derive(Debug, Clone, Copy)]
pub(crate) struct Acknowledge;

#[async_trait]
impl ActionHandler for Acknowledge {
    async fn handle(
        &self,
        _tx: &mut dyn Mutations,
        ctx: &ActionContext,
    ) -> Result<Value, SourceError> {
        Ok(json!({"processed_count": ctx.target.len(), "ids": ids_json(ctx)}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DataSource, MemorySource};

    fn context(target: ActionTarget) -> ActionContext {
        ActionContext {
            table_id: "users".to_string(),
            action: "test".to_string(),
            primary_key: "id".to_string(),
            target,
        }
    }

    fn source() -> MemorySource {
        MemorySource::new(vec![
            json!({"id": 1, "name": "Ada", "active": false}),
            json!({"id": 2, "name": "Bob", "active": true}),
        ])
    }

    // =========================================================================
    // Descriptor Tests
    // =========================================================================

    #[test]
    fn test_row_and_bulk_defaults() {
        let row = Action::row("approve");
        assert_eq!(row.label, "Approve");
        assert_eq!(row.method, HttpMethod::Get);
        assert!(!row.confirm);
        assert!(!row.requires_selection);

        let bulk = Action::bulk("archive");
        assert_eq!(bulk.method, HttpMethod::Post);
        assert!(bulk.confirm);
        assert!(bulk.requires_selection);
    }

    #[test]
    fn test_presets() {
        let delete = Action::delete();
        assert_eq!(delete.method, HttpMethod::Delete);
        assert!(delete.confirm);
        assert!(delete.mutating);

        let edit = Action::edit("/users/{id}/edit");
        assert!(!edit.mutating);
        assert_eq!(edit.url_for(&json!(7)).as_deref(), Some("/users/7/edit"));

        assert!(!Action::bulk_export().mutating);
    }

    #[test]
    fn test_serialization_hides_handler() {
        let json = serde_json::to_value(Action::bulk_delete()).unwrap();
        assert_eq!(json["name"], "delete");
        assert_eq!(json["type"], "bulk");
        assert_eq!(json["method"], "delete");
        assert_eq!(json["requires_selection"], true);
        assert!(json.get("handler").is_none());
        assert!(json.get("mutating").is_none());
        assert!(json.get("icon").is_none());
    }

    #[test]
    fn test_success_messages() {
        assert_eq!(
            Action::bulk_delete().success_message(2),
            "Successfully deleted 2 items."
        );
        assert_eq!(
            Action::bulk("notify").success_message(3),
            "Successfully processed 3 items."
        );
        assert_eq!(Action::delete().success_message(1), "Record deleted successfully.");
        assert_eq!(Action::row("ping").success_message(1), "Action completed successfully.");
    }

    #[test]
    fn test_target_shapes() {
        let single: ActionTarget = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(single, ActionTarget::Single(json!(5)));
        assert_eq!(single.kind(), ActionKind::Row);

        let many: ActionTarget = serde_json::from_value(json!([1, "2"])).unwrap();
        assert_eq!(many.kind(), ActionKind::Bulk);
        assert_eq!(many.len(), 2);
    }

    // =========================================================================
    // Handler Tests
    // =========================================================================

    #[tokio::test]
    async fn test_update_records_handler() {
        let source = source();
        let mut tx = source.begin().await.unwrap();
        let data = UpdateRecords::new(json!({"active": true}))
            .handle(&mut tx, &context(ActionTarget::Many(vec![json!(1), json!(2)])))
            .await
            .unwrap();
        assert_eq!(data["updated_count"], 2);
        source.commit(tx).await.unwrap();

        let records = source.records().await;
        assert!(records.iter().all(|r| r["active"] == json!(true)));
    }

    #[tokio::test]
    async fn test_clone_record_handler() {
        let source = source();
        let mut tx = source.begin().await.unwrap();
        let data = CloneRecord
            .handle(&mut tx, &context(ActionTarget::Single(json!(2))))
            .await
            .unwrap();
        assert_eq!(data["new_id"], 3);
        source.commit(tx).await.unwrap();

        let records = source.records().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["name"], "Bob");
    }

    #[tokio::test]
    async fn test_export_missing_record_fails() {
        let source = source();
        let mut tx = source.begin().await.unwrap();
        let err = ExportRecords
            .handle(&mut tx, &context(ActionTarget::Many(vec![json!(1), json!(9)])))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_redirect_handler() {
        let source = source();
        let mut tx = source.begin().await.unwrap();
        let data = Redirect {
            url: "/users/{id}".to_string(),
        }
        .handle(&mut tx, &context(ActionTarget::Single(json!(1))))
        .await
        .unwrap();
        assert_eq!(data["url"], "/users/1");
    }
}
