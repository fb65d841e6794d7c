//! In-memory data source
//!
//! Records live in a shared vector of JSON objects. Queries evaluate condition
//! trees against each record; transactions work on a private copy that
//! replaces the shared vector on commit.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use runtara_dsl::{
    ConditionArgument, ConditionExpression, ConditionOperation, ConditionOperator, MappingValue,
};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::SourceError;
use crate::query::SortDirection;
use crate::record::{Record, is_blank, value_at_path, value_to_text, values_at_path};
use crate::source::{DataSource, FieldRef, ListQuery, Mutations};

/// Data source over an in-memory sequence of records
///
/// Cloning shares the underlying records.
#[derive(Debug, Clone)]
pub struct MemorySource {
    records: Arc<Mutex<Vec<Record>>>,
    primary_key: String,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            primary_key: "id".to_string(),
        }
    }

    /// Use `key` instead of `id` to identify records
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Snapshot of the current records in source order
    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    type Query = MemoryQuery;
    type Tx = MemoryTx;

    fn query(&self) -> MemoryQuery {
        MemoryQuery {
            records: Arc::clone(&self.records),
            searches: Vec::new(),
            conditions: Vec::new(),
            sorts: Vec::new(),
        }
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Transactions are serialised: the shared records stay locked until
    /// commit or rollback.
    async fn begin(&self) -> Result<MemoryTx, SourceError> {
        let guard = Arc::clone(&self.records).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            primary_key: self.primary_key.clone(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), SourceError> {
        let MemoryTx {
            mut guard, working, ..
        } = tx;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), SourceError> {
        drop(tx);
        Ok(())
    }
}

// ============================================================================
// Query
// ============================================================================

struct Search {
    paths: Vec<String>,
    term: String,
}

/// Working query over a [`MemorySource`]
pub struct MemoryQuery {
    records: Arc<Mutex<Vec<Record>>>,
    searches: Vec<Search>,
    conditions: Vec<ConditionExpression>,
    sorts: Vec<(String, SortDirection)>,
}

impl MemoryQuery {
    fn matches(&self, record: &Record) -> Result<bool, SourceError> {
        for search in &self.searches {
            let hit = search.paths.iter().any(|path| {
                field_values(record, path)
                    .iter()
                    .filter(|v| !v.is_null())
                    .any(|v| value_to_text(v).to_lowercase().contains(&search.term))
            });
            if !hit {
                return Ok(false);
            }
        }
        for condition in &self.conditions {
            if !evaluate(condition, record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn collect(&self) -> Result<Vec<Record>, SourceError> {
        let records = self.records.lock().await;
        let mut matched = Vec::new();
        for record in records.iter() {
            if self.matches(record)? {
                matched.push(record.clone());
            }
        }
        drop(records);

        if !self.sorts.is_empty() {
            // sort_by is stable; equal keys keep source order
            matched.sort_by(|a, b| {
                self.sorts
                    .iter()
                    .map(|(path, direction)| {
                        let ordering = compare_keys(
                            sort_key(a, path, *direction),
                            sort_key(b, path, *direction),
                        );
                        match direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(matched)
    }
}

#[async_trait]
impl ListQuery for MemoryQuery {
    fn search(&mut self, fields: &[FieldRef], term: &str) -> Result<(), SourceError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.searches.push(Search {
            paths: fields.iter().map(FieldRef::path).collect(),
            term: term.to_lowercase(),
        });
        Ok(())
    }

    fn filter(&mut self, condition: ConditionExpression) -> Result<(), SourceError> {
        self.conditions.push(condition);
        Ok(())
    }

    fn sort(&mut self, field: &FieldRef, direction: SortDirection) -> Result<(), SourceError> {
        self.sorts.push((field.path(), direction));
        Ok(())
    }

    async fn paginate(&self, page: u32, per_page: u32) -> Result<(Vec<Record>, u64), SourceError> {
        let matched = self.collect().await?;
        let total = matched.len() as u64;
        let per_page = per_page.max(1) as usize;
        let offset = (page.max(1) as usize - 1).saturating_mul(per_page);
        let items = matched.into_iter().skip(offset).take(per_page).collect();
        Ok((items, total))
    }

    async fn all(&self) -> Result<Vec<Record>, SourceError> {
        self.collect().await
    }
}

/// Values at a dotted path with arrays of scalars flattened
fn field_values<'a>(record: &'a Value, path: &str) -> Vec<&'a Value> {
    values_at_path(record, path)
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

/// Smallest value for ascending order, largest for descending
fn sort_key<'a>(record: &'a Value, path: &str, direction: SortDirection) -> Option<&'a Value> {
    let values = field_values(record, path)
        .into_iter()
        .filter(|v| !v.is_null());
    match direction {
        SortDirection::Asc => values.min_by(|a, b| compare_values(a, b)),
        SortDirection::Desc => values.max_by(|a, b| compare_values(a, b)),
    }
}

/// Missing values sort after present ones
fn compare_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric values order before textual ones; each class compares on its own terms
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => value_to_text(a).cmp(&value_to_text(b)),
    }
}

/// Numeric when the operand is a number, textual otherwise
fn compare_to_operand(value: &Value, operand: &Value) -> Ordering {
    if operand.is_number() {
        if let (Some(x), Some(y)) = (as_number(value), as_number(operand)) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    value_to_text(value).cmp(&value_to_text(operand))
}

fn loosely_equal(value: &Value, operand: &Value) -> bool {
    if value.is_number() || operand.is_number() {
        if let (Some(x), Some(y)) = (as_number(value), as_number(operand)) {
            return x == y;
        }
    }
    value_to_text(value) == value_to_text(operand)
}

// ============================================================================
// Condition Evaluation
// ============================================================================

fn evaluate(condition: &ConditionExpression, record: &Record) -> Result<bool, SourceError> {
    match condition {
        ConditionExpression::Operation(op) => evaluate_operation(op, record),
        ConditionExpression::Value(mapping) => {
            let path = field_path(mapping)?;
            Ok(field_values(record, &path)
                .iter()
                .any(|v| !is_blank(v) && **v != Value::Bool(false)))
        }
    }
}

fn evaluate_operation(op: &ConditionOperation, record: &Record) -> Result<bool, SourceError> {
    match op.op {
        ConditionOperator::And => {
            for sub in sub_expressions(op)? {
                if !evaluate(sub, record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionOperator::Or => {
            for sub in sub_expressions(op)? {
                if evaluate(sub, record)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionOperator::Not => {
            let subs = sub_expressions(op)?;
            if subs.len() != 1 {
                return Err(SourceError::invalid_condition(
                    "NOT operation requires exactly one argument",
                ));
            }
            Ok(!evaluate(subs[0], record)?)
        }
        ConditionOperator::Eq | ConditionOperator::Ne => {
            let (values, operand) = binary_operands(op, record)?;
            let equal = if operand.is_null() {
                values.iter().all(|v| v.is_null())
            } else {
                values.iter().any(|v| loosely_equal(v, operand))
            };
            Ok(if op.op == ConditionOperator::Eq { equal } else { !equal })
        }
        ConditionOperator::Gt
        | ConditionOperator::Lt
        | ConditionOperator::Gte
        | ConditionOperator::Lte => {
            let (values, operand) = binary_operands(op, record)?;
            if operand.is_null() {
                return Err(SourceError::invalid_condition(format!(
                    "{:?} operation with NULL value is not supported",
                    op.op
                )));
            }
            Ok(values.iter().filter(|v| !v.is_null()).any(|v| {
                let ordering = compare_to_operand(v, operand);
                match op.op {
                    ConditionOperator::Gt => ordering.is_gt(),
                    ConditionOperator::Lt => ordering.is_lt(),
                    ConditionOperator::Gte => ordering.is_ge(),
                    _ => ordering.is_le(),
                }
            }))
        }
        ConditionOperator::Contains
        | ConditionOperator::StartsWith
        | ConditionOperator::EndsWith => {
            let (values, operand) = binary_operands(op, record)?;
            let needle = operand.as_str().ok_or_else(|| {
                SourceError::invalid_condition(format!("{:?} value must be a string", op.op))
            })?;
            Ok(values.iter().filter(|v| !v.is_null()).any(|v| {
                let text = value_to_text(v);
                match op.op {
                    ConditionOperator::Contains => text.contains(needle),
                    ConditionOperator::StartsWith => text.starts_with(needle),
                    _ => text.ends_with(needle),
                }
            }))
        }
        ConditionOperator::In | ConditionOperator::NotIn => {
            let (values, operand) = binary_operands(op, record)?;
            let options = operand.as_array().ok_or_else(|| {
                SourceError::invalid_condition(format!("{:?} operation requires an array value", op.op))
            })?;
            let found = values
                .iter()
                .any(|v| options.iter().any(|o| loosely_equal(v, o)));
            Ok(if op.op == ConditionOperator::In { found } else { !found })
        }
        ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty => {
            let path = unary_field(op)?;
            let empty = field_values(record, &path).iter().all(|v| is_blank(v));
            Ok(if op.op == ConditionOperator::IsEmpty { empty } else { !empty })
        }
        ConditionOperator::IsDefined => {
            let path = unary_field(op)?;
            Ok(value_at_path(record, &path).is_some_and(|v| !v.is_null()))
        }
        ConditionOperator::Length => Err(SourceError::unsupported(
            "LENGTH operator must be used within a comparison",
        )),
    }
}

fn sub_expressions(op: &ConditionOperation) -> Result<Vec<&ConditionExpression>, SourceError> {
    let subs: Vec<_> = op
        .arguments
        .iter()
        .filter_map(|arg| match arg {
            ConditionArgument::Expression(sub) => Some(sub.as_ref()),
            ConditionArgument::Value(_) => None,
        })
        .collect();
    if subs.is_empty() {
        return Err(SourceError::invalid_condition(format!(
            "{:?} operation requires at least one condition",
            op.op
        )));
    }
    Ok(subs)
}

fn binary_operands<'a>(
    op: &'a ConditionOperation,
    record: &'a Record,
) -> Result<(Vec<&'a Value>, &'a Value), SourceError> {
    if op.arguments.len() != 2 {
        return Err(SourceError::invalid_condition(format!(
            "{:?} operation requires exactly 2 arguments",
            op.op
        )));
    }
    let path = argument_field(&op.arguments[0])?;
    let operand = match &op.arguments[1] {
        ConditionArgument::Value(MappingValue::Immediate(imm)) => &imm.value,
        _ => {
            return Err(SourceError::invalid_condition(
                "Expected an immediate value as second argument",
            ));
        }
    };
    Ok((field_values(record, &path), operand))
}

fn unary_field(op: &ConditionOperation) -> Result<String, SourceError> {
    if op.arguments.len() != 1 {
        return Err(SourceError::invalid_condition(format!(
            "{:?} operation requires exactly 1 argument",
            op.op
        )));
    }
    argument_field(&op.arguments[0])
}

fn argument_field(arg: &ConditionArgument) -> Result<String, SourceError> {
    match arg {
        ConditionArgument::Value(mapping) => field_path(mapping),
        ConditionArgument::Expression(_) => Err(SourceError::invalid_condition(
            "Expected a field reference, got an expression",
        )),
    }
}

fn field_path(mapping: &MappingValue) -> Result<String, SourceError> {
    match mapping {
        MappingValue::Reference(reference) => Ok(reference.value.clone()),
        MappingValue::Immediate(imm) => imm
            .value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SourceError::invalid_condition("Expected a field name string")),
        MappingValue::Composite(_) => Err(SourceError::invalid_condition(
            "Composite values are not supported as field references",
        )),
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Open transaction over a [`MemorySource`]
pub struct MemoryTx {
    guard: OwnedMutexGuard<Vec<Record>>,
    working: Vec<Record>,
    primary_key: String,
}

impl MemoryTx {
    fn position(&self, id: &Value) -> Option<usize> {
        self.working.iter().position(|record| {
            record
                .get(&self.primary_key)
                .is_some_and(|key| !key.is_null() && loosely_equal(key, id))
        })
    }

    fn next_id(&self) -> Value {
        let keys: Vec<&Value> = self
            .working
            .iter()
            .filter_map(|r| r.get(&self.primary_key))
            .filter(|k| !k.is_null())
            .collect();

        if keys.iter().all(|k| k.is_i64()) {
            let max = keys.iter().filter_map(|k| k.as_i64()).max().unwrap_or(0);
            if let Some(next) = max.checked_add(1) {
                return Value::from(next);
            }
        }
        Value::String(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl Mutations for MemoryTx {
    async fn find(&mut self, id: &Value) -> Result<Option<Record>, SourceError> {
        Ok(self.position(id).map(|i| self.working[i].clone()))
    }

    async fn update(&mut self, id: &Value, patch: &Value) -> Result<(), SourceError> {
        let fields = patch
            .as_object()
            .ok_or_else(|| SourceError::invalid_field("Update patch must be a JSON object"))?;
        let index = self
            .position(id)
            .ok_or_else(|| SourceError::record_not_found(value_to_text(id)))?;

        if let Value::Object(record) = &mut self.working[index] {
            for (key, value) in fields {
                record.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&mut self, id: &Value) -> Result<(), SourceError> {
        let index = self
            .position(id)
            .ok_or_else(|| SourceError::record_not_found(value_to_text(id)))?;
        self.working.remove(index);
        Ok(())
    }

    async fn insert(&mut self, mut record: Record) -> Result<Value, SourceError> {
        let fields = record
            .as_object_mut()
            .ok_or_else(|| SourceError::invalid_field("Record must be a JSON object"))?;

        let id = match fields.get(&self.primary_key) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = self.next_id();
                fields.insert(self.primary_key.clone(), id.clone());
                id
            }
        };
        if self.position(&id).is_some() {
            return Err(SourceError::invalid_field(format!(
                "Duplicate {}: {}",
                self.primary_key,
                value_to_text(&id)
            )));
        }

        self.working.push(record);
        Ok(id)
    }
}
