//! Data source adapters
//!
//! The engine never talks to a store directly. It narrows a [`ListQuery`]
//! obtained from a [`DataSource`] and runs action handlers against the
//! [`Mutations`] handle of one source transaction.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use runtara_dsl::ConditionExpression;
use serde_json::Value;

use crate::error::SourceError;
use crate::query::SortDirection;
use crate::record::Record;

pub use memory::MemorySource;
pub use postgres::PgSource;

/// Field addressed by a column key
///
/// Dotted keys reach into related data; the first segment names the relation
/// and the remainder the field on the related record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Column(String),
    Relation { relation: String, field: String },
}

impl FieldRef {
    /// `name` -> column, `user.name` -> relation `user`, field `name`
    pub fn parse(key: &str) -> Self {
        match key.split_once('.') {
            Some((relation, field)) if !relation.is_empty() && !field.is_empty() => {
                FieldRef::Relation {
                    relation: relation.to_string(),
                    field: field.to_string(),
                }
            }
            _ => FieldRef::Column(key.to_string()),
        }
    }

    /// Dotted path back into a record
    pub fn path(&self) -> String {
        match self {
            FieldRef::Column(name) => name.clone(),
            FieldRef::Relation { relation, field } => format!("{}.{}", relation, field),
        }
    }
}

/// Working query narrowed step by step by the executor
#[async_trait]
pub trait ListQuery: Send {
    /// Keep records where any of `fields` contains `term`, case-insensitively
    ///
    /// Relation fields are resolved by the adapter.
    fn search(&mut self, fields: &[FieldRef], term: &str) -> Result<(), SourceError>;

    /// Keep records matching `condition`
    fn filter(&mut self, condition: ConditionExpression) -> Result<(), SourceError>;

    /// Order by `field`; later calls break ties of earlier ones
    fn sort(&mut self, field: &FieldRef, direction: SortDirection) -> Result<(), SourceError>;

    /// One page of matching records plus the total match count
    async fn paginate(&self, page: u32, per_page: u32) -> Result<(Vec<Record>, u64), SourceError>;

    /// Every matching record
    async fn all(&self) -> Result<Vec<Record>, SourceError>;
}

/// Record mutations inside one source transaction
#[async_trait]
pub trait Mutations: Send {
    async fn find(&mut self, id: &Value) -> Result<Option<Record>, SourceError>;

    /// Fails with `RecordNotFound` when no record has `id`
    async fn update(&mut self, id: &Value, patch: &Value) -> Result<(), SourceError>;

    /// Fails with `RecordNotFound` when no record has `id`
    async fn delete(&mut self, id: &Value) -> Result<(), SourceError>;

    /// Insert a record and return its primary key
    async fn insert(&mut self, record: Record) -> Result<Value, SourceError>;
}

/// A queryable, transactional store
#[async_trait]
pub trait DataSource: Send + Sync {
    type Query: ListQuery;
    type Tx: Mutations;

    /// Fresh query over every record
    fn query(&self) -> Self::Query;

    /// Name of the primary key field
    fn primary_key(&self) -> &str;

    async fn begin(&self) -> Result<Self::Tx, SourceError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), SourceError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), SourceError>;
}
