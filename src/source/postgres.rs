//! PostgreSQL data source
//!
//! Rows are read as `to_jsonb(t)` so any table can back a list without typed
//! row mapping. Related rows registered with [`PgSource::belongs_to`] and
//! [`PgSource::has_many`] are embedded under the relation name, searched with
//! `EXISTS` sub-queries and sorted with correlated sub-selects. Relation
//! aggregates (`items_count`, `items_sum_price`) are embedded the same way and
//! can be sorted on. The primary key is always the last ORDER BY term, so page
//! boundaries are stable.

use std::sync::Arc;

use async_trait::async_trait;
use runtara_dsl::ConditionExpression;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::SourceError;
use crate::query::SortDirection;
use crate::record::{Record, value_to_text};
use crate::source::{DataSource, FieldRef, ListQuery, Mutations};
use crate::sql::condition::{build_condition_clause, column_sql};
use crate::sql::sanitize::{
    escape_like, quote_identifier, validate_column_name, validate_identifier,
};

const ALIAS: &str = "t";
const RELATED_ALIAS: &str = "r";

/// How a related table joins to the listed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `related.id = t.foreign_key`
    BelongsTo,
    /// `related.foreign_key = t.primary_key`
    HasMany,
}

/// Related table reachable through dotted column keys
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub table: String,
    pub foreign_key: String,
}

/// Which soft-deleted rows a listing sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trashed {
    /// Only live rows
    #[default]
    Exclude,
    /// Live and soft-deleted rows
    Include,
    /// Only soft-deleted rows
    Only,
}

/// Aggregate function computed over a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

/// Relation aggregate embedded in every record under [`RelationAggregate::key`]
#[derive(Debug, Clone)]
pub struct RelationAggregate {
    pub relation: String,
    pub function: AggregateFn,
    pub column: Option<String>,
}

impl RelationAggregate {
    /// `<relation>_count` or `<relation>_<fn>_<column>`
    pub fn key(&self) -> String {
        match &self.column {
            Some(column) => format!("{}_{}_{}", self.relation, self.function.as_str(), column),
            None => format!("{}_{}", self.relation, self.function.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct TableDef {
    table: String,
    primary_key: String,
    soft_delete: bool,
    trashed: Trashed,
    relations: Vec<Relation>,
    aggregates: Vec<RelationAggregate>,
}

impl TableDef {
    fn table_sql(&self) -> String {
        quote_identifier(&self.table)
    }

    fn pk_sql(&self) -> String {
        format!("{}.{}", ALIAS, quote_identifier(&self.primary_key))
    }

    fn relation(&self, name: &str) -> Result<&Relation, SourceError> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| SourceError::invalid_field(format!("Unknown relation: {}", name)))
    }

    /// `FROM "related" r WHERE <join>`
    fn related_from(&self, relation: &Relation) -> String {
        let join = match relation.kind {
            RelationKind::BelongsTo => format!(
                "{}.\"id\" = {}.{}",
                RELATED_ALIAS,
                ALIAS,
                quote_identifier(&relation.foreign_key)
            ),
            RelationKind::HasMany => format!(
                "{}.{} = {}",
                RELATED_ALIAS,
                quote_identifier(&relation.foreign_key),
                self.pk_sql()
            ),
        };
        format!(
            "FROM {} {} WHERE {}",
            quote_identifier(&relation.table),
            RELATED_ALIAS,
            join
        )
    }

    /// Correlated sub-select computing `aggregate` for the current row
    fn aggregate_sql(&self, aggregate: &RelationAggregate) -> Result<String, SourceError> {
        let relation = self.relation(&aggregate.relation)?;
        let selected = match &aggregate.column {
            Some(column) => format!(
                "{}({})",
                aggregate.function.as_str().to_uppercase(),
                column_sql(RELATED_ALIAS, column).map_err(SourceError::InvalidField)?
            ),
            None => "COUNT(*)".to_string(),
        };
        Ok(format!("(SELECT {} {})", selected, self.related_from(relation)))
    }

    fn aggregate(&self, key: &str) -> Option<&RelationAggregate> {
        self.aggregates.iter().find(|a| a.key() == key)
    }

    fn is_embedded(&self, key: &str) -> bool {
        self.relations.iter().any(|r| r.name == key) || self.aggregate(key).is_some()
    }

    fn record_sql(&self) -> String {
        if self.relations.is_empty() && self.aggregates.is_empty() {
            return format!("to_jsonb({})", ALIAS);
        }
        let mut embedded: Vec<String> = self
            .relations
            .iter()
            .map(|relation| {
                let value = match relation.kind {
                    RelationKind::BelongsTo => format!(
                        "(SELECT to_jsonb({}) {})",
                        RELATED_ALIAS,
                        self.related_from(relation)
                    ),
                    RelationKind::HasMany => format!(
                        "(SELECT COALESCE(jsonb_agg(to_jsonb({})), '[]'::jsonb) {})",
                        RELATED_ALIAS,
                        self.related_from(relation)
                    ),
                };
                format!("'{}', {}", relation.name, value)
            })
            .collect();
        // Aggregates are validated when registered
        embedded.extend(self.aggregates.iter().filter_map(|aggregate| {
            self.aggregate_sql(aggregate)
                .ok()
                .map(|sql| format!("'{}', {}", aggregate.key(), sql))
        }));
        format!(
            "to_jsonb({}) || jsonb_build_object({})",
            ALIAS,
            embedded.join(", ")
        )
    }

    fn live_filter(&self) -> Option<String> {
        if !self.soft_delete {
            return None;
        }
        match self.trashed {
            Trashed::Exclude => Some(format!("{}.\"deleted\" = FALSE", ALIAS)),
            Trashed::Include => None,
            Trashed::Only => Some(format!("{}.\"deleted\" = TRUE", ALIAS)),
        }
    }
}

/// Data source over one PostgreSQL table
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
    def: Arc<TableDef>,
}

impl PgSource {
    /// List rows of `table`, keyed by `id`
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, SourceError> {
        let table = table.into();
        validate_identifier(&table).map_err(SourceError::InvalidField)?;
        Ok(Self {
            pool,
            def: Arc::new(TableDef {
                table,
                primary_key: "id".to_string(),
                soft_delete: false,
                trashed: Trashed::Exclude,
                relations: Vec::new(),
                aggregates: Vec::new(),
            }),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.def.table
    }

    /// Key rows by `key` instead of `id`
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Result<Self, SourceError> {
        let key = key.into();
        validate_column_name(&key).map_err(SourceError::InvalidField)?;
        Arc::make_mut(&mut self.def).primary_key = key;
        Ok(self)
    }

    /// Hide rows flagged `deleted = TRUE` and flag rows instead of deleting them
    pub fn soft_delete(mut self) -> Self {
        Arc::make_mut(&mut self.def).soft_delete = true;
        self
    }

    /// List soft-deleted rows alongside live ones; no effect without [`PgSource::soft_delete`]
    pub fn with_trashed(mut self) -> Self {
        Arc::make_mut(&mut self.def).trashed = Trashed::Include;
        self
    }

    /// List only soft-deleted rows; no effect without [`PgSource::soft_delete`]
    pub fn only_trashed(mut self) -> Self {
        Arc::make_mut(&mut self.def).trashed = Trashed::Only;
        self
    }

    /// Embed the number of related rows as `<relation>_count`
    pub fn with_count(self, relation: impl Into<String>) -> Result<Self, SourceError> {
        self.aggregate(relation.into(), AggregateFn::Count, None)
    }

    /// Embed `SUM(column)` over a relation as `<relation>_sum_<column>`
    pub fn with_sum(
        self,
        relation: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.aggregate(relation.into(), AggregateFn::Sum, Some(column.into()))
    }

    /// Embed `AVG(column)` over a relation as `<relation>_avg_<column>`
    pub fn with_avg(
        self,
        relation: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.aggregate(relation.into(), AggregateFn::Avg, Some(column.into()))
    }

    /// Embed `MIN(column)` over a relation as `<relation>_min_<column>`
    pub fn with_min(
        self,
        relation: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.aggregate(relation.into(), AggregateFn::Min, Some(column.into()))
    }

    /// Embed `MAX(column)` over a relation as `<relation>_max_<column>`
    pub fn with_max(
        self,
        relation: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.aggregate(relation.into(), AggregateFn::Max, Some(column.into()))
    }

    /// Relations must be registered before aggregates over them
    fn aggregate(
        mut self,
        relation: String,
        function: AggregateFn,
        column: Option<String>,
    ) -> Result<Self, SourceError> {
        let aggregate = RelationAggregate {
            relation,
            function,
            column,
        };
        self.def.aggregate_sql(&aggregate)?;
        if self.def.is_embedded(&aggregate.key()) {
            return Err(SourceError::invalid_field(format!(
                "'{}' is already registered",
                aggregate.key()
            )));
        }
        Arc::make_mut(&mut self.def).aggregates.push(aggregate);
        Ok(self)
    }

    /// Register a to-one relation: `table.id = <this>.foreign_key`
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.relation(name.into(), RelationKind::BelongsTo, table.into(), foreign_key.into())
    }

    /// Register a to-many relation: `table.foreign_key = <this>.<primary key>`
    pub fn has_many(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Result<Self, SourceError> {
        self.relation(name.into(), RelationKind::HasMany, table.into(), foreign_key.into())
    }

    fn relation(
        mut self,
        name: String,
        kind: RelationKind,
        table: String,
        foreign_key: String,
    ) -> Result<Self, SourceError> {
        validate_column_name(&name).map_err(SourceError::InvalidField)?;
        validate_identifier(&table).map_err(SourceError::InvalidField)?;
        validate_column_name(&foreign_key).map_err(SourceError::InvalidField)?;
        if self.def.is_embedded(&name) {
            return Err(SourceError::invalid_field(format!(
                "Relation '{}' is already registered",
                name
            )));
        }
        Arc::make_mut(&mut self.def).relations.push(Relation {
            name,
            kind,
            table,
            foreign_key,
        });
        Ok(self)
    }
}

#[async_trait]
impl DataSource for PgSource {
    type Query = PgQuery;
    type Tx = PgTx;

    fn query(&self) -> PgQuery {
        PgQuery {
            pool: self.pool.clone(),
            def: Arc::clone(&self.def),
            clauses: Vec::new(),
            params: Vec::new(),
            order: Vec::new(),
        }
    }

    fn primary_key(&self) -> &str {
        &self.def.primary_key
    }

    async fn begin(&self) -> Result<PgTx, SourceError> {
        let tx = self.pool.begin().await?;
        Ok(PgTx {
            tx,
            def: Arc::clone(&self.def),
        })
    }

    async fn commit(&self, tx: PgTx) -> Result<(), SourceError> {
        tx.tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: PgTx) -> Result<(), SourceError> {
        tx.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Query
// ============================================================================

/// Working query over a [`PgSource`]
///
/// Clauses and parameters accumulate until [`ListQuery::paginate`] or
/// [`ListQuery::all`] runs them.
pub struct PgQuery {
    pool: PgPool,
    def: Arc<TableDef>,
    clauses: Vec<String>,
    params: Vec<String>,
    order: Vec<String>,
}

impl PgQuery {
    fn next_param(&self) -> usize {
        self.params.len() + 1
    }

    fn where_sql(&self) -> String {
        let mut parts: Vec<String> = self.def.live_filter().into_iter().collect();
        parts.extend(self.clauses.iter().map(|c| format!("({})", c)));
        if parts.is_empty() {
            "TRUE".to_string()
        } else {
            parts.join(" AND ")
        }
    }

    fn order_sql(&self) -> String {
        let mut order = self.order.clone();
        order.push(format!("{} ASC", self.def.pk_sql()));
        order.join(", ")
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT {} AS record FROM {} {} WHERE {} ORDER BY {}",
            self.def.record_sql(),
            self.def.table_sql(),
            ALIAS,
            self.where_sql(),
            self.order_sql()
        )
    }

    fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} {} WHERE {}",
            self.def.table_sql(),
            ALIAS,
            self.where_sql()
        )
    }

    fn search_sql(&self, field: &FieldRef, param: usize) -> Result<String, SourceError> {
        match field {
            FieldRef::Column(name) => {
                let column = column_sql(ALIAS, name).map_err(SourceError::InvalidField)?;
                Ok(format!("{}::text ILIKE ${}", column, param))
            }
            FieldRef::Relation { relation, field } => {
                let relation = self.def.relation(relation)?;
                let column = column_sql(RELATED_ALIAS, field).map_err(SourceError::InvalidField)?;
                Ok(format!(
                    "EXISTS (SELECT 1 {} AND {}::text ILIKE ${})",
                    self.def.related_from(relation),
                    column,
                    param
                ))
            }
        }
    }

    async fn fetch(&self, sql: &str, page: Option<(i64, i64)>) -> Result<Vec<Record>, SourceError> {
        tracing::debug!(sql, params = ?self.params, "list query");

        let mut query = sqlx::query(sql);
        for param in &self.params {
            query = query.bind(param.as_str());
        }
        if let Some((limit, offset)) = page {
            query = query.bind(limit).bind(offset);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<Value, _>("record").map_err(SourceError::from))
            .collect()
    }
}

#[async_trait]
impl ListQuery for PgQuery {
    fn search(&mut self, fields: &[FieldRef], term: &str) -> Result<(), SourceError> {
        if fields.is_empty() {
            return Ok(());
        }
        let param = self.next_param();
        let parts = fields
            .iter()
            .map(|field| self.search_sql(field, param))
            .collect::<Result<Vec<_>, _>>()?;

        self.params.push(format!("%{}%", escape_like(term)));
        self.clauses.push(parts.join(" OR "));
        Ok(())
    }

    fn filter(&mut self, condition: ConditionExpression) -> Result<(), SourceError> {
        let mut offset = self.next_param() as i32;
        let (clause, params) = build_condition_clause(&condition, ALIAS, &mut offset)
            .map_err(SourceError::InvalidCondition)?;

        self.params.extend(params.iter().map(value_to_text));
        self.clauses.push(clause);
        Ok(())
    }

    fn sort(&mut self, field: &FieldRef, direction: SortDirection) -> Result<(), SourceError> {
        let expr = match field {
            FieldRef::Column(name) => match self.def.aggregate(name) {
                Some(aggregate) => self.def.aggregate_sql(aggregate)?,
                None => column_sql(ALIAS, name).map_err(SourceError::InvalidField)?,
            },
            FieldRef::Relation { relation, field } => {
                let relation = self.def.relation(relation)?;
                let column = column_sql(RELATED_ALIAS, field).map_err(SourceError::InvalidField)?;
                let selected = match (relation.kind, direction) {
                    (RelationKind::BelongsTo, _) => column,
                    (RelationKind::HasMany, SortDirection::Asc) => format!("MIN({})", column),
                    (RelationKind::HasMany, SortDirection::Desc) => format!("MAX({})", column),
                };
                format!("(SELECT {} {})", selected, self.def.related_from(relation))
            }
        };
        self.order.push(format!("{} {}", expr, direction.as_sql()));
        Ok(())
    }

    async fn paginate(&self, page: u32, per_page: u32) -> Result<(Vec<Record>, u64), SourceError> {
        let count_sql = self.count_sql();
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        for param in &self.params {
            count_query = count_query.bind(param.as_str());
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        let limit = i64::from(per_page.max(1));
        let offset = i64::from(page.max(1) - 1) * limit;
        let sql = format!(
            "{} LIMIT ${} OFFSET ${}",
            self.select_sql(),
            self.params.len() + 1,
            self.params.len() + 2
        );
        let items = self.fetch(&sql, Some((limit, offset))).await?;

        Ok((items, u64::try_from(total).unwrap_or_default()))
    }

    async fn all(&self) -> Result<Vec<Record>, SourceError> {
        self.fetch(&self.select_sql(), None).await
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Open transaction over a [`PgSource`]
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    def: Arc<TableDef>,
}

impl PgTx {
    fn key_filter(&self, param: usize) -> String {
        let mut filter = format!("{}::text = ${}", self.def.pk_sql(), param);
        if let Some(live) = self.def.live_filter() {
            filter.push_str(" AND ");
            filter.push_str(&live);
        }
        filter
    }

    /// Writable column names of `record`; embedded relations and aggregates are skipped
    fn field_list<'a>(&self, record: &'a Value) -> Result<Vec<&'a String>, SourceError> {
        let fields = record
            .as_object()
            .ok_or_else(|| SourceError::invalid_field("Record must be a JSON object"))?;
        let mut names = Vec::with_capacity(fields.len());
        for name in fields.keys() {
            if self.def.is_embedded(name) {
                continue;
            }
            validate_column_name(name).map_err(SourceError::InvalidField)?;
            names.push(name);
        }
        Ok(names)
    }
}

#[async_trait]
impl Mutations for PgTx {
    async fn find(&mut self, id: &Value) -> Result<Option<Record>, SourceError> {
        let sql = format!(
            "SELECT {} AS record FROM {} {} WHERE {}",
            self.def.record_sql(),
            self.def.table_sql(),
            ALIAS,
            self.key_filter(1)
        );
        let row = sqlx::query(&sql)
            .bind(value_to_text(id))
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| row.try_get::<Value, _>("record"))
            .transpose()
            .map_err(SourceError::from)
    }

    async fn update(&mut self, id: &Value, patch: &Value) -> Result<(), SourceError> {
        let fields = self.field_list(patch)?;
        if fields.is_empty() {
            return match self.find(id).await? {
                Some(_) => Ok(()),
                None => Err(SourceError::record_not_found(value_to_text(id))),
            };
        }

        let assignments: Vec<String> = fields
            .iter()
            .map(|f| format!("{col} = p.{col}", col = quote_identifier(f)))
            .collect();
        let sql = format!(
            "UPDATE {table} AS {alias} SET {sets} FROM jsonb_populate_record(NULL::{table}, $1::jsonb) AS p WHERE {filter}",
            table = self.def.table_sql(),
            alias = ALIAS,
            sets = assignments.join(", "),
            filter = self.key_filter(2)
        );
        tracing::debug!(sql, "update record");

        let result = sqlx::query(&sql)
            .bind(patch)
            .bind(value_to_text(id))
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SourceError::record_not_found(value_to_text(id)));
        }
        Ok(())
    }

    async fn delete(&mut self, id: &Value) -> Result<(), SourceError> {
        let sql = if self.def.soft_delete {
            format!(
                "UPDATE {} AS {} SET \"deleted\" = TRUE WHERE {}::text = $1 AND {}.\"deleted\" = FALSE",
                self.def.table_sql(),
                ALIAS,
                self.def.pk_sql(),
                ALIAS
            )
        } else {
            format!(
                "DELETE FROM {} AS {} WHERE {}",
                self.def.table_sql(),
                ALIAS,
                self.key_filter(1)
            )
        };
        tracing::debug!(sql, "delete record");

        let result = sqlx::query(&sql)
            .bind(value_to_text(id))
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SourceError::record_not_found(value_to_text(id)));
        }
        Ok(())
    }

    async fn insert(&mut self, record: Record) -> Result<Value, SourceError> {
        let fields = self.field_list(&record)?;
        if fields.is_empty() {
            return Err(SourceError::invalid_field("Record has no fields to insert"));
        }

        let columns: Vec<String> = fields.iter().map(|f| quote_identifier(f)).collect();
        let selected: Vec<String> = columns.iter().map(|c| format!("p.{}", c)).collect();
        let sql = format!(
            "INSERT INTO {table} AS {alias} ({columns}) SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1::jsonb) AS p RETURNING to_jsonb({alias}.*) -> $2::text",
            table = self.def.table_sql(),
            alias = ALIAS,
            columns = columns.join(", "),
            selected = selected.join(", ")
        );
        tracing::debug!(sql, "insert record");

        let row = sqlx::query(&sql)
            .bind(&record)
            .bind(self.def.primary_key.as_str())
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.try_get::<Option<Value>, _>(0)?.unwrap_or(Value::Null))
    }
}
