//! Fluent, deferred query builder.
//!
//! A builder is a pending computation: predicate, ordering and pagination
//! calls mutate it in any order, and nothing executes until a consumption
//! method (`fetch`, `fetch_one`, `fetch_optional`, `count`) is called.
//! Consumption takes `self`, so a builder executes at most once — the
//! memoized-single-execution contract is enforced by the type system
//! rather than at runtime.
//!
//! Builder defects (malformed disjunctions, conflicting pagination) are
//! recorded at call time and surfaced from the consumption method before
//! any network or backend work.

use crate::client::QueryContext;
use crate::descriptor::{
    CountMode, OrderBy, Pagination, Predicate, PredicateOp, QueryDescriptor, ResultShape,
};
use crate::disjunction::Disjunction;
use crate::error::{OpsLinkError, Result};
use crate::models::{Payload, Rows};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::time::Duration;

/// A pending read against one table.
///
/// Not meant to be shared across concurrent logical queries; each call
/// site constructs its own instance via `client.from(table).select(...)`.
pub struct QueryBuilder<T = JsonValue> {
    ctx: QueryContext,
    descriptor: QueryDescriptor,
    defect: Option<OpsLinkError>,
    _rows: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> QueryBuilder<T> {
    pub(crate) fn new(ctx: QueryContext, table: &str, columns: &str) -> Self {
        let mut descriptor = QueryDescriptor::new(table);
        descriptor.projection = columns.to_string();
        Self {
            ctx,
            descriptor,
            defect: None,
            _rows: PhantomData,
        }
    }

    fn record_defect(&mut self, message: String) {
        // First defect wins; it already names the earliest mistake
        if self.defect.is_none() {
            self.defect = Some(OpsLinkError::ValidationError(message));
        }
    }

    fn filter(mut self, column: &str, op: PredicateOp, value: JsonValue) -> Self {
        self.descriptor.set_filter(column, Predicate::new(op, value));
        self
    }

    /// Equality filter. A second predicate on the same column replaces the
    /// first rather than combining with it.
    pub fn eq(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Eq, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Neq, value.into())
    }

    pub fn gt(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Gt, value.into())
    }

    pub fn gte(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Gte, value.into())
    }

    pub fn lt(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Lt, value.into())
    }

    pub fn lte(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Lte, value.into())
    }

    /// Pattern match; `%` is any run of characters, `_` exactly one.
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, PredicateOp::Like, JsonValue::String(pattern.to_string()))
    }

    /// Case-insensitive pattern match.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, PredicateOp::Ilike, JsonValue::String(pattern.to_string()))
    }

    /// Membership in a value set.
    pub fn is_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let set: Vec<JsonValue> = values.into_iter().map(Into::into).collect();
        self.filter(column, PredicateOp::In, JsonValue::Array(set))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, PredicateOp::Is, JsonValue::Null)
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(column, PredicateOp::Not, JsonValue::Null)
    }

    /// Array column contains every given element.
    pub fn contains(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::Contains, value.into())
    }

    /// Array column is a subset of the given elements.
    pub fn contained_by(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, PredicateOp::ContainedBy, value.into())
    }

    /// Raw disjunction, restricted to `column.operator.value` triples
    /// joined by commas (e.g. `status.eq.open,severity.gte.3`). Anything
    /// outside that grammar is a validation defect.
    pub fn or_raw(mut self, expression: &str) -> Self {
        match Disjunction::parse(expression) {
            Ok(disjunction) => self.descriptor.disjunctions.push(disjunction),
            Err(OpsLinkError::ValidationError(message)) => self.record_defect(message),
            Err(other) => self.record_defect(other.to_string()),
        }
        self
    }

    /// Ascending order on a column.
    pub fn order(mut self, column: &str) -> Self {
        self.descriptor.order = Some(OrderBy {
            column: column.to_string(),
            ascending: true,
        });
        self
    }

    /// Descending order on a column.
    pub fn order_desc(mut self, column: &str) -> Self {
        self.descriptor.order = Some(OrderBy {
            column: column.to_string(),
            ascending: false,
        });
        self
    }

    /// At most `n` rows. Mutually exclusive with `range`.
    pub fn limit(mut self, n: u64) -> Self {
        if self.descriptor.pagination.is_some() {
            self.record_defect("limit and range are mutually exclusive".to_string());
        } else {
            self.descriptor.pagination = Some(Pagination::Limit(n));
        }
        self
    }

    /// Inclusive row window `[start, end]`. Mutually exclusive with `limit`.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        if self.descriptor.pagination.is_some() {
            self.record_defect("limit and range are mutually exclusive".to_string());
        } else if end < start {
            self.record_defect(format!("invalid range: [{start}, {end}]"));
        } else {
            self.descriptor.pagination = Some(Pagination::Range { start, end });
        }
        self
    }

    /// Request an exact count of matching rows alongside the data.
    pub fn count_exact(mut self) -> Self {
        self.descriptor.count = CountMode::Exact;
        self
    }

    /// Existence-only read: no row payload, count/head semantics only.
    pub fn head(mut self) -> Self {
        self.descriptor.head = true;
        self
    }

    /// Override the per-call deadline for this query.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.ctx.deadline = deadline;
        self
    }

    async fn run(mut self, shape: ResultShape) -> Result<Payload> {
        if let Some(defect) = self.defect.take() {
            return Err(defect);
        }
        self.descriptor.shape = shape;
        self.ctx
            .strategy
            .query(&self.ctx.database, &self.descriptor, self.ctx.deadline)
            .await
    }

    /// Execute and return all matching rows in descriptor order.
    pub async fn fetch(self) -> Result<Rows<T>> {
        let payload = self.run(ResultShape::Rows).await?;
        Rows::from_payload(payload)
    }

    /// Execute expecting exactly one matching row.
    pub async fn fetch_one(self) -> Result<T> {
        let payload = self.run(ResultShape::SingleRequired).await?;
        let found = payload.rows.len();
        if found != 1 {
            return Err(OpsLinkError::QueryError(format!(
                "expected exactly one row, found {found}"
            )));
        }
        let mut rows = Rows::from_payload(payload)?;
        Ok(rows.rows.remove(0))
    }

    /// Execute accepting zero or one matching row; zero rows is `None`,
    /// not a failure.
    pub async fn fetch_optional(self) -> Result<Option<T>> {
        let payload = self.run(ResultShape::SingleOptional).await?;
        let found = payload.rows.len();
        if found > 1 {
            return Err(OpsLinkError::QueryError(format!(
                "expected at most one row, found {found}"
            )));
        }
        let mut rows = Rows::from_payload(payload)?;
        Ok(rows.rows.pop())
    }

    /// Execute as a count-only read (head + exact count).
    pub async fn count(mut self) -> Result<u64> {
        self.descriptor.count = CountMode::Exact;
        self.descriptor.head = true;
        let payload = self.run(ResultShape::Rows).await?;
        payload
            .count
            .ok_or_else(|| OpsLinkError::QueryError("executor returned no count".to_string()))
    }
}
