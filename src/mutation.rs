//! Fluent, deferred mutation builders.
//!
//! Same contract as the query builder: assembly is cheap and infallible,
//! execution is explicit and consumes the builder. Update and delete
//! require at least one filter predicate; an unfiltered call is rejected
//! with a validation error before anything reaches the network, because it
//! would silently target the entire table.

use crate::client::QueryContext;
use crate::descriptor::{MutationDescriptor, MutationKind, Predicate, PredicateOp};
use crate::error::{OpsLinkError, Result};
use crate::models::Rows;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::time::Duration;

fn to_payload(record: impl Serialize) -> (Option<JsonValue>, Option<OpsLinkError>) {
    match serde_json::to_value(record) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(OpsLinkError::SerializationError(err))),
    }
}

async fn run(
    ctx: &QueryContext,
    descriptor: &MutationDescriptor,
    defect: Option<OpsLinkError>,
    deadline: Duration,
) -> Result<crate::models::Payload> {
    if let Some(defect) = defect {
        return Err(defect);
    }
    descriptor.validate()?;
    ctx.strategy.mutate(&ctx.database, descriptor, deadline).await
}

/// A pending insert of one record or an array of records.
pub struct InsertBuilder<T = JsonValue> {
    ctx: QueryContext,
    descriptor: MutationDescriptor,
    defect: Option<OpsLinkError>,
    _rows: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> InsertBuilder<T> {
    pub(crate) fn new(ctx: QueryContext, table: &str, record: impl Serialize) -> Self {
        let mut descriptor = MutationDescriptor::new(table, MutationKind::Insert);
        let (payload, defect) = to_payload(record);
        descriptor.payload = payload;
        Self {
            ctx,
            descriptor,
            defect,
            _rows: PhantomData,
        }
    }

    /// Projection returned for the inserted rows.
    pub fn returning(mut self, columns: &str) -> Self {
        self.descriptor.returning = Some(columns.to_string());
        self
    }

    /// Override the per-call deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.ctx.deadline = deadline;
        self
    }

    /// Execute, returning the inserted rows.
    pub async fn execute(self) -> Result<Rows<T>> {
        let payload = run(&self.ctx, &self.descriptor, self.defect, self.ctx.deadline).await?;
        Rows::from_payload(payload)
    }

    /// Execute a single-record insert, returning the inserted row.
    pub async fn execute_one(self) -> Result<T> {
        let mut rows = self.execute().await?;
        if rows.rows.len() != 1 {
            return Err(OpsLinkError::QueryError(format!(
                "expected one inserted row, got {}",
                rows.rows.len()
            )));
        }
        Ok(rows.rows.remove(0))
    }
}

/// A pending update; requires at least one filter before execution.
pub struct UpdateBuilder<T = JsonValue> {
    ctx: QueryContext,
    descriptor: MutationDescriptor,
    defect: Option<OpsLinkError>,
    _rows: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> UpdateBuilder<T> {
    pub(crate) fn new(ctx: QueryContext, table: &str, changes: impl Serialize) -> Self {
        let mut descriptor = MutationDescriptor::new(table, MutationKind::Update);
        let (payload, defect) = to_payload(changes);
        descriptor.payload = payload;
        Self {
            ctx,
            descriptor,
            defect,
            _rows: PhantomData,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::Eq, value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::Neq, value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let set: Vec<JsonValue> = values.into_iter().map(Into::into).collect();
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::In, JsonValue::Array(set)));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::Is, JsonValue::Null));
        self
    }

    /// Projection returned for the updated rows.
    pub fn returning(mut self, columns: &str) -> Self {
        self.descriptor.returning = Some(columns.to_string());
        self
    }

    /// Override the per-call deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.ctx.deadline = deadline;
        self
    }

    /// Execute, returning the updated rows. Rejects with a validation
    /// error when no filter is attached.
    pub async fn execute(self) -> Result<Rows<T>> {
        let payload = run(&self.ctx, &self.descriptor, self.defect, self.ctx.deadline).await?;
        Rows::from_payload(payload)
    }

    /// Execute expecting exactly one updated row.
    pub async fn execute_one(self) -> Result<T> {
        let mut rows = self.execute().await?;
        if rows.rows.len() != 1 {
            return Err(OpsLinkError::QueryError(format!(
                "expected one updated row, got {}",
                rows.rows.len()
            )));
        }
        Ok(rows.rows.remove(0))
    }
}

/// A pending delete; requires at least one filter before execution.
pub struct DeleteBuilder<T = JsonValue> {
    ctx: QueryContext,
    descriptor: MutationDescriptor,
    _rows: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DeleteBuilder<T> {
    pub(crate) fn new(ctx: QueryContext, table: &str) -> Self {
        Self {
            ctx,
            descriptor: MutationDescriptor::new(table, MutationKind::Delete),
            _rows: PhantomData,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::Eq, value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::Neq, value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let set: Vec<JsonValue> = values.into_iter().map(Into::into).collect();
        self.descriptor
            .set_filter(column, Predicate::new(PredicateOp::In, JsonValue::Array(set)));
        self
    }

    /// Projection returned for the deleted rows.
    pub fn returning(mut self, columns: &str) -> Self {
        self.descriptor.returning = Some(columns.to_string());
        self
    }

    /// Override the per-call deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.ctx.deadline = deadline;
        self
    }

    /// Execute, returning the deleted rows. Rejects with a validation
    /// error when no filter is attached.
    pub async fn execute(self) -> Result<Rows<T>> {
        let payload = run(&self.ctx, &self.descriptor, None, self.ctx.deadline).await?;
        Rows::from_payload(payload)
    }
}
