//! Direct execution against a privileged local backend handle.
//!
//! When trusted credentials are present (server-side or development
//! context) descriptors run here instead of travelling to the proxy. The
//! [`DirectBackend`] trait is the seam; [`MemoryBackend`] is the in-memory
//! implementation used for development and tests, carrying the full
//! predicate/order/pagination semantics so both execution paths can be
//! compared row for row.

use crate::descriptor::{MutationDescriptor, Pagination, Predicate, PredicateOp, QueryDescriptor};
use crate::error::{OpsLinkError, Result};
use crate::models::Payload;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

type Row = JsonMap<String, JsonValue>;

/// Privileged backend handle with descriptor-shaped native operations.
///
/// Implementations carry their own credential; no token handling happens
/// on this path. Native failures map into [`OpsLinkError::BackendError`].
#[async_trait]
pub trait DirectBackend: Send + Sync + 'static {
    async fn select(&self, query: &QueryDescriptor) -> Result<Payload>;
    async fn insert(&self, mutation: &MutationDescriptor) -> Result<Payload>;
    async fn update(&self, mutation: &MutationDescriptor) -> Result<Payload>;
    async fn delete(&self, mutation: &MutationDescriptor) -> Result<Payload>;
}

/// Compare two JSON scalars for ordering predicates. Values of
/// incomparable kinds order as `None` and fail range predicates.
fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            x.as_f64().partial_cmp(&y.as_f64())
        }
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    compare_values(a, b) == Some(Ordering::Equal) || a == b
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` exactly one.
fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

fn array_contains(haystack: &[JsonValue], needle: &JsonValue) -> bool {
    haystack.iter().any(|v| values_equal(v, needle))
}

/// Evaluate one predicate against a row. Missing columns read as `null`.
pub(crate) fn predicate_matches(row: &Row, column: &str, predicate: &Predicate) -> bool {
    static NULL: JsonValue = JsonValue::Null;
    let actual = row.get(column).unwrap_or(&NULL);
    let expected = &predicate.value;
    match predicate.op {
        PredicateOp::Eq => values_equal(actual, expected),
        PredicateOp::Neq => !values_equal(actual, expected),
        PredicateOp::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
        PredicateOp::Gte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        PredicateOp::Lt => compare_values(actual, expected) == Some(Ordering::Less),
        PredicateOp::Lte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        PredicateOp::Like => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like_match(pattern, text),
            _ => false,
        },
        PredicateOp::Ilike => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => {
                like_match(&pattern.to_lowercase(), &text.to_lowercase())
            }
            _ => false,
        },
        PredicateOp::In => expected
            .as_array()
            .is_some_and(|set| array_contains(set, actual)),
        PredicateOp::Is => values_equal(actual, expected),
        PredicateOp::Not => !values_equal(actual, expected),
        PredicateOp::Contains => match (actual.as_array(), expected) {
            (Some(have), JsonValue::Array(want)) => {
                want.iter().all(|v| array_contains(have, v))
            }
            (Some(have), scalar) => array_contains(have, scalar),
            _ => false,
        },
        PredicateOp::ContainedBy => match (actual.as_array(), expected.as_array()) {
            (Some(have), Some(allowed)) => {
                have.iter().all(|v| array_contains(allowed, v))
            }
            _ => false,
        },
    }
}

fn row_matches(row: &Row, query: &QueryDescriptor) -> bool {
    query
        .filters
        .iter()
        .all(|(column, predicate)| predicate_matches(row, column, predicate))
        && query.disjunctions.iter().all(|d| d.matches(row))
}

fn mutation_matches(row: &Row, mutation: &MutationDescriptor) -> bool {
    mutation
        .filters
        .iter()
        .all(|(column, predicate)| predicate_matches(row, column, predicate))
}

fn project(row: &Row, projection: &str) -> JsonValue {
    if projection.trim() == "*" {
        return JsonValue::Object(row.clone());
    }
    let mut out = JsonMap::new();
    for column in projection.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(value) = row.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    JsonValue::Object(out)
}

fn as_row(value: &JsonValue) -> Result<Row> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| OpsLinkError::BackendError("row payload must be an object".to_string()))
}

/// In-memory table store implementing [`DirectBackend`].
///
/// Does NOT persist anything; intended for development contexts and tests,
/// where it doubles as the reference semantics for the remote path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or extend) a table with rows. Each row must be a JSON object.
    pub async fn load(&self, table: &str, rows: Vec<JsonValue>) -> Result<()> {
        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            parsed.push(as_row(row)?);
        }
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().extend(parsed);
        Ok(())
    }

    /// Current number of rows in a table (testing convenience).
    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DirectBackend for MemoryBackend {
    async fn select(&self, query: &QueryDescriptor) -> Result<Payload> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&query.table)
            .ok_or_else(|| OpsLinkError::BackendError(format!("unknown table: {}", query.table)))?;

        let mut matched: Vec<&Row> = rows.iter().filter(|row| row_matches(row, query)).collect();

        if let Some(order) = &query.order {
            matched.sort_by(|a, b| {
                static NULL: JsonValue = JsonValue::Null;
                let left = a.get(&order.column).unwrap_or(&NULL);
                let right = b.get(&order.column).unwrap_or(&NULL);
                let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let total = matched.len() as u64;
        let paged: Vec<&Row> = match query.pagination {
            Some(Pagination::Limit(n)) => matched.into_iter().take(n as usize).collect(),
            Some(Pagination::Range { start, end }) => matched
                .into_iter()
                .skip(start as usize)
                .take((end.saturating_sub(start) + 1) as usize)
                .collect(),
            None => matched,
        };

        let count = query.count.wire().map(|_| total);
        let rows = if query.head {
            Vec::new()
        } else {
            paged
                .into_iter()
                .map(|row| project(row, &query.projection))
                .collect()
        };
        Ok(Payload { rows, count })
    }

    async fn insert(&self, mutation: &MutationDescriptor) -> Result<Payload> {
        mutation.validate()?;
        let payload = mutation
            .payload
            .as_ref()
            .ok_or_else(|| OpsLinkError::BackendError("insert without payload".to_string()))?;
        let new_rows: Vec<Row> = match payload {
            JsonValue::Array(records) => {
                records.iter().map(as_row).collect::<Result<Vec<_>>>()?
            }
            record => vec![as_row(record)?],
        };

        let projection = mutation.returning.as_deref().unwrap_or("*");
        let returned = new_rows.iter().map(|row| project(row, projection)).collect();

        let mut tables = self.tables.write().await;
        tables
            .entry(mutation.table.clone())
            .or_default()
            .extend(new_rows);
        Ok(Payload {
            rows: returned,
            count: None,
        })
    }

    async fn update(&self, mutation: &MutationDescriptor) -> Result<Payload> {
        mutation.validate()?;
        let changes = match mutation.payload.as_ref() {
            Some(JsonValue::Object(changes)) => changes.clone(),
            _ => {
                return Err(OpsLinkError::BackendError(
                    "update payload must be a record".to_string(),
                ))
            }
        };

        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(&mutation.table).ok_or_else(|| {
            OpsLinkError::BackendError(format!("unknown table: {}", mutation.table))
        })?;

        let projection = mutation.returning.as_deref().unwrap_or("*");
        let mut returned = Vec::new();
        for row in rows.iter_mut().filter(|row| mutation_matches(row, mutation)) {
            for (column, value) in &changes {
                row.insert(column.clone(), value.clone());
            }
            returned.push(project(row, projection));
        }
        Ok(Payload {
            rows: returned,
            count: None,
        })
    }

    async fn delete(&self, mutation: &MutationDescriptor) -> Result<Payload> {
        mutation.validate()?;
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(&mutation.table).ok_or_else(|| {
            OpsLinkError::BackendError(format!("unknown table: {}", mutation.table))
        })?;

        let projection = mutation.returning.as_deref().unwrap_or("*");
        let mut returned = Vec::new();
        rows.retain(|row| {
            if mutation_matches(row, mutation) {
                returned.push(project(row, projection));
                false
            } else {
                true
            }
        });
        Ok(Payload {
            rows: returned,
            count: None,
        })
    }
}
