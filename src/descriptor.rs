//! Data-only descriptors for pending queries and mutations.
//!
//! A descriptor captures everything a builder assembled, independent of
//! whether it will run against a privileged local backend handle or be
//! serialized into a proxy call. Both executors consume the same shapes.

use crate::disjunction::Disjunction;
use crate::error::{OpsLinkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Closed operator set for column predicates.
///
/// Wire names follow the proxy filter grammar (`eq`, `neq`, ...,
/// `containedBy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredicateOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
    Not,
    Contains,
    ContainedBy,
}

impl PredicateOp {
    /// Wire spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::In => "in",
            Self::Is => "is",
            Self::Not => "not",
            Self::Contains => "contains",
            Self::ContainedBy => "containedBy",
        }
    }

    /// Parse a wire spelling; `None` for anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "ilike" => Some(Self::Ilike),
            "in" => Some(Self::In),
            "is" => Some(Self::Is),
            "not" => Some(Self::Not),
            "contains" => Some(Self::Contains),
            "containedBy" => Some(Self::ContainedBy),
            _ => None,
        }
    }
}

/// One column predicate: operator plus operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub op: PredicateOp,
    pub value: JsonValue,
}

impl Predicate {
    pub fn new(op: PredicateOp, value: JsonValue) -> Self {
        Self { op, value }
    }
}

/// Ordering clause: one column, ascending or descending.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    /// Wire form: `column.asc` / `column.desc`.
    pub fn wire_format(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        format!("{}.{}", self.column, direction)
    }

    /// Parse the wire form.
    pub fn parse_wire(s: &str) -> Result<Self> {
        let (column, direction) = s.rsplit_once('.').ok_or_else(|| {
            OpsLinkError::ValidationError(format!("invalid order clause: {s}"))
        })?;
        let ascending = match direction {
            "asc" => true,
            "desc" => false,
            other => {
                return Err(OpsLinkError::ValidationError(format!(
                    "invalid order direction: {other}"
                )))
            }
        };
        Ok(Self {
            column: column.to_string(),
            ascending,
        })
    }
}

/// Pagination mode. Mutually exclusive by construction: a descriptor holds
/// at most one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// At most `n` rows.
    Limit(u64),
    /// Inclusive `[start, end]` row window.
    Range { start: u64, end: u64 },
}

impl Pagination {
    /// Page size for execution paths that take a single limit parameter:
    /// `Range { start, end }` converts via `end - start + 1`.
    pub fn effective_limit(&self) -> u64 {
        match self {
            Self::Limit(n) => *n,
            Self::Range { start, end } => end.saturating_sub(*start) + 1,
        }
    }
}

/// Result shape requested by the consumption method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultShape {
    /// Zero or more rows.
    #[default]
    Rows,
    /// Exactly one row; zero or many is an error.
    SingleRequired,
    /// Zero or one row; zero is a `None` result, not an error.
    SingleOptional,
}

/// Whether the executor should compute an exact match count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    #[default]
    None,
    Exact,
}

impl CountMode {
    /// Wire value, omitted when counting is off.
    pub fn wire(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Exact => Some("exact"),
        }
    }
}

/// A pending read, independent of execution strategy.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub table: String,
    /// Column list or `*`.
    pub projection: String,
    /// One predicate per column; a later predicate on the same column
    /// replaces the earlier one.
    pub filters: BTreeMap<String, Predicate>,
    /// Validated raw disjunction clauses, passed through to the executor.
    pub disjunctions: Vec<Disjunction>,
    pub order: Option<OrderBy>,
    pub pagination: Option<Pagination>,
    pub shape: ResultShape,
    pub count: CountMode,
    /// Existence/count-only read: no row payload is returned.
    pub head: bool,
}

impl QueryDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: "*".to_string(),
            filters: BTreeMap::new(),
            disjunctions: Vec::new(),
            order: None,
            pagination: None,
            shape: ResultShape::Rows,
            count: CountMode::None,
            head: false,
        }
    }

    /// Register a predicate, overwriting any previous one on the column.
    pub fn set_filter(&mut self, column: impl Into<String>, predicate: Predicate) {
        self.filters.insert(column.into(), predicate);
    }

    /// Page size, if any pagination is set.
    pub fn effective_limit(&self) -> Option<u64> {
        self.pagination.as_ref().map(Pagination::effective_limit)
    }
}

/// Kind of write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// A pending write, independent of execution strategy.
#[derive(Debug, Clone)]
pub struct MutationDescriptor {
    pub table: String,
    pub kind: MutationKind,
    /// Record (or array of records, insert only) to write.
    pub payload: Option<JsonValue>,
    /// Filter predicates; required for update/delete.
    pub filters: BTreeMap<String, Predicate>,
    /// Projection returned for affected rows.
    pub returning: Option<String>,
}

impl MutationDescriptor {
    pub fn new(table: impl Into<String>, kind: MutationKind) -> Self {
        Self {
            table: table.into(),
            kind,
            payload: None,
            filters: BTreeMap::new(),
            returning: None,
        }
    }

    /// Register a predicate, overwriting any previous one on the column.
    pub fn set_filter(&mut self, column: impl Into<String>, predicate: Predicate) {
        self.filters.insert(column.into(), predicate);
    }

    /// Pre-network validation. An update or delete with zero predicates
    /// would target the whole table and is rejected here.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            MutationKind::Insert => match &self.payload {
                Some(JsonValue::Object(_)) => Ok(()),
                Some(JsonValue::Array(rows))
                    if !rows.is_empty() && rows.iter().all(JsonValue::is_object) =>
                {
                    Ok(())
                }
                Some(_) => Err(OpsLinkError::ValidationError(
                    "insert payload must be a record or a non-empty array of records"
                        .to_string(),
                )),
                None => Err(OpsLinkError::ValidationError(
                    "insert requires a payload".to_string(),
                )),
            },
            MutationKind::Update => {
                if !matches!(self.payload, Some(JsonValue::Object(_))) {
                    return Err(OpsLinkError::ValidationError(
                        "update payload must be a record".to_string(),
                    ));
                }
                if self.filters.is_empty() {
                    return Err(OpsLinkError::ValidationError(format!(
                        "update on '{}' requires at least one filter",
                        self.table
                    )));
                }
                Ok(())
            }
            MutationKind::Delete => {
                if self.filters.is_empty() {
                    return Err(OpsLinkError::ValidationError(format!(
                        "delete on '{}' requires at least one filter",
                        self.table
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predicate_op_roundtrip() {
        let ops = [
            PredicateOp::Eq,
            PredicateOp::Neq,
            PredicateOp::Gt,
            PredicateOp::Gte,
            PredicateOp::Lt,
            PredicateOp::Lte,
            PredicateOp::Like,
            PredicateOp::Ilike,
            PredicateOp::In,
            PredicateOp::Is,
            PredicateOp::Not,
            PredicateOp::Contains,
            PredicateOp::ContainedBy,
        ];
        for op in ops {
            assert_eq!(PredicateOp::parse(op.as_str()), Some(op));
        }
        assert_eq!(PredicateOp::parse("drop table"), None);
    }

    #[test]
    fn test_same_column_overwrites() {
        let mut q = QueryDescriptor::new("calls");
        q.set_filter("status", Predicate::new(PredicateOp::Eq, json!("open")));
        q.set_filter("status", Predicate::new(PredicateOp::Neq, json!("closed")));
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.filters["status"].op, PredicateOp::Neq);
    }

    #[test]
    fn test_range_effective_limit() {
        let p = Pagination::Range { start: 0, end: 4 };
        assert_eq!(p.effective_limit(), 5);
        assert_eq!(Pagination::Limit(10).effective_limit(), 10);
    }

    #[test]
    fn test_order_wire_roundtrip() {
        let order = OrderBy {
            column: "created_at".to_string(),
            ascending: false,
        };
        assert_eq!(order.wire_format(), "created_at.desc");
        assert_eq!(OrderBy::parse_wire("created_at.desc").unwrap(), order);
        assert!(OrderBy::parse_wire("created_at").is_err());
        assert!(OrderBy::parse_wire("created_at.sideways").is_err());
    }

    #[test]
    fn test_unfiltered_update_rejected() {
        let mut m = MutationDescriptor::new("prospects", MutationKind::Update);
        m.payload = Some(json!({"status": "won"}));
        assert!(matches!(
            m.validate(),
            Err(OpsLinkError::ValidationError(_))
        ));

        m.set_filter("id", Predicate::new(PredicateOp::Eq, json!(7)));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_unfiltered_delete_rejected() {
        let m = MutationDescriptor::new("prospects", MutationKind::Delete);
        assert!(matches!(
            m.validate(),
            Err(OpsLinkError::ValidationError(_))
        ));
    }

    #[test]
    fn test_insert_payload_shapes() {
        let mut m = MutationDescriptor::new("logs", MutationKind::Insert);
        assert!(m.validate().is_err());

        m.payload = Some(json!({"level": "error"}));
        assert!(m.validate().is_ok());

        m.payload = Some(json!([{"level": "error"}, {"level": "warn"}]));
        assert!(m.validate().is_ok());

        m.payload = Some(json!(["not-a-record"]));
        assert!(m.validate().is_err());
    }
}
