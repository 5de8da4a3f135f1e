//! Wire models for the proxy protocol.
//!
//! One logical call is one JSON POST body ([`ProxyRequest`]) and one JSON
//! response envelope ([`ProxyResponse`]). Filters travel either as a raw
//! scalar (implying equality) or as an explicit `{op, value}` pair, matching
//! what the proxy endpoint parses.

use crate::descriptor::{
    CountMode, MutationDescriptor, MutationKind, OrderBy, Pagination, Predicate, PredicateOp,
    QueryDescriptor, ResultShape,
};
use crate::disjunction::Disjunction;
use crate::error::{OpsLinkError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Operation kind on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

/// A filter as the proxy sees it: a raw scalar means equality, anything
/// else is an explicit operator pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Operator { op: PredicateOp, value: JsonValue },
    Scalar(JsonValue),
}

impl From<&Predicate> for FilterValue {
    fn from(p: &Predicate) -> Self {
        match (p.op, &p.value) {
            // An object operand sent raw could re-parse as the {op, value}
            // form; keep the operator explicit for that shape
            (PredicateOp::Eq, JsonValue::Object(_)) => Self::Operator {
                op: PredicateOp::Eq,
                value: p.value.clone(),
            },
            (PredicateOp::Eq, _) => Self::Scalar(p.value.clone()),
            (op, _) => Self::Operator {
                op,
                value: p.value.clone(),
            },
        }
    }
}

impl From<FilterValue> for Predicate {
    fn from(f: FilterValue) -> Self {
        match f {
            FilterValue::Scalar(value) => Predicate::new(PredicateOp::Eq, value),
            FilterValue::Operator { op, value } => Predicate::new(op, value),
        }
    }
}

/// Request body for the proxy endpoint. Absent fields are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Logical datastore selector.
    pub database: String,
    pub operation: Operation,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, FilterValue>>,
    #[serde(rename = "or", default, skip_serializing_if = "Option::is_none")]
    pub or_clauses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<bool>,
    #[serde(
        rename = "maybeSingle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub maybe_single: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<bool>,
}

fn filters_to_wire(filters: &BTreeMap<String, Predicate>) -> Option<BTreeMap<String, FilterValue>> {
    if filters.is_empty() {
        return None;
    }
    Some(
        filters
            .iter()
            .map(|(column, predicate)| (column.clone(), FilterValue::from(predicate)))
            .collect(),
    )
}

fn filters_from_wire(filters: Option<BTreeMap<String, FilterValue>>) -> BTreeMap<String, Predicate> {
    filters
        .unwrap_or_default()
        .into_iter()
        .map(|(column, filter)| (column, Predicate::from(filter)))
        .collect()
}

impl ProxyRequest {
    /// Serialize a pending read for the wire.
    pub fn from_query(database: &str, query: &QueryDescriptor) -> Self {
        let or_clauses = if query.disjunctions.is_empty() {
            None
        } else {
            Some(query.disjunctions.iter().map(Disjunction::render).collect())
        };
        Self {
            database: database.to_string(),
            operation: Operation::Select,
            table: query.table.clone(),
            select: Some(query.projection.clone()),
            data: None,
            filters: filters_to_wire(&query.filters),
            or_clauses,
            order: query.order.as_ref().map(OrderBy::wire_format),
            limit: query.effective_limit(),
            single: (query.shape == ResultShape::SingleRequired).then_some(true),
            maybe_single: (query.shape == ResultShape::SingleOptional).then_some(true),
            count: query.count.wire().map(str::to_string),
            head: query.head.then_some(true),
        }
    }

    /// Serialize a pending write for the wire.
    pub fn from_mutation(database: &str, mutation: &MutationDescriptor) -> Self {
        let operation = match mutation.kind {
            MutationKind::Insert => Operation::Insert,
            MutationKind::Update => Operation::Update,
            MutationKind::Delete => Operation::Delete,
        };
        Self {
            database: database.to_string(),
            operation,
            table: mutation.table.clone(),
            select: mutation.returning.clone(),
            data: mutation.payload.clone(),
            filters: filters_to_wire(&mutation.filters),
            or_clauses: None,
            order: None,
            limit: None,
            single: None,
            maybe_single: None,
            count: None,
            head: None,
        }
    }

    /// Reconstruct the read descriptor this request carries.
    pub fn to_query_descriptor(&self) -> Result<QueryDescriptor> {
        if self.operation != Operation::Select {
            return Err(OpsLinkError::ValidationError(format!(
                "expected a select request, got {:?}",
                self.operation
            )));
        }
        let mut disjunctions = Vec::new();
        for clause in self.or_clauses.iter().flatten() {
            disjunctions.push(Disjunction::parse(clause)?);
        }
        let order = self
            .order
            .as_deref()
            .map(OrderBy::parse_wire)
            .transpose()?;
        let shape = if self.single == Some(true) {
            ResultShape::SingleRequired
        } else if self.maybe_single == Some(true) {
            ResultShape::SingleOptional
        } else {
            ResultShape::Rows
        };
        let count = match self.count.as_deref() {
            None => CountMode::None,
            Some("exact") => CountMode::Exact,
            Some(other) => {
                return Err(OpsLinkError::ValidationError(format!(
                    "unknown count mode: {other}"
                )))
            }
        };
        Ok(QueryDescriptor {
            table: self.table.clone(),
            projection: self.select.clone().unwrap_or_else(|| "*".to_string()),
            filters: filters_from_wire(self.filters.clone()),
            disjunctions,
            order,
            pagination: self.limit.map(Pagination::Limit),
            shape,
            count,
            head: self.head.unwrap_or(false),
        })
    }

    /// Reconstruct the write descriptor this request carries.
    pub fn to_mutation_descriptor(&self) -> Result<MutationDescriptor> {
        let kind = match self.operation {
            Operation::Insert => MutationKind::Insert,
            Operation::Update => MutationKind::Update,
            Operation::Delete => MutationKind::Delete,
            Operation::Select => {
                return Err(OpsLinkError::ValidationError(
                    "expected a mutation request, got a select".to_string(),
                ))
            }
        };
        Ok(MutationDescriptor {
            table: self.table.clone(),
            kind,
            payload: self.data.clone(),
            filters: filters_from_wire(self.filters.clone()),
            returning: self.select.clone(),
        })
    }
}

/// Response envelope from the proxy endpoint: exactly one of `data` and
/// `error` is meaningfully populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub data: Option<JsonValue>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ProxyResponse {
    pub fn ok(data: JsonValue, count: Option<u64>) -> Self {
        Self {
            data: Some(data),
            error: None,
            count,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
            count: None,
        }
    }
}

/// Uniform result of either executor: rows in descriptor order plus an
/// optional exact count.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub rows: Vec<JsonValue>,
    pub count: Option<u64>,
}

impl Payload {
    /// Normalize the wire `data` arm: an array is the row set, a lone
    /// object is one row, `null` is zero rows.
    pub fn from_wire(data: Option<JsonValue>, count: Option<u64>) -> Self {
        let rows = match data {
            Some(JsonValue::Array(rows)) => rows,
            Some(JsonValue::Null) | None => Vec::new(),
            Some(row) => vec![row],
        };
        Self { rows, count }
    }

    pub fn into_wire(self) -> ProxyResponse {
        ProxyResponse::ok(JsonValue::Array(self.rows), self.count)
    }
}

/// Typed rows handed back to callers.
#[derive(Debug, Clone)]
pub struct Rows<T> {
    pub rows: Vec<T>,
    /// Exact match count, present when the query asked for one.
    pub count: Option<u64>,
}

impl<T: DeserializeOwned> Rows<T> {
    pub(crate) fn from_payload(payload: Payload) -> Result<Self> {
        let mut rows = Vec::with_capacity(payload.rows.len());
        for row in payload.rows {
            rows.push(serde_json::from_value(row)?);
        }
        Ok(Self {
            rows,
            count: payload.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_query() -> QueryDescriptor {
        let mut q = QueryDescriptor::new("error_logs");
        q.set_filter("a", Predicate::new(PredicateOp::Eq, json!(1)));
        q.set_filter("b", Predicate::new(PredicateOp::Gt, json!(2)));
        q.order = Some(OrderBy {
            column: "c".to_string(),
            ascending: false,
        });
        q.pagination = Some(Pagination::Range { start: 0, end: 4 });
        q
    }

    #[test]
    fn test_eq_travels_as_raw_scalar() {
        let request = ProxyRequest::from_query("LOGMONITOR", &sample_query());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["filters"]["a"], json!(1));
        assert_eq!(body["filters"]["b"], json!({"op": "gt", "value": 2}));
    }

    #[test]
    fn test_wire_roundtrip_reconstructs_descriptor() {
        let request = ProxyRequest::from_query("LOGMONITOR", &sample_query());
        let json = serde_json::to_string(&request).unwrap();
        let parsed: ProxyRequest = serde_json::from_str(&json).unwrap();
        let rebuilt = parsed.to_query_descriptor().unwrap();

        assert_eq!(rebuilt.filters.len(), 2);
        assert_eq!(rebuilt.filters["a"], Predicate::new(PredicateOp::Eq, json!(1)));
        assert_eq!(rebuilt.filters["b"], Predicate::new(PredicateOp::Gt, json!(2)));
        let order = rebuilt.order.clone().unwrap();
        assert_eq!(order.column, "c");
        assert!(!order.ascending);
        // range(0,4) travels as limit = end - start + 1
        assert_eq!(rebuilt.effective_limit(), Some(5));
    }

    #[test]
    fn test_eq_object_operand_travels_explicit() {
        let mut q = QueryDescriptor::new("events");
        let operand = json!({"op": "gt", "value": 1});
        q.set_filter("meta", Predicate::new(PredicateOp::Eq, operand.clone()));

        let request = ProxyRequest::from_query("LOGMONITOR", &q);
        let body = serde_json::to_value(&request).unwrap();
        // Sent raw, this operand would deserialize as a gt filter
        assert_eq!(body["filters"]["meta"], json!({"op": "eq", "value": operand}));

        let parsed: ProxyRequest = serde_json::from_value(body).unwrap();
        let rebuilt = parsed.to_query_descriptor().unwrap();
        assert_eq!(rebuilt.filters["meta"], Predicate::new(PredicateOp::Eq, operand));
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let q = QueryDescriptor::new("calls");
        let request = ProxyRequest::from_query("PQNC_QA", &q);
        let body = serde_json::to_value(&request).unwrap();
        let object = body.as_object().unwrap();
        for absent in ["filters", "or", "order", "limit", "single", "maybeSingle", "count", "head"] {
            assert!(!object.contains_key(absent), "{absent} should be omitted");
        }
        assert_eq!(body["operation"], json!("select"));
        assert_eq!(body["select"], json!("*"));
    }

    #[test]
    fn test_mutation_roundtrip() {
        let mut m = MutationDescriptor::new("contacts", MutationKind::Update);
        m.payload = Some(json!({"status": "imported"}));
        m.set_filter("batch_id", Predicate::new(PredicateOp::Eq, json!("b-1")));
        m.returning = Some("id,status".to_string());

        let request = ProxyRequest::from_mutation("PQNC_QA", &m);
        let json = serde_json::to_string(&request).unwrap();
        let parsed: ProxyRequest = serde_json::from_str(&json).unwrap();
        let rebuilt = parsed.to_mutation_descriptor().unwrap();

        assert_eq!(rebuilt.kind, MutationKind::Update);
        assert_eq!(rebuilt.payload, Some(json!({"status": "imported"})));
        assert_eq!(rebuilt.filters["batch_id"].value, json!("b-1"));
        assert_eq!(rebuilt.returning.as_deref(), Some("id,status"));
        assert!(rebuilt.validate().is_ok());
    }

    #[test]
    fn test_payload_from_wire_shapes() {
        let array = Payload::from_wire(Some(json!([{"id": 1}, {"id": 2}])), Some(2));
        assert_eq!(array.rows.len(), 2);
        assert_eq!(array.count, Some(2));

        let single = Payload::from_wire(Some(json!({"id": 1})), None);
        assert_eq!(single.rows.len(), 1);

        let empty = Payload::from_wire(Some(JsonValue::Null), None);
        assert!(empty.rows.is_empty());
    }
}
