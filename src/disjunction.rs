//! Closed grammar for raw OR filter expressions.
//!
//! The `or(...)` escape hatch on the query builder accepts only
//! `column.operator.value` triples joined by commas, e.g.
//! `status.eq.open,severity.gte.3`. Anything outside that grammar is
//! rejected before any network or backend work, so caller-supplied text
//! never reaches the remote filter parser uninterpreted.

use crate::descriptor::{Predicate, PredicateOp};
use crate::error::{OpsLinkError, Result};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// One `column.operator.value` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub column: String,
    pub op: PredicateOp,
    pub value: String,
}

impl Triple {
    /// Operand as a JSON value: numbers, booleans and `null` parse as
    /// themselves, everything else is a string.
    pub fn operand(&self) -> JsonValue {
        match serde_json::from_str(&self.value) {
            Ok(v @ (JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null)) => v,
            _ => JsonValue::String(self.value.clone()),
        }
    }

    /// The triple as an ordinary predicate on its column.
    pub fn to_predicate(&self) -> Predicate {
        Predicate::new(self.op, self.operand())
    }
}

/// A validated disjunction: a row passes when any triple matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Disjunction {
    triples: Vec<Triple>,
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Disjunction {
    /// Parse a raw expression against the closed grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OpsLinkError::ValidationError(
                "empty disjunction expression".to_string(),
            ));
        }
        let mut triples = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            let mut pieces = part.splitn(3, '.');
            let (column, op, value) = match (pieces.next(), pieces.next(), pieces.next()) {
                (Some(c), Some(o), Some(v)) => (c, o, v),
                _ => {
                    return Err(OpsLinkError::ValidationError(format!(
                        "disjunction clause '{part}' is not a column.operator.value triple"
                    )))
                }
            };
            if !is_ident(column) {
                return Err(OpsLinkError::ValidationError(format!(
                    "invalid column name in disjunction: {column}"
                )));
            }
            let op = PredicateOp::parse(op).ok_or_else(|| {
                OpsLinkError::ValidationError(format!(
                    "unknown operator in disjunction: {op}"
                ))
            })?;
            if value.is_empty() || value.contains(['(', ')']) {
                return Err(OpsLinkError::ValidationError(format!(
                    "invalid value in disjunction clause '{part}'"
                )));
            }
            triples.push(Triple {
                column: column.to_string(),
                op,
                value: value.to_string(),
            });
        }
        Ok(Self { triples })
    }

    /// Canonical wire rendering, `column.op.value` joined by commas.
    pub fn render(&self) -> String {
        self.triples
            .iter()
            .map(|t| format!("{}.{}.{}", t.column, t.op.as_str(), t.value))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// `true` when any triple matches the row.
    pub fn matches(&self, row: &JsonMap<String, JsonValue>) -> bool {
        self.triples.iter().any(|t| {
            crate::local::predicate_matches(row, &t.column, &t.to_predicate())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_render_canonical() {
        let d = Disjunction::parse("status.eq.open, severity.gte.3").unwrap();
        assert_eq!(d.triples().len(), 2);
        assert_eq!(d.render(), "status.eq.open,severity.gte.3");
    }

    #[test]
    fn test_operand_typing() {
        let d = Disjunction::parse("a.eq.3,b.eq.true,c.is.null,d.eq.open").unwrap();
        let operands: Vec<JsonValue> = d.triples().iter().map(Triple::operand).collect();
        assert_eq!(operands, vec![json!(3), json!(true), json!(null), json!("open")]);
    }

    #[test]
    fn test_rejects_free_text() {
        assert!(Disjunction::parse("status=eq=open").is_err());
        assert!(Disjunction::parse("").is_err());
        assert!(Disjunction::parse("status.droptable.x").is_err());
        assert!(Disjunction::parse("1bad.eq.x").is_err());
        assert!(Disjunction::parse("a.eq.fn()").is_err());
    }

    #[test]
    fn test_value_may_contain_dots() {
        // splitn(3) keeps everything after the second dot as the value
        let d = Disjunction::parse("version.eq.1.2.3").unwrap();
        assert_eq!(d.triples()[0].value, "1.2.3");
    }

    #[test]
    fn test_matches_any_triple() {
        let d = Disjunction::parse("status.eq.open,severity.gte.3").unwrap();
        let open = json!({"status": "open", "severity": 1});
        let severe = json!({"status": "closed", "severity": 5});
        let neither = json!({"status": "closed", "severity": 1});
        assert!(d.matches(open.as_object().unwrap()));
        assert!(d.matches(severe.as_object().unwrap()));
        assert!(!d.matches(neither.as_object().unwrap()));
    }
}
