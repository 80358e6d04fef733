//! Filter predicate evaluation
//!
//! A predicate runs once per candidate. Sub-queries that fail simply
//! select nothing: an existence test turns false, a comparison operand
//! stays unresolved. Nothing in here raises an error.

use crate::ast::{CompareOp, FilterExpr, LogicalOp, Operand, Plan, SubQuery};
use crate::eval::eval_subquery;
use serde_json::Value;

pub(crate) fn matches(plan: &Plan, expr: &FilterExpr, candidate: &Value, root: &Value) -> bool {
    match expr {
        FilterExpr::Logical { op, left, right } => match op {
            LogicalOp::And => {
                matches(plan, left, candidate, root) && matches(plan, right, candidate, root)
            }
            LogicalOp::Or => {
                matches(plan, left, candidate, root) || matches(plan, right, candidate, root)
            }
        },
        FilterExpr::Not(inner) => !matches(plan, inner, candidate, root),
        // existence, not truthiness: a selected null or false still counts
        FilterExpr::Exists(query) => !eval_subquery(plan, query, candidate, root).is_empty(),
        FilterExpr::Regex { query, pattern } => {
            match single_value(plan, query, candidate, root) {
                Some(Value::String(s)) => pattern.is_match(&s),
                _ => false,
            }
        }
        FilterExpr::Compare { op, left, right } => {
            let left = resolve(plan, left, candidate, root);
            let right = resolve(plan, right, candidate, root);
            compare(*op, left.as_ref(), right.as_ref())
        }
    }
}

/// Resolve an operand to at most one value. Operand queries are
/// statically single-valued, so the sub-query yields zero or one result.
fn resolve(plan: &Plan, operand: &Operand, candidate: &Value, root: &Value) -> Option<Value> {
    match operand {
        Operand::Literal(value) => Some(value.clone()),
        Operand::Query(query) => single_value(plan, query, candidate, root),
    }
}

fn single_value(plan: &Plan, query: &SubQuery, candidate: &Value, root: &Value) -> Option<Value> {
    eval_subquery(plan, query, candidate, root).into_iter().next()
}

fn compare(op: CompareOp, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        CompareOp::Eq => resolved_eq(left, right),
        // != is the exact negation of ==, so an unresolved operand
        // satisfies it
        CompareOp::Ne => !resolved_eq(left, right),
        CompareOp::Lt => number_pair(left, right).is_some_and(|(l, r)| l < r),
        CompareOp::Le => number_pair(left, right).is_some_and(|(l, r)| l <= r),
        CompareOp::Gt => number_pair(left, right).is_some_and(|(l, r)| l > r),
        CompareOp::Ge => number_pair(left, right).is_some_and(|(l, r)| l >= r),
    }
}

fn resolved_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => eq_values(l, r),
        _ => false,
    }
}

/// Deep, type-strict equality. Numbers compare by numeric value so that
/// `1.0 == 1`, and so that losslessly decoded numbers keep their textual
/// form while still comparing by magnitude (`11.00 == 11`,
/// `-0.123e2 == -12.3`). Values of different kinds are never equal.
fn eq_values(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r.iter()).all(|(l, r)| eq_values(l, r))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(k, lv)| r.get(k).is_some_and(|rv| eq_values(lv, rv)))
        }
        _ => false,
    }
}

/// Ordering comparisons apply to numbers only; any other pairing,
/// including string-to-string, is false.
fn number_pair(left: Option<&Value>, right: Option<&Value>) -> Option<(f64, f64)> {
    match (left?, right?) {
        (Value::Number(l), Value::Number(r)) => Some((l.as_f64()?, r.as_f64()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_equality_across_forms() {
        assert!(eq_values(&json!(2.0), &json!(2)));
        assert!(eq_values(&json!(-12.3), &json!(-12.3)));
        assert!(!eq_values(&json!(2), &json!("2")));
        assert!(!eq_values(&json!(0), &json!(false)));
        assert!(!eq_values(&json!(null), &json!(false)));
    }

    #[test]
    fn test_deep_equality() {
        assert!(eq_values(&json!([1, [2]]), &json!([1.0, [2]])));
        assert!(!eq_values(&json!([1, 2]), &json!([1])));
        assert!(eq_values(&json!({"a": [2]}), &json!({"a": [2.0]})));
        assert!(!eq_values(&json!({"a": 1}), &json!({"b": 1})));
    }

    #[test]
    fn test_unresolved_operands() {
        // == with a missing side is false; != is its exact negation
        assert!(!compare(CompareOp::Eq, None, Some(&json!(2))));
        assert!(compare(CompareOp::Ne, None, Some(&json!(2))));
        assert!(!compare(CompareOp::Lt, None, Some(&json!(2))));
    }

    #[test]
    fn test_ordering_is_numeric_only() {
        assert!(compare(CompareOp::Lt, Some(&json!(1)), Some(&json!(2))));
        assert!(compare(CompareOp::Le, Some(&json!(2)), Some(&json!(2))));
        assert!(compare(CompareOp::Ge, Some(&json!(2)), Some(&json!(2))));
        assert!(!compare(CompareOp::Lt, Some(&json!("a")), Some(&json!("b"))));
        assert!(!compare(CompareOp::Gt, Some(&json!(true)), Some(&json!(false))));
        assert!(!compare(CompareOp::Lt, Some(&json!("0.9")), Some(&json!(1))));
    }
}
