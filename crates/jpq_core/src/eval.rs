//! Evaluator: walks a plan's segments against a decoded JSON value
//!
//! The walk carries a value list and a single/multi-valued context flag.
//! In single-valued context a failing step aborts with its error; once a
//! fan-out step (wildcard, union, slice, filter, descent, multi-name) has
//! run, later per-value failures just drop the value. An aggregate
//! function collapses the list and returns the context to single-valued.
//! If the walk ends with no results, the whole evaluation reports
//! `none matched` with the full expression text.

use crate::ast::{
    FunctionBinding, Plan, Segment, SegmentKind, SliceSpec, SubQuery, UnionSpec,
};
use crate::error::{Error, kind_name};
use crate::filter;
use serde_json::{Map, Value};

pub(crate) fn evaluate(plan: &Plan, root: &Value) -> Result<Vec<Value>, Error> {
    let results = eval_from(plan, &plan.segments, vec![root], root, false)?;
    if results.is_empty() {
        // the terminal segment's connected text is the whole expression
        let path = plan
            .segments
            .last()
            .map(|s| s.connected_text.clone())
            .unwrap_or_default();
        return Err(Error::NoneMatched { path });
    }
    Ok(results)
}

/// Evaluate a filter sub-query from its anchor. Any error inside means
/// the sub-query selects nothing; the final none-matched decision belongs
/// to the top-level evaluation alone.
pub(crate) fn eval_subquery<'v>(
    plan: &Plan,
    sub: &SubQuery,
    candidate: &'v Value,
    root: &'v Value,
) -> Vec<Value> {
    let start = match sub.anchor {
        crate::ast::Anchor::Current => candidate,
        crate::ast::Anchor::Root => root,
    };
    eval_from(plan, &sub.segments, vec![start], root, false).unwrap_or_default()
}

/// Walk `segments` over `values`. Function steps split the walk: they
/// operate on the whole list, then the remaining segments run over their
/// output, which is why this recurses instead of looping to the end.
fn eval_from<'v>(
    plan: &Plan,
    segments: &[Segment],
    mut values: Vec<&'v Value>,
    root: &'v Value,
    mut multi: bool,
) -> Result<Vec<Value>, Error> {
    let mut pool = KeyPool::new();
    for (i, segment) in segments.iter().enumerate() {
        if let SegmentKind::Function { name, binding } = &segment.kind {
            return eval_function(
                plan,
                &segments[i + 1..],
                segment,
                name,
                *binding,
                values,
                root,
                multi,
            );
        }
        let mut next = Vec::new();
        for &value in &values {
            match apply_segment(plan, segment, value, root, &mut pool, &mut next) {
                Ok(()) => {}
                Err(_) if multi => {}
                Err(e) => return Err(e),
            }
        }
        values = next;
        multi = multi || segment.kind.is_multi_valued();
    }
    Ok(values.into_iter().cloned().collect())
}

/// Apply a user function step to the whole value list, then continue with
/// the remaining segments over its output.
#[allow(clippy::too_many_arguments)]
fn eval_function<'v>(
    plan: &Plan,
    rest: &[Segment],
    segment: &Segment,
    name: &str,
    binding: FunctionBinding,
    values: Vec<&'v Value>,
    root: &'v Value,
    multi: bool,
) -> Result<Vec<Value>, Error> {
    match binding {
        FunctionBinding::Unbound => Err(Error::FunctionNotFound {
            function: segment.text.clone(),
        }),
        FunctionBinding::Filter => {
            let Some(f) = plan.filter_functions.get(name) else {
                return Err(Error::FunctionNotFound {
                    function: segment.text.clone(),
                });
            };
            let mut outputs = Vec::with_capacity(values.len());
            for value in values {
                match f(value) {
                    Ok(out) => outputs.push(out),
                    Err(_) if multi => {}
                    Err(message) => {
                        return Err(Error::FunctionFailed {
                            function: segment.text.clone(),
                            message,
                        });
                    }
                }
            }
            let refs: Vec<&Value> = outputs.iter().collect();
            eval_from(plan, rest, refs, root, multi)
        }
        FunctionBinding::Aggregate => {
            let Some(f) = plan.aggregate_functions.get(name) else {
                return Err(Error::FunctionNotFound {
                    function: segment.text.clone(),
                });
            };
            let params = aggregate_params(values);
            match f(&params) {
                Ok(out) => eval_from(plan, rest, vec![&out], root, false),
                Err(message) => Err(Error::FunctionFailed {
                    function: segment.text.clone(),
                    message,
                }),
            }
        }
    }
}

/// An aggregate over a single array value receives the array's elements;
/// otherwise it receives the value list as-is.
fn aggregate_params(values: Vec<&Value>) -> Vec<Value> {
    if values.len() == 1
        && let Value::Array(arr) = values[0]
    {
        return arr.clone();
    }
    values.into_iter().cloned().collect()
}

fn type_unmatched(expected: &'static str, found: &Value, segment: &Segment) -> Error {
    Error::TypeUnmatched {
        expected,
        found: kind_name(found),
        path: segment.text.clone(),
    }
}

fn apply_segment<'v>(
    plan: &Plan,
    segment: &Segment,
    value: &'v Value,
    root: &'v Value,
    pool: &mut KeyPool<'v>,
    out: &mut Vec<&'v Value>,
) -> Result<(), Error> {
    match &segment.kind {
        SegmentKind::ChildSingle(name) => match value {
            Value::Object(map) => match map.get(name) {
                Some(v) => {
                    out.push(v);
                    Ok(())
                }
                None => Err(Error::MemberNotExist {
                    path: segment.text.clone(),
                }),
            },
            Value::Array(_) => Err(type_unmatched("object", value, segment)),
            _ => Err(type_unmatched("object/array", value, segment)),
        },
        SegmentKind::ChildMulti(names) => match value {
            Value::Object(map) => {
                for name in names {
                    if let Some(v) = map.get(name) {
                        out.push(v);
                    }
                }
                Ok(())
            }
            Value::Array(_) => Err(type_unmatched("object", value, segment)),
            _ => Err(type_unmatched("object/array", value, segment)),
        },
        SegmentKind::ChildWildcard => match value {
            Value::Object(map) => {
                let keys = pool.take_sorted(map);
                for key in &keys {
                    if let Some(v) = map.get(*key) {
                        out.push(v);
                    }
                }
                pool.put_back(keys);
                Ok(())
            }
            Value::Array(arr) => {
                out.extend(arr.iter());
                Ok(())
            }
            _ => Err(type_unmatched("object/array", value, segment)),
        },
        SegmentKind::ArrayIndex(index) => match value {
            Value::Array(arr) => match resolve_index(*index, arr.len()) {
                Some(i) => {
                    out.push(&arr[i]);
                    Ok(())
                }
                None => Err(Error::IndexOutOfRange {
                    path: segment.text.clone(),
                }),
            },
            _ => Err(type_unmatched("array", value, segment)),
        },
        SegmentKind::ArraySlice(spec) => match value {
            Value::Array(arr) => {
                slice_indices(spec, arr.len(), |i| out.push(&arr[i]));
                Ok(())
            }
            _ => Err(type_unmatched("array", value, segment)),
        },
        SegmentKind::ArrayUnion(specs) => match value {
            Value::Array(arr) => {
                for spec in specs {
                    match spec {
                        UnionSpec::Index(index) => {
                            // out-of-range members of a union are skipped
                            if let Some(i) = resolve_index(*index, arr.len()) {
                                out.push(&arr[i]);
                            }
                        }
                        UnionSpec::Slice(spec) => {
                            slice_indices(spec, arr.len(), |i| out.push(&arr[i]));
                        }
                        UnionSpec::Wildcard => out.extend(arr.iter()),
                    }
                }
                Ok(())
            }
            _ => Err(type_unmatched("array", value, segment)),
        },
        SegmentKind::Filter(expr) => match value {
            Value::Array(arr) => {
                for candidate in arr {
                    if filter::matches(plan, expr, candidate, root) {
                        out.push(candidate);
                    }
                }
                Ok(())
            }
            Value::Object(map) => {
                let keys = pool.take_sorted(map);
                for key in &keys {
                    if let Some(candidate) = map.get(*key)
                        && filter::matches(plan, expr, candidate, root)
                    {
                        out.push(candidate);
                    }
                }
                pool.put_back(keys);
                Ok(())
            }
            _ => Err(type_unmatched("object/array", value, segment)),
        },
        SegmentKind::RecursiveDescent {
            map_gate,
            list_gate,
        } => {
            descend(value, *map_gate, *list_gate, pool, out);
            Ok(())
        }
        // handled at list level in eval_from
        SegmentKind::Function { .. } => Ok(()),
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 {
        len.saturating_add(index)
    } else {
        index
    };
    if resolved >= 0 && resolved < len {
        Some(resolved as usize)
    } else {
        None
    }
}

/// Emit the indices a slice selects, in iteration order.
///
/// `step = 0` behaves as `step = 1`. Positive steps normalize negative
/// bounds against the length and clamp into the array. Negative steps
/// keep negative bounds as the stop condition and fold overshooting
/// bounds back across the length: a start past the end wraps once
/// (`[5:1:-1]` on three elements yields the last) and an end at or past
/// `len - 1` wraps to a negative stop (`[2:2:-1]` runs a full reverse).
fn slice_indices(spec: &SliceSpec, len: usize, mut emit: impl FnMut(usize)) {
    let len = len as i64;
    let mut step = spec.step.unwrap_or(1);
    if step == 0 {
        step = 1;
    }

    if step > 0 {
        let mut start = spec.start.unwrap_or(0);
        let mut end = spec.end.unwrap_or(len);
        if start < 0 {
            start = start.saturating_add(len);
        }
        if end < 0 {
            end = end.saturating_add(len);
        }
        start = start.clamp(0, len);
        end = end.min(len);
        let mut i = start;
        while i < end {
            emit(i as usize);
            i = i.saturating_add(step);
        }
    } else {
        let mut start = spec.start.unwrap_or(len - 1);
        let mut end = spec.end.unwrap_or(-len - 1);
        if start >= len {
            start = (start.saturating_sub(len)).min(len - 1);
        }
        if end >= len - 1 {
            end = end.saturating_sub(len);
        }
        end = end.max(-len - 1);
        let mut i = start;
        while i > end {
            if i >= 0 && i < len {
                emit(i as usize);
            }
            i = i.saturating_add(step);
        }
    }
}

/// Pre-order walk over every object/array reachable from `start`,
/// emitting the nodes that pass the kind gates. Children are pushed in
/// reverse sorted-key/index order so the pop order is forward.
fn descend<'v>(
    start: &'v Value,
    map_gate: bool,
    list_gate: bool,
    pool: &mut KeyPool<'v>,
    out: &mut Vec<&'v Value>,
) {
    let mut stack: Vec<&'v Value> = Vec::new();
    if matches!(start, Value::Object(_) | Value::Array(_)) {
        stack.push(start);
    }
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if map_gate {
                    out.push(node);
                }
                let keys = pool.take_sorted(map);
                for key in keys.iter().rev() {
                    if let Some(child) = map.get(*key)
                        && matches!(child, Value::Object(_) | Value::Array(_))
                    {
                        stack.push(child);
                    }
                }
                pool.put_back(keys);
            }
            Value::Array(arr) => {
                if list_gate {
                    out.push(node);
                }
                for child in arr.iter().rev() {
                    if matches!(child, Value::Object(_) | Value::Array(_)) {
                        stack.push(child);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Scratch pool of sorted-key vectors, reused across object visits within
/// one evaluation so the descent walk does not allocate per node.
struct KeyPool<'v> {
    free: Vec<Vec<&'v str>>,
}

impl<'v> KeyPool<'v> {
    fn new() -> Self {
        Self { free: Vec::new() }
    }

    fn take_sorted(&mut self, map: &'v Map<String, Value>) -> Vec<&'v str> {
        let mut keys = self.free.pop().unwrap_or_default();
        keys.clear();
        keys.extend(map.keys().map(String::as_str));
        keys.sort_unstable();
        keys
    }

    fn put_back(&mut self, keys: Vec<&'v str>) {
        self.free.push(keys);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slice(spec: (Option<i64>, Option<i64>, Option<i64>), len: usize) -> Vec<usize> {
        let spec = SliceSpec {
            start: spec.0,
            end: spec.1,
            step: spec.2,
        };
        let mut out = Vec::new();
        slice_indices(&spec, len, |i| out.push(i));
        out
    }

    #[test]
    fn test_slice_positive_step() {
        assert_eq!(slice((Some(0), Some(3), None), 3), vec![0, 1, 2]);
        assert_eq!(slice((Some(0), Some(0), None), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(2), Some(1), None), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(-2), Some(-1), None), 3), vec![1]);
        assert_eq!(slice((Some(-4), Some(3), None), 3), vec![0, 1, 2]);
        assert_eq!(slice((Some(0), Some(-1), None), 3), vec![0, 1]);
        assert_eq!(slice((Some(0), Some(-4), None), 3), Vec::<usize>::new());
        assert_eq!(slice((None, Some(2), None), 3), vec![0, 1]);
        assert_eq!(slice((Some(-1), None, None), 3), vec![2]);
        assert_eq!(slice((None, None, None), 3), vec![0, 1, 2]);
        assert_eq!(slice((Some(0), Some(3), Some(2)), 3), vec![0, 2]);
        assert_eq!(slice((Some(0), Some(2), Some(2)), 3), vec![0]);
    }

    #[test]
    fn test_slice_step_zero_is_one() {
        assert_eq!(slice((Some(0), Some(2), Some(0)), 3), vec![0, 1]);
    }

    #[test]
    fn test_slice_negative_step() {
        assert_eq!(slice((Some(0), Some(3), Some(-1)), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(2), Some(0), Some(-1)), 3), vec![2, 1]);
        assert_eq!(slice((Some(2), Some(0), Some(-2)), 3), vec![2]);
        assert_eq!(slice((Some(2), Some(-1), Some(-2)), 3), vec![2, 0]);
        assert_eq!(slice((Some(2), Some(-1), Some(-1)), 3), vec![2, 1, 0]);
        assert_eq!(slice((None, None, Some(-1)), 3), vec![2, 1, 0]);
        assert_eq!(slice((Some(1), None, Some(-1)), 3), vec![1, 0]);
        assert_eq!(slice((None, Some(1), Some(-1)), 3), vec![2]);
    }

    #[test]
    fn test_slice_negative_step_overshoot_folds_back() {
        // starts past the end fold across the length
        assert_eq!(slice((Some(3), Some(1), Some(-1)), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(4), Some(1), Some(-1)), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(5), Some(1), Some(-1)), 3), vec![2]);
        assert_eq!(slice((Some(6), Some(1), Some(-1)), 3), vec![2]);
        // ends at or past len-1 wrap to a negative stop
        assert_eq!(slice((Some(2), Some(2), Some(-1)), 3), vec![2, 1, 0]);
        assert_eq!(slice((Some(2), Some(3), Some(-1)), 3), vec![2, 1]);
        assert_eq!(slice((Some(2), Some(5), Some(-1)), 3), Vec::<usize>::new());
        // negative starts are stop conditions, not wrapped
        assert_eq!(slice((Some(-1), Some(0), Some(-1)), 3), Vec::<usize>::new());
    }

    #[test]
    fn test_slice_saturates_huge_bounds() {
        let huge = 1_000_000_000_000_000_000i64;
        assert_eq!(slice((Some(-huge), Some(1), None), 3), vec![0]);
        assert_eq!(slice((Some(huge), Some(1), None), 3), Vec::<usize>::new());
        assert_eq!(slice((Some(1), Some(huge), None), 3), vec![1, 2]);
        assert_eq!(slice((Some(huge), Some(0), Some(-1)), 3), vec![2, 1]);
        assert_eq!(slice((Some(1), Some(-huge), Some(-1)), 3), vec![1, 0]);
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(1_000_000_000_000_000_000, 3), None);
    }

    #[test]
    fn test_descend_preorder_sorted() {
        let doc = json!({"a": 1, "b": [2, 3], "c": {"d": 4, "e": [5, 6]}});
        let mut pool = KeyPool::new();
        let mut out = Vec::new();
        descend(&doc, true, true, &mut pool, &mut out);
        // root, then containers in sorted-key visit order
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], &doc);
        assert_eq!(out[1], &json!([2, 3]));
        assert_eq!(out[2], &json!({"d": 4, "e": [5, 6]}));
        assert_eq!(out[3], &json!([5, 6]));
    }

    #[test]
    fn test_descend_gates() {
        let doc = json!({"a": [1], "b": {"c": 2}});
        let mut pool = KeyPool::new();

        let mut maps_only = Vec::new();
        descend(&doc, true, false, &mut pool, &mut maps_only);
        assert_eq!(maps_only, vec![&doc, &json!({"c": 2})]);

        let mut lists_only = Vec::new();
        descend(&doc, false, true, &mut pool, &mut lists_only);
        assert_eq!(lists_only, vec![&json!([1])]);
    }

    #[test]
    fn test_descend_scalar_start_is_empty() {
        let doc = json!("a");
        let mut pool = KeyPool::new();
        let mut out = Vec::new();
        descend(&doc, true, true, &mut pool, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_key_pool_reuse() {
        let doc = json!({"b": 1, "a": 2});
        let map = doc.as_object().expect("object");
        let mut pool = KeyPool::new();
        let keys = pool.take_sorted(map);
        assert_eq!(keys, vec!["a", "b"]);
        pool.put_back(keys);
        assert_eq!(pool.free.len(), 1);
        let again = pool.take_sorted(map);
        assert_eq!(again, vec!["a", "b"]);
        assert!(pool.free.is_empty());
    }
}
