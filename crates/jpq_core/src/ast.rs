//! Plan and filter-expression definitions

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A user filter function: applied per value, its result replaces the value
pub type FilterFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A user aggregate function: consumes the whole value list, yields one value
pub type AggregateFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A compiled JSONPath expression, reusable across documents and threads
///
/// Obtain one with [`parse`](crate::parse) or
/// [`parse_with`](crate::parse_with), then call
/// [`query`](Plan::query) any number of times. The plan is immutable;
/// concurrent queries against distinct documents are safe.
pub struct Plan {
    pub(crate) segments: Vec<Segment>,
    /// Source text of the whole expression with the leading `$` and the
    /// surrounding blanks stripped. Reported by `none matched`.
    pub(crate) connected_text: String,
    pub(crate) filter_functions: HashMap<String, FilterFn>,
    pub(crate) aggregate_functions: HashMap<String, AggregateFn>,
    /// Reserved: switches the output from values to accessor descriptors.
    pub(crate) accessor_mode: bool,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("segments", &self.segments)
            .field("connected_text", &self.connected_text)
            .field("filter_functions", &self.filter_functions.len())
            .field("aggregate_functions", &self.aggregate_functions.len())
            .field("accessor_mode", &self.accessor_mode)
            .finish()
    }
}

/// One step of a compiled path
///
/// The plan holds segments in evaluation order; the end of the vector is
/// the terminal that appends surviving values to the result list. `text`
/// and `connected_text` are fixed at parse time and never change.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    /// Literal source substring of this step (`.a`, `['a','b']`, `[0:2]`)
    pub text: String,
    /// Concatenated source of every step up to and including this one
    pub connected_text: String,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone)]
pub(crate) enum SegmentKind {
    /// One object key, from `.name` or `['name']`
    ChildSingle(String),
    /// Comma-separated quoted names, in expression order, missing skipped
    ChildMulti(Vec<String>),
    /// `.*` or `[*]`: object values in sorted-key order, array elements in
    /// index order
    ChildWildcard,
    /// `..`: pre-order walk over every reachable object/array; the gates
    /// record whether the following segment applies to maps and/or lists
    RecursiveDescent { map_gate: bool, list_gate: bool },
    /// `[n]` with negative indexes resolving from the end
    ArrayIndex(i64),
    /// `[a,b:c,*]`: expression order, duplicates preserved
    ArrayUnion(Vec<UnionSpec>),
    /// `[start:end:step]`
    ArraySlice(SliceSpec),
    /// `[?( predicate )]`
    Filter(FilterExpr),
    /// `.name()`: a user function, bound against the config at parse time
    Function { name: String, binding: FunctionBinding },
}

impl SegmentKind {
    /// Whether this step can fan one value out into several.
    ///
    /// Once a multi-valued step has run, later per-value errors no longer
    /// abort the evaluation; the value just contributes nothing.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            SegmentKind::ChildMulti(_)
                | SegmentKind::ChildWildcard
                | SegmentKind::RecursiveDescent { .. }
                | SegmentKind::ArrayUnion(_)
                | SegmentKind::ArraySlice(_)
                | SegmentKind::Filter(_)
        )
    }
}

/// How a `.name()` step resolved against the config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionBinding {
    Filter,
    Aggregate,
    /// No registered function of this name; fails at evaluation
    Unbound,
}

/// One member of an array union
#[derive(Debug, Clone)]
pub(crate) enum UnionSpec {
    Index(i64),
    Slice(SliceSpec),
    Wildcard,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SliceSpec {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: Option<i64>,
}

/// Boolean expression inside `[?( ... )]`
#[derive(Debug, Clone)]
pub(crate) enum FilterExpr {
    Logical {
        op: LogicalOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    Not(Box<FilterExpr>),
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    /// True iff the sub-query selects at least one value
    Exists(SubQuery),
    /// True iff the sub-query selects a single string matching the pattern
    Regex { query: SubQuery, pattern: Regex },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

/// A comparison or existence operand
///
/// Literals are cached as `serde_json::Value` at parse time so filter
/// evaluation never re-converts them.
#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Literal(Value),
    Query(SubQuery),
}

/// Where a filter sub-query starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    /// `@`: the candidate under test
    Current,
    /// `$`: the outer document
    Root,
}

/// A path rooted at `@` or `$` inside a filter expression
#[derive(Debug, Clone)]
pub(crate) struct SubQuery {
    pub anchor: Anchor,
    pub segments: Vec<Segment>,
}

impl SubQuery {
    /// Whether the sub-query is statically limited to at most one value.
    ///
    /// Comparison and regex operands must be; wildcard, slice, union,
    /// descent, multi-name, and nested filter steps all disqualify.
    pub fn is_single_valued(&self) -> bool {
        self.segments.iter().all(|seg| {
            matches!(
                seg.kind,
                SegmentKind::ChildSingle(_)
                    | SegmentKind::ArrayIndex(_)
                    | SegmentKind::Function { .. }
            )
        })
    }
}

/// Derive recursive-descent gates from the segment that follows each `..`.
///
/// Called once per segment vector when the plan (or a sub-query) is built.
pub(crate) fn finalize_descent_gates(segments: &mut [Segment]) {
    for i in 0..segments.len() {
        let (map_gate, list_gate) = match segments.get(i + 1).map(|s| &s.kind) {
            Some(SegmentKind::ChildSingle(_)) | Some(SegmentKind::ChildMulti(_)) => (true, false),
            Some(SegmentKind::ArrayIndex(_))
            | Some(SegmentKind::ArrayUnion(_))
            | Some(SegmentKind::ArraySlice(_)) => (false, true),
            _ => (true, true),
        };
        if let SegmentKind::RecursiveDescent {
            map_gate: m,
            list_gate: l,
        } = &mut segments[i].kind
        {
            *m = map_gate;
            *l = list_gate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(kind: SegmentKind) -> Segment {
        Segment {
            text: String::new(),
            connected_text: String::new(),
            kind,
        }
    }

    #[test]
    fn test_multi_valued_classification() {
        assert!(!SegmentKind::ChildSingle("a".to_string()).is_multi_valued());
        assert!(!SegmentKind::ArrayIndex(0).is_multi_valued());
        assert!(
            !SegmentKind::Function {
                name: "f".to_string(),
                binding: FunctionBinding::Unbound,
            }
            .is_multi_valued()
        );
        assert!(SegmentKind::ChildWildcard.is_multi_valued());
        assert!(SegmentKind::ChildMulti(vec![]).is_multi_valued());
        assert!(SegmentKind::ArraySlice(SliceSpec::default()).is_multi_valued());
    }

    #[test]
    fn test_descent_gates_for_name() {
        let mut segments = vec![
            seg(SegmentKind::RecursiveDescent {
                map_gate: true,
                list_gate: true,
            }),
            seg(SegmentKind::ChildSingle("a".to_string())),
        ];
        finalize_descent_gates(&mut segments);
        match segments[0].kind {
            SegmentKind::RecursiveDescent { map_gate, list_gate } => {
                assert!(map_gate);
                assert!(!list_gate);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_descent_gates_for_index() {
        let mut segments = vec![
            seg(SegmentKind::RecursiveDescent {
                map_gate: true,
                list_gate: true,
            }),
            seg(SegmentKind::ArrayIndex(1)),
        ];
        finalize_descent_gates(&mut segments);
        match segments[0].kind {
            SegmentKind::RecursiveDescent { map_gate, list_gate } => {
                assert!(!map_gate);
                assert!(list_gate);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_single_valued_subquery() {
        let single = SubQuery {
            anchor: Anchor::Current,
            segments: vec![
                seg(SegmentKind::ChildSingle("a".to_string())),
                seg(SegmentKind::ArrayIndex(0)),
            ],
        };
        assert!(single.is_single_valued());

        let grouped = SubQuery {
            anchor: Anchor::Current,
            segments: vec![seg(SegmentKind::ChildWildcard)],
        };
        assert!(!grouped.is_single_valued());
    }
}
