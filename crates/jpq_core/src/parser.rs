//! Recursive-descent parser producing a [`Plan`]
//!
//! Structural failures are reported at the enclosing recovery point: a
//! bracket that cannot be parsed reports `unrecognized input` at the `[`,
//! a dot with no name reports at the `.`. Semantic failures (value-group
//! and current-node prohibitions, `$`-omission, integer overflow) keep
//! their inner position and reason.

use crate::Config;
use crate::ast::{
    Anchor, CompareOp, FilterExpr, FunctionBinding, LogicalOp, Operand, Plan, Segment,
    SegmentKind, SliceSpec, SubQuery, UnionSpec, finalize_descent_gates,
};
use crate::error::{Error, reason};
use crate::lexer::{Lexer, is_function_name};
use regex::Regex;

/// Internal parse failure
///
/// `Soft` is a structural mismatch that the nearest recovery point turns
/// into `unrecognized input`; `Hard` already carries the final error.
enum Failure {
    Soft,
    Hard(Error),
}

type PResult<T> = Result<T, Failure>;

/// Raw bracket element, before integer conversion.
///
/// The bracket's shape is validated first; conversion (and overflow
/// reporting) happens only once the closing `]` has been seen.
enum RawElement {
    Int(String),
    Slice(Option<String>, Option<String>, Option<String>),
    Wildcard,
}

/// Parse one expression with a fresh parser.
///
/// A new parser per call is what makes `parse` itself thread-safe; the
/// returned plan is immutable and shareable.
pub(crate) fn parse_expression(input: &str, config: &Config) -> Result<Plan, Error> {
    Parser {
        lexer: Lexer::new(input),
        config: config.clone(),
    }
    .parse()
}

struct Parser {
    lexer: Lexer,
    config: Config,
}

impl Parser {
    fn unrecognized(&self, pos: usize) -> Error {
        Error::InvalidSyntax {
            position: pos,
            reason: reason::UNRECOGNIZED.to_string(),
            near: self.lexer.rest_from(pos),
        }
    }

    fn hard(&self, pos: usize, why: &str) -> Failure {
        Failure::Hard(Error::InvalidSyntax {
            position: pos,
            reason: why.to_string(),
            near: self.lexer.rest_from(pos),
        })
    }

    fn parse(mut self) -> Result<Plan, Error> {
        self.lexer.skip_blanks();
        let start = self.lexer.pos();
        if self.lexer.eof() {
            return Err(self.unrecognized(start));
        }
        if self.lexer.peek() == Some('@') {
            return Err(Error::InvalidSyntax {
                position: start,
                reason: reason::AT_PROHIBITED.to_string(),
                near: self.lexer.rest_from(start),
            });
        }

        let mut segments = Vec::new();
        let mut connected = String::new();

        // The leading `$` is optional, but only a name or a bracket may
        // replace it; a leading `.` is not recognized.
        if !self.lexer.eat('$') {
            match self.lexer.peek() {
                Some('[') => {}
                Some('.') => return Err(self.unrecognized(start)),
                _ => {
                    if self.bare_first_piece(&mut segments, &mut connected).is_err() {
                        return Err(self.unrecognized(start));
                    }
                }
            }
        }

        loop {
            self.lexer.skip_blanks();
            if self.lexer.eof() {
                break;
            }
            let seg_start = self.lexer.pos();
            let piece = match self.lexer.peek() {
                Some('.') => self.dot_piece(&mut segments, &mut connected, true),
                Some('[') => self.bracket_piece(&mut segments, &mut connected, true),
                _ => return Err(self.unrecognized(seg_start)),
            };
            match piece {
                Ok(()) => {}
                Err(Failure::Soft) => return Err(self.unrecognized(seg_start)),
                Err(Failure::Hard(e)) => return Err(e),
            }
        }

        finalize_descent_gates(&mut segments);
        Ok(Plan {
            segments,
            connected_text: connected,
            filter_functions: self.config.filter_functions.clone(),
            aggregate_functions: self.config.aggregate_functions.clone(),
            accessor_mode: self.config.accessor_mode,
        })
    }

    fn push_segment(
        &self,
        segments: &mut Vec<Segment>,
        connected: &mut String,
        seg_start: usize,
        kind: SegmentKind,
    ) {
        let text = self.lexer.slice(seg_start, self.lexer.pos());
        connected.push_str(&text);
        segments.push(Segment {
            text,
            connected_text: connected.clone(),
            kind,
        });
    }

    /// First segment when the leading `$` is omitted: a bare name,
    /// wildcard, or function.
    fn bare_first_piece(
        &mut self,
        segments: &mut Vec<Segment>,
        connected: &mut String,
    ) -> PResult<()> {
        let seg_start = self.lexer.pos();
        if self.lexer.eat('*') {
            self.push_segment(segments, connected, seg_start, SegmentKind::ChildWildcard);
            return Ok(());
        }
        let Some(name) = self.lexer.read_name() else {
            return Err(Failure::Soft);
        };
        let kind = self.name_or_function(name);
        self.push_segment(segments, connected, seg_start, kind);
        Ok(())
    }

    /// `.name`, `.name()`, `.*`, `..name`, `..*`, `..[...]`
    fn dot_piece(
        &mut self,
        segments: &mut Vec<Segment>,
        connected: &mut String,
        top: bool,
    ) -> PResult<()> {
        let seg_start = self.lexer.pos();
        if self.lexer.eat2('.', '.') {
            self.push_segment(
                segments,
                connected,
                seg_start,
                SegmentKind::RecursiveDescent {
                    map_gate: true,
                    list_gate: true,
                },
            );
            let child_start = self.lexer.pos();
            match self.lexer.peek() {
                Some('[') => return self.bracket_piece(segments, connected, top),
                Some('*') => {
                    self.lexer.bump();
                    self.push_segment(segments, connected, child_start, SegmentKind::ChildWildcard);
                    Ok(())
                }
                _ => {
                    let Some(name) = self.lexer.read_name() else {
                        return Err(Failure::Soft);
                    };
                    let kind = self.name_or_function(name);
                    self.push_segment(segments, connected, child_start, kind);
                    Ok(())
                }
            }
        } else {
            self.lexer.eat('.');
            match self.lexer.peek() {
                Some('*') => {
                    self.lexer.bump();
                    self.push_segment(segments, connected, seg_start, SegmentKind::ChildWildcard);
                    Ok(())
                }
                _ => {
                    let Some(name) = self.lexer.read_name() else {
                        return Err(Failure::Soft);
                    };
                    let kind = self.name_or_function(name);
                    self.push_segment(segments, connected, seg_start, kind);
                    Ok(())
                }
            }
        }
    }

    /// A parsed name, reinterpreted as a function when it is immediately
    /// followed by `()` and fits the function identifier charset.
    fn name_or_function(&mut self, name: String) -> SegmentKind {
        if self.lexer.peek() == Some('(')
            && self.lexer.peek_at(1) == Some(')')
            && is_function_name(&name)
        {
            self.lexer.bump();
            self.lexer.bump();
            let binding = if self.config.filter_functions.contains_key(&name) {
                FunctionBinding::Filter
            } else if self.config.aggregate_functions.contains_key(&name) {
                FunctionBinding::Aggregate
            } else {
                FunctionBinding::Unbound
            };
            SegmentKind::Function { name, binding }
        } else {
            SegmentKind::ChildSingle(name)
        }
    }

    /// Any `[...]` segment. With `top` set, scripts are recognized and
    /// rejected as unsupported; in filter sub-queries they fail softly.
    fn bracket_piece(
        &mut self,
        segments: &mut Vec<Segment>,
        connected: &mut String,
        top: bool,
    ) -> PResult<()> {
        let seg_start = self.lexer.pos();
        let kind = self.bracket_kind(seg_start, top)?;
        self.push_segment(segments, connected, seg_start, kind);
        Ok(())
    }

    fn bracket_kind(&mut self, seg_start: usize, top: bool) -> PResult<SegmentKind> {
        self.lexer.eat('[');
        self.lexer.skip_blanks();
        match self.lexer.peek() {
            Some('\'') | Some('"') => self.bracket_names(),
            Some('?') => self.bracket_filter(),
            Some('(') => self.bracket_script(seg_start, top),
            _ => self.bracket_array(),
        }
    }

    /// `['a']`, `["a"]`, `['a','b',...]`
    fn bracket_names(&mut self) -> PResult<SegmentKind> {
        let mut names = Vec::new();
        loop {
            if !matches!(self.lexer.peek(), Some('\'') | Some('"')) {
                return Err(Failure::Soft);
            }
            let Some(name) = self.lexer.read_bracket_string() else {
                return Err(Failure::Soft);
            };
            names.push(name);
            self.lexer.skip_blanks();
            if self.lexer.eat(',') {
                self.lexer.skip_blanks();
                continue;
            }
            if self.lexer.eat(']') {
                break;
            }
            return Err(Failure::Soft);
        }
        if names.len() == 1 {
            let name = names.remove(0);
            Ok(SegmentKind::ChildSingle(name))
        } else {
            Ok(SegmentKind::ChildMulti(names))
        }
    }

    /// `[(text)]`: recognized, then rejected at plan construction
    fn bracket_script(&mut self, seg_start: usize, top: bool) -> PResult<SegmentKind> {
        self.lexer.eat('(');
        let mut command = String::new();
        loop {
            match self.lexer.peek() {
                Some(')') => break,
                Some(c) => {
                    self.lexer.bump();
                    command.push(c);
                }
                None => return Err(Failure::Soft),
            }
        }
        self.lexer.eat(')');
        if command.is_empty() || !self.lexer.eat(']') {
            return Err(Failure::Soft);
        }
        if !top {
            return Err(Failure::Soft);
        }
        Err(Failure::Hard(Error::NotSupported {
            feature: "script",
            path: self.lexer.slice(seg_start, self.lexer.pos()),
        }))
    }

    /// Indexes, slices, wildcards, and unions of them
    fn bracket_array(&mut self) -> PResult<SegmentKind> {
        let mut raw = Vec::new();
        loop {
            self.lexer.skip_blanks();
            let element = if self.lexer.eat('*') {
                RawElement::Wildcard
            } else {
                let first = self.lexer.read_int_token();
                self.lexer.skip_blanks();
                if self.lexer.eat(':') {
                    self.lexer.skip_blanks();
                    let second = self.lexer.read_int_token();
                    self.lexer.skip_blanks();
                    let third = if self.lexer.eat(':') {
                        self.lexer.skip_blanks();
                        let t = self.lexer.read_int_token();
                        self.lexer.skip_blanks();
                        t
                    } else {
                        None
                    };
                    RawElement::Slice(first, second, third)
                } else {
                    match first {
                        Some(token) => RawElement::Int(token),
                        None => return Err(Failure::Soft),
                    }
                }
            };
            raw.push(element);
            self.lexer.skip_blanks();
            if self.lexer.eat(',') {
                continue;
            }
            if self.lexer.eat(']') {
                break;
            }
            return Err(Failure::Soft);
        }

        // Shape is valid; now convert, so a malformed bracket never
        // reports an overflow and a well-formed one always does.
        let mut specs = Vec::with_capacity(raw.len());
        for element in raw {
            specs.push(match element {
                RawElement::Wildcard => UnionSpec::Wildcard,
                RawElement::Int(token) => UnionSpec::Index(self.convert_int(&token)?),
                RawElement::Slice(start, end, step) => UnionSpec::Slice(SliceSpec {
                    start: self.convert_opt_int(start)?,
                    end: self.convert_opt_int(end)?,
                    step: self.convert_opt_int(step)?,
                }),
            });
        }

        if specs.len() == 1 {
            Ok(match specs.remove(0) {
                UnionSpec::Index(i) => SegmentKind::ArrayIndex(i),
                UnionSpec::Slice(spec) => SegmentKind::ArraySlice(spec),
                UnionSpec::Wildcard => SegmentKind::ChildWildcard,
            })
        } else {
            Ok(SegmentKind::ArrayUnion(specs))
        }
    }

    fn convert_int(&self, token: &str) -> PResult<i64> {
        token.parse::<i64>().map_err(|e| {
            Failure::Hard(Error::InvalidArgument {
                argument: token.trim_start_matches('+').to_string(),
                message: e.to_string(),
            })
        })
    }

    fn convert_opt_int(&self, token: Option<String>) -> PResult<Option<i64>> {
        match token {
            Some(t) => Ok(Some(self.convert_int(&t)?)),
            None => Ok(None),
        }
    }

    // ========== Filter Expressions ==========

    /// `[?( expr )]`
    fn bracket_filter(&mut self) -> PResult<SegmentKind> {
        self.lexer.eat('?');
        if !self.lexer.eat('(') {
            return Err(Failure::Soft);
        }
        let expr = self.filter_or()?;
        self.lexer.skip_blanks();
        if !self.lexer.eat(')') {
            return Err(Failure::Soft);
        }
        self.lexer.skip_blanks();
        if !self.lexer.eat(']') {
            return Err(Failure::Soft);
        }
        Ok(SegmentKind::Filter(expr))
    }

    fn filter_or(&mut self) -> PResult<FilterExpr> {
        let mut left = self.filter_and()?;
        loop {
            self.lexer.skip_blanks();
            if self.lexer.eat2('|', '|') {
                let right = self.filter_and()?;
                left = FilterExpr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn filter_and(&mut self) -> PResult<FilterExpr> {
        let mut left = self.filter_term()?;
        loop {
            self.lexer.skip_blanks();
            if self.lexer.eat2('&', '&') {
                let right = self.filter_term()?;
                left = FilterExpr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            } else {
                return Ok(left);
            }
        }
    }

    /// `( expr )`, `! query`, comparison, regex match, existence test
    fn filter_term(&mut self) -> PResult<FilterExpr> {
        self.lexer.skip_blanks();
        match self.lexer.peek() {
            Some('(') => {
                self.lexer.bump();
                let inner = self.filter_or()?;
                self.lexer.skip_blanks();
                if !self.lexer.eat(')') {
                    return Err(Failure::Soft);
                }
                Ok(inner)
            }
            Some('!') => {
                // negation applies to an existence query only
                self.lexer.bump();
                self.lexer.skip_blanks();
                if !matches!(self.lexer.peek(), Some('@') | Some('$')) {
                    return Err(Failure::Soft);
                }
                let query = self.subquery()?;
                Ok(FilterExpr::Not(Box::new(FilterExpr::Exists(query))))
            }
            _ => self.comparison_or_exists(),
        }
    }

    fn comparison_or_exists(&mut self) -> PResult<FilterExpr> {
        self.lexer.skip_blanks();
        let left_pos = self.lexer.pos();
        let left = self.operand()?;
        self.lexer.skip_blanks();

        if self.lexer.eat2('=', '~') {
            let Operand::Query(query) = left else {
                return Err(Failure::Soft);
            };
            self.lexer.skip_blanks();
            let Some(pattern_text) = self.lexer.read_regex_literal() else {
                return Err(Failure::Soft);
            };
            if !query.is_single_valued() {
                return Err(self.hard(left_pos, reason::VALUE_GROUP));
            }
            let pattern = Regex::new(&pattern_text).map_err(|e| {
                Failure::Hard(Error::InvalidArgument {
                    argument: pattern_text.clone(),
                    message: e.to_string(),
                })
            })?;
            return Ok(FilterExpr::Regex { query, pattern });
        }

        let op = if self.lexer.eat2('=', '=') {
            Some(CompareOp::Eq)
        } else if self.lexer.eat2('!', '=') {
            Some(CompareOp::Ne)
        } else if self.lexer.eat2('<', '=') {
            Some(CompareOp::Le)
        } else if self.lexer.eat2('>', '=') {
            Some(CompareOp::Ge)
        } else if self.lexer.peek() == Some('<') && self.lexer.peek_at(1) != Some('>') {
            self.lexer.bump();
            Some(CompareOp::Lt)
        } else if self.lexer.eat('>') {
            Some(CompareOp::Gt)
        } else {
            None
        };

        let Some(op) = op else {
            // no operator: the operand stands alone as an existence test,
            // which only a query can be
            return match left {
                Operand::Query(query) => Ok(FilterExpr::Exists(query)),
                Operand::Literal(_) => Err(self.hard(left_pos, reason::DOLLAR_OMISSION)),
            };
        };

        self.lexer.skip_blanks();
        let right_pos = self.lexer.pos();
        let right = self.operand()?;

        if let Operand::Query(q) = &left
            && !q.is_single_valued()
        {
            return Err(self.hard(left_pos, reason::VALUE_GROUP));
        }
        if let Operand::Query(q) = &right
            && !q.is_single_valued()
        {
            return Err(self.hard(right_pos, reason::VALUE_GROUP));
        }
        if let (Operand::Query(l), Operand::Query(r)) = (&left, &right)
            && l.anchor == Anchor::Current
            && r.anchor == Anchor::Current
        {
            return Err(self.hard(left_pos, reason::TWO_CURRENT_NODES));
        }

        Ok(FilterExpr::Compare { op, left, right })
    }

    /// A comparison/existence operand: sub-query or literal
    fn operand(&mut self) -> PResult<Operand> {
        self.lexer.skip_blanks();
        let start = self.lexer.pos();
        match self.lexer.peek() {
            Some('@') | Some('$') => Ok(Operand::Query(self.subquery()?)),
            Some('\'') | Some('"') => match self.lexer.read_literal_string() {
                Some(s) => Ok(Operand::Literal(serde_json::Value::String(s))),
                None => Err(Failure::Soft),
            },
            Some(c) if c.is_ascii_digit() || c == '+' || c == '-' => {
                let Some(token) = self.lexer.read_number_token() else {
                    return Err(Failure::Soft);
                };
                self.number_literal(&token)
            }
            Some('[') | Some('{') => Err(self.hard(start, reason::DOLLAR_OMISSION)),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(c) = self.lexer.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        self.lexer.bump();
                        word.push(c);
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" | "True" | "TRUE" => Ok(Operand::Literal(serde_json::Value::Bool(true))),
                    "false" | "False" | "FALSE" => {
                        Ok(Operand::Literal(serde_json::Value::Bool(false)))
                    }
                    "null" | "Null" | "NULL" => Ok(Operand::Literal(serde_json::Value::Null)),
                    _ => Err(self.hard(start, reason::DOLLAR_OMISSION)),
                }
            }
            _ => Err(Failure::Soft),
        }
    }

    fn number_literal(&self, token: &str) -> PResult<Operand> {
        let number = token.parse::<f64>().map_err(|e| {
            Failure::Hard(Error::InvalidArgument {
                argument: token.to_string(),
                message: e.to_string(),
            })
        })?;
        if !number.is_finite() {
            return Err(Failure::Hard(Error::InvalidArgument {
                argument: token.to_string(),
                message: "number out of range".to_string(),
            }));
        }
        let value = serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
        Ok(Operand::Literal(value))
    }

    /// `@`- or `$`-rooted path inside a filter. Structural failures are
    /// soft: they surface at the enclosing bracket.
    fn subquery(&mut self) -> PResult<SubQuery> {
        let anchor = match self.lexer.bump() {
            Some('@') => Anchor::Current,
            Some('$') => Anchor::Root,
            _ => return Err(Failure::Soft),
        };
        let mut segments = Vec::new();
        let mut connected = String::new();
        loop {
            match self.lexer.peek() {
                Some('.') => self.dot_piece(&mut segments, &mut connected, false)?,
                Some('[') => self.bracket_piece(&mut segments, &mut connected, false)?,
                _ => break,
            }
        }
        finalize_descent_gates(&mut segments);
        Ok(SubQuery { anchor, segments })
    }
}
