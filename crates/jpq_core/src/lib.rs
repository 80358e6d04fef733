//! jpq_core - JSONPath query engine
//!
//! Parses a JSONPath expression into a reusable [`Plan`] and evaluates it
//! against decoded JSON values, with filter expressions, regular
//! expression matching, and user-defined filter/aggregate functions.
//!
//! Results come back in deterministic document order: object members are
//! iterated in sorted-key order under wildcards, filters, and recursive
//! descent; arrays in index order; unions and multi-name brackets in
//! expression order.

mod ast;
mod error;
mod eval;
mod filter;
mod lexer;
mod parser;

pub use ast::{AggregateFn, FilterFn, Plan};
pub use error::Error;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Evaluation options: user function registries and the reserved
/// accessor-mode switch
///
/// # Example
/// ```
/// use serde_json::{Value, json};
/// use jpq_core::{Config, retrieve_with};
///
/// let mut config = Config::default();
/// config.set_filter_function("twice", |v: &Value| {
///     v.as_f64()
///         .map(|n| json!(n * 2.0))
///         .ok_or_else(|| "not a number".to_string())
/// });
///
/// let json = json!([1.0, 2.5]);
/// let results = retrieve_with("$.*.twice()", &json, &config).unwrap();
/// assert_eq!(results, vec![json!(2.0), json!(5.0)]);
/// ```
#[derive(Clone, Default)]
pub struct Config {
    pub(crate) filter_functions: HashMap<String, FilterFn>,
    pub(crate) aggregate_functions: HashMap<String, AggregateFn>,
    pub(crate) accessor_mode: bool,
}

impl Config {
    /// Register a filter function: applied per value, its result replaces
    /// the value
    pub fn set_filter_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.filter_functions
            .insert(name.into(), Arc::new(function));
    }

    /// Register an aggregate function: consumes the whole value list and
    /// yields a single value
    pub fn set_aggregate_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.aggregate_functions
            .insert(name.into(), Arc::new(function));
    }

    /// Reserved: switch the output from values to accessor descriptors
    pub fn set_accessor_mode(&mut self, enabled: bool) {
        self.accessor_mode = enabled;
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("filter_functions", &self.filter_functions.len())
            .field("aggregate_functions", &self.aggregate_functions.len())
            .field("accessor_mode", &self.accessor_mode)
            .finish()
    }
}

/// Compile a JSONPath expression for repeated evaluation
///
/// # Example
/// ```
/// use serde_json::json;
/// use jpq_core::parse;
///
/// let plan = parse("$.store.book[0].price").unwrap();
///
/// let json1 = json!({"store": {"book": [{"price": 10}, {"price": 20}]}});
/// let json2 = json!({"store": {"book": [{"price": 30}]}});
///
/// assert_eq!(plan.query(&json1).unwrap(), vec![json!(10)]);
/// assert_eq!(plan.query(&json2).unwrap(), vec![json!(30)]);
/// ```
pub fn parse(jsonpath: &str) -> Result<Plan, Error> {
    parser::parse_expression(jsonpath, &Config::default())
}

/// Compile a JSONPath expression, binding `.name()` steps against the
/// config's function registries
pub fn parse_with(jsonpath: &str, config: &Config) -> Result<Plan, Error> {
    parser::parse_expression(jsonpath, config)
}

/// Parse and evaluate in one call
///
/// # Example
/// ```
/// use serde_json::json;
/// use jpq_core::retrieve;
///
/// let json = json!({"a": "b", "c": {"d": "e"}});
/// let results = retrieve("$.a", &json).unwrap();
/// assert_eq!(results, vec![json!("b")]);
/// ```
pub fn retrieve(jsonpath: &str, json: &Value) -> Result<Vec<Value>, Error> {
    parse(jsonpath)?.query(json)
}

/// Parse with a config and evaluate in one call
pub fn retrieve_with(jsonpath: &str, json: &Value, config: &Config) -> Result<Vec<Value>, Error> {
    parse_with(jsonpath, config)?.query(json)
}

impl Plan {
    /// Evaluate against a document, returning the selected values in
    /// document order
    ///
    /// The plan never mutates the document, and one plan may serve
    /// concurrent queries against distinct documents.
    pub fn query(&self, json: &Value) -> Result<Vec<Value>, Error> {
        eval::evaluate(self, json)
    }
}
