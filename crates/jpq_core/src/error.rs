//! Error taxonomy for parsing and retrieval

use serde_json::Value;
use thiserror::Error;

/// Error type for JSONPath operations
///
/// Parse-time failures report a character `position` into the original
/// expression and the remaining input `near` it. Retrieval failures carry
/// the source text of the failing step in `path`; [`Error::NoneMatched`]
/// carries the text of the whole expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The expression does not match the grammar
    #[error("invalid syntax (position={position}, reason={reason}, near={near})")]
    InvalidSyntax {
        position: usize,
        reason: String,
        near: String,
    },

    /// A token matched the grammar but its value is unusable
    /// (integer overflow in an index or slice, malformed number literal,
    /// uncompilable regex pattern)
    #[error("invalid argument (argument={argument}, error={message})")]
    InvalidArgument { argument: String, message: String },

    /// A step was applied to a value of the wrong kind
    #[error("type unmatched (expected={expected}, found={found}, path={path})")]
    TypeUnmatched {
        expected: &'static str,
        found: &'static str,
        path: String,
    },

    /// An object lookup found no member with the given name
    #[error("member did not exist (path={path})")]
    MemberNotExist { path: String },

    /// A single array index resolved outside the array
    #[error("index out of range (path={path})")]
    IndexOutOfRange { path: String },

    /// The expression selected nothing
    #[error("none matched (path={path})")]
    NoneMatched { path: String },

    /// A recognized construct that this engine refuses to run
    #[error("not supported (feature={feature}, path={path})")]
    NotSupported { feature: &'static str, path: String },

    /// A `.name()` step with no registered function of that name
    #[error("function not found (function={function})")]
    FunctionNotFound { function: String },

    /// A registered function returned an error
    #[error("function failed (function={function}, error={message})")]
    FunctionFailed { function: String, message: String },
}

/// Parse-time syntax reasons, kept verbatim in error messages.
pub(crate) mod reason {
    pub const UNRECOGNIZED: &str = "unrecognized input";
    pub const AT_PROHIBITED: &str = "the use of '@' at the beginning is prohibited";
    pub const DOLLAR_OMISSION: &str = "the omission of '$' allowed only at the beginning";
    pub const VALUE_GROUP: &str = "JSONPath that returns a value group is prohibited";
    pub const TWO_CURRENT_NODES: &str = "comparison between two current nodes is prohibited";
}

/// Human-readable kind name of a JSON value, used in `type unmatched`
pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_syntax_display() {
        let err = Error::InvalidSyntax {
            position: 4,
            reason: reason::TWO_CURRENT_NODES.to_string(),
            near: "@.a==@.a)]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid syntax (position=4, reason=comparison between two current nodes is prohibited, near=@.a==@.a)])"
        );
    }

    #[test]
    fn test_none_matched_display() {
        let err = Error::NoneMatched {
            path: ".*[?(@.a)]".to_string(),
        };
        assert_eq!(err.to_string(), "none matched (path=.*[?(@.a)])");
    }

    #[test]
    fn test_type_unmatched_display() {
        let err = Error::TypeUnmatched {
            expected: "object",
            found: "array",
            path: ".a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "type unmatched (expected=object, found=array, path=.a)"
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(kind_name(&json!(null)), "null");
        assert_eq!(kind_name(&json!(true)), "bool");
        assert_eq!(kind_name(&json!(1.5)), "number");
        assert_eq!(kind_name(&json!("a")), "string");
        assert_eq!(kind_name(&json!([1])), "array");
        assert_eq!(kind_name(&json!({"a": 1})), "object");
    }
}
