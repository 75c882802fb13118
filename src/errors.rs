use thiserror::Error;

/// Alias-table validation errors, fatal at mapper construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown alias key: '{0}' (expected one of id, label, children, isDisabled, isLeaf, isAsync)")]
    UnknownField(String),

    #[error("ambiguous alias: '{alias}' is mapped by both '{first}' and '{second}'")]
    AmbiguousAlias {
        alias: String,
        first: &'static str,
        second: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum TreeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("raw root must be an object, got {kind}")]
    InvalidRoot { kind: &'static str },

    #[error("children field '{key}' must be an array or null, got {kind}")]
    InvalidChildren { key: String, kind: &'static str },

    #[error("child element at index {index} must be an object, got {kind}")]
    InvalidChild { index: usize, kind: &'static str },

    #[error("node is no longer part of this tree")]
    DetachedNode,

    #[error("operation would move a node into its own subtree")]
    CycleDetected,

    #[error("child index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Short type tag for error messages, typeof-style.
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
