//! Canonical view nodes: the strongly-shaped mirror of a raw record

use generational_arena::Index;
use serde_json::Value;

use crate::watcher::{FieldWrite, Record};

/// Arena payload for one view node.
///
/// Identity (`id`) is an opaque, equality-comparable JSON value carried
/// verbatim from the raw side; it is not the node's handle, and two nodes may
/// transiently share an `id` during edits. The parent link is a plain index,
/// set on reparent and never driving lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewNode {
    pub id: Value,
    pub label: String,
    pub is_disabled: bool,
    pub is_leaf: bool,
    pub is_async: bool,
    pub(crate) children: Vec<Index>,
    pub(crate) parent: Option<Index>,
}

impl ViewNode {
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

impl Record for ViewNode {
    fn read(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(self.id.clone()),
            "label" => Some(Value::String(self.label.clone())),
            "isDisabled" => Some(Value::Bool(self.is_disabled)),
            "isLeaf" => Some(Value::Bool(self.is_leaf)),
            "isAsync" => Some(Value::Bool(self.is_async)),
            _ => None,
        }
    }

    fn write(&mut self, key: &str, value: Value) -> FieldWrite {
        match key {
            "id" => self.id = value,
            "label" => self.label = coerce_label(&value),
            "isDisabled" => self.is_disabled = coerce_flag(&value),
            "isLeaf" => self.is_leaf = coerce_flag(&value),
            "isAsync" => self.is_async = coerce_flag(&value),
            // The canonical shape is fixed; there is nowhere to store other keys
            _ => return FieldWrite::Ignored,
        }
        FieldWrite::Updated
    }

    fn remove(&mut self, key: &str) -> bool {
        // Canonical fields cannot disappear; a delete resets to the default
        match key {
            "id" => self.id = Value::Null,
            "label" => self.label.clear(),
            "isDisabled" => self.is_disabled = false,
            "isLeaf" => self.is_leaf = false,
            "isAsync" => self.is_async = false,
            _ => return false,
        }
        true
    }

    fn has(&self, key: &str) -> bool {
        matches!(key, "id" | "label" | "isDisabled" | "isLeaf" | "isAsync")
    }

    fn parent(&self) -> Option<Index> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<Index>) {
        self.parent = parent;
    }

    fn children(&self) -> &[Index] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<Index> {
        &mut self.children
    }
}

/// Caller-side description of a view subtree to insert: the factory input for
/// view-tree mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSeed {
    pub id: Value,
    pub label: String,
    pub is_disabled: bool,
    pub is_leaf: bool,
    pub is_async: bool,
    pub children: Vec<NodeSeed>,
}

impl NodeSeed {
    pub fn new(id: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<NodeSeed>) -> Self {
        self.children = children;
        self
    }

    pub fn disabled(mut self, value: bool) -> Self {
        self.is_disabled = value;
        self
    }

    pub fn leaf(mut self, value: bool) -> Self {
        self.is_leaf = value;
        self
    }

    pub fn asynchronous(mut self, value: bool) -> Self {
        self.is_async = value;
        self
    }
}

/// Display-string coercion for `label`: strings pass through, null clears,
/// anything else keeps its JSON rendering.
pub(crate) fn coerce_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Flag coercion follows loose truthiness: false, null, zero and the empty
/// string are off; everything else is on.
pub(crate) fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
