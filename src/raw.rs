//! Raw-tree records: caller-shaped JSON objects held in the observable store
//!
//! A raw node enters the engine as a `serde_json::Value` object. Its scalar
//! fields stay in an ordered JSON map under the caller's own names; the
//! children entry (whatever the caller calls it) is parsed into arena links
//! and re-inserted under the same name at export.

use generational_arena::Index;
use serde_json::{Map, Value};

use crate::errors::{value_kind, TreeError, TreeResult};
use crate::watcher::{FieldWrite, Record, Watcher};

/// Arena payload for one raw node.
#[derive(Debug, Default)]
pub struct RawRecord {
    fields: Map<String, Value>,
    /// `None` when the children key was absent or null in the source object.
    children: Option<Vec<Index>>,
    parent: Option<Index>,
}

impl RawRecord {
    /// Scalar fields, in insertion order, under the caller's names.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether the source object carried a children key at all (empty array
    /// included). Distinguishes a leaf from a node with zero children.
    pub fn has_children_key(&self) -> bool {
        self.children.is_some()
    }

    pub fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn new(fields: Map<String, Value>, children: Option<Vec<Index>>) -> Self {
        Self {
            fields,
            children,
            parent: None,
        }
    }

    pub(crate) fn set_children_links(&mut self, links: Option<Vec<Index>>) {
        self.children = links;
    }
}

/// Check a JSON value against the raw-tree shape rules without touching the
/// store: the value must be an object, children keys must hold arrays or
/// null, and every array element must satisfy the same rules recursively.
///
/// Running this before [`adopt`] keeps failed adoptions from leaving orphaned
/// records behind.
pub fn validate(value: &Value, children_key: &str) -> TreeResult<()> {
    let Value::Object(map) = value else {
        return Err(TreeError::InvalidRoot {
            kind: value_kind(value),
        });
    };
    match map.get(children_key) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                if !item.is_object() {
                    return Err(TreeError::InvalidChild {
                        index,
                        kind: value_kind(item),
                    });
                }
                validate(item, children_key)?;
            }
            Ok(())
        }
        Some(other) => Err(TreeError::InvalidChildren {
            key: children_key.to_string(),
            kind: value_kind(other),
        }),
    }
}

impl Record for RawRecord {
    fn read(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: Value) -> FieldWrite {
        match self.fields.insert(key.to_string(), value) {
            Some(_) => FieldWrite::Updated,
            None => FieldWrite::Inserted,
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.fields.remove(key).is_some()
    }

    fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    fn parent(&self) -> Option<Index> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<Index>) {
        self.parent = parent;
    }

    fn children(&self) -> &[Index] {
        self.children.as_deref().unwrap_or(&[])
    }

    fn children_mut(&mut self) -> &mut Vec<Index> {
        // A structural write materializes the children array on demand
        self.children.get_or_insert_with(Vec::new)
    }
}

/// Adopt a JSON object (and everything below its children key) into the
/// store. Returns the new subtree's root handle; parents are linked, the
/// store root is left untouched.
///
/// `children_key` values must be an array, null, or absent; every array
/// element must itself be an object.
pub fn adopt(store: &mut Watcher<RawRecord>, value: Value, children_key: &str) -> TreeResult<Index> {
    let Value::Object(mut map) = value else {
        return Err(TreeError::InvalidRoot {
            kind: value_kind(&value),
        });
    };

    let children = match map.remove(children_key) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut links = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                if !item.is_object() {
                    return Err(TreeError::InvalidChild {
                        index,
                        kind: value_kind(&item),
                    });
                }
                links.push(adopt(store, item, children_key)?);
            }
            Some(links)
        }
        Some(other) => {
            return Err(TreeError::InvalidChildren {
                key: children_key.to_string(),
                kind: value_kind(&other),
            });
        }
    };

    let links: Vec<Index> = children.iter().flatten().copied().collect();
    let node = store.insert(RawRecord {
        fields: map,
        children,
        parent: None,
    });
    for child in links {
        if let Some(record) = store.get_mut(child) {
            record.set_parent(Some(node));
        }
    }
    Ok(node)
}

/// Serialize a subtree back to a JSON object, re-inserting the child array
/// under `children_key`. Nodes adopted without a children key (or with a null
/// one) export without it.
pub fn export(store: &Watcher<RawRecord>, node: Index, children_key: &str) -> Value {
    let Some(record) = store.get(node) else {
        return Value::Null;
    };
    let mut map = record.fields.clone();
    if let Some(links) = &record.children {
        let children: Vec<Value> = links
            .iter()
            .map(|&child| export(store, child, children_key))
            .collect();
        map.insert(children_key.to_string(), Value::Array(children));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_nested_object_when_adopting_then_links_follow_children_key() {
        let mut store = Watcher::new();
        let root = adopt(
            &mut store,
            json!({"id": 1, "label": "Node1", "children": [
                {"id": 11, "label": "Node1-1"},
                {"id": 12, "label": "Node1-2", "children": []},
            ]}),
            "children",
        )
        .unwrap();

        let record = store.get(root).unwrap();
        assert_eq!(record.field("id"), Some(&json!(1)));
        assert_eq!(record.child_count(), 2);
        assert!(record.has_children_key());

        let first = record.children()[0];
        assert_eq!(store.get(first).unwrap().parent(), Some(root));
        assert!(!store.get(first).unwrap().has_children_key());
        let second = record.children()[1];
        assert!(store.get(second).unwrap().has_children_key());
        assert_eq!(store.get(second).unwrap().child_count(), 0);
    }

    #[test]
    fn given_aliased_children_key_when_adopting_then_only_that_key_is_structural() {
        let mut store = Watcher::new();
        let root = adopt(
            &mut store,
            json!({"id": 1, "items": [{"id": 2}], "children": "just a plain field"}),
            "items",
        )
        .unwrap();

        let record = store.get(root).unwrap();
        assert_eq!(record.child_count(), 1);
        // Under an alias, a field literally named "children" is scalar data
        assert_eq!(record.field("children"), Some(&json!("just a plain field")));
    }

    #[test]
    fn given_null_children_when_adopting_then_treated_as_leaf() {
        let mut store = Watcher::new();
        let root = adopt(&mut store, json!({"id": 1, "children": null}), "children").unwrap();
        assert!(!store.get(root).unwrap().has_children_key());
    }

    #[test]
    fn given_non_array_children_when_adopting_then_fails() {
        let mut store = Watcher::new();
        let err = adopt(&mut store, json!({"children": 42}), "children").unwrap_err();
        assert!(matches!(err, TreeError::InvalidChildren { kind: "number", .. }));
    }

    #[test]
    fn given_scalar_child_element_when_adopting_then_fails_with_its_index() {
        let mut store = Watcher::new();
        let err = adopt(
            &mut store,
            json!({"children": [{"id": 1}, "oops"]}),
            "children",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidChild { index: 1, kind: "string" }
        ));
    }

    #[test]
    fn given_adopted_tree_when_exporting_then_round_trips() {
        let source = json!({"id": 1, "label": "Node1", "extra": true, "children": [
            {"id": 11, "label": "Node1-1"},
        ]});
        let mut store = Watcher::new();
        let root = adopt(&mut store, source.clone(), "children").unwrap();
        assert_eq!(export(&store, root, "children"), source);
    }
}
