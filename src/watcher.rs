//! Observable arena store: container mutations go in, typed events come out
//!
//! The store has two API planes. *Observed* operations apply one mutation and
//! return the [`Mutation`] describing it, already applied (after-the-fact
//! notification, never a veto hook). *Silent* operations never produce events;
//! conversion and mirror handlers use them, which is what keeps the
//! synchronization protocol reentrant-safe: a handler's own writes cannot
//! re-trigger handlers.

use generational_arena::{Arena, Index};
use serde_json::Value;
use tracing::instrument;

use crate::errors::{TreeError, TreeResult};

/// Names with this prefix are reserved for private bookkeeping: field writes
/// and removes apply to the backing record but bypass event emission.
pub const PRIVATE_PREFIX: char = '_';

/// Outcome of a field write on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWrite {
    /// The key did not exist before.
    Inserted,
    /// An existing key was overwritten.
    Updated,
    /// The record has no storage for this key; nothing happened.
    Ignored,
}

/// Node payload observable by a [`Watcher`].
///
/// Fields hold scalar [`Value`]s addressed by name; the ordered child sequence
/// and the parent back-link are kept apart from the fields so the store can
/// manage structure generically for both tree kinds.
pub trait Record {
    fn read(&self, key: &str) -> Option<Value>;
    fn write(&mut self, key: &str, value: Value) -> FieldWrite;
    fn remove(&mut self, key: &str) -> bool;
    fn has(&self, key: &str) -> bool;

    fn parent(&self) -> Option<Index>;
    fn set_parent(&mut self, parent: Option<Index>);
    fn children(&self) -> &[Index];
    fn children_mut(&mut self) -> &mut Vec<Index>;
}

/// A mutation that has been applied to the store.
///
/// `node` is always the handle of the record owning the mutated container.
/// Child sequences belong to their record, so for array mutations this is the
/// nearest enclosing non-array ancestor by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// A field appeared under a new key.
    ObjectInsert { node: Index, key: String, value: Value },
    /// An existing field was overwritten.
    ObjectUpdate { node: Index, key: String, value: Value },
    /// A field was removed.
    ObjectDelete { node: Index, key: String },
    /// A child was pushed onto the end of the child sequence.
    ArrayAppend { node: Index, index: usize, child: Index },
    /// The child at `index` was replaced; `replaced` is the old occupant.
    ArrayUpdate {
        node: Index,
        index: usize,
        child: Index,
        replaced: Index,
    },
    /// The child at `index` was spliced out.
    ArrayDelete { node: Index, index: usize, child: Index },
    /// The child sequence was cut down to a shorter length; `removed` is the
    /// dropped tail, in order.
    ArrayTruncate { node: Index, removed: Vec<Index> },
}

impl Mutation {
    /// Handle of the record owning the mutated container.
    pub fn node(&self) -> Index {
        match self {
            Mutation::ObjectInsert { node, .. }
            | Mutation::ObjectUpdate { node, .. }
            | Mutation::ObjectDelete { node, .. }
            | Mutation::ArrayAppend { node, .. }
            | Mutation::ArrayUpdate { node, .. }
            | Mutation::ArrayDelete { node, .. }
            | Mutation::ArrayTruncate { node, .. } => *node,
        }
    }
}

/// Arena-backed observable tree store.
#[derive(Debug)]
pub struct Watcher<T: Record> {
    arena: Arena<T>,
    root: Option<Index>,
}

impl<T: Record> Default for Watcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Watcher<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    // --- silent plane ---------------------------------------------------

    pub fn insert(&mut self, record: T) -> Index {
        self.arena.insert(record)
    }

    pub fn get(&self, idx: Index) -> Option<&T> {
        self.arena.get(idx)
    }

    pub fn get_mut(&mut self, idx: Index) -> Option<&mut T> {
        self.arena.get_mut(idx)
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    /// Number of live records across all subtrees.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn set_root(&mut self, idx: Index) {
        self.root = Some(idx);
    }

    /// Preorder walk of a subtree, starting handle included.
    ///
    /// Collected eagerly so callers may mutate the arena while consuming it.
    pub fn subtree(&self, idx: Index) -> Vec<Index> {
        let mut order = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(record) = self.arena.get(current) {
                order.push(current);
                // Reverse keeps left-to-right order on the stack
                for &child in record.children().iter().rev() {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Free a single record from the arena, leaving its links untouched.
    pub fn free(&mut self, idx: Index) -> bool {
        if self.root == Some(idx) {
            self.root = None;
        }
        self.arena.remove(idx).is_some()
    }

    /// Free a whole subtree from the arena. Returns the freed handles in
    /// preorder. Does not touch the parent's child sequence; unlink first if
    /// the subtree is still attached.
    pub fn free_subtree(&mut self, idx: Index) -> Vec<Index> {
        let order = self.subtree(idx);
        for &node in &order {
            self.arena.remove(node);
        }
        if self.root == Some(idx) {
            self.root = None;
        }
        order
    }

    /// Splice a node out of its parent's child sequence without emitting an
    /// event. Returns the old parent and the position the node held.
    pub fn unlink(&mut self, idx: Index) -> Option<(Index, usize)> {
        let parent = self.arena.get(idx)?.parent()?;
        let pos = self
            .arena
            .get(parent)?
            .children()
            .iter()
            .position(|&c| c == idx)?;
        self.arena.get_mut(parent)?.children_mut().remove(pos);
        if let Some(record) = self.arena.get_mut(idx) {
            record.set_parent(None);
        }
        Some((parent, pos))
    }

    // --- observed plane -------------------------------------------------

    /// Write a field. Emits `ObjectInsert` for a new key, `ObjectUpdate` for
    /// an existing one. Private-prefixed keys apply silently (`None`).
    #[instrument(level = "trace", skip(self, value))]
    pub fn set_field(&mut self, node: Index, key: &str, value: Value) -> TreeResult<Option<Mutation>> {
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        if key.starts_with(PRIVATE_PREFIX) {
            record.write(key, value);
            return Ok(None);
        }
        Ok(match record.write(key, value.clone()) {
            FieldWrite::Inserted => Some(Mutation::ObjectInsert {
                node,
                key: key.to_string(),
                value,
            }),
            FieldWrite::Updated => Some(Mutation::ObjectUpdate {
                node,
                key: key.to_string(),
                value,
            }),
            FieldWrite::Ignored => None,
        })
    }

    /// Remove a field. Emits `ObjectDelete` when the key existed; private
    /// prefixed keys apply silently.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_field(&mut self, node: Index, key: &str) -> TreeResult<Option<Mutation>> {
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        let existed = record.remove(key);
        if !existed || key.starts_with(PRIVATE_PREFIX) {
            return Ok(None);
        }
        Ok(Some(Mutation::ObjectDelete {
            node,
            key: key.to_string(),
        }))
    }

    /// Append an already-inserted child. Emits `ArrayAppend`.
    #[instrument(level = "trace", skip(self))]
    pub fn push_child(&mut self, node: Index, child: Index) -> TreeResult<Mutation> {
        if !self.arena.contains(child) {
            return Err(TreeError::DetachedNode);
        }
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        record.children_mut().push(child);
        let index = record.children().len() - 1;
        if let Some(new) = self.arena.get_mut(child) {
            new.set_parent(Some(node));
        }
        Ok(Mutation::ArrayAppend { node, index, child })
    }

    /// Replace the child at `index`. Emits `ArrayUpdate` carrying the old
    /// occupant; the occupant's parent link is cleared but it stays in the
    /// arena (the caller decides whether it is garbage or being moved).
    #[instrument(level = "trace", skip(self))]
    pub fn set_child(&mut self, node: Index, index: usize, child: Index) -> TreeResult<Mutation> {
        if !self.arena.contains(child) {
            return Err(TreeError::DetachedNode);
        }
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        let len = record.children().len();
        if index >= len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        let replaced = record.children()[index];
        record.children_mut()[index] = child;
        if replaced != child {
            if let Some(old) = self.arena.get_mut(replaced) {
                old.set_parent(None);
            }
        }
        if let Some(new) = self.arena.get_mut(child) {
            new.set_parent(Some(node));
        }
        Ok(Mutation::ArrayUpdate {
            node,
            index,
            child,
            replaced,
        })
    }

    /// Splice the child at `index` out of the sequence. Emits `ArrayDelete`.
    /// The child stays in the arena; the caller decides reclamation.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_child(&mut self, node: Index, index: usize) -> TreeResult<Mutation> {
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        let len = record.children().len();
        if index >= len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        let child = record.children_mut().remove(index);
        if let Some(removed) = self.arena.get_mut(child) {
            removed.set_parent(None);
        }
        Ok(Mutation::ArrayDelete { node, index, child })
    }

    /// Cut the child sequence down to `len`. Emits `ArrayTruncate` with the
    /// dropped tail. Lengths at or above the current count are a no-op that
    /// still reports (with an empty tail), mirroring an idempotent length
    /// assignment.
    #[instrument(level = "trace", skip(self))]
    pub fn truncate_children(&mut self, node: Index, len: usize) -> TreeResult<Mutation> {
        let record = self.arena.get_mut(node).ok_or(TreeError::DetachedNode)?;
        let removed: Vec<Index> = if len < record.children().len() {
            record.children_mut().split_off(len)
        } else {
            Vec::new()
        };
        for &child in &removed {
            if let Some(dropped) = self.arena.get_mut(child) {
                dropped.set_parent(None);
            }
        }
        Ok(Mutation::ArrayTruncate { node, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal record for exercising the store in isolation.
    #[derive(Debug, Default)]
    struct TestRecord {
        fields: serde_json::Map<String, Value>,
        children: Vec<Index>,
        parent: Option<Index>,
    }

    impl Record for TestRecord {
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
            &self.children
        }
        fn children_mut(&mut self) -> &mut Vec<Index> {
            &mut self.children
        }
    }

    fn store_with_root() -> (Watcher<TestRecord>, Index) {
        let mut store = Watcher::new();
        let root = store.insert(TestRecord::default());
        store.set_root(root);
        (store, root)
    }

    #[test]
    fn given_new_key_when_setting_field_then_emits_object_insert() {
        let (mut store, root) = store_with_root();
        let event = store.set_field(root, "name", json!("a")).unwrap();
        assert_eq!(
            event,
            Some(Mutation::ObjectInsert {
                node: root,
                key: "name".into(),
                value: json!("a"),
            })
        );
    }

    #[test]
    fn given_existing_key_when_setting_field_then_emits_object_update() {
        let (mut store, root) = store_with_root();
        store.set_field(root, "name", json!("a")).unwrap();
        let event = store.set_field(root, "name", json!("b")).unwrap();
        assert!(matches!(event, Some(Mutation::ObjectUpdate { .. })));
    }

    #[test]
    fn given_private_prefixed_key_when_writing_then_applies_without_event() {
        let (mut store, root) = store_with_root();
        let event = store.set_field(root, "_internal", json!(1)).unwrap();
        assert_eq!(event, None);
        assert_eq!(store.get(root).unwrap().read("_internal"), Some(json!(1)));

        let event = store.remove_field(root, "_internal").unwrap();
        assert_eq!(event, None);
        assert!(!store.get(root).unwrap().has("_internal"));
    }

    #[test]
    fn given_missing_key_when_removing_field_then_no_event() {
        let (mut store, root) = store_with_root();
        assert_eq!(store.remove_field(root, "ghost").unwrap(), None);
    }

    #[test]
    fn given_children_when_pushing_and_removing_then_events_carry_owner_and_index() {
        let (mut store, root) = store_with_root();
        let a = store.insert(TestRecord::default());
        let b = store.insert(TestRecord::default());

        let appended = store.push_child(root, a).unwrap();
        assert_eq!(
            appended,
            Mutation::ArrayAppend {
                node: root,
                index: 0,
                child: a
            }
        );
        store.push_child(root, b).unwrap();
        assert_eq!(store.get(a).unwrap().parent(), Some(root));

        let removed = store.remove_child(root, 0).unwrap();
        assert_eq!(
            removed,
            Mutation::ArrayDelete {
                node: root,
                index: 0,
                child: a
            }
        );
        assert_eq!(store.get(root).unwrap().children(), &[b]);
        assert_eq!(store.get(a).unwrap().parent(), None);
    }

    #[test]
    fn given_occupied_slot_when_setting_child_then_event_carries_replaced_handle() {
        let (mut store, root) = store_with_root();
        let a = store.insert(TestRecord::default());
        let b = store.insert(TestRecord::default());
        store.push_child(root, a).unwrap();

        let event = store.set_child(root, 0, b).unwrap();
        assert_eq!(
            event,
            Mutation::ArrayUpdate {
                node: root,
                index: 0,
                child: b,
                replaced: a
            }
        );
        assert_eq!(store.get(b).unwrap().parent(), Some(root));
        assert_eq!(store.get(a).unwrap().parent(), None);
    }

    #[test]
    fn given_long_child_list_when_truncating_then_tail_is_reported_in_order() {
        let (mut store, root) = store_with_root();
        let kids: Vec<Index> = (0..4).map(|_| store.insert(TestRecord::default())).collect();
        for &k in &kids {
            store.push_child(root, k).unwrap();
        }

        let event = store.truncate_children(root, 1).unwrap();
        assert_eq!(
            event,
            Mutation::ArrayTruncate {
                node: root,
                removed: kids[1..].to_vec()
            }
        );
        assert_eq!(store.get(root).unwrap().children(), &kids[..1]);
    }

    #[test]
    fn given_out_of_bounds_index_when_mutating_then_errors() {
        let (mut store, root) = store_with_root();
        let child = store.insert(TestRecord::default());
        assert!(matches!(
            store.set_child(root, 0, child),
            Err(TreeError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            store.remove_child(root, 0),
            Err(TreeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn given_freed_subtree_when_accessing_then_handles_are_dead() {
        let (mut store, root) = store_with_root();
        let a = store.insert(TestRecord::default());
        let b = store.insert(TestRecord::default());
        store.push_child(root, a).unwrap();
        store.push_child(a, b).unwrap();

        store.unlink(a);
        assert_eq!(store.get(root).unwrap().children(), &[] as &[Index]);

        let freed = store.free_subtree(a);
        assert_eq!(freed, vec![a, b]);
        assert!(!store.contains(a));
        assert!(!store.contains(b));
        assert_eq!(store.len(), 1);
    }
}
