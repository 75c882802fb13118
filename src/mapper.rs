//! TreeMapper: builds the view tree from a raw tree and keeps both sides
//! index-synchronized through every mutation
//!
//! A mapper owns two observable stores (one per tree) and the two identity
//! maps pairing their nodes. All mutation enters through the proxies returned
//! by [`TreeMapper::raw_proxy`] and [`TreeMapper::view_proxy`]; each proxy
//! operation applies one mutation, receives the typed event and synchronously
//! mirrors it onto the opposite tree before returning. Mirror handlers write
//! through the silent store plane only, so they can never re-enter
//! observation.
//!
//! Reclamation is explicit: structural removal detaches the affected subtree
//! pair — arena slots freed, identity-map entries dropped — in the same
//! synchronous handler. Handles held by callers afterwards resolve to `None`.

use std::collections::HashMap;
use std::mem;

use generational_arena::Index;
use serde_json::{json, Map, Value};
use tracing::instrument;

use crate::errors::{TreeError, TreeResult};
use crate::keymap::{AliasTable, KeyMap, NodeField};
use crate::node::{coerce_flag, coerce_label, NodeSeed, ViewNode};
use crate::raw::{self, RawRecord};
use crate::watcher::{Mutation, Record, Watcher};

/// Handle of a node in the raw tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawId(pub(crate) Index);

/// Handle of a node in the view tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub(crate) Index);

/// Contract for on-demand child loading, supplied and invoked by the host —
/// the mapper never schedules it. The host calls the loader when an expanded
/// node lacks materialized children; the loader hands raw child objects to
/// `resolve`, and the host feeds them through [`RawTreeProxy::push_child`],
/// which re-enters the synchronization protocol like any other raw mutation.
pub type AsyncChildLoader<'a> = dyn FnMut(&ViewNode, &mut dyn FnMut(Vec<Value>)) + 'a;

#[derive(Debug)]
pub struct TreeMapper {
    keys: KeyMap,
    raw: Watcher<RawRecord>,
    view: Watcher<ViewNode>,
    raw_to_view: HashMap<Index, Index>,
    view_to_raw: HashMap<Index, Index>,
    raw_root: Index,
    view_root: Index,
}

impl TreeMapper {
    /// Build a mapper from a raw tree root and an alias table.
    ///
    /// Adopts the raw tree, converts it into a parallel view tree and
    /// registers every (raw, view) pair. Fails on an invalid alias table, a
    /// non-object root, or a children entry that is neither array nor null.
    #[instrument(level = "debug", skip(raw_root))]
    pub fn new(raw_root: Value, aliases: AliasTable) -> TreeResult<Self> {
        let keys = KeyMap::build(&aliases)?;
        raw::validate(&raw_root, keys.raw_key(NodeField::Children))?;

        let mut raw_store = Watcher::new();
        let children_key = keys.children_key().to_string();
        let raw_root_idx = raw::adopt(&mut raw_store, raw_root, &children_key)?;
        raw_store.set_root(raw_root_idx);

        let mut mapper = TreeMapper {
            keys,
            raw: raw_store,
            view: Watcher::new(),
            raw_to_view: HashMap::new(),
            view_to_raw: HashMap::new(),
            raw_root: raw_root_idx,
            // Overwritten right below, once the view tree exists
            view_root: raw_root_idx,
        };

        let view_root_idx = mapper.convert_raw_subtree(raw_root_idx);
        mapper.view.set_root(view_root_idx);
        mapper.view_root = view_root_idx;

        Ok(mapper)
    }

    // --- accessors ------------------------------------------------------

    pub fn key_map(&self) -> &KeyMap {
        &self.keys
    }

    pub fn raw_root(&self) -> RawId {
        RawId(self.raw_root)
    }

    pub fn view_root(&self) -> ViewId {
        ViewId(self.view_root)
    }

    pub fn raw(&self, id: RawId) -> Option<&RawRecord> {
        self.raw.get(id.0)
    }

    pub fn view(&self, id: ViewId) -> Option<&ViewNode> {
        self.view.get(id.0)
    }

    pub fn raw_children(&self, id: RawId) -> Vec<RawId> {
        self.raw
            .get(id.0)
            .map(|r| r.children().iter().map(|&c| RawId(c)).collect())
            .unwrap_or_default()
    }

    pub fn view_children(&self, id: ViewId) -> Vec<ViewId> {
        self.view
            .get(id.0)
            .map(|n| n.children().iter().map(|&c| ViewId(c)).collect())
            .unwrap_or_default()
    }

    pub fn raw_parent(&self, id: RawId) -> Option<RawId> {
        self.raw.get(id.0).and_then(Record::parent).map(RawId)
    }

    pub fn view_parent(&self, id: ViewId) -> Option<ViewId> {
        self.view.get(id.0).and_then(Record::parent).map(ViewId)
    }

    /// Paired view node for a raw node. `None` when the handle was never
    /// attached to this mapper or its subtree has been detached — an expected
    /// transient state, not an error.
    pub fn view_node_for(&self, raw: RawId) -> Option<ViewId> {
        if !self.raw.contains(raw.0) {
            return None;
        }
        self.pair_view(raw.0).map(ViewId)
    }

    /// Paired raw node for a view node; same `None` semantics.
    pub fn raw_node_for(&self, view: ViewId) -> Option<RawId> {
        if !self.view.contains(view.0) {
            return None;
        }
        self.pair_raw(view.0).map(RawId)
    }

    /// Live node count per store; shrinks when subtrees are detached.
    pub fn raw_count(&self) -> usize {
        self.raw.len()
    }

    pub fn view_count(&self) -> usize {
        self.view.len()
    }

    /// Serialize the raw tree back to JSON, children under the caller's name.
    pub fn export_raw(&self) -> Value {
        raw::export(&self.raw, self.raw_root, self.keys.children_key())
    }

    /// Serialize the view tree to canonical JSON.
    pub fn export_view(&self) -> Value {
        self.export_view_subtree(self.view_root)
    }

    pub(crate) fn export_view_subtree(&self, node: Index) -> Value {
        let Some(view) = self.view.get(node) else {
            return Value::Null;
        };
        let children: Vec<Value> = view
            .children()
            .iter()
            .map(|&c| self.export_view_subtree(c))
            .collect();
        json!({
            "id": view.id,
            "label": view.label,
            "isDisabled": view.is_disabled,
            "isLeaf": view.is_leaf,
            "isAsync": view.is_async,
            "children": children,
        })
    }

    // --- proxies --------------------------------------------------------

    /// Mutation surface of the raw tree. All raw edits must go through this;
    /// the stores are private, so out-of-band mutation cannot happen.
    pub fn raw_proxy(&mut self) -> RawTreeProxy<'_> {
        RawTreeProxy { mapper: self }
    }

    /// Mutation surface of the view tree.
    pub fn view_proxy(&mut self) -> ViewTreeProxy<'_> {
        ViewTreeProxy { mapper: self }
    }

    // --- pairing --------------------------------------------------------

    fn register_pair(&mut self, raw_idx: Index, view_idx: Index) {
        self.raw_to_view.insert(raw_idx, view_idx);
        self.view_to_raw.insert(view_idx, raw_idx);
    }

    fn pair_view(&self, raw_idx: Index) -> Option<Index> {
        self.raw_to_view
            .get(&raw_idx)
            .copied()
            .filter(|&v| self.view.contains(v))
    }

    fn pair_raw(&self, view_idx: Index) -> Option<Index> {
        self.view_to_raw
            .get(&view_idx)
            .copied()
            .filter(|&r| self.raw.contains(r))
    }

    // --- conversion -----------------------------------------------------

    /// Convert an adopted raw subtree into view nodes, registering each pair
    /// and wiring parent links. Writes only freshly created nodes, so no
    /// events can fire.
    fn convert_raw_subtree(&mut self, raw_idx: Index) -> Index {
        let (id, label, is_disabled, is_leaf, is_async, raw_children) = match self.raw.get(raw_idx)
        {
            Some(record) => (
                record
                    .field(self.keys.raw_key(NodeField::Id))
                    .cloned()
                    .unwrap_or(Value::Null),
                record
                    .field(self.keys.raw_key(NodeField::Label))
                    .map(coerce_label)
                    .unwrap_or_default(),
                record
                    .field(self.keys.raw_key(NodeField::IsDisabled))
                    .is_some_and(coerce_flag),
                record
                    .field(self.keys.raw_key(NodeField::IsLeaf))
                    .is_some_and(coerce_flag),
                record
                    .field(self.keys.raw_key(NodeField::IsAsync))
                    .is_some_and(coerce_flag),
                record.children().to_vec(),
            ),
            None => Default::default(),
        };

        let view_idx = self.view.insert(ViewNode {
            id,
            label,
            is_disabled,
            is_leaf,
            is_async,
            children: Vec::new(),
            parent: None,
        });
        self.register_pair(raw_idx, view_idx);

        for raw_child in raw_children {
            let view_child = self.convert_raw_subtree(raw_child);
            if let Some(parent) = self.view.get_mut(view_idx) {
                parent.children_mut().push(view_child);
            }
            if let Some(child) = self.view.get_mut(view_child) {
                child.set_parent(Some(view_idx));
            }
        }
        view_idx
    }

    /// Convert an existing view subtree into raw records, registering each
    /// pair. Only `id`, `label` and children materialize on the raw side;
    /// flags stay view-only until the caller writes them explicitly.
    fn convert_view_subtree(&mut self, view_idx: Index) -> Index {
        let (id, label, view_children) = match self.view.get(view_idx) {
            Some(node) => (node.id.clone(), node.label.clone(), node.children().to_vec()),
            None => Default::default(),
        };

        let mut fields = Map::new();
        fields.insert(self.keys.raw_key(NodeField::Id).to_string(), id);
        fields.insert(
            self.keys.raw_key(NodeField::Label).to_string(),
            Value::String(label),
        );
        let raw_idx = self.raw.insert(RawRecord::new(fields, Some(Vec::new())));
        self.register_pair(raw_idx, view_idx);

        for view_child in view_children {
            let raw_child = self.convert_view_subtree(view_child);
            if let Some(parent) = self.raw.get_mut(raw_idx) {
                parent.children_mut().push(raw_child);
            }
            if let Some(child) = self.raw.get_mut(raw_child) {
                child.set_parent(Some(raw_idx));
            }
        }
        raw_idx
    }

    /// Materialize a seed as a view subtree (no pairs yet — the mirror step
    /// creates the raw counterparts).
    fn build_view_from_seed(&mut self, seed: NodeSeed) -> Index {
        let NodeSeed {
            id,
            label,
            is_disabled,
            is_leaf,
            is_async,
            children,
        } = seed;
        let view_idx = self.view.insert(ViewNode {
            id,
            label,
            is_disabled,
            is_leaf,
            is_async,
            children: Vec::new(),
            parent: None,
        });
        for child_seed in children {
            let child = self.build_view_from_seed(child_seed);
            if let Some(parent) = self.view.get_mut(view_idx) {
                parent.children_mut().push(child);
            }
            if let Some(node) = self.view.get_mut(child) {
                node.set_parent(Some(view_idx));
            }
        }
        view_idx
    }

    // --- detach (explicit reclamation) ----------------------------------

    /// Free a raw subtree and every paired view node, dropping both identity
    /// map entries per node. The view side mirrors the raw structure one to
    /// one, so the raw walk covers the whole pair.
    fn detach_raw_subtree(&mut self, raw_idx: Index) {
        for freed in self.raw.free_subtree(raw_idx) {
            if let Some(view_idx) = self.raw_to_view.remove(&freed) {
                self.view_to_raw.remove(&view_idx);
                self.view.free(view_idx);
            }
        }
    }

    /// Symmetric detach starting from the view side.
    fn detach_view_subtree(&mut self, view_idx: Index) {
        for freed in self.view.free_subtree(view_idx) {
            if let Some(raw_idx) = self.view_to_raw.remove(&freed) {
                self.raw_to_view.remove(&raw_idx);
                self.raw.free(raw_idx);
            }
        }
    }

    // --- mirror handlers: raw events onto the view tree -----------------

    fn mirror_raw(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::ArrayAppend { node, child, .. } => {
                let Some(view_parent) = self.pair_view(node) else {
                    return;
                };
                let view_child = self.convert_raw_subtree(child);
                if let Some(parent) = self.view.get_mut(view_parent) {
                    parent.children_mut().push(view_child);
                }
                if let Some(new) = self.view.get_mut(view_child) {
                    new.set_parent(Some(view_parent));
                }
            }
            Mutation::ArrayDelete { node, index, child } => {
                let Some(view_parent) = self.pair_view(node) else {
                    return;
                };
                if let Some(parent) = self.view.get_mut(view_parent) {
                    if index < parent.children().len() {
                        parent.children_mut().remove(index);
                    }
                }
                self.detach_raw_subtree(child);
            }
            Mutation::ArrayUpdate {
                node,
                index,
                child,
                replaced,
            } => {
                let Some(view_parent) = self.pair_view(node) else {
                    return;
                };
                if replaced == child {
                    return;
                }
                // Reuse the known pair when the incoming node is an existing
                // one being moved; convert only brand-new subtrees.
                let view_child = match self.pair_view(child) {
                    Some(existing) => {
                        self.view.unlink(existing);
                        existing
                    }
                    None => self.convert_raw_subtree(child),
                };
                let replaced_view = self.view.get_mut(view_parent).and_then(|parent| {
                    parent
                        .children_mut()
                        .get_mut(index)
                        .map(|slot| mem::replace(slot, view_child))
                });
                if let Some(moved) = self.view.get_mut(view_child) {
                    moved.set_parent(Some(view_parent));
                }
                if replaced_view.is_some() {
                    self.detach_raw_subtree(replaced);
                }
            }
            Mutation::ArrayTruncate { node, removed } => {
                let Some(view_parent) = self.pair_view(node) else {
                    return;
                };
                if let Some(parent) = self.view.get_mut(view_parent) {
                    let keep = parent.children().len().saturating_sub(removed.len());
                    parent.children_mut().truncate(keep);
                }
                for raw_child in removed {
                    self.detach_raw_subtree(raw_child);
                }
            }
            Mutation::ObjectInsert { node, key, value }
            | Mutation::ObjectUpdate { node, key, value } => {
                // Raw names without a canonical translation stay raw-only
                let Some(field) = self.keys.canonical(&key) else {
                    return;
                };
                let Some(view_idx) = self.pair_view(node) else {
                    return;
                };
                // Children replacement never reaches here; the proxy routes
                // the children key through its own structural path
                if field != NodeField::Children {
                    if let Some(view) = self.view.get_mut(view_idx) {
                        view.write(field.canonical_name(), value);
                    }
                }
            }
            Mutation::ObjectDelete { node, key } => {
                let Some(field) = self.keys.canonical(&key) else {
                    return;
                };
                let Some(view_idx) = self.pair_view(node) else {
                    return;
                };
                if field != NodeField::Children {
                    if let Some(view) = self.view.get_mut(view_idx) {
                        view.remove(field.canonical_name());
                    }
                }
            }
        }
    }

    // --- mirror handlers: view events onto the raw tree -----------------

    fn mirror_view(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::ArrayAppend { node, child, .. } => {
                let Some(raw_parent) = self.pair_raw(node) else {
                    return;
                };
                let raw_child = self.convert_view_subtree(child);
                if let Some(parent) = self.raw.get_mut(raw_parent) {
                    // children_mut materializes the raw array on demand
                    parent.children_mut().push(raw_child);
                }
                if let Some(new) = self.raw.get_mut(raw_child) {
                    new.set_parent(Some(raw_parent));
                }
            }
            Mutation::ArrayDelete { node, index, child } => {
                let Some(raw_parent) = self.pair_raw(node) else {
                    return;
                };
                if let Some(parent) = self.raw.get_mut(raw_parent) {
                    if index < parent.children().len() {
                        parent.children_mut().remove(index);
                    }
                }
                self.detach_view_subtree(child);
            }
            Mutation::ArrayUpdate {
                node,
                index,
                child,
                replaced,
            } => {
                let Some(raw_parent) = self.pair_raw(node) else {
                    return;
                };
                if replaced == child {
                    return;
                }
                let raw_child = match self.pair_raw(child) {
                    Some(existing) => {
                        self.raw.unlink(existing);
                        existing
                    }
                    None => self.convert_view_subtree(child),
                };
                let replaced_raw = self.raw.get_mut(raw_parent).and_then(|parent| {
                    parent
                        .children_mut()
                        .get_mut(index)
                        .map(|slot| mem::replace(slot, raw_child))
                });
                if let Some(moved) = self.raw.get_mut(raw_child) {
                    moved.set_parent(Some(raw_parent));
                }
                if replaced_raw.is_some() {
                    self.detach_view_subtree(replaced);
                }
            }
            Mutation::ArrayTruncate { node, removed } => {
                let Some(raw_parent) = self.pair_raw(node) else {
                    return;
                };
                if let Some(parent) = self.raw.get_mut(raw_parent) {
                    let keep = parent.children().len().saturating_sub(removed.len());
                    parent.children_mut().truncate(keep);
                }
                for view_child in removed {
                    self.detach_view_subtree(view_child);
                }
            }
            Mutation::ObjectInsert { node, key, value }
            | Mutation::ObjectUpdate { node, key, value } => {
                let Some(field) = NodeField::parse(&key) else {
                    return;
                };
                let Some(raw_idx) = self.pair_raw(node) else {
                    return;
                };
                if field == NodeField::Children {
                    return;
                }
                // Write-back rule: a canonical scalar lands in the raw record
                // only when the caller exposed the field or the record already
                // carries the key; otherwise the write must not pollute the
                // raw shape.
                let raw_key = self.keys.raw_key(field).to_string();
                let configured = self.keys.is_configured(field);
                if let Some(record) = self.raw.get_mut(raw_idx) {
                    if configured || record.has(&raw_key) {
                        record.write(&raw_key, value);
                    }
                }
            }
            Mutation::ObjectDelete { .. } => {
                // The canonical shape is fixed; the view proxy never emits
                // field deletions
            }
        }
    }

    // --- shared structural helpers --------------------------------------

    fn ensure_live_raw(&self, node: Index) -> TreeResult<()> {
        if self.raw.contains(node) {
            Ok(())
        } else {
            Err(TreeError::DetachedNode)
        }
    }

    fn ensure_live_view(&self, node: Index) -> TreeResult<()> {
        if self.view.contains(node) {
            Ok(())
        } else {
            Err(TreeError::DetachedNode)
        }
    }
}

/// Mutation surface of the raw tree: every operation applies the edit,
/// receives its event and mirrors it onto the view tree before returning.
pub struct RawTreeProxy<'a> {
    mapper: &'a mut TreeMapper,
}

impl RawTreeProxy<'_> {
    /// Read a scalar field of a raw record.
    pub fn field(&self, node: RawId, key: &str) -> Option<Value> {
        self.mapper.raw.get(node.0).and_then(|r| r.read(key))
    }

    /// Write a field on a raw record.
    ///
    /// The children key is structural: an array value replaces the whole
    /// child sequence (converting every element, reparenting the pairs and
    /// detaching the old ones); null clears it. Any other key stores the
    /// value as scalar data and mirrors it onto the paired view node when the
    /// name translates canonically. Private-prefixed names bypass mirroring.
    #[instrument(level = "debug", skip(self, value))]
    pub fn set_field(&mut self, node: RawId, key: &str, value: Value) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;

        if key == m.keys.children_key() {
            return match value {
                Value::Array(_) | Value::Null => replace_raw_children(m, node.0, value),
                other => Err(TreeError::InvalidChildren {
                    key: key.to_string(),
                    kind: crate::errors::value_kind(&other),
                }),
            };
        }

        if let Some(mutation) = m.raw.set_field(node.0, key, value)? {
            m.mirror_raw(mutation);
        }
        Ok(())
    }

    /// Remove a field. Removing the children key clears the child sequence
    /// (detaching every pair). Returns whether anything was removed.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_field(&mut self, node: RawId, key: &str) -> TreeResult<bool> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;

        if key == m.keys.children_key() {
            let had = m.raw.get(node.0).is_some_and(RawRecord::has_children_key);
            if had {
                replace_raw_children(m, node.0, Value::Null)?;
            }
            return Ok(had);
        }

        match m.raw.remove_field(node.0, key)? {
            Some(mutation) => {
                m.mirror_raw(mutation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Append a raw child object. The converted view node appears at the same
    /// index on the other side.
    #[instrument(level = "debug", skip(self, value))]
    pub fn push_child(&mut self, node: RawId, value: Value) -> TreeResult<RawId> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;
        if !value.is_object() {
            let index = m.raw.get(node.0).map_or(0, |r| r.children().len());
            return Err(TreeError::InvalidChild {
                index,
                kind: crate::errors::value_kind(&value),
            });
        }
        raw::validate(&value, m.keys.children_key())?;

        let children_key = m.keys.children_key().to_string();
        let child = raw::adopt(&mut m.raw, value, &children_key)?;
        let mutation = m.raw.push_child(node.0, child)?;
        m.mirror_raw(mutation);
        Ok(RawId(child))
    }

    /// Splice the child at `index` out of the sequence; the paired view child
    /// is spliced at the same index and both subtrees are detached. Returns a
    /// snapshot of the removed raw subtree.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, node: RawId, index: usize) -> TreeResult<Value> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;

        let children_key = m.keys.children_key().to_string();
        let child = child_at(m.raw.get(node.0), index)?;
        let snapshot = raw::export(&m.raw, child, &children_key);

        let mutation = m.raw.remove_child(node.0, index)?;
        m.mirror_raw(mutation);
        Ok(snapshot)
    }

    /// Replace the child at `index` with a fresh raw object. The old occupant
    /// pair is detached.
    #[instrument(level = "debug", skip(self, value))]
    pub fn set_child(&mut self, node: RawId, index: usize, value: Value) -> TreeResult<RawId> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;
        child_at(m.raw.get(node.0), index)?;
        if !value.is_object() {
            return Err(TreeError::InvalidChild {
                index,
                kind: crate::errors::value_kind(&value),
            });
        }
        raw::validate(&value, m.keys.children_key())?;

        let children_key = m.keys.children_key().to_string();
        let child = raw::adopt(&mut m.raw, value, &children_key)?;
        let mutation = m.raw.set_child(node.0, index, child)?;
        m.mirror_raw(mutation);
        Ok(RawId(child))
    }

    /// Replace the child at `index` with an existing node, moving it from
    /// wherever it currently sits (the index refers to the sequence after the
    /// node has been unlinked from its old position). The paired view node is
    /// reused and reparented; the replaced occupant pair is detached.
    #[instrument(level = "debug", skip(self))]
    pub fn set_child_existing(&mut self, node: RawId, index: usize, child: RawId) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;
        m.ensure_live_raw(child.0)?;
        if m.raw.subtree(child.0).contains(&node.0) {
            return Err(TreeError::CycleDetected);
        }

        // Bounds against the sequence as it will look once the child has
        // left its old slot, before mutating anything
        let len = m.raw.get(node.0).map_or(0, |r| r.children().len());
        let same_parent = m.raw.get(child.0).and_then(Record::parent) == Some(node.0);
        let effective = if same_parent { len.saturating_sub(1) } else { len };
        if index >= effective {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: effective,
            });
        }

        m.raw.unlink(child.0);
        let mutation = m.raw.set_child(node.0, index, child.0)?;
        m.mirror_raw(mutation);
        Ok(())
    }

    /// Cut the child sequence down to `len`; the view sequence is cut to the
    /// same length and every dropped pair is detached.
    #[instrument(level = "debug", skip(self))]
    pub fn truncate_children(&mut self, node: RawId, len: usize) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_raw(node.0)?;
        let mutation = m.raw.truncate_children(node.0, len)?;
        m.mirror_raw(mutation);
        Ok(())
    }
}

/// Mutation surface of the view tree; edits write back to the raw tree per
/// the alias rules.
pub struct ViewTreeProxy<'a> {
    mapper: &'a mut TreeMapper,
}

impl ViewTreeProxy<'_> {
    pub fn set_label(&mut self, node: ViewId, label: impl Into<String>) -> TreeResult<()> {
        self.set_scalar(node, NodeField::Label, Value::String(label.into()))
    }

    pub fn set_id(&mut self, node: ViewId, id: impl Into<Value>) -> TreeResult<()> {
        self.set_scalar(node, NodeField::Id, id.into())
    }

    pub fn set_disabled(&mut self, node: ViewId, value: bool) -> TreeResult<()> {
        self.set_scalar(node, NodeField::IsDisabled, Value::Bool(value))
    }

    pub fn set_leaf(&mut self, node: ViewId, value: bool) -> TreeResult<()> {
        self.set_scalar(node, NodeField::IsLeaf, Value::Bool(value))
    }

    pub fn set_async(&mut self, node: ViewId, value: bool) -> TreeResult<()> {
        self.set_scalar(node, NodeField::IsAsync, Value::Bool(value))
    }

    #[instrument(level = "debug", skip(self, value))]
    fn set_scalar(&mut self, node: ViewId, field: NodeField, value: Value) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        if let Some(mutation) = m.view.set_field(node.0, field.canonical_name(), value)? {
            m.mirror_view(mutation);
        }
        Ok(())
    }

    /// Append a subtree described by a seed; a raw counterpart is converted
    /// and appended at the same index (materializing the raw children array
    /// if the record was a leaf).
    #[instrument(level = "debug", skip(self, seed))]
    pub fn push_child(&mut self, node: ViewId, seed: NodeSeed) -> TreeResult<ViewId> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        let child = m.build_view_from_seed(seed);
        let mutation = m.view.push_child(node.0, child)?;
        m.mirror_view(mutation);
        Ok(ViewId(child))
    }

    /// Splice out the child at `index`, detaching both subtrees. Returns the
    /// canonical snapshot of the removed view subtree.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, node: ViewId, index: usize) -> TreeResult<Value> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        let child = child_at_view(m.view.get(node.0), index)?;
        let snapshot = m.export_view_subtree(child);

        let mutation = m.view.remove_child(node.0, index)?;
        m.mirror_view(mutation);
        Ok(snapshot)
    }

    /// Replace the child at `index` with a fresh subtree built from a seed.
    #[instrument(level = "debug", skip(self, seed))]
    pub fn set_child(&mut self, node: ViewId, index: usize, seed: NodeSeed) -> TreeResult<ViewId> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        child_at_view(m.view.get(node.0), index)?;

        let child = m.build_view_from_seed(seed);
        let mutation = m.view.set_child(node.0, index, child)?;
        m.mirror_view(mutation);
        Ok(ViewId(child))
    }

    /// Replace the child at `index` with an existing view node, moving it
    /// from its current position (index interpreted after the unlink). Its
    /// raw pair moves with it; the replaced occupant pair is detached.
    #[instrument(level = "debug", skip(self))]
    pub fn set_child_existing(&mut self, node: ViewId, index: usize, child: ViewId) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        m.ensure_live_view(child.0)?;
        if m.view.subtree(child.0).contains(&node.0) {
            return Err(TreeError::CycleDetected);
        }

        let len = m.view.get(node.0).map_or(0, |n| n.children().len());
        let same_parent = m.view.get(child.0).and_then(Record::parent) == Some(node.0);
        let effective = if same_parent { len.saturating_sub(1) } else { len };
        if index >= effective {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: effective,
            });
        }

        m.view.unlink(child.0);
        let mutation = m.view.set_child(node.0, index, child.0)?;
        m.mirror_view(mutation);
        Ok(())
    }

    /// Replace the whole child sequence with subtrees built from seeds. Raw
    /// counterparts are converted for every seed; all old pairs are detached.
    /// Unlike scalar fields, children always write back.
    #[instrument(level = "debug", skip(self, seeds))]
    pub fn set_children(&mut self, node: ViewId, seeds: Vec<NodeSeed>) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;

        let old = match m.view.get_mut(node.0) {
            Some(view) => mem::take(view.children_mut()),
            None => Vec::new(),
        };

        let mut new_children = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let child = m.build_view_from_seed(seed);
            if let Some(built) = m.view.get_mut(child) {
                built.set_parent(Some(node.0));
            }
            new_children.push(child);
        }
        if let Some(view) = m.view.get_mut(node.0) {
            *view.children_mut() = new_children.clone();
        }

        if let Some(raw_idx) = m.pair_raw(node.0) {
            for old_child in old {
                m.detach_view_subtree(old_child);
            }
            let mut raw_children = Vec::with_capacity(new_children.len());
            for &view_child in &new_children {
                let raw_child = m.convert_view_subtree(view_child);
                if let Some(record) = m.raw.get_mut(raw_child) {
                    record.set_parent(Some(raw_idx));
                }
                raw_children.push(raw_child);
            }
            if let Some(record) = m.raw.get_mut(raw_idx) {
                record.set_children_links(Some(raw_children));
            }
        } else {
            for old_child in old {
                m.view.free_subtree(old_child);
            }
        }
        Ok(())
    }

    /// Cut the child sequence down to `len`, detaching every dropped pair.
    #[instrument(level = "debug", skip(self))]
    pub fn truncate_children(&mut self, node: ViewId, len: usize) -> TreeResult<()> {
        let m = &mut *self.mapper;
        m.ensure_live_view(node.0)?;
        let mutation = m.view.truncate_children(node.0, len)?;
        m.mirror_view(mutation);
        Ok(())
    }
}

/// Replace (array) or clear (null) the whole raw child sequence and rebuild
/// the paired view children. Old pairs are detached, new elements adopted and
/// converted — the `object.update` form of a children edit.
fn replace_raw_children(m: &mut TreeMapper, node: Index, value: Value) -> TreeResult<()> {
    let children_key = m.keys.children_key().to_string();
    let old: Vec<Index> = m
        .raw
        .get(node)
        .map(|r| r.children().to_vec())
        .unwrap_or_default();

    let new_links = match value {
        Value::Null => None,
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if !item.is_object() {
                    return Err(TreeError::InvalidChild {
                        index,
                        kind: crate::errors::value_kind(item),
                    });
                }
                raw::validate(item, &children_key)?;
            }
            let mut links = Vec::with_capacity(items.len());
            for item in items {
                let child = raw::adopt(&mut m.raw, item, &children_key)?;
                if let Some(record) = m.raw.get_mut(child) {
                    record.set_parent(Some(node));
                }
                links.push(child);
            }
            Some(links)
        }
        other => {
            return Err(TreeError::InvalidChildren {
                key: children_key,
                kind: crate::errors::value_kind(&other),
            });
        }
    };

    if let Some(record) = m.raw.get_mut(node) {
        record.set_children_links(new_links.clone());
    }

    if let Some(view_idx) = m.pair_view(node) {
        if let Some(view) = m.view.get_mut(view_idx) {
            view.children_mut().clear();
        }
        for old_child in old {
            m.detach_raw_subtree(old_child);
        }
        for raw_child in new_links.into_iter().flatten() {
            let view_child = m.convert_raw_subtree(raw_child);
            if let Some(view) = m.view.get_mut(view_idx) {
                view.children_mut().push(view_child);
            }
            if let Some(child) = m.view.get_mut(view_child) {
                child.set_parent(Some(view_idx));
            }
        }
    } else {
        for old_child in old {
            m.raw.free_subtree(old_child);
        }
    }
    Ok(())
}

fn child_at(record: Option<&RawRecord>, index: usize) -> TreeResult<Index> {
    let record = record.ok_or(TreeError::DetachedNode)?;
    let len = record.children().len();
    record
        .children()
        .get(index)
        .copied()
        .ok_or(TreeError::IndexOutOfBounds { index, len })
}

fn child_at_view(node: Option<&ViewNode>, index: usize) -> TreeResult<Index> {
    let node = node.ok_or(TreeError::DetachedNode)?;
    let len = node.children().len();
    node.children()
        .get(index)
        .copied()
        .ok_or(TreeError::IndexOutOfBounds { index, len })
}
