//! Terminal rendering of either tree via termtree

use itertools::Itertools;
use termtree::Tree;

use crate::mapper::{RawId, TreeMapper, ViewId};

/// Render a tree structure as `termtree::Tree<String>` for terminal output.
pub trait TreeRender {
    /// The view tree, one line per node: label, id and active flag markers.
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeRender for TreeMapper {
    fn to_tree_string(&self) -> Tree<String> {
        view_tree(self, self.view_root())
    }
}

fn view_tree(mapper: &TreeMapper, node: ViewId) -> Tree<String> {
    let text = match mapper.view(node) {
        Some(view) => {
            let flags: Vec<&str> = [
                (view.is_disabled, "disabled"),
                (view.is_leaf, "leaf"),
                (view.is_async, "async"),
            ]
            .iter()
            .filter_map(|&(on, name)| on.then_some(name))
            .collect();
            let label = if view.label.is_empty() {
                "<unlabeled>"
            } else {
                view.label.as_str()
            };
            if flags.is_empty() {
                format!("{} (id={})", label, view.id)
            } else {
                format!("{} (id={}) [{}]", label, view.id, flags.join(","))
            }
        }
        None => "<detached>".to_string(),
    };

    Tree::new(text).with_leaves(
        mapper
            .view_children(node)
            .into_iter()
            .map(|child| view_tree(mapper, child)),
    )
}

/// The raw tree, one line per node: the record's scalar fields as `key=value`
/// pairs in field order.
pub fn raw_tree_string(mapper: &TreeMapper) -> Tree<String> {
    raw_tree(mapper, mapper.raw_root())
}

fn raw_tree(mapper: &TreeMapper, node: RawId) -> Tree<String> {
    let text = match mapper.raw(node) {
        Some(record) => {
            if record.fields().is_empty() {
                "{}".to_string()
            } else {
                record
                    .fields()
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .join(" ")
            }
        }
        None => "<detached>".to_string(),
    };

    Tree::new(text).with_leaves(
        mapper
            .raw_children(node)
            .into_iter()
            .map(|child| raw_tree(mapper, child)),
    )
}
