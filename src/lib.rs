//! Bidirectional tree mirroring.
//!
//! A [`TreeMapper`] adopts a caller-owned "raw" tree of JSON records with
//! arbitrary field names and builds a parallel "view" tree of canonical,
//! strongly-shaped nodes. From then on the two stay index-synchronized in
//! both directions: raw edits surface on the view tree, view edits write back
//! to the raw tree, and neither side needs to know the other's field naming.
//!
//! All mutation goes through the proxies ([`TreeMapper::raw_proxy`] /
//! [`TreeMapper::view_proxy`]); each operation emits one typed mutation event
//! and mirrors it onto the opposite tree synchronously before returning.
//! Structural removals detach the affected subtree pair immediately — arena
//! slots and identity-map entries are reclaimed without any explicit destroy
//! call on the caller's side.
//!
//! ```
//! use serde_json::json;
//! use treemirror::{AliasTable, TreeMapper};
//!
//! let mut mapper = TreeMapper::new(
//!     json!({"key": 1, "name": "Node1", "items": [
//!         {"key": 11, "name": "Node1-1"},
//!     ]}),
//!     AliasTable::from_pairs([("id", "key"), ("label", "name"), ("children", "items")])?,
//! )?;
//!
//! // A raw append shows up as a view node at the same index
//! let root = mapper.raw_root();
//! mapper.raw_proxy().push_child(root, json!({"key": 12, "name": "Node1-2"}))?;
//! let second = mapper.view_children(mapper.view_root())[1];
//! assert_eq!(mapper.view(second).unwrap().id, json!(12));
//!
//! // A view-side label edit writes back under the caller's field name
//! mapper.view_proxy().set_label(second, "renamed")?;
//! let raw_child = mapper.raw_node_for(second).unwrap();
//! assert_eq!(mapper.raw(raw_child).unwrap().field("name"), Some(&json!("renamed")));
//! # Ok::<(), treemirror::TreeError>(())
//! ```

pub mod cli;
pub mod config;
pub mod display;
pub mod errors;
pub mod exitcode;
pub mod keymap;
pub mod mapper;
pub mod node;
pub mod raw;
pub mod util;
pub mod watcher;

pub use errors::{ConfigError, TreeError, TreeResult};
pub use keymap::{AliasTable, KeyMap, NodeField};
pub use mapper::{AsyncChildLoader, RawId, RawTreeProxy, TreeMapper, ViewId, ViewTreeProxy};
pub use node::{NodeSeed, ViewNode};
pub use raw::RawRecord;
pub use watcher::{Mutation, Watcher};
