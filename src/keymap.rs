//! Field-name translation between caller-defined raw records and canonical view nodes

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// The canonical field set of a view node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeField {
    Id,
    Label,
    Children,
    IsDisabled,
    IsLeaf,
    IsAsync,
}

impl NodeField {
    pub const ALL: [NodeField; 6] = [
        NodeField::Id,
        NodeField::Label,
        NodeField::Children,
        NodeField::IsDisabled,
        NodeField::IsLeaf,
        NodeField::IsAsync,
    ];

    /// Canonical spelling, as it appears in alias tables and exported view trees.
    pub fn canonical_name(self) -> &'static str {
        match self {
            NodeField::Id => "id",
            NodeField::Label => "label",
            NodeField::Children => "children",
            NodeField::IsDisabled => "isDisabled",
            NodeField::IsLeaf => "isLeaf",
            NodeField::IsAsync => "isAsync",
        }
    }

    pub fn parse(name: &str) -> Option<NodeField> {
        NodeField::ALL
            .into_iter()
            .find(|f| f.canonical_name() == name)
    }
}

impl std::fmt::Display for NodeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Caller-supplied mapping from canonical field names to the raw tree's field names.
///
/// Every entry is optional; an unspecified field keeps its canonical name as the
/// raw name. The table is consumed at mapper construction and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasTable {
    pub id: Option<String>,
    pub label: Option<String>,
    pub children: Option<String>,
    #[serde(rename = "isDisabled")]
    pub is_disabled: Option<String>,
    #[serde(rename = "isLeaf")]
    pub is_leaf: Option<String>,
    #[serde(rename = "isAsync")]
    pub is_async: Option<String>,
}

impl AliasTable {
    /// Build a table from dynamic `(canonical, alias)` pairs.
    ///
    /// Rejects keys outside the canonical field set; later pairs overwrite
    /// earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = AliasTable::default();
        for (key, alias) in pairs {
            let field = NodeField::parse(key.as_ref())
                .ok_or_else(|| ConfigError::UnknownField(key.as_ref().to_string()))?;
            *table.slot_mut(field) = Some(alias.into());
        }
        Ok(table)
    }

    pub fn get(&self, field: NodeField) -> Option<&str> {
        match field {
            NodeField::Id => self.id.as_deref(),
            NodeField::Label => self.label.as_deref(),
            NodeField::Children => self.children.as_deref(),
            NodeField::IsDisabled => self.is_disabled.as_deref(),
            NodeField::IsLeaf => self.is_leaf.as_deref(),
            NodeField::IsAsync => self.is_async.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: NodeField) -> &mut Option<String> {
        match field {
            NodeField::Id => &mut self.id,
            NodeField::Label => &mut self.label,
            NodeField::Children => &mut self.children,
            NodeField::IsDisabled => &mut self.is_disabled,
            NodeField::IsLeaf => &mut self.is_leaf,
            NodeField::IsAsync => &mut self.is_async,
        }
    }
}

/// Immutable bidirectional name dictionary built from an [`AliasTable`].
///
/// Holds the complete canonical→raw table (defaults filled in), its inverse,
/// and the set of fields the caller configured explicitly. The latter drives
/// the write-back rule: canonical scalar writes only land in a raw record when
/// the field was exposed by the caller or the record already carries the key.
#[derive(Debug, Clone)]
pub struct KeyMap {
    to_raw: HashMap<NodeField, String>,
    to_canonical: HashMap<String, NodeField>,
    configured: HashSet<NodeField>,
}

impl KeyMap {
    /// Validate the alias table and build the two-way dictionary.
    ///
    /// Fails when two canonical fields resolve to the same raw name, since the
    /// inverse translation would be ambiguous.
    pub fn build(table: &AliasTable) -> Result<KeyMap, ConfigError> {
        let mut to_raw = HashMap::new();
        let mut configured = HashSet::new();

        for field in NodeField::ALL {
            match table.get(field) {
                Some(alias) => {
                    to_raw.insert(field, alias.to_string());
                    configured.insert(field);
                }
                None => {
                    to_raw.insert(field, field.canonical_name().to_string());
                }
            }
        }

        if let Some(alias) = to_raw.values().duplicates().next() {
            let mut offenders = NodeField::ALL
                .into_iter()
                .filter(|f| to_raw[f] == *alias)
                .map(NodeField::canonical_name);
            let (first, second) = offenders
                .next_tuple()
                .expect("a duplicated alias names at least two fields");
            return Err(ConfigError::AmbiguousAlias {
                alias: alias.clone(),
                first,
                second,
            });
        }

        let to_canonical = to_raw
            .iter()
            .map(|(field, alias)| (alias.clone(), *field))
            .collect();

        Ok(KeyMap {
            to_raw,
            to_canonical,
            configured,
        })
    }

    /// Raw field name for a canonical field. Total: defaults guarantee an entry.
    pub fn raw_key(&self, field: NodeField) -> &str {
        &self.to_raw[&field]
    }

    /// Canonical field for a raw field name, if the name translates at all.
    pub fn canonical(&self, raw_key: &str) -> Option<NodeField> {
        self.to_canonical.get(raw_key).copied()
    }

    /// Whether the caller explicitly exposed this canonical field.
    pub fn is_configured(&self, field: NodeField) -> bool {
        self.configured.contains(&field)
    }

    /// Raw name of the children sequence.
    pub fn children_key(&self) -> &str {
        self.raw_key(NodeField::Children)
    }
}
