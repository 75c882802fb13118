//! Alias-table configuration files
//!
//! The CLI reads the field-alias mapping from a small TOML file:
//!
//! ```toml
//! [aliases]
//! id = "key"
//! label = "name"
//! children = "items"
//! ```
//!
//! Recognized keys are the canonical field names (`id`, `label`, `children`,
//! `isDisabled`, `isLeaf`, `isAsync`); anything else is rejected. A mapping
//! table is per-invocation input, so there is no layered or global config.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::errors::ConfigError;
use crate::keymap::{AliasTable, KeyMap};

#[derive(Error, Debug)]
pub enum AliasFileError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AliasFile {
    #[serde(default)]
    aliases: AliasTable,
}

/// Load and validate an alias table from a TOML file.
///
/// Validation runs the same [`KeyMap`] build as mapper construction, so an
/// ambiguous table fails here rather than later.
pub fn load_alias_table(path: &Path) -> Result<AliasTable, AliasFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| AliasFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: AliasFile = toml::from_str(&content).map_err(|source| AliasFileError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    KeyMap::build(&file.aliases)?;
    Ok(file.aliases)
}
