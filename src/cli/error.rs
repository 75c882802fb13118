//! CLI-level errors (wraps engine and IO errors)

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AliasFileError;
use crate::errors::TreeError;
use crate::exitcode;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("{0}")]
    AliasFile(#[from] AliasFileError),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid edit '{script}': {reason}")]
    InvalidEdit { script: String, reason: String },

    #[error("no node at path '{0}'")]
    NoSuchPath(String),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidEdit { .. } | CliError::NoSuchPath(_) => exitcode::USAGE,
            CliError::Io { .. } => exitcode::NOINPUT,
            CliError::Json { .. } => exitcode::DATAERR,
            CliError::AliasFile(_) => exitcode::CONFIG,
            CliError::Tree(e) => match e {
                TreeError::Config(_) => exitcode::CONFIG,
                TreeError::InvalidRoot { .. }
                | TreeError::InvalidChildren { .. }
                | TreeError::InvalidChild { .. } => exitcode::DATAERR,
                _ => exitcode::SOFTWARE,
            },
        }
    }
}
