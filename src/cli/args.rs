//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Mirror a raw JSON record tree into a canonical view tree and keep both in sync
#[derive(Parser, Debug)]
#[command(name = "treemirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-d, -dd, -ddd)
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the view tree mirrored from a raw JSON file
    Show {
        /// Raw tree JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Alias table TOML file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        aliases: Option<PathBuf>,

        /// Print the raw tree instead of the view tree
        #[arg(long)]
        raw: bool,
    },

    /// Apply edit scripts against the mirrored trees, then print the result
    Apply {
        /// Raw tree JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Alias table TOML file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        aliases: Option<PathBuf>,

        /// Edit script, repeatable: `push PATH JSON`, `replace PATH IDX JSON`,
        /// `remove PATH IDX`, `truncate PATH LEN`, `set PATH KEY=JSON`,
        /// `unset PATH KEY`, `label PATH TEXT`. PATH is `.` for the root or
        /// dotted child indexes like `0.2`.
        #[arg(short, long = "edit", required = true)]
        edits: Vec<String>,

        /// Write the synchronized raw tree to this file
        #[arg(short, long, value_hint = ValueHint::FilePath, conflicts_with = "write")]
        out: Option<PathBuf>,

        /// Write the synchronized raw tree back to the input file
        #[arg(long)]
        write: bool,
    },

    /// Print the canonical view tree as JSON
    Export {
        /// Raw tree JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Alias table TOML file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        aliases: Option<PathBuf>,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
