//! Command dispatch and the edit-script grammar

use std::io;
use std::path::Path;
use std::sync::OnceLock;

use clap::CommandFactory;
use clap_complete::generate;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::load_alias_table;
use crate::display::{raw_tree_string, TreeRender};
use crate::keymap::AliasTable;
use crate::mapper::{RawId, TreeMapper};

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Show { file, aliases, raw }) => show(file, aliases.as_deref(), *raw),
        Some(Commands::Apply {
            file,
            aliases,
            edits,
            out,
            write,
        }) => apply(file, aliases.as_deref(), edits, out.as_deref(), *write),
        Some(Commands::Export { file, aliases }) => export(file, aliases.as_deref()),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => Ok(()),
    }
}

#[instrument(level = "debug")]
fn show(file: &Path, aliases: Option<&Path>, raw: bool) -> CliResult<()> {
    let mapper = load_mapper(file, aliases)?;
    if raw {
        output::info(&raw_tree_string(&mapper));
    } else {
        output::info(&mapper.to_tree_string());
    }
    Ok(())
}

#[instrument(level = "debug", skip(edits))]
fn apply(
    file: &Path,
    aliases: Option<&Path>,
    edits: &[String],
    out: Option<&Path>,
    write: bool,
) -> CliResult<()> {
    // Parse everything before touching the tree so a typo in the third edit
    // doesn't leave the first two half-applied in the output
    let ops: Vec<EditOp> = edits.iter().map(|e| parse_edit(e)).collect::<CliResult<_>>()?;

    let mut mapper = load_mapper(file, aliases)?;
    apply_edits(&mut mapper, &ops)?;

    output::header("view tree");
    output::info(&mapper.to_tree_string());

    let target = if write { Some(file) } else { out };
    if let Some(target) = target {
        write_json(target, &mapper.export_raw())?;
        output::action("wrote", &target.display());
    }
    Ok(())
}

#[instrument(level = "debug")]
fn export(file: &Path, aliases: Option<&Path>) -> CliResult<()> {
    let mapper = load_mapper(file, aliases)?;
    let json = serde_json::to_string_pretty(&mapper.export_view())
        .expect("canonical view tree serializes");
    output::info(&json);
    Ok(())
}

fn load_mapper(file: &Path, aliases: Option<&Path>) -> CliResult<TreeMapper> {
    let table = match aliases {
        Some(path) => load_alias_table(path)?,
        None => AliasTable::default(),
    };
    let root = read_json(file)?;
    Ok(TreeMapper::new(root, table)?)
}

fn read_json(path: &Path) -> CliResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &Value) -> CliResult<()> {
    let content = serde_json::to_string_pretty(value).expect("exported tree serializes");
    std::fs::write(path, content).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One parsed edit script.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    /// `push PATH JSON` — append a raw child object
    Push { path: NodePath, value: Value },
    /// `replace PATH IDX JSON` — replace the child at an index
    Replace {
        path: NodePath,
        index: usize,
        value: Value,
    },
    /// `remove PATH IDX` — splice out the child at an index
    Remove { path: NodePath, index: usize },
    /// `truncate PATH LEN` — cut the child list down to a length
    Truncate { path: NodePath, len: usize },
    /// `set PATH KEY=JSON` — write a raw field
    Set {
        path: NodePath,
        key: String,
        value: Value,
    },
    /// `unset PATH KEY` — remove a raw field
    Unset { path: NodePath, key: String },
    /// `label PATH TEXT` — set the view-side label (exercises write-back)
    Label { path: NodePath, text: String },
}

/// Node address in either tree: `.` for the root, dotted child indexes
/// (`0.2.1`) below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn parse(text: &str) -> Option<NodePath> {
        if text == "." {
            return Some(NodePath(Vec::new()));
        }
        text.split('.')
            .map(|part| part.parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()
            .map(NodePath)
    }

    /// Walk the raw tree down the child indexes.
    pub fn resolve(&self, mapper: &TreeMapper) -> Option<RawId> {
        let mut node = mapper.raw_root();
        for &index in &self.0 {
            node = mapper.raw_children(node).get(index).copied()?;
        }
        Some(node)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

fn edit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<op>push|replace|remove|truncate|set|unset|label)\s+(?P<path>\S+)(?:\s+(?P<rest>.+))?$")
            .expect("static pattern compiles")
    })
}

/// Parse one edit script into an [`EditOp`].
pub fn parse_edit(script: &str) -> CliResult<EditOp> {
    let invalid = |reason: &str| CliError::InvalidEdit {
        script: script.to_string(),
        reason: reason.to_string(),
    };

    let caps = edit_regex()
        .captures(script.trim())
        .ok_or_else(|| invalid("expected `<op> <path> [args]`"))?;

    let path = NodePath::parse(&caps["path"])
        .ok_or_else(|| invalid("path must be `.` or dotted child indexes like `0.2`"))?;
    let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");

    let op = match &caps["op"] {
        "push" => EditOp::Push {
            path,
            value: parse_value(nonempty(rest).ok_or_else(|| invalid("push needs a JSON value"))?),
        },
        "replace" => {
            let (index, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| invalid("replace needs `IDX JSON`"))?;
            EditOp::Replace {
                path,
                index: index.parse().map_err(|_| invalid("index must be a number"))?,
                value: parse_value(value.trim()),
            }
        }
        "remove" => EditOp::Remove {
            path,
            index: rest.parse().map_err(|_| invalid("remove needs an index"))?,
        },
        "truncate" => EditOp::Truncate {
            path,
            len: rest.parse().map_err(|_| invalid("truncate needs a length"))?,
        },
        "set" => {
            let (key, value) = rest
                .split_once('=')
                .ok_or_else(|| invalid("set needs `KEY=JSON`"))?;
            EditOp::Set {
                path,
                key: key.trim().to_string(),
                value: parse_value(value.trim()),
            }
        }
        "unset" => EditOp::Unset {
            path,
            key: nonempty(rest)
                .ok_or_else(|| invalid("unset needs a key"))?
                .to_string(),
        },
        "label" => EditOp::Label {
            path,
            text: rest.to_string(),
        },
        _ => unreachable!("regex restricts the op set"),
    };
    Ok(op)
}

fn nonempty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}

/// Values are JSON; anything that does not parse is taken as a bare string,
/// so `set . name=Node1` works without shell-quoted quotes.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Run parsed edits against the mapper in order.
pub fn apply_edits(mapper: &mut TreeMapper, ops: &[EditOp]) -> CliResult<()> {
    for op in ops {
        debug!(?op, "applying edit");
        apply_edit(mapper, op)?;
    }
    Ok(())
}

fn apply_edit(mapper: &mut TreeMapper, op: &EditOp) -> CliResult<()> {
    let resolve = |mapper: &TreeMapper, path: &NodePath| {
        path.resolve(mapper)
            .ok_or_else(|| CliError::NoSuchPath(path.to_string()))
    };

    match op {
        EditOp::Push { path, value } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().push_child(node, value.clone())?;
        }
        EditOp::Replace { path, index, value } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().set_child(node, *index, value.clone())?;
        }
        EditOp::Remove { path, index } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().remove_child(node, *index)?;
        }
        EditOp::Truncate { path, len } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().truncate_children(node, *len)?;
        }
        EditOp::Set { path, key, value } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().set_field(node, key, value.clone())?;
        }
        EditOp::Unset { path, key } => {
            let node = resolve(mapper, path)?;
            mapper.raw_proxy().remove_field(node, key)?;
        }
        EditOp::Label { path, text } => {
            let node = resolve(mapper, path)?;
            let view = mapper
                .view_node_for(node)
                .ok_or_else(|| CliError::NoSuchPath(path.to_string()))?;
            mapper.view_proxy().set_label(view, text.clone())?;
        }
    }
    Ok(())
}
