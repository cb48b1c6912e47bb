//! Rescue file loading
//!
//! DAGMan writes `<dag file>.rescueNNN` files listing the nodes that finished.
//! Applying one marks those instances done so a rewritten DAG skips them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::edges::JOIN_NODE_PREFIX;
use crate::error::{DagError, Result};
use crate::formatter::NodeNameFormatter;
use crate::graph::Graph;
use crate::node::{InstanceFlags, NodeKind};

static DONE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DONE\s+(\S+)\s*$").expect("valid regex"));

/// Read a rescue file and apply it to `graph`.
pub fn rescue(
    graph: &mut Graph,
    rescue_file: impl AsRef<Path>,
    formatter: &dyn NodeNameFormatter,
) -> Result<()> {
    let text = fs::read_to_string(rescue_file.as_ref())?;
    apply_rescue(graph, &text, formatter)
}

/// Overwrite the done state of every node from rescue file contents.
///
/// This is destructive: instances not listed as `DONE` become not done, even
/// if they were marked done before.
#[instrument(skip_all)]
pub fn apply_rescue(
    graph: &mut Graph,
    rescue_text: &str,
    formatter: &dyn NodeNameFormatter,
) -> Result<()> {
    let done = parse_rescue(graph, rescue_text, formatter)?;

    for node in graph.nodes_mut() {
        let flags = match done.get(node.name()) {
            Some(indices) => (0..node.instances())
                .map(|i| (i, indices.contains(&i)))
                .collect(),
            None => BTreeMap::new(),
        };
        node.set_done(InstanceFlags::PerInstance(flags));
    }

    info!(
        nodes = done.len(),
        instances = done.values().map(BTreeSet::len).sum::<usize>(),
        "applied rescue state"
    );
    Ok(())
}

/// Completed instance indices per node name.
fn parse_rescue(
    graph: &Graph,
    rescue_text: &str,
    formatter: &dyn NodeNameFormatter,
) -> Result<BTreeMap<String, BTreeSet<usize>>> {
    let mut done: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();

    for line in rescue_text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(caps) = DONE_LINE.captures(line) else {
            warn!(line, "ignoring unrecognized rescue line");
            continue;
        };
        let id = &caps[1];

        if id.starts_with(JOIN_NODE_PREFIX) {
            continue;
        }
        let single = graph
            .node(id)
            .is_some_and(|n| !matches!(n.kind(), NodeKind::Layer(_)))
            || graph.final_node().is_some_and(|f| f.name() == id);
        let (name, index) = if single {
            (id.to_string(), 0)
        } else {
            formatter.parse(id)?
        };

        debug!(node = %name, index, "done");
        done.entry(name).or_default().insert(index);
    }

    Ok(done)
}

/// The most recent rescue file for `dag_file_name` in `dag_dir`.
///
/// Rescue files are numbered `<dag>.rescue001`, `<dag>.rescue002`, ... so the
/// lexicographically last match is the newest.
pub fn find_rescue_file(dag_dir: impl AsRef<Path>, dag_file_name: &str) -> Result<PathBuf> {
    let dag_dir = dag_dir.as_ref();
    let prefix = format!("{dag_file_name}.rescue");

    let mut matches: Vec<PathBuf> = WalkDir::new(dag_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();

    matches.pop().ok_or_else(|| DagError::NoRescueFileFound {
        dir: dag_dir.display().to_string(),
        dag_file: dag_file_name.to_string(),
    })
}
