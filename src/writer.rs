//! DAG file writer
//!
//! Walks a [`Graph`] breadth-first from its roots and emits the DAGMan
//! description, plus the submit, no-op and config files it refers to.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::edges::{Edge, EdgeEnd, IndexGroup, JoinFactory, JOIN_NODE_PREFIX};
use crate::error::{DagError, Result};
use crate::formatter::NodeNameFormatter;
use crate::graph::Graph;
use crate::node::{Node, NodeKind, Script, SubmitDescription};
use crate::walk::WalkOrder;

pub const DEFAULT_DAG_FILE_NAME: &str = "dagfile.dag";
pub const CONFIG_FILE_NAME: &str = "dagman.config";
pub const NOOP_SUBMIT_FILE_NAME: &str = "__JOIN__.sub";

/// Write `graph` into `dag_dir` and return the path of the DAG file.
pub fn write_dag(
    graph: &Graph,
    dag_dir: impl AsRef<Path>,
    dag_file_name: &str,
    formatter: &dyn NodeNameFormatter,
) -> Result<PathBuf> {
    DagWriter::new(graph, formatter).write(dag_dir.as_ref(), dag_file_name)
}

/// Escape a VARS value for use inside double quotes.
pub fn escape_var(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Single-use writer. Join node numbering starts at zero for every writer.
pub struct DagWriter<'a> {
    graph: &'a Graph,
    formatter: &'a dyn NodeNameFormatter,
    joins: JoinFactory,
}

impl<'a> DagWriter<'a> {
    pub fn new(graph: &'a Graph, formatter: &'a dyn NodeNameFormatter) -> Self {
        Self {
            graph,
            formatter,
            joins: JoinFactory::new(),
        }
    }

    /// The DAG file contents without touching the filesystem.
    pub fn render(mut self) -> Result<String> {
        self.render_dag()
    }

    #[instrument(skip(self), fields(nodes = self.graph.len()))]
    pub fn write(mut self, dag_dir: &Path, dag_file_name: &str) -> Result<PathBuf> {
        let text = self.render_dag()?;
        self.check_submit_conflicts(dag_dir)?;

        fs::create_dir_all(dag_dir)?;

        for node in self.graph.nodes().chain(self.graph.final_node()) {
            if let Some(SubmitDescription::Inline(description)) = node.submit_description() {
                let path = dag_dir.join(submit_file_name(node.name()));
                debug!(path = %path.display(), "write submit file");
                fs::write(path, format!("{description}\nqueue\n"))?;
            }
        }

        if !self.joins.is_empty() {
            fs::write(dag_dir.join(NOOP_SUBMIT_FILE_NAME), "")?;
        }

        let dagman_config = &self.graph.config().dagman_config;
        if !dagman_config.is_empty() {
            let mut config = String::new();
            for (key, value) in dagman_config {
                let _ = writeln!(config, "{key} = {value}");
            }
            fs::write(dag_dir.join(CONFIG_FILE_NAME), config)?;
        }

        let path = dag_dir.join(dag_file_name);
        fs::write(&path, text)?;
        info!(
            path = %path.display(),
            joins = self.joins.allocated().count(),
            "wrote DAG file"
        );
        Ok(path)
    }

    /// Generated submit files must not replace files other nodes refer to.
    fn check_submit_conflicts(&self, dag_dir: &Path) -> Result<()> {
        let nodes = || self.graph.nodes().chain(self.graph.final_node());

        let referenced: Vec<PathBuf> = nodes()
            .filter_map(|node| match node.submit_description() {
                Some(SubmitDescription::File(path)) => Some(dag_dir.join(path)),
                _ => None,
            })
            .collect();
        if referenced.is_empty() {
            return Ok(());
        }

        let mut generated: BTreeMap<PathBuf, String> = nodes()
            .filter(|node| {
                matches!(
                    node.submit_description(),
                    Some(SubmitDescription::Inline(_))
                )
            })
            .map(|node| {
                (
                    dag_dir.join(submit_file_name(node.name())),
                    node.name().to_string(),
                )
            })
            .collect();
        if !self.joins.is_empty() {
            generated.insert(
                dag_dir.join(NOOP_SUBMIT_FILE_NAME),
                JOIN_NODE_PREFIX.to_string(),
            );
        }

        match referenced.iter().find_map(|path| generated.get_key_value(path)) {
            Some((path, node)) => Err(DagError::SubmitFileConflict {
                node: node.clone(),
                path: path.display().to_string(),
            }),
            None => Ok(()),
        }
    }

    fn render_dag(&mut self) -> Result<String> {
        let graph = self.graph;
        let mut out = String::new();
        self.write_meta(&mut out);

        out.push_str("# BEGIN NODES AND EDGES\n");
        let order = graph.walk(WalkOrder::BreadthFirst);
        if order.len() < graph.len() {
            warn!(
                reachable = order.len(),
                total = graph.len(),
                "some nodes are not reachable from a root and were skipped"
            );
        }
        let children = graph.node_to_children();
        for id in &order {
            let Some(node) = graph.node(id) else { continue };
            self.write_node(&mut out, node)?;
            if let Some(children) = children.get(id) {
                for child in children {
                    if let Some(child) = graph.node(child) {
                        self.write_edges(&mut out, node, child)?;
                    }
                }
            }
        }
        for join in self.joins.allocated() {
            let _ = writeln!(out, "JOB {join} {NOOP_SUBMIT_FILE_NAME} NOOP");
        }
        out.push_str("# END NODES AND EDGES\n");

        if let Some(final_node) = graph.final_node() {
            out.push_str("# FINAL NODE\n");
            self.write_node(&mut out, final_node)?;
            out.push_str("# END FINAL NODE\n");
        }

        Ok(out)
    }

    fn write_meta(&self, out: &mut String) {
        let config = self.graph.config();
        out.push_str("# BEGIN META\n");

        if !config.dagman_config.is_empty() {
            let _ = writeln!(out, "CONFIG {CONFIG_FILE_NAME}");
        }
        if let Some(log) = &config.jobstate_log {
            let _ = writeln!(out, "JOBSTATE_LOG {}", log.display());
        }
        if let Some(status) = &config.node_status_file {
            let mut line = format!("NODE_STATUS_FILE {}", status.path.display());
            if let Some(seconds) = status.update_seconds {
                let _ = write!(line, " {seconds}");
            }
            if status.always_update {
                line.push_str(" ALWAYS-UPDATE");
            }
            let _ = writeln!(out, "{line}");
        }
        if let Some(dot) = &config.dot_config {
            let _ = write!(
                out,
                "DOT {} {} {}",
                dot.path.display(),
                if dot.update { "UPDATE" } else { "DONT-UPDATE" },
                if dot.overwrite { "OVERWRITE" } else { "DONT-OVERWRITE" },
            );
            if let Some(include) = &dot.include_file {
                let _ = write!(out, " INCLUDE {}", include.display());
            }
            out.push('\n');
        }
        for (key, value) in &config.job_attributes {
            let _ = writeln!(out, "SET_JOB_ATTR {key} = {value}");
        }
        // MAXJOBS is the DAGMan keyword for category limits; CATEGORY assigns nodes
        for (category, max_jobs) in &config.max_jobs_by_category {
            let _ = writeln!(out, "MAXJOBS {category} {max_jobs}");
        }

        out.push_str("# END META\n");
    }

    /// Node name of instance `index` in the written file.
    fn instance_name(&self, node: &Node, index: usize) -> Result<String> {
        match node.kind() {
            NodeKind::Layer(_) => self.formatter.generate(node.name(), index),
            NodeKind::SubDag(_) | NodeKind::Final(_) => Ok(node.name().to_string()),
        }
    }

    fn write_node(&self, out: &mut String, node: &Node) -> Result<()> {
        for index in 0..node.instances() {
            let name = self.instance_name(node, index)?;

            let mut line = match node.kind() {
                NodeKind::Layer(layer) => format!(
                    "JOB {name} {}",
                    submit_reference(node.name(), &layer.submit_description)
                ),
                NodeKind::SubDag(subdag) => {
                    format!("SUBDAG EXTERNAL {name} {}", subdag.dag_file.display())
                }
                NodeKind::Final(f) => format!(
                    "FINAL {name} {}",
                    submit_reference(node.name(), &f.submit_description)
                ),
            };
            if let Some(dir) = &node.meta().dir {
                let _ = write!(line, " DIR {}", dir.display());
            }
            if node.is_noop(index) {
                line.push_str(" NOOP");
            }
            if node.is_done(index) && !node.is_final() {
                line.push_str(" DONE");
            }
            let _ = writeln!(out, "{line}");

            if let Some(vars) = node.vars().get(index).filter(|v| !v.is_empty()) {
                let pairs = vars
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", escape_var(v)))
                    .collect::<Vec<_>>()
                    .join(" ");
                let _ = writeln!(out, "VARS {name} {pairs}");
            }

            write_node_meta(out, &name, node);
        }
        Ok(())
    }

    fn write_edges(&mut self, out: &mut String, parent: &Node, child: &Node) -> Result<()> {
        let Some(edge) = self.graph.edge(parent.name(), child.name()) else {
            return Ok(());
        };
        let pairs = edge.generate(
            EdgeEnd::new(parent.name(), parent.instances()),
            EdgeEnd::new(child.name(), child.instances()),
            &mut self.joins,
        )?;

        for (parents, children) in pairs {
            let parents = self.group_names(parent, &parents)?;
            let children = self.group_names(child, &children)?;
            let _ = writeln!(out, "PARENT {parents} CHILD {children}");
        }
        Ok(())
    }

    fn group_names(&self, node: &Node, group: &IndexGroup) -> Result<String> {
        match group {
            IndexGroup::Join(join) => Ok(join.to_string()),
            IndexGroup::Indices(indices) => {
                let names = indices
                    .iter()
                    .map(|&i| self.instance_name(node, i))
                    .collect::<Result<Vec<_>>>()?;
                Ok(names.join(" "))
            }
        }
    }
}

fn submit_file_name(node_name: &str) -> String {
    format!("{node_name}.sub")
}

fn submit_reference(node_name: &str, description: &SubmitDescription) -> String {
    match description {
        SubmitDescription::Inline(_) => submit_file_name(node_name),
        SubmitDescription::File(path) => path.display().to_string(),
    }
}

fn write_node_meta(out: &mut String, name: &str, node: &Node) {
    let meta = node.meta();

    if let Some(retries) = meta.retries {
        let _ = write!(out, "RETRY {name} {retries}");
        if let Some(code) = meta.retry_unless_exit {
            let _ = write!(out, " UNLESS-EXIT {code}");
        }
        out.push('\n');
    }
    if let Some(pre) = &meta.pre {
        write_script(out, "PRE", name, pre);
    }
    if let Some(post) = &meta.post {
        write_script(out, "POST", name, post);
    }
    if let Some(code) = meta.pre_skip {
        let _ = writeln!(out, "PRE_SKIP {name} {code}");
    }
    if meta.priority != 0 {
        let _ = writeln!(out, "PRIORITY {name} {}", meta.priority);
    }
    if let Some(category) = &meta.category {
        let _ = writeln!(out, "CATEGORY {name} {category}");
    }
    if let Some(abort) = &meta.abort {
        let _ = write!(out, "ABORT-DAG-ON {name} {}", abort.node_exit_value);
        if let Some(code) = abort.dag_return_value {
            let _ = write!(out, " RETURN {code}");
        }
        out.push('\n');
    }
}

fn write_script(out: &mut String, kind: &str, name: &str, script: &Script) {
    out.push_str("SCRIPT ");
    if let Some(retry) = &script.retry {
        let _ = write!(out, "DEFER {} {} ", retry.status, retry.delay);
    }
    let _ = write!(out, "{kind} {name} {}", script.executable);
    for arg in &script.arguments {
        let _ = write!(out, " {arg}");
    }
    out.push('\n');
}
