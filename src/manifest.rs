//! YAML graph manifests
//!
//! A manifest describes a whole graph declaratively: layers, subdags, the
//! final node, edges between them, graph-level options and the node name
//! formatter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::edges::{EdgeKind, Slice};
use crate::error::{DagError, Result};
use crate::formatter::SimpleFormatter;
use crate::graph::{DotConfig, Graph, GraphConfig, NodeStatusFile};
use crate::node::{InstanceFlags, Node, NodeId, Nodes, Script, SubmitDescription, Vars};

/// Whole-graph manifest.
#[derive(Debug, Deserialize, Default)]
pub struct GraphManifest {
    #[serde(default)]
    pub formatter: FormatterDef,
    #[serde(default)]
    pub config: ConfigDef,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
    #[serde(default)]
    pub subdags: Vec<SubDagDef>,
    #[serde(default, rename = "final")]
    pub final_node: Option<FinalDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Deserialize)]
pub struct FormatterDef {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub index_width: usize,
    #[serde(default)]
    pub offset: i64,
}

impl Default for FormatterDef {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            index_width: 0,
            offset: 0,
        }
    }
}

fn default_separator() -> String {
    SimpleFormatter::DEFAULT_SEPARATOR.to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigDef {
    #[serde(default)]
    pub dagman_config: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub job_attributes: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub max_jobs_by_category: BTreeMap<String, u32>,
    #[serde(default)]
    pub jobstate_log: Option<PathBuf>,
    #[serde(default)]
    pub node_status_file: Option<NodeStatusFileDef>,
    #[serde(default)]
    pub dot: Option<DotDef>,
}

#[derive(Debug, Deserialize)]
pub struct NodeStatusFileDef {
    pub path: PathBuf,
    #[serde(default)]
    pub update_seconds: Option<u64>,
    #[serde(default)]
    pub always_update: bool,
}

#[derive(Debug, Deserialize)]
pub struct DotDef {
    pub path: PathBuf,
    #[serde(default)]
    pub update: bool,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub include_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Either inline submit text or a path to a submit file.
#[derive(Debug, Deserialize, Default)]
pub struct SubmitDef {
    #[serde(default)]
    pub submit: Option<String>,
    #[serde(default)]
    pub submit_file: Option<PathBuf>,
}

impl SubmitDef {
    fn resolve(&self, node: &str) -> Result<SubmitDescription> {
        match (&self.submit, &self.submit_file) {
            (Some(text), None) => Ok(SubmitDescription::inline(text.clone())),
            (None, Some(path)) => Ok(SubmitDescription::file(path.clone())),
            (Some(_), Some(_)) => Err(DagError::Manifest {
                details: format!("node '{node}' sets both submit and submit_file"),
            }),
            (None, None) => Err(DagError::Manifest {
                details: format!("node '{node}' needs submit or submit_file"),
            }),
        }
    }
}

/// `true`/`false` for every instance, or `{index: bool}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FlagsDef {
    All(bool),
    PerInstance(BTreeMap<usize, bool>),
}

impl From<&FlagsDef> for InstanceFlags {
    fn from(def: &FlagsDef) -> Self {
        match def {
            FlagsDef::All(value) => InstanceFlags::All(*value),
            FlagsDef::PerInstance(map) => InstanceFlags::PerInstance(map.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptDef {
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub retry_status: Option<i32>,
    #[serde(default)]
    pub retry_delay: Option<u64>,
}

impl From<&ScriptDef> for Script {
    fn from(def: &ScriptDef) -> Self {
        let script = Script::new(def.executable.clone()).with_arguments(def.arguments.clone());
        match def.retry_status {
            Some(status) => script.with_retry(status, def.retry_delay.unwrap_or(0)),
            None => script,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AbortDef {
    pub node_exit_value: i32,
    #[serde(default)]
    pub dag_return_value: Option<i32>,
}

/// Options shared by every node kind.
#[derive(Debug, Deserialize, Default)]
pub struct NodeOptionsDef {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub noop: Option<FlagsDef>,
    #[serde(default)]
    pub done: Option<FlagsDef>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_unless_exit: Option<i32>,
    #[serde(default)]
    pub pre: Option<ScriptDef>,
    #[serde(default)]
    pub post: Option<ScriptDef>,
    #[serde(default)]
    pub pre_skip: Option<i32>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub abort: Option<AbortDef>,
}

impl NodeOptionsDef {
    fn apply(&self, mut node: Node) -> Node {
        if let Some(dir) = &self.dir {
            node = node.with_dir(dir.clone());
        }
        if let Some(noop) = &self.noop {
            node = node.with_noop(noop);
        }
        if let Some(done) = &self.done {
            node = node.with_done(done);
        }
        if let Some(retries) = self.retries {
            node = node.with_retries(retries, self.retry_unless_exit);
        }
        if let Some(pre) = &self.pre {
            node = node.with_pre(pre.into());
        }
        if let Some(post) = &self.post {
            node = node.with_post(post.into());
        }
        if let Some(code) = self.pre_skip {
            node = node.with_pre_skip(code);
        }
        if let Some(category) = &self.category {
            node = node.with_category(category.clone());
        }
        if let Some(abort) = &self.abort {
            node = node.with_abort(abort.node_exit_value, abort.dag_return_value);
        }
        node.with_priority(self.priority)
    }
}

#[derive(Debug, Deserialize)]
pub struct LayerDef {
    pub name: String,
    #[serde(flatten)]
    pub submit: SubmitDef,
    #[serde(default)]
    pub vars: Vec<BTreeMap<String, serde_yaml::Value>>,
    #[serde(flatten)]
    pub options: NodeOptionsDef,
}

#[derive(Debug, Deserialize)]
pub struct SubDagDef {
    pub name: String,
    pub dag_file: PathBuf,
    #[serde(flatten)]
    pub options: NodeOptionsDef,
}

#[derive(Debug, Deserialize)]
pub struct FinalDef {
    pub name: String,
    #[serde(flatten)]
    pub submit: SubmitDef,
    #[serde(flatten)]
    pub options: NodeOptionsDef,
}

/// Handles string OR array for parents/children
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EdgeEndpoint {
    Single(String),
    Multiple(Vec<String>),
}

impl EdgeEndpoint {
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            EdgeEndpoint::Single(s) => vec![s.as_str()],
            EdgeEndpoint::Multiple(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EdgeKindDef {
    #[default]
    ManyToMany,
    OneToOne,
    Grouper {
        parent_chunk_size: usize,
        child_chunk_size: usize,
    },
    Slicer {
        #[serde(default)]
        parent_slice: Option<String>,
        #[serde(default)]
        child_slice: Option<String>,
    },
}

impl EdgeKindDef {
    fn resolve(&self) -> Result<EdgeKind> {
        let slice = |s: &Option<String>| -> Result<Slice> {
            s.as_deref().map(str::parse::<Slice>).unwrap_or(Ok(Slice::all()))
        };
        Ok(match self {
            EdgeKindDef::ManyToMany => EdgeKind::many_to_many(),
            EdgeKindDef::OneToOne => EdgeKind::one_to_one(),
            EdgeKindDef::Grouper {
                parent_chunk_size,
                child_chunk_size,
            } => EdgeKind::grouper(*parent_chunk_size, *child_chunk_size),
            EdgeKindDef::Slicer {
                parent_slice,
                child_slice,
            } => EdgeKind::slicer(slice(parent_slice)?, slice(child_slice)?),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EdgeDef {
    pub parents: EdgeEndpoint,
    pub children: EdgeEndpoint,
    #[serde(default)]
    pub edge: EdgeKindDef,
}

/// Render a YAML scalar the way it would be typed in a submit file.
fn scalar_to_string(key: &str, value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(DagError::Manifest {
            details: format!("value of '{key}' must be a string, number or boolean"),
        }),
    }
}

fn string_map(map: &BTreeMap<String, serde_yaml::Value>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), scalar_to_string(k, v)?)))
        .collect()
}

impl GraphManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn formatter(&self) -> Result<SimpleFormatter> {
        SimpleFormatter::new(
            self.formatter.separator.clone(),
            self.formatter.index_width,
            self.formatter.offset,
        )
    }

    pub fn graph_config(&self) -> Result<GraphConfig> {
        let c = &self.config;
        Ok(GraphConfig {
            dagman_config: string_map(&c.dagman_config)?,
            job_attributes: string_map(&c.job_attributes)?,
            max_jobs_by_category: c.max_jobs_by_category.clone(),
            jobstate_log: c.jobstate_log.clone(),
            node_status_file: c.node_status_file.as_ref().map(|s| NodeStatusFile {
                path: s.path.clone(),
                update_seconds: s.update_seconds,
                always_update: s.always_update,
            }),
            dot_config: c.dot.as_ref().map(|d| DotConfig {
                path: d.path.clone(),
                update: d.update,
                overwrite: d.overwrite,
                include_file: d.include_file.clone(),
            }),
        })
    }

    /// Build and validate the graph.
    pub fn build_graph(&self) -> Result<Graph> {
        let mut graph = Graph::with_config(self.graph_config()?);

        for layer in &self.layers {
            let vars = layer
                .vars
                .iter()
                .map(string_map)
                .collect::<Result<Vec<Vars>>>()?;
            let node = Node::layer(&layer.name, layer.submit.resolve(&layer.name)?).with_vars(vars);
            graph.insert(layer.options.apply(node))?;
        }

        for subdag in &self.subdags {
            let node = Node::subdag(&subdag.name, subdag.dag_file.clone());
            graph.insert(subdag.options.apply(node))?;
        }

        if let Some(f) = &self.final_node {
            let node = Node::final_node(&f.name, f.submit.resolve(&f.name)?);
            graph.insert(f.options.apply(node))?;
        }

        for edge in &self.edges {
            let parents: Nodes = edge.parents.as_vec().into_iter().map(NodeId::from).collect();
            let children: Nodes = edge.children.as_vec().into_iter().map(NodeId::from).collect();
            graph.add_children(&parents, &children, Some(edge.edge.resolve()?))?;
        }

        Ok(graph)
    }
}
