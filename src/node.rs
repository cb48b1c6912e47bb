//! Node model: layers, subdags and the final node
//!
//! Nodes are plain values owned by a [`Graph`](crate::Graph) and referred to by
//! [`NodeId`]. A node never points back at its graph; parents and children are
//! answered by the graph from its edge table.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::edges::JOIN_NODE_PREFIX;
use crate::error::{DagError, Result};

static NODE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+$").expect("valid regex"));

const RESERVED_NAMES: &[&str] = &["PARENT", "CHILD"];

/// Check a name can appear as a DAGMan node name.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| DagError::InvalidNodeName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if !NODE_NAME.is_match(name) {
        return Err(invalid("name cannot contain whitespace"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("name cannot contain a path separator"));
    }
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(invalid("name is a reserved DAG keyword"));
    }
    if name.starts_with(JOIN_NODE_PREFIX) {
        return Err(invalid("names starting with __JOIN__ are reserved for join nodes"));
    }
    Ok(())
}

// ============================================================================
// NODE ID
// ============================================================================

/// Cheap-to-clone handle naming a node in its graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(name: impl AsRef<str>) -> Self {
        NodeId(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for NodeId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

// ============================================================================
// NODES
// ============================================================================

/// A deduplicated set of node handles.
///
/// Bulk edge operations and multi-start walks take a `Nodes` so callers never
/// need to deduplicate by hand. Iteration is in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nodes(BTreeSet<NodeId>);

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }

    /// Names joined with `", "`.
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<NodeId> for Nodes {
    fn from(id: NodeId) -> Self {
        Nodes(BTreeSet::from([id]))
    }
}

impl From<&NodeId> for Nodes {
    fn from(id: &NodeId) -> Self {
        Nodes::from(id.clone())
    }
}

impl FromIterator<NodeId> for Nodes {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Nodes(iter.into_iter().collect())
    }
}

impl Extend<NodeId> for Nodes {
    fn extend<T: IntoIterator<Item = NodeId>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Nodes {
    type Item = NodeId;
    type IntoIter = std::collections::btree_set::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = &'a NodeId;
    type IntoIter = std::collections::btree_set::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// NODE OPTIONS
// ============================================================================

/// Per-instance variables of one layer instance.
pub type Vars = BTreeMap<String, String>;

/// A submit description: inline text or a path to an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDescription {
    Inline(String),
    File(PathBuf),
}

impl SubmitDescription {
    pub fn inline(text: impl Into<String>) -> Self {
        SubmitDescription::Inline(text.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        SubmitDescription::File(path.into())
    }
}

/// A boolean for every instance, or an explicit per-instance map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceFlags {
    All(bool),
    PerInstance(BTreeMap<usize, bool>),
}

impl Default for InstanceFlags {
    fn default() -> Self {
        InstanceFlags::PerInstance(BTreeMap::new())
    }
}

impl From<bool> for InstanceFlags {
    fn from(value: bool) -> Self {
        InstanceFlags::All(value)
    }
}

impl From<BTreeMap<usize, bool>> for InstanceFlags {
    fn from(map: BTreeMap<usize, bool>) -> Self {
        InstanceFlags::PerInstance(map)
    }
}

impl InstanceFlags {
    /// Flag for instance `index`; instances missing from a map are unset.
    pub fn get(&self, index: usize) -> bool {
        match self {
            InstanceFlags::All(value) => *value,
            InstanceFlags::PerInstance(map) => map.get(&index).copied().unwrap_or(false),
        }
    }

    /// Expand `All` into an explicit map over `instances`.
    pub fn normalized(self, instances: usize) -> Self {
        match self {
            InstanceFlags::All(value) => {
                InstanceFlags::PerInstance((0..instances).map(|i| (i, value)).collect())
            }
            map => map,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<usize, bool>> {
        match self {
            InstanceFlags::PerInstance(map) => Some(map),
            InstanceFlags::All(_) => None,
        }
    }
}

/// Deferred retry of a pre/post script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRetry {
    /// Script exit status that triggers the deferral.
    pub status: i32,
    /// Seconds to wait before rerunning.
    pub delay: u64,
}

/// A PRE or POST script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub executable: String,
    pub arguments: Vec<String>,
    pub retry: Option<ScriptRetry>,
}

impl Script {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            arguments: Vec::new(),
            retry: None,
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry(mut self, status: i32, delay: u64) -> Self {
        self.retry = Some(ScriptRetry { status, delay });
        self
    }
}

/// Abort the whole DAG when a node exits with a given value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortCondition {
    pub node_exit_value: i32,
    pub dag_return_value: Option<i32>,
}

/// Options shared by every node kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub dir: Option<PathBuf>,
    pub noop: InstanceFlags,
    pub done: InstanceFlags,
    pub retries: Option<u32>,
    pub retry_unless_exit: Option<i32>,
    pub pre: Option<Script>,
    pub post: Option<Script>,
    pub pre_skip: Option<i32>,
    pub priority: i32,
    pub category: Option<String>,
    pub abort: Option<AbortCondition>,
}

// ============================================================================
// NODE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub submit_description: SubmitDescription,
    pub vars: Vec<Vars>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDag {
    pub dag_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Final {
    pub submit_description: SubmitDescription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Layer(Layer),
    SubDag(SubDag),
    Final(Final),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Layer(_) => "Layer",
            NodeKind::SubDag(_) => "SubDAG",
            NodeKind::Final(_) => "Final",
        }
    }
}

/// A logical node of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    meta: NodeMeta,
}

impl Node {
    /// A layer with a single instance and no variables.
    pub fn layer(name: impl AsRef<str>, submit_description: SubmitDescription) -> Self {
        Self::with_kind(
            name,
            NodeKind::Layer(Layer {
                submit_description,
                vars: vec![Vars::new()],
            }),
        )
    }

    pub fn subdag(name: impl AsRef<str>, dag_file: impl Into<PathBuf>) -> Self {
        Self::with_kind(
            name,
            NodeKind::SubDag(SubDag {
                dag_file: dag_file.into(),
            }),
        )
    }

    pub fn final_node(name: impl AsRef<str>, submit_description: SubmitDescription) -> Self {
        Self::with_kind(name, NodeKind::Final(Final { submit_description }))
    }

    fn with_kind(name: impl AsRef<str>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(name),
            kind,
            meta: NodeMeta::default(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        &mut self.meta
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, NodeKind::Final(_))
    }

    /// Number of DAGMan nodes this node expands to.
    pub fn instances(&self) -> usize {
        match &self.kind {
            NodeKind::Layer(layer) => layer.vars.len().max(1),
            NodeKind::SubDag(_) | NodeKind::Final(_) => 1,
        }
    }

    /// Per-instance variables; empty for non-layers.
    pub fn vars(&self) -> &[Vars] {
        match &self.kind {
            NodeKind::Layer(layer) => &layer.vars,
            _ => &[],
        }
    }

    /// Replace a layer's variables. An empty list becomes one empty map so
    /// the layer keeps one real instance. Ignored for other kinds.
    pub fn set_vars(&mut self, vars: Vec<Vars>) {
        if let NodeKind::Layer(layer) = &mut self.kind {
            layer.vars = if vars.is_empty() { vec![Vars::new()] } else { vars };
        }
    }

    pub fn submit_description(&self) -> Option<&SubmitDescription> {
        match &self.kind {
            NodeKind::Layer(layer) => Some(&layer.submit_description),
            NodeKind::Final(f) => Some(&f.submit_description),
            NodeKind::SubDag(_) => None,
        }
    }

    pub fn dag_file(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::SubDag(subdag) => Some(&subdag.dag_file),
            _ => None,
        }
    }

    pub fn is_noop(&self, index: usize) -> bool {
        self.meta.noop.get(index)
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.meta.done.get(index)
    }

    pub fn set_noop(&mut self, noop: impl Into<InstanceFlags>) {
        self.meta.noop = noop.into().normalized(self.instances());
    }

    /// Overwrite the done state of every instance.
    pub fn set_done(&mut self, done: impl Into<InstanceFlags>) {
        self.meta.done = done.into().normalized(self.instances());
    }

    pub(crate) fn normalize_flags(&mut self) {
        let instances = self.instances();
        self.meta.noop = std::mem::take(&mut self.meta.noop).normalized(instances);
        self.meta.done = std::mem::take(&mut self.meta.done).normalized(instances);
    }

    // ─────────────────────────────────────────────────────────────
    // Builder-style setters
    // ─────────────────────────────────────────────────────────────

    pub fn with_vars(mut self, vars: Vec<Vars>) -> Self {
        self.set_vars(vars);
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.meta.dir = Some(dir.into());
        self
    }

    pub fn with_noop(mut self, noop: impl Into<InstanceFlags>) -> Self {
        self.meta.noop = noop.into();
        self
    }

    pub fn with_done(mut self, done: impl Into<InstanceFlags>) -> Self {
        self.meta.done = done.into();
        self
    }

    pub fn with_retries(mut self, retries: u32, unless_exit: Option<i32>) -> Self {
        self.meta.retries = Some(retries);
        self.meta.retry_unless_exit = unless_exit;
        self
    }

    pub fn with_pre(mut self, script: Script) -> Self {
        self.meta.pre = Some(script);
        self
    }

    pub fn with_post(mut self, script: Script) -> Self {
        self.meta.post = Some(script);
        self
    }

    pub fn with_pre_skip(mut self, exit_code: i32) -> Self {
        self.meta.pre_skip = Some(exit_code);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.meta.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.meta.category = Some(category.into());
        self
    }

    pub fn with_abort(mut self, node_exit_value: i32, dag_return_value: Option<i32>) -> Self {
        self.meta.abort = Some(AbortCondition {
            node_exit_value,
            dag_return_value,
        });
        self
    }
}
