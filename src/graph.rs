//! The DAG container
//!
//! The graph owns every node and edge in flat, name-keyed tables. Edges are
//! stored once per ordered `(parent, child)` pair together with the strategy
//! used to expand them when writing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use glob::Pattern;
use tracing::debug;

use crate::edges::EdgeKind;
use crate::error::{DagError, Result};
use crate::node::{validate_name, Node, NodeId, Nodes, SubmitDescription, Vars};
use crate::walk::{self, WalkOrder};

// ============================================================================
// GRAPH CONFIGURATION
// ============================================================================

/// `NODE_STATUS_FILE` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatusFile {
    pub path: PathBuf,
    pub update_seconds: Option<u64>,
    pub always_update: bool,
}

impl NodeStatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            update_seconds: None,
            always_update: false,
        }
    }
}

/// `DOT` settings for graph visualization output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotConfig {
    pub path: PathBuf,
    pub update: bool,
    pub overwrite: bool,
    pub include_file: Option<PathBuf>,
}

impl DotConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            update: false,
            overwrite: true,
            include_file: None,
        }
    }
}

/// Graph-level options written into the meta block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// Engine options, written to a separate config file.
    pub dagman_config: BTreeMap<String, String>,
    /// `SET_JOB_ATTR` overrides.
    pub job_attributes: BTreeMap<String, String>,
    pub max_jobs_by_category: BTreeMap<String, u32>,
    pub jobstate_log: Option<PathBuf>,
    pub node_status_file: Option<NodeStatusFile>,
    pub dot_config: Option<DotConfig>,
}

// ============================================================================
// GRAPH
// ============================================================================

/// A workflow graph of layers, subdags and an optional final node.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<(NodeId, NodeId), EdgeKind>,
    final_node: Option<Node>,
    config: GraphConfig,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GraphConfig {
        &mut self.config
    }

    // ─────────────────────────────────────────────────────────────
    // Node creation
    // ─────────────────────────────────────────────────────────────

    /// Add a node of any kind. A final node replaces the current one.
    pub fn insert(&mut self, mut node: Node) -> Result<NodeId> {
        validate_name(node.name())?;
        self.check_unique(node.name())?;
        node.normalize_flags();

        let id = node.id().clone();
        debug!(node = %id, kind = node.kind().label(), instances = node.instances(), "add node");
        if node.is_final() {
            self.final_node = Some(node);
        } else {
            self.nodes.insert(id.clone(), node);
        }
        Ok(id)
    }

    /// Add a layer with one instance per entry of `vars`.
    pub fn layer(
        &mut self,
        name: impl AsRef<str>,
        submit_description: SubmitDescription,
        vars: Vec<Vars>,
    ) -> Result<NodeId> {
        self.insert(Node::layer(name, submit_description).with_vars(vars))
    }

    pub fn subdag(&mut self, name: impl AsRef<str>, dag_file: impl Into<PathBuf>) -> Result<NodeId> {
        self.insert(Node::subdag(name, dag_file))
    }

    pub fn set_final(
        &mut self,
        name: impl AsRef<str>,
        submit_description: SubmitDescription,
    ) -> Result<NodeId> {
        self.insert(Node::final_node(name, submit_description))
    }

    /// Add `node` as a child of every node in `parents`.
    pub fn insert_child(
        &mut self,
        parents: &Nodes,
        node: Node,
        edge: Option<EdgeKind>,
    ) -> Result<NodeId> {
        self.check_known(parents)?;
        Self::check_linkable(&node)?;
        let id = self.insert(node)?;
        self.add_children(parents, &Nodes::from(&id), edge)?;
        Ok(id)
    }

    /// Add `node` as a parent of every node in `children`.
    pub fn insert_parent(
        &mut self,
        children: &Nodes,
        node: Node,
        edge: Option<EdgeKind>,
    ) -> Result<NodeId> {
        self.check_known(children)?;
        Self::check_linkable(&node)?;
        let id = self.insert(node)?;
        self.add_parents(children, &Nodes::from(&id), edge)?;
        Ok(id)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        if let Some(node) = self.nodes.remove(name) {
            self.edges
                .retain(|(p, c), _| p.as_str() != name && c.as_str() != name);
            return Some(node);
        }
        if self.final_node.as_ref().is_some_and(|f| f.name() == name) {
            return self.final_node.take();
        }
        None
    }

    fn check_unique(&self, name: &str) -> Result<()> {
        let taken = self.nodes.contains_key(name)
            || self.final_node.as_ref().is_some_and(|f| f.name() == name);
        if taken {
            return Err(DagError::DuplicateNodeName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_addressable(&self, name: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Ok(());
        }
        if self.final_node.as_ref().is_some_and(|f| f.name() == name) {
            return Err(DagError::FinalNodeNotAddressable {
                name: name.to_string(),
            });
        }
        Err(DagError::UnknownNode {
            name: name.to_string(),
        })
    }

    fn check_linkable(node: &Node) -> Result<()> {
        if node.is_final() {
            return Err(DagError::FinalNodeNotAddressable {
                name: node.name().to_string(),
            });
        }
        Ok(())
    }

    fn check_known(&self, nodes: &Nodes) -> Result<()> {
        nodes.iter().try_for_each(|n| self.check_addressable(n))
    }

    // ─────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────

    /// Whether a layer or subdag with this name is in the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn final_node(&self) -> Option<&Node> {
        self.final_node.as_ref()
    }

    pub fn final_node_mut(&mut self) -> Option<&mut Node> {
        self.final_node.as_mut()
    }

    /// Layers and subdags in name order. The final node is not included.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn select<F>(&self, mut predicate: F) -> Nodes
    where
        F: FnMut(&Node) -> bool,
    {
        self.nodes
            .values()
            .filter(|&n| predicate(n))
            .map(|n| n.id().clone())
            .collect()
    }

    /// Nodes whose name matches a shell-style glob.
    pub fn glob(&self, pattern: &str) -> Result<Nodes> {
        let pattern = Pattern::new(pattern).map_err(|e| DagError::InvalidGlob {
            pattern: pattern.to_string(),
            details: e.to_string(),
        })?;
        Ok(self.select(|n| pattern.matches(n.name())))
    }

    // ─────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────

    /// Connect `parent` to `child`, replacing any existing edge between them.
    pub fn add_edge(&mut self, parent: &str, child: &str, edge: Option<EdgeKind>) -> Result<()> {
        self.check_addressable(parent)?;
        self.check_addressable(child)?;
        let edge = edge.unwrap_or_default();
        debug!(parent, child, %edge, "add edge");
        self.edges
            .insert((NodeId::new(parent), NodeId::new(child)), edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, parent: &str, child: &str) -> Option<EdgeKind> {
        self.edges
            .remove(&(NodeId::new(parent), NodeId::new(child)))
    }

    pub fn edge(&self, parent: &str, child: &str) -> Option<&EdgeKind> {
        self.edges.get(&(NodeId::new(parent), NodeId::new(child)))
    }

    /// Every `(parent, child, edge)` triple in name order.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &EdgeKind)> {
        self.edges.iter().map(|((p, c), e)| (p, c, e))
    }

    /// Connect every parent to every child with one edge per pair.
    pub fn add_children(
        &mut self,
        parents: &Nodes,
        children: &Nodes,
        edge: Option<EdgeKind>,
    ) -> Result<()> {
        self.check_known(parents)?;
        self.check_known(children)?;
        for parent in parents {
            for child in children {
                self.add_edge(parent, child, edge)?;
            }
        }
        Ok(())
    }

    pub fn add_parents(
        &mut self,
        children: &Nodes,
        parents: &Nodes,
        edge: Option<EdgeKind>,
    ) -> Result<()> {
        self.add_children(parents, children, edge)
    }

    pub fn remove_children(&mut self, parents: &Nodes, children: &Nodes) {
        for parent in parents {
            for child in children {
                self.remove_edge(parent, child);
            }
        }
    }

    pub fn remove_parents(&mut self, children: &Nodes, parents: &Nodes) {
        self.remove_children(parents, children)
    }

    // ─────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────

    pub fn node_to_children(&self) -> BTreeMap<NodeId, Nodes> {
        let mut map: BTreeMap<NodeId, Nodes> = self
            .nodes
            .keys()
            .map(|id| (id.clone(), Nodes::new()))
            .collect();
        for (parent, child) in self.edges.keys() {
            map.entry(parent.clone()).or_default().insert(child.clone());
        }
        map
    }

    pub fn node_to_parents(&self) -> BTreeMap<NodeId, Nodes> {
        let mut map: BTreeMap<NodeId, Nodes> = self
            .nodes
            .keys()
            .map(|id| (id.clone(), Nodes::new()))
            .collect();
        for (parent, child) in self.edges.keys() {
            map.entry(child.clone()).or_default().insert(parent.clone());
        }
        map
    }

    pub fn children(&self, name: &str) -> Nodes {
        self.edges
            .keys()
            .filter(|(p, _)| p.as_str() == name)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn parents(&self, name: &str) -> Nodes {
        self.edges
            .keys()
            .filter(|(_, c)| c.as_str() == name)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Nodes without parents.
    pub fn roots(&self) -> Nodes {
        self.node_to_parents()
            .into_iter()
            .filter(|(_, parents)| parents.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Nodes without children.
    pub fn leaves(&self) -> Nodes {
        self.node_to_children()
            .into_iter()
            .filter(|(_, children)| children.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────

    /// Every node reachable from the roots.
    pub fn walk(&self, order: WalkOrder) -> Vec<NodeId> {
        let children = self.node_to_children();
        walk::walk(self.roots(), order, |n| {
            children.get(n).map(|c| c.iter().cloned().collect()).unwrap_or_default()
        })
    }

    /// Nodes reachable by following child edges from `start`, not counting
    /// `start` itself unless a cycle leads back to it.
    pub fn walk_descendants(&self, start: &Nodes, order: WalkOrder) -> Vec<NodeId> {
        let children = self.node_to_children();
        let next = |n: &NodeId| -> Vec<NodeId> {
            children.get(n).map(|c| c.iter().cloned().collect()).unwrap_or_default()
        };
        let seed: Vec<NodeId> = start.iter().flat_map(next).collect();
        walk::walk(seed, order, next)
    }

    /// Nodes reachable by following parent edges from `start`.
    pub fn walk_ancestors(&self, start: &Nodes, order: WalkOrder) -> Vec<NodeId> {
        let parents = self.node_to_parents();
        let next = |n: &NodeId| -> Vec<NodeId> {
            parents.get(n).map(|c| c.iter().cloned().collect()).unwrap_or_default()
        };
        let seed: Vec<NodeId> = start.iter().flat_map(next).collect();
        walk::walk(seed, order, next)
    }

    // ─────────────────────────────────────────────────────────────
    // Description
    // ─────────────────────────────────────────────────────────────

    /// A plain-text table of every node, its size and its neighbours.
    pub fn describe(&self) -> String {
        let children = self.node_to_children();
        let parents = self.node_to_parents();

        let edge_list = |from: &NodeId, to: &Nodes, outgoing: bool| -> String {
            to.iter()
                .map(|other| {
                    let key = if outgoing {
                        (from.clone(), other.clone())
                    } else {
                        (other.clone(), from.clone())
                    };
                    match self.edges.get(&key) {
                        Some(edge) => format!("{other}[{edge}]"),
                        None => other.to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut rows = vec![[
            "Name".to_string(),
            "Type".to_string(),
            "Vars".to_string(),
            "Parents".to_string(),
            "Children".to_string(),
        ]];
        for node in self.nodes.values() {
            let id = node.id();
            rows.push([
                id.to_string(),
                node.kind().label().to_string(),
                node.instances().to_string(),
                parents.get(id).map(|p| edge_list(id, p, false)).unwrap_or_default(),
                children.get(id).map(|c| edge_list(id, c, true)).unwrap_or_default(),
            ]);
        }
        if let Some(f) = &self.final_node {
            rows.push([
                f.name().to_string(),
                f.kind().label().to_string(),
                "1".to_string(),
                String::new(),
                String::new(),
            ]);
        }

        let mut widths = [0usize; 5];
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for row in &rows {
            let line = row
                .iter()
                .zip(widths)
                .map(|(cell, w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join(" | ");
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}
