//! dagscribe - build, validate and write HTCondor DAGMan workflow graphs

pub mod edges;
pub mod error;
pub mod formatter;
pub mod graph;
pub mod manifest;
pub mod node;
pub mod rescue;
pub mod walk;
pub mod writer;

pub use edges::{
    Edge, EdgeEnd, EdgeKind, EdgePair, Grouper, IndexGroup, JoinFactory, JoinNode, ManyToMany,
    OneToOne, Slice, Slicer,
};
pub use error::{DagError, FixSuggestion, Result};
pub use formatter::{NodeNameFormatter, SimpleFormatter};
pub use graph::{DotConfig, Graph, GraphConfig, NodeStatusFile};
pub use manifest::GraphManifest;
pub use node::{
    AbortCondition, InstanceFlags, Node, NodeId, NodeKind, NodeMeta, Nodes, Script, ScriptRetry,
    SubmitDescription, Vars,
};
pub use rescue::{apply_rescue, find_rescue_file, rescue};
pub use walk::WalkOrder;
pub use writer::{write_dag, DagWriter, DEFAULT_DAG_FILE_NAME};
