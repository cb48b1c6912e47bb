//! Error types with fix suggestions

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DagError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum DagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // ─────────────────────────────────────────────────────────────
    // Graph construction errors (DAG-001 to DAG-009)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-001: Node name '{name}' is already used by another node in this graph")]
    DuplicateNodeName { name: String },

    #[error("DAG-002: Invalid node name '{name}': {reason}")]
    InvalidNodeName { name: String, reason: String },

    #[error("DAG-003: Node '{name}' does not belong to this graph")]
    UnknownNode { name: String },

    #[error("DAG-004: Final node '{name}' cannot be the parent or child of an edge")]
    FinalNodeNotAddressable { name: String },

    #[error("DAG-005: Invalid glob pattern '{pattern}': {details}")]
    InvalidGlob { pattern: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Traversal errors (DAG-010)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-010: Unrecognized walk order '{order}' (expected depth-first or breadth-first)")]
    UnrecognizedWalkOrder { order: String },

    // ─────────────────────────────────────────────────────────────
    // Edge errors (DAG-020 to DAG-022)
    // ─────────────────────────────────────────────────────────────

    #[error(
        "DAG-020: OneToOne edge needs the same number of vars: parent '{parent}' has {parent_count}, child '{child}' has {child_count}"
    )]
    OneToOneEdgeNeedsSameNumberOfVars {
        parent: String,
        parent_count: usize,
        child: String,
        child_count: usize,
    },

    #[error("DAG-021: Incompatible grouper between '{parent}' and '{child}': {details}")]
    IncompatibleGrouper {
        parent: String,
        child: String,
        details: String,
    },

    #[error("DAG-022: Invalid slice: {details}")]
    InvalidSlice { details: String },

    // ─────────────────────────────────────────────────────────────
    // Formatter errors (DAG-030 to DAG-032)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-030: Layer name '{layer}' contains the node name separator '{separator}'")]
    LayerNameContainsSeparator { layer: String, separator: String },

    #[error("DAG-031: Node name '{text}' cannot be inverted by the formatter: {details}")]
    CannotInvertFormat { text: String, details: String },

    #[error("DAG-032: Invalid formatter: {details}")]
    InvalidFormatter { details: String },

    // ─────────────────────────────────────────────────────────────
    // Writer errors (DAG-035)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-035: Node '{node}' would overwrite submit file '{path}' referenced by another node")]
    SubmitFileConflict { node: String, path: String },

    // ─────────────────────────────────────────────────────────────
    // Rescue errors (DAG-040)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-040: No rescue file for '{dag_file}' found in {dir}")]
    NoRescueFileFound { dir: String, dag_file: String },

    // ─────────────────────────────────────────────────────────────
    // Manifest errors (DAG-050)
    // ─────────────────────────────────────────────────────────────

    #[error("DAG-050: Invalid manifest: {details}")]
    Manifest { details: String },
}

impl FixSuggestion for DagError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            DagError::Io(_) => Some("Check file path and permissions"),
            DagError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            DagError::DuplicateNodeName { .. } => {
                Some("Use unique names for layers, subdags and the final node")
            }
            DagError::InvalidNodeName { .. } => {
                Some("Use a non-empty name without whitespace or slashes that is not PARENT or CHILD")
            }
            DagError::UnknownNode { .. } => {
                Some("Create the node in this graph before connecting it")
            }
            DagError::FinalNodeNotAddressable { .. } => {
                Some("The final node always runs last; remove it from the edge")
            }
            DagError::InvalidGlob { .. } => Some("Use shell-style patterns such as 'layer_*'"),
            DagError::UnrecognizedWalkOrder { .. } => {
                Some("Use 'depth-first' (or 'dfs') or 'breadth-first' (or 'bfs')")
            }
            DagError::OneToOneEdgeNeedsSameNumberOfVars { .. } => {
                Some("Give both layers the same number of vars, or use a many-to-many edge")
            }
            DagError::IncompatibleGrouper { .. } => {
                Some("Pick chunk sizes that divide each layer evenly into the same number of chunks")
            }
            DagError::InvalidSlice { .. } => Some("Slice steps must be non-zero"),
            DagError::LayerNameContainsSeparator { .. } => {
                Some("Rename the layer or configure a different separator")
            }
            DagError::CannotInvertFormat { .. } => {
                Some("Check the formatter separator, width and offset produce parseable names")
            }
            DagError::InvalidFormatter { .. } => Some("Use a non-empty separator"),
            DagError::SubmitFileConflict { .. } => {
                Some("Rename the node or move the referenced submit file out of the DAG directory")
            }
            DagError::NoRescueFileFound { .. } => {
                Some("Run without --rescue, or point to the directory DAGMan wrote into")
            }
            DagError::Manifest { .. } => Some("Check the manifest fields against the documentation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_suggestion() {
        let errors = vec![
            DagError::DuplicateNodeName { name: "a".into() },
            DagError::UnrecognizedWalkOrder { order: "sideways".into() },
            DagError::NoRescueFileFound {
                dir: "/tmp".into(),
                dag_file: "d".into(),
            },
            DagError::SubmitFileConflict {
                node: "a".into(),
                path: "a.sub".into(),
            },
        ];
        for err in errors {
            assert!(err.fix_suggestion().is_some(), "{err}");
        }
    }

    #[test]
    fn one_to_one_message_names_both_layers() {
        let err = DagError::OneToOneEdgeNeedsSameNumberOfVars {
            parent: "a".into(),
            parent_count: 2,
            child: "b".into(),
            child_count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("'a' has 2"));
        assert!(msg.contains("'b' has 3"));
    }
}
