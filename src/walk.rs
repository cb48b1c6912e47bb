//! Traversal order for graph walks

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::DagError;

/// Which end of the frontier a walk pops from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Pop the most recently discovered node first (stack).
    #[default]
    DepthFirst,
    /// Pop the oldest discovered node first (queue).
    BreadthFirst,
}

impl FromStr for WalkOrder {
    type Err = DagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "depth-first" | "depth_first" | "dfs" => Ok(WalkOrder::DepthFirst),
            "breadth-first" | "breadth_first" | "bfs" => Ok(WalkOrder::BreadthFirst),
            _ => Err(DagError::UnrecognizedWalkOrder {
                order: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for WalkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkOrder::DepthFirst => write!(f, "depth-first"),
            WalkOrder::BreadthFirst => write!(f, "breadth-first"),
        }
    }
}

/// Walk from `start`, growing the frontier with `next`.
///
/// Each node is yielded at most once, so cycles terminate.
pub(crate) fn walk<T, F, I>(start: I, order: WalkOrder, mut next: F) -> Vec<T>
where
    T: Clone + Eq + std::hash::Hash,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Vec<T>,
{
    let mut frontier: VecDeque<T> = start.into_iter().collect();
    let mut seen: HashSet<T> = HashSet::new();
    let mut out = Vec::new();

    loop {
        let node = match order {
            WalkOrder::DepthFirst => frontier.pop_back(),
            WalkOrder::BreadthFirst => frontier.pop_front(),
        };
        let Some(node) = node else { break };

        if !seen.insert(node.clone()) {
            continue;
        }
        frontier.extend(next(&node));
        out.push(node);
    }

    out
}
