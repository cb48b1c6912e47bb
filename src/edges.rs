//! Edge strategies between layers
//!
//! A logical edge connects two nodes whose instance counts may both be large.
//! Each strategy expands the logical edge into `PARENT ... CHILD ...` groups,
//! inserting synthetic join nodes where that keeps the output linear in the
//! number of instances instead of quadratic.

use std::fmt;
use std::str::FromStr;

use crate::error::{DagError, Result};

/// Prefix of every join node name in a written DAG.
pub const JOIN_NODE_PREFIX: &str = "__JOIN__";

/// A synthetic no-op node used to fan in and fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinNode(pub usize);

impl JoinNode {
    pub fn id(&self) -> usize {
        self.0
    }
}

impl fmt::Display for JoinNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{JOIN_NODE_PREFIX}{}", self.0)
    }
}

/// Allocates join nodes for a single write.
#[derive(Debug, Default)]
pub struct JoinFactory {
    next: usize,
}

impl JoinFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_join_node(&mut self) -> JoinNode {
        let node = JoinNode(self.next);
        self.next += 1;
        node
    }

    /// All join nodes handed out so far, in allocation order.
    pub fn allocated(&self) -> impl Iterator<Item = JoinNode> {
        (0..self.next).map(JoinNode)
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// One side of an emitted `PARENT ... CHILD ...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexGroup {
    Indices(Vec<usize>),
    Join(JoinNode),
}

impl IndexGroup {
    fn all(count: usize) -> Self {
        IndexGroup::Indices((0..count).collect())
    }

    fn one(index: usize) -> Self {
        IndexGroup::Indices(vec![index])
    }
}

pub type EdgePair = (IndexGroup, IndexGroup);

/// Name and instance count of an edge endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EdgeEnd<'a> {
    pub name: &'a str,
    pub instances: usize,
}

impl<'a> EdgeEnd<'a> {
    pub fn new(name: &'a str, instances: usize) -> Self {
        Self { name, instances }
    }
}

/// Expands a logical edge into index groups.
pub trait Edge {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>>;
}

// ============================================================================
// MANY TO MANY
// ============================================================================

/// Every parent instance must finish before any child instance starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManyToMany;

impl Edge for ManyToMany {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>> {
        if parent.instances == 1 || child.instances == 1 {
            return Ok(vec![(
                IndexGroup::all(parent.instances),
                IndexGroup::all(child.instances),
            )]);
        }

        let join = joins.get_join_node();
        Ok(vec![
            (IndexGroup::all(parent.instances), IndexGroup::Join(join)),
            (IndexGroup::Join(join), IndexGroup::all(child.instances)),
        ])
    }
}

// ============================================================================
// ONE TO ONE
// ============================================================================

/// Instance `i` of the child depends only on instance `i` of the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneToOne;

impl Edge for OneToOne {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        _joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>> {
        if parent.instances != child.instances {
            return Err(DagError::OneToOneEdgeNeedsSameNumberOfVars {
                parent: parent.name.to_string(),
                parent_count: parent.instances,
                child: child.name.to_string(),
                child_count: child.instances,
            });
        }

        Ok((0..parent.instances)
            .map(|i| (IndexGroup::one(i), IndexGroup::one(i)))
            .collect())
    }
}

// ============================================================================
// GROUPER
// ============================================================================

/// Connects consecutive chunks of the parent to consecutive chunks of the
/// child, chunk `k` to chunk `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grouper {
    pub parent_chunk_size: usize,
    pub child_chunk_size: usize,
}

impl Grouper {
    pub fn new(parent_chunk_size: usize, child_chunk_size: usize) -> Self {
        Self {
            parent_chunk_size,
            child_chunk_size,
        }
    }

    fn chunks(&self, parent: EdgeEnd<'_>, child: EdgeEnd<'_>) -> Result<usize> {
        let incompatible = |details: String| DagError::IncompatibleGrouper {
            parent: parent.name.to_string(),
            child: child.name.to_string(),
            details,
        };

        if self.parent_chunk_size == 0 || self.child_chunk_size == 0 {
            return Err(incompatible(format!(
                "chunk sizes must be positive (got {} and {})",
                self.parent_chunk_size, self.child_chunk_size
            )));
        }

        let parent_chunks = parent.instances as f64 / self.parent_chunk_size as f64;
        let child_chunks = child.instances as f64 / self.child_chunk_size as f64;

        if parent.instances % self.parent_chunk_size != 0 {
            return Err(incompatible(format!(
                "parent chunk size {} does not evenly divide {} instances ({parent_chunks:.2} chunks)",
                self.parent_chunk_size, parent.instances
            )));
        }
        if child.instances % self.child_chunk_size != 0 {
            return Err(incompatible(format!(
                "child chunk size {} does not evenly divide {} instances ({child_chunks:.2} chunks)",
                self.child_chunk_size, child.instances
            )));
        }

        let parent_chunks = parent.instances / self.parent_chunk_size;
        let child_chunks = child.instances / self.child_chunk_size;
        if parent_chunks != child_chunks {
            return Err(incompatible(format!(
                "parent has {parent_chunks} chunks but child has {child_chunks} chunks"
            )));
        }

        Ok(parent_chunks)
    }
}

impl Edge for Grouper {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>> {
        let chunks = self.chunks(parent, child)?;
        let mut pairs = Vec::with_capacity(chunks * 2);

        for k in 0..chunks {
            let p = k * self.parent_chunk_size..(k + 1) * self.parent_chunk_size;
            let c = k * self.child_chunk_size..(k + 1) * self.child_chunk_size;
            let join = joins.get_join_node();
            pairs.push((IndexGroup::Indices(p.collect()), IndexGroup::Join(join)));
            pairs.push((IndexGroup::Join(join), IndexGroup::Indices(c.collect())));
        }

        Ok(pairs)
    }
}

// ============================================================================
// SLICER
// ============================================================================

/// `start:stop:step` over `0..n`; negative bounds count from the end and a
/// negative step walks backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Self> {
        if step == Some(0) {
            return Err(DagError::InvalidSlice {
                details: "slice step cannot be zero".to_string(),
            });
        }
        Ok(Self { start, stop, step })
    }

    /// The full range, `::`.
    pub fn all() -> Self {
        Self::default()
    }

    /// Indices of `0..len` selected by this slice, in order.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };

        let clamp = |bound: i64| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };
        let start = self
            .start
            .map(clamp)
            .unwrap_or(if step > 0 { lower } else { upper });
        let stop = self
            .stop
            .map(clamp)
            .unwrap_or(if step > 0 { upper } else { lower });

        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        out
    }
}

impl FromStr for Slice {
    type Err = DagError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DagError::InvalidSlice {
            details: format!("'{s}' is not of the form start:stop[:step]"),
        };
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }

        let field = |p: &str| -> Result<Option<i64>> {
            let p = p.trim();
            if p.is_empty() {
                Ok(None)
            } else {
                p.parse().map(Some).map_err(|_| invalid())
            }
        };

        Slice::new(
            field(parts[0])?,
            field(parts[1])?,
            parts.get(2).map(|p| field(*p)).transpose()?.flatten(),
        )
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", show(self.start), show(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

/// Connects the sliced parent indices to the sliced child indices by
/// position.
///
/// When the two slices select different numbers of indices the longer one is
/// truncated; no error is raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slicer {
    pub parent_slice: Slice,
    pub child_slice: Slice,
}

impl Slicer {
    pub fn new(parent_slice: Slice, child_slice: Slice) -> Self {
        Self {
            parent_slice,
            child_slice,
        }
    }
}

impl Edge for Slicer {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        _joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>> {
        let parents = self.parent_slice.indices(parent.instances);
        let children = self.child_slice.indices(child.instances);

        Ok(parents
            .into_iter()
            .zip(children)
            .map(|(p, c)| (IndexGroup::one(p), IndexGroup::one(c)))
            .collect())
    }
}

// ============================================================================
// EDGE KIND
// ============================================================================

/// The closed set of edge strategies a graph can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    ManyToMany(ManyToMany),
    OneToOne(OneToOne),
    Grouper(Grouper),
    Slicer(Slicer),
}

impl Default for EdgeKind {
    fn default() -> Self {
        EdgeKind::ManyToMany(ManyToMany)
    }
}

impl EdgeKind {
    pub fn many_to_many() -> Self {
        EdgeKind::ManyToMany(ManyToMany)
    }

    pub fn one_to_one() -> Self {
        EdgeKind::OneToOne(OneToOne)
    }

    pub fn grouper(parent_chunk_size: usize, child_chunk_size: usize) -> Self {
        EdgeKind::Grouper(Grouper::new(parent_chunk_size, child_chunk_size))
    }

    pub fn slicer(parent_slice: Slice, child_slice: Slice) -> Self {
        EdgeKind::Slicer(Slicer::new(parent_slice, child_slice))
    }
}

impl Edge for EdgeKind {
    fn generate(
        &self,
        parent: EdgeEnd<'_>,
        child: EdgeEnd<'_>,
        joins: &mut JoinFactory,
    ) -> Result<Vec<EdgePair>> {
        match self {
            EdgeKind::ManyToMany(e) => e.generate(parent, child, joins),
            EdgeKind::OneToOne(e) => e.generate(parent, child, joins),
            EdgeKind::Grouper(e) => e.generate(parent, child, joins),
            EdgeKind::Slicer(e) => e.generate(parent, child, joins),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::ManyToMany(_) => write!(f, "ManyToMany"),
            EdgeKind::OneToOne(_) => write!(f, "OneToOne"),
            EdgeKind::Grouper(g) => write!(
                f,
                "Grouper({}, {})",
                g.parent_chunk_size, g.child_chunk_size
            ),
            EdgeKind::Slicer(s) => write!(f, "Slicer({}, {})", s.parent_slice, s.child_slice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(name: &str, instances: usize) -> EdgeEnd<'_> {
        EdgeEnd::new(name, instances)
    }

    #[test]
    fn many_to_many_single_parent_needs_no_join() {
        let mut joins = JoinFactory::new();
        for n in [1, 2, 50] {
            let pairs = ManyToMany.generate(end("p", 1), end("c", n), &mut joins).unwrap();
            assert_eq!(pairs.len(), 1);
            assert_eq!(pairs[0].1, IndexGroup::Indices((0..n).collect()));
        }
        assert!(joins.is_empty());
    }

    #[test]
    fn many_to_many_uses_one_join() {
        let mut joins = JoinFactory::new();
        let pairs = ManyToMany.generate(end("p", 3), end("c", 4), &mut joins).unwrap();
        assert_eq!(
            pairs,
            vec![
                (IndexGroup::Indices(vec![0, 1, 2]), IndexGroup::Join(JoinNode(0))),
                (IndexGroup::Join(JoinNode(0)), IndexGroup::Indices(vec![0, 1, 2, 3])),
            ]
        );
        assert_eq!(joins.allocated().count(), 1);
    }

    #[test]
    fn one_to_one_pairs_indices() {
        let mut joins = JoinFactory::new();
        let pairs = OneToOne.generate(end("p", 3), end("c", 3), &mut joins).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[2], (IndexGroup::one(2), IndexGroup::one(2)));
    }

    #[test]
    fn one_to_one_rejects_mismatch() {
        let mut joins = JoinFactory::new();
        let err = OneToOne
            .generate(end("p", 3), end("c", 4), &mut joins)
            .unwrap_err();
        assert!(matches!(
            err,
            DagError::OneToOneEdgeNeedsSameNumberOfVars {
                parent_count: 3,
                child_count: 4,
                ..
            }
        ));
    }

    #[test]
    fn grouper_matches_chunks() {
        let mut joins = JoinFactory::new();
        let pairs = Grouper::new(3, 2)
            .generate(end("p", 6), end("c", 4), &mut joins)
            .unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0].0, IndexGroup::Indices(vec![0, 1, 2]));
        assert_eq!(pairs[1].1, IndexGroup::Indices(vec![0, 1]));
        assert_eq!(pairs[2].0, IndexGroup::Indices(vec![3, 4, 5]));
        assert_eq!(pairs[3], (IndexGroup::Join(JoinNode(1)), IndexGroup::Indices(vec![2, 3])));
    }

    #[test]
    fn grouper_rejects_uneven_child() {
        let mut joins = JoinFactory::new();
        let err = Grouper::new(3, 3)
            .generate(end("p", 6), end("c", 4), &mut joins)
            .unwrap_err();
        match err {
            DagError::IncompatibleGrouper { details, .. } => assert!(details.contains("1.33")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn grouper_rejects_chunk_count_mismatch() {
        let mut joins = JoinFactory::new();
        let err = Grouper::new(2, 2)
            .generate(end("p", 6), end("c", 4), &mut joins)
            .unwrap_err();
        match err {
            DagError::IncompatibleGrouper { details, .. } => {
                assert!(details.contains("3 chunks"));
                assert!(details.contains("2 chunks"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn slice_indices_handle_negative_bounds_and_steps() {
        let s = |text: &str| text.parse::<Slice>().unwrap();
        assert_eq!(s("::").indices(4), vec![0, 1, 2, 3]);
        assert_eq!(s("1:").indices(4), vec![1, 2, 3]);
        assert_eq!(s("::2").indices(5), vec![0, 2, 4]);
        assert_eq!(s("-2:").indices(5), vec![3, 4]);
        assert_eq!(s("::-1").indices(3), vec![2, 1, 0]);
        assert_eq!(s("10:20").indices(3), Vec::<usize>::new());
    }

    #[test]
    fn slice_rejects_zero_step() {
        assert!(matches!("::0".parse::<Slice>(), Err(DagError::InvalidSlice { .. })));
        assert!("1".parse::<Slice>().is_err());
    }

    #[test]
    fn slice_with_huge_step_stops_after_first_index() {
        let s = |text: &str| text.parse::<Slice>().unwrap();
        assert_eq!(s("1::9223372036854775807").indices(3), vec![1]);
        assert_eq!(s("::-9223372036854775808").indices(3), vec![2]);
    }

    #[test]
    fn slicer_truncates_to_shorter_side() {
        // mismatched lengths are silently truncated rather than rejected
        let mut joins = JoinFactory::new();
        let slicer = Slicer::new(Slice::all(), "1:".parse().unwrap());
        let pairs = slicer.generate(end("p", 4), end("c", 4), &mut joins).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], (IndexGroup::one(0), IndexGroup::one(1)));
        assert_eq!(pairs[2], (IndexGroup::one(2), IndexGroup::one(3)));
    }

    #[test]
    fn edge_kind_display() {
        assert_eq!(EdgeKind::default().to_string(), "ManyToMany");
        assert_eq!(EdgeKind::grouper(3, 2).to_string(), "Grouper(3, 2)");
        let slicer = EdgeKind::slicer(Slice::all(), "1::2".parse().unwrap());
        assert_eq!(slicer.to_string(), "Slicer(:, 1::2)");
    }
}
