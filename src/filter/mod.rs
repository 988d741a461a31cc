//! Broad phase: cross-shape candidate pairs from overlapping boxes.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::bounds::{Aabb, BoundsIndex, Bvh, OVERLAP_EPSILON};
use crate::config::{CheckLevel, EngineConfig};
use crate::error::Result;
use crate::topology::{EntityId, EntityKind, ShapeId, TopologyStore};

/// The unordered kinds of the two entities of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KindPair {
    VertexVertex,
    VertexEdge,
    EdgeEdge,
    VertexFace,
    EdgeFace,
    FaceFace,
}

impl KindPair {
    /// All kind pairs, in level order.
    pub const ALL: [Self; 6] = [
        Self::VertexVertex,
        Self::VertexEdge,
        Self::EdgeEdge,
        Self::VertexFace,
        Self::EdgeFace,
        Self::FaceFace,
    ];

    /// The kind pair of two entity kinds, in either order.
    #[must_use]
    pub fn of(a: EntityKind, b: EntityKind) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        match (lo, hi) {
            (EntityKind::Vertex, EntityKind::Vertex) => Self::VertexVertex,
            (EntityKind::Vertex, EntityKind::Edge) => Self::VertexEdge,
            (EntityKind::Edge, EntityKind::Edge) => Self::EdgeEdge,
            (EntityKind::Vertex, EntityKind::Face) => Self::VertexFace,
            (EntityKind::Edge, EntityKind::Face) => Self::EdgeFace,
            _ => Self::FaceFace,
        }
    }

    /// Lowest check level that emits this kind pair.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::VertexVertex => 0,
            Self::VertexEdge => 1,
            Self::EdgeEdge => 2,
            Self::VertexFace => 3,
            Self::EdgeFace => 4,
            Self::FaceFace => 5,
        }
    }
}

impl fmt::Display for KindPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VertexVertex => "vertex/vertex",
            Self::VertexEdge => "vertex/edge",
            Self::EdgeEdge => "edge/edge",
            Self::VertexFace => "vertex/face",
            Self::EdgeFace => "edge/face",
            Self::FaceFace => "face/face",
        };
        f.write_str(s)
    }
}

/// Two entities, one from each shape, whose boxes overlap.
///
/// `a` always belongs to the first shape and `b` to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidatePair {
    pub a: EntityId,
    pub b: EntityId,
    pub kind: KindPair,
    pub level: CheckLevel,
}

impl CandidatePair {
    /// Creates a pair, deriving the kind pair from the entities.
    #[must_use]
    pub fn new(a: EntityId, b: EntityId, level: CheckLevel) -> Self {
        Self {
            a,
            b,
            kind: KindPair::of(a.kind(), b.kind()),
            level,
        }
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} ({})", self.a, self.b, self.kind)
    }
}

/// Emits every pair of entities, one from each shape, whose boxes overlap
/// and whose kinds are enabled by `config.level`.
///
/// Pairs come back sorted and without duplicates. When a shape is checked
/// against itself, each unordered entity pair is emitted once, with the
/// smaller id as `a`. When the number of box
/// tests `|A| * |B|` is at most `config.naive_filter_threshold`, all pairs
/// are tested directly (O(n*m)); above it the second shape's boxes are put
/// in a [`Bvh`] and queried with each box of the first.
///
/// # Errors
///
/// Returns an error if either shape is not in the store.
pub fn candidate_pairs(
    store: &TopologyStore,
    index: &mut BoundsIndex,
    shape_a: ShapeId,
    shape_b: ShapeId,
    config: &EngineConfig,
) -> Result<Vec<CandidatePair>> {
    let level = config.level;
    let enabled_kinds = |kind: EntityKind| {
        KindPair::ALL
            .iter()
            .any(|&kp| level.enables(kp) && kp_contains(kp, kind))
    };
    let entities_a: Vec<EntityId> = store
        .shape(shape_a)?
        .entities()
        .into_iter()
        .filter(|e| enabled_kinds(e.kind()))
        .collect();
    let entities_b: Vec<EntityId> = store
        .shape(shape_b)?
        .entities()
        .into_iter()
        .filter(|e| enabled_kinds(e.kind()))
        .collect();
    if entities_a.is_empty() || entities_b.is_empty() {
        return Ok(Vec::new());
    }

    index.insert_shape(store, shape_a, config)?;
    index.insert_shape(store, shape_b, config)?;
    let box_of = |e: EntityId| index.get(e).copied().unwrap_or_else(Aabb::unbounded);

    let mut pairs = BTreeSet::new();
    let same_shape = shape_a == shape_b;
    let mut consider = |a: EntityId, b: EntityId| {
        if a == b {
            return;
        }
        let (a, b) = if same_shape && b < a { (b, a) } else { (a, b) };
        let pair = CandidatePair::new(a, b, level);
        if level.enables(pair.kind) {
            pairs.insert(pair);
        }
    };

    let tests = entities_a.len().saturating_mul(entities_b.len());
    if tests <= config.naive_filter_threshold {
        for &a in &entities_a {
            let box_a = box_of(a);
            for &b in &entities_b {
                if BoundsIndex::overlaps(&box_a, &box_of(b)) {
                    consider(a, b);
                }
            }
        }
    } else {
        let bvh = Bvh::build(
            entities_b.iter().map(|&b| (b, box_of(b))).collect(),
            config.bvh_leaf_size,
        );
        for &a in &entities_a {
            for b in bvh.query(&box_of(a), OVERLAP_EPSILON) {
                consider(a, b);
            }
        }
    }

    debug!(
        a = entities_a.len(),
        b = entities_b.len(),
        pairs = pairs.len(),
        naive = tests <= config.naive_filter_threshold,
        "candidate pairs"
    );
    Ok(pairs.into_iter().collect())
}

fn kp_contains(kp: KindPair, kind: EntityKind) -> bool {
    match kp {
        KindPair::VertexVertex => kind == EntityKind::Vertex,
        KindPair::VertexEdge => kind != EntityKind::Face,
        KindPair::EdgeEdge => kind == EntityKind::Edge,
        KindPair::VertexFace => kind != EntityKind::Edge,
        KindPair::EdgeFace => kind != EntityKind::Vertex,
        KindPair::FaceFace => kind == EntityKind::Face,
    }
}
