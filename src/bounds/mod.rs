//! Per-entity axis-aligned bounding volumes.
//!
//! Boxes are built bottom-up (vertices, then edges, then faces), always
//! enlarged by the owning entity's tolerance, and cached by entity id.

mod bvh;

pub use bvh::Bvh;

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::geometry::adapter::face_parameter_box;
use crate::math::Point3;
use crate::topology::{EdgeId, EntityId, FaceId, ShapeId, TopologyStore};

/// Slack absorbing rounding error in overlap tests.
pub const OVERLAP_EPSILON: f64 = 1e-12;

/// Curve sampling starts with this many segments and doubles.
const EDGE_START_SEGMENTS: usize = 8;
const EDGE_MAX_SEGMENTS: usize = 4096;
/// Surface sampling grid per direction, doubled up to the cap.
const FACE_START_GRID: usize = 8;
const FACE_MAX_GRID: usize = 128;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3,
    /// Maximum corner of the bounding box.
    pub max: Point3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) bounding box.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// A box overlapping everything, used for entities whose extent cannot
    /// be computed so that their pairs still reach the narrow phase.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            min: Point3::new(f64::MIN, f64::MIN, f64::MIN),
            max: Point3::new(f64::MAX, f64::MAX, f64::MAX),
        }
    }

    /// A degenerate box around one point.
    #[must_use]
    pub fn from_point(point: &Point3) -> Self {
        Self {
            min: *point,
            max: *point,
        }
    }

    /// Expand this bounding box to include another.
    pub fn expand(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Expand this bounding box to include a point.
    pub fn expand_point(&mut self, point: &Point3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Pad this bounding box by a given amount in all directions.
    #[must_use]
    pub fn padded(&self, padding: f64) -> Self {
        if !self.is_valid() {
            return *self;
        }
        Self {
            min: Point3::new(self.min.x - padding, self.min.y - padding, self.min.z - padding),
            max: Point3::new(self.max.x + padding, self.max.y + padding, self.max.z + padding),
        }
    }

    /// Interval overlap test on all three axes with `eps` of slack.
    #[must_use]
    pub fn overlaps(&self, other: &Self, eps: f64) -> bool {
        self.min.x <= other.max.x + eps
            && self.max.x >= other.min.x - eps
            && self.min.y <= other.max.y + eps
            && self.max.y >= other.min.y - eps
            && self.min.z <= other.max.z + eps
            && self.max.z >= other.min.z - eps
    }

    /// Returns `true` if `point` lies inside the box, allowing `eps`.
    #[must_use]
    pub fn contains_point(&self, point: &Point3, eps: f64) -> bool {
        self.overlaps(&Self::from_point(point), eps)
    }

    /// Get the center of this bounding box.
    #[must_use]
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Get the index of the longest axis (0=X, 1=Y, 2=Z).
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Length of the diagonal.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        if self.is_valid() {
            (self.max - self.min).norm()
        } else {
            0.0
        }
    }

    /// Largest per-axis distance between the corners of two boxes, used to
    /// measure how much a refinement changed a box.
    #[must_use]
    pub fn max_corner_shift(&self, other: &Self) -> f64 {
        (self.min - other.min).amax().max((self.max - other.max).amax())
    }

    /// Check if this bounding box is valid (non-empty).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}

/// Cache of entity boxes.
#[derive(Debug, Default)]
pub struct BoundsIndex {
    boxes: HashMap<EntityId, Aabb>,
}

impl BoundsIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes and caches the boxes of every entity of `shape`, in
    /// parallel per dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is not found.
    pub fn insert_shape(&mut self, store: &TopologyStore, shape: ShapeId, config: &EngineConfig) -> Result<()> {
        let data = store.shape(shape)?;

        let vertex_boxes: Vec<(EntityId, Aabb)> = data
            .vertices
            .par_iter()
            .filter(|&&v| !self.boxes.contains_key(&EntityId::Vertex(v)))
            .map(|&v| {
                let e = EntityId::Vertex(v);
                (e, vertex_box(store, e, config))
            })
            .collect();
        self.boxes.extend(vertex_boxes);

        let edge_boxes: Vec<(EntityId, Aabb)> = data
            .edges
            .par_iter()
            .filter(|&&e| !self.boxes.contains_key(&EntityId::Edge(e)))
            .map(|&e| (EntityId::Edge(e), self.compute_edge(store, e, config)))
            .collect();
        self.boxes.extend(edge_boxes);

        let face_boxes: Vec<(EntityId, Aabb)> = data
            .faces
            .par_iter()
            .filter(|&&f| !self.boxes.contains_key(&EntityId::Face(f)))
            .map(|&f| (EntityId::Face(f), self.compute_face(store, f, config)))
            .collect();
        self.boxes.extend(face_boxes);

        debug!(entities = data.entity_count(), cached = self.boxes.len(), "shape boxes built");
        Ok(())
    }

    /// Returns the box of `entity`, computing and caching it on first use.
    pub fn box_of(&mut self, store: &TopologyStore, entity: EntityId, config: &EngineConfig) -> Aabb {
        if let Some(b) = self.boxes.get(&entity) {
            return *b;
        }
        let b = match entity {
            EntityId::Vertex(_) => vertex_box(store, entity, config),
            EntityId::Edge(id) => self.compute_edge(store, id, config),
            EntityId::Face(id) => {
                // Faces reuse their edges' boxes.
                if let Ok(edges) = store.face_edges(id) {
                    for oe in edges {
                        self.box_of(store, EntityId::Edge(oe.edge), config);
                    }
                }
                self.compute_face(store, id, config)
            }
        };
        self.boxes.insert(entity, b);
        b
    }

    /// Returns the cached box of `entity`, if computed.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&Aabb> {
        self.boxes.get(&entity)
    }

    /// Overlap test between two boxes with [`OVERLAP_EPSILON`] slack.
    #[must_use]
    pub fn overlaps(a: &Aabb, b: &Aabb) -> bool {
        a.overlaps(b, OVERLAP_EPSILON)
    }

    fn compute_edge(&self, store: &TopologyStore, id: EdgeId, config: &EngineConfig) -> Aabb {
        let entity = EntityId::Edge(id);
        let result = (|| -> Result<Aabb> {
            let tol = store.tolerance_of(entity, config.tolerance)?;
            let mut b = edge_sample_box(store, id, tol, config.bounds_refine_fraction)?;
            let edge = store.edge(id)?;
            for v in [edge.start, edge.end] {
                let vb = self
                    .boxes
                    .get(&EntityId::Vertex(v))
                    .copied()
                    .unwrap_or_else(|| vertex_box(store, EntityId::Vertex(v), config));
                b.expand(&vb);
            }
            Ok(b.padded(tol))
        })();
        result.unwrap_or_else(|err| {
            warn!(%entity, %err, "edge box unavailable, using unbounded box");
            Aabb::unbounded()
        })
    }

    fn compute_face(&self, store: &TopologyStore, id: FaceId, config: &EngineConfig) -> Aabb {
        let entity = EntityId::Face(id);
        let result = (|| -> Result<Aabb> {
            let tol = store.tolerance_of(entity, config.tolerance)?;
            let mut b = face_sample_box(store, id, tol, config.bounds_refine_fraction)?;
            for oe in store.face_edges(id)? {
                let eb = self
                    .boxes
                    .get(&EntityId::Edge(oe.edge))
                    .copied()
                    .unwrap_or_else(|| self.compute_edge(store, oe.edge, config));
                b.expand(&eb);
            }
            Ok(b.padded(tol))
        })();
        result.unwrap_or_else(|err| {
            warn!(%entity, %err, "face box unavailable, using unbounded box");
            Aabb::unbounded()
        })
    }
}

fn vertex_box(store: &TopologyStore, entity: EntityId, config: &EngineConfig) -> Aabb {
    let EntityId::Vertex(id) = entity else {
        return Aabb::unbounded();
    };
    match (store.vertex(id), store.tolerance_of(entity, config.tolerance)) {
        (Ok(v), Ok(tol)) => Aabb::from_point(&v.point).padded(tol),
        _ => Aabb::unbounded(),
    }
}

/// Samples an edge's curve, doubling the density until the box moves by
/// less than `fraction * tol`. The last change is kept as padding.
fn edge_sample_box(store: &TopologyStore, id: EdgeId, tol: f64, fraction: f64) -> Result<Aabb> {
    let edge = store.edge(id)?;
    let sample = |segments: usize| -> Result<Aabb> {
        let mut b = Aabb::empty();
        for i in 0..=segments {
            let t = edge.t_start + (edge.t_end - edge.t_start) * i as f64 / segments as f64;
            b.expand_point(&edge.curve.evaluate(t)?);
        }
        Ok(b)
    };

    let threshold = (fraction * tol).max(f64::EPSILON);
    let mut segments = EDGE_START_SEGMENTS;
    let mut current = sample(segments)?;
    loop {
        segments *= 2;
        let refined = sample(segments)?;
        let change = refined.max_corner_shift(&current);
        current = refined;
        if change < threshold || segments >= EDGE_MAX_SEGMENTS {
            return Ok(current.padded(change));
        }
    }
}

/// Samples the surface over the face's parameter box the same way.
fn face_sample_box(store: &TopologyStore, id: FaceId, tol: f64, fraction: f64) -> Result<Aabb> {
    let face = store.face(id)?;
    let domain = face_parameter_box(store, EntityId::Face(id))?;
    let sample = |grid: usize| -> Result<Aabb> {
        let mut b = Aabb::empty();
        for i in 0..=grid {
            let u = domain.u_min + (domain.u_max - domain.u_min) * i as f64 / grid as f64;
            for j in 0..=grid {
                let v = domain.v_min + (domain.v_max - domain.v_min) * j as f64 / grid as f64;
                b.expand_point(&face.surface.evaluate(u, v)?);
            }
        }
        Ok(b)
    };

    let threshold = (fraction * tol).max(f64::EPSILON);
    let mut grid = FACE_START_GRID;
    let mut current = sample(grid)?;
    loop {
        grid *= 2;
        let refined = sample(grid)?;
        let change = refined.max_corner_shift(&current);
        current = refined;
        if change < threshold || grid >= FACE_MAX_GRID {
            return Ok(current.padded(change));
        }
    }
}
