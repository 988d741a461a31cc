use crate::math::Point3;

use super::ShapeId;

slotmap::new_key_type! {
    /// Unique identifier for a vertex in the topology store.
    pub struct VertexId;
}

/// Data associated with a topological vertex.
#[derive(Debug, Clone)]
pub struct VertexData {
    /// The 3D position of the vertex.
    pub point: Point3,
    /// Positional uncertainty radius; `None` uses the engine default.
    pub tolerance: Option<f64>,
    /// The shape owning this vertex.
    pub shape: ShapeId,
}

impl VertexData {
    /// Creates a new vertex at the given point.
    #[must_use]
    pub fn new(shape: ShapeId, point: Point3) -> Self {
        Self {
            point,
            tolerance: None,
            shape,
        }
    }

    /// Overrides the default tolerance for this vertex.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}
