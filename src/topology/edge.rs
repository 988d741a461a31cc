use std::sync::Arc;

use crate::geometry::curve::Curve;

use super::vertex::VertexId;
use super::ShapeId;

slotmap::new_key_type! {
    /// Unique identifier for an edge in the topology store.
    pub struct EdgeId;
}

/// Shared handle to the curve carried by an edge.
pub type CurveHandle = Arc<dyn Curve>;

/// Data associated with a topological edge.
///
/// An edge connects two vertices and carries a geometric curve
/// that defines the shape of the edge between them. A closed edge
/// (full circle) uses the same vertex at both ends.
#[derive(Debug, Clone)]
pub struct EdgeData {
    /// Start vertex of the edge.
    pub start: VertexId,
    /// End vertex of the edge.
    pub end: VertexId,
    /// The geometric curve defining this edge's shape.
    pub curve: CurveHandle,
    /// Parameter on the curve corresponding to the start vertex.
    pub t_start: f64,
    /// Parameter on the curve corresponding to the end vertex.
    pub t_end: f64,
    /// Positional uncertainty radius; `None` uses the engine default.
    pub tolerance: Option<f64>,
    /// The shape owning this edge.
    pub shape: ShapeId,
}
