pub mod builder;
pub mod edge;
pub mod entity;
pub mod face;
pub mod vertex;
pub mod wire;

pub use builder::ShapeBuilder;
pub use edge::{CurveHandle, EdgeData, EdgeId};
pub use entity::{EntityId, EntityKind};
pub use face::{FaceData, FaceId, SurfaceHandle};
pub use vertex::{VertexData, VertexId};
pub use wire::{OrientedEdge, WireData, WireId};

use crate::error::{Result, TopologyError};
use crate::math::TOLERANCE;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Unique identifier for a shape (one boolean-operation argument).
    pub struct ShapeId;
}

/// The entities belonging to one shape.
#[derive(Debug, Clone, Default)]
pub struct ShapeData {
    /// Vertices of the shape, in creation order.
    pub vertices: Vec<VertexId>,
    /// Edges of the shape, in creation order.
    pub edges: Vec<EdgeId>,
    /// Faces of the shape, in creation order.
    pub faces: Vec<FaceId>,
}

impl ShapeData {
    /// Total number of vertices, edges and faces.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.vertices.len() + self.edges.len() + self.faces.len()
    }

    /// All entities of the shape, vertices first, then edges, then faces.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.vertices
            .iter()
            .map(|&v| EntityId::Vertex(v))
            .chain(self.edges.iter().map(|&e| EntityId::Edge(e)))
            .chain(self.faces.iter().map(|&f| EntityId::Face(f)))
            .collect()
    }
}

/// Central arena that owns all topological entities.
///
/// Entities reference each other via typed IDs (generational indices),
/// avoiding self-referential structures. The store is only read during an
/// engine run, so it can be shared across worker threads.
#[derive(Debug, Default)]
pub struct TopologyStore {
    shapes: SlotMap<ShapeId, ShapeData>,
    vertices: SlotMap<VertexId, VertexData>,
    edges: SlotMap<EdgeId, EdgeData>,
    wires: SlotMap<WireId, WireData>,
    faces: SlotMap<FaceId, FaceData>,
}

impl TopologyStore {
    /// Creates a new, empty topology store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Shape operations ---

    /// Creates a new, empty shape and returns its ID.
    pub fn add_shape(&mut self) -> ShapeId {
        self.shapes.insert(ShapeData::default())
    }

    /// Returns a reference to the shape data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is not found in the store.
    pub fn shape(&self, id: ShapeId) -> Result<&ShapeData> {
        self.shapes
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("shape".into()).into())
    }

    // --- Vertex operations ---

    /// Inserts a vertex, registers it with its shape and returns its ID.
    pub fn add_vertex(&mut self, data: VertexData) -> VertexId {
        let shape = data.shape;
        let id = self.vertices.insert(data);
        if let Some(shape) = self.shapes.get_mut(shape) {
            shape.vertices.push(id);
        }
        id
    }

    /// Returns a reference to the vertex data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn vertex(&self, id: VertexId) -> Result<&VertexData> {
        self.vertices
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("vertex".into()).into())
    }

    // --- Edge operations ---

    /// Inserts an edge, registers it with its shape and returns its ID.
    pub fn add_edge(&mut self, data: EdgeData) -> EdgeId {
        let shape = data.shape;
        let id = self.edges.insert(data);
        if let Some(shape) = self.shapes.get_mut(shape) {
            shape.edges.push(id);
        }
        id
    }

    /// Returns a reference to the edge data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn edge(&self, id: EdgeId) -> Result<&EdgeData> {
        self.edges
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("edge".into()).into())
    }

    // --- Wire operations ---

    /// Inserts a wire and returns its ID.
    pub fn add_wire(&mut self, data: WireData) -> WireId {
        self.wires.insert(data)
    }

    /// Returns a reference to the wire data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn wire(&self, id: WireId) -> Result<&WireData> {
        self.wires
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("wire".into()).into())
    }

    // --- Face operations ---

    /// Inserts a face, registers it with its shape and returns its ID.
    pub fn add_face(&mut self, data: FaceData) -> FaceId {
        let shape = data.shape;
        let id = self.faces.insert(data);
        if let Some(shape) = self.shapes.get_mut(shape) {
            shape.faces.push(id);
        }
        id
    }

    /// Returns a reference to the face data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn face(&self, id: FaceId) -> Result<&FaceData> {
        self.faces
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("face".into()).into())
    }

    // --- Queries ---

    /// Returns the tolerance of an entity, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn tolerance_of(&self, entity: EntityId, default: f64) -> Result<f64> {
        let own = match entity {
            EntityId::Vertex(id) => self.vertex(id)?.tolerance,
            EntityId::Edge(id) => self.edge(id)?.tolerance,
            EntityId::Face(id) => self.face(id)?.tolerance,
        };
        Ok(own.unwrap_or(default).max(0.0))
    }

    /// Returns every edge used by the face's wires, in wire order.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or one of its wires is missing.
    pub fn face_edges(&self, face: FaceId) -> Result<Vec<OrientedEdge>> {
        let mut edges = Vec::new();
        for &wire in &self.face(face)?.wires {
            edges.extend_from_slice(&self.wire(wire)?.edges);
        }
        Ok(edges)
    }

    /// Checks the edge invariants: a forward, non-empty parameter range
    /// inside the curve domain, a non-zero length, and endpoints within
    /// tolerance of the curve.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Malformed`] naming the edge.
    pub fn validate_edge(&self, id: EdgeId, default_tolerance: f64) -> Result<()> {
        let entity = EntityId::Edge(id);
        let malformed = |reason: String| TopologyError::Malformed { entity, reason };

        let edge = self.edge(id)?;
        let tol = edge.tolerance.unwrap_or(default_tolerance);
        if edge.t_end - edge.t_start <= TOLERANCE {
            return Err(malformed(format!(
                "empty parameter range [{}, {}]",
                edge.t_start, edge.t_end
            ))
            .into());
        }
        let domain = edge.curve.domain();
        if !domain.contains(edge.t_start, TOLERANCE) || !domain.contains(edge.t_end, TOLERANCE) {
            return Err(malformed(format!(
                "range [{}, {}] outside curve domain [{}, {}]",
                edge.t_start, edge.t_end, domain.t_min, domain.t_max
            ))
            .into());
        }

        // Approximate length from a coarse polyline.
        let samples = 8;
        let mut length = 0.0;
        let mut prev = edge.curve.evaluate(edge.t_start)?;
        for i in 1..=samples {
            let t = edge.t_start + (edge.t_end - edge.t_start) * f64::from(i) / f64::from(samples);
            let p = edge.curve.evaluate(t)?;
            length += (p - prev).norm();
            prev = p;
        }
        if length <= tol.max(TOLERANCE) {
            return Err(malformed(format!("zero-length edge ({length:e})")).into());
        }

        for (vertex_id, t) in [(edge.start, edge.t_start), (edge.end, edge.t_end)] {
            let vertex = self.vertex(vertex_id)?;
            let allowed = tol.max(vertex.tolerance.unwrap_or(default_tolerance));
            let on_curve = edge.curve.evaluate(t)?;
            let gap = (on_curve - vertex.point).norm();
            if gap > allowed {
                return Err(malformed(format!(
                    "endpoint at t = {t} is {gap:e} from its vertex (tolerance {allowed:e})"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Checks that every wire of the face is a closed cycle of edges.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Malformed`] naming the face.
    pub fn validate_face(&self, id: FaceId) -> Result<()> {
        let entity = EntityId::Face(id);
        let face = self.face(id)?;
        if face.wires.is_empty() && !face.parameter_domain().is_bounded() {
            return Err(TopologyError::Malformed {
                entity,
                reason: "face without wires needs a bounded parameter domain".into(),
            }
            .into());
        }
        for &wire_id in &face.wires {
            let wire = self.wire(wire_id)?;
            if wire.edges.is_empty() {
                return Err(TopologyError::Malformed {
                    entity,
                    reason: "empty wire".into(),
                }
                .into());
            }
            for (i, oe) in wire.edges.iter().enumerate() {
                let next = wire.edges[(i + 1) % wire.edges.len()];
                let (_, end) = self.oriented_vertices(*oe)?;
                let (start, _) = self.oriented_vertices(next)?;
                if end != start {
                    return Err(TopologyError::Malformed {
                        entity,
                        reason: TopologyError::WireNotClosed.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Returns the (first, last) vertices of an edge as traversed.
    fn oriented_vertices(&self, oe: OrientedEdge) -> Result<(VertexId, VertexId)> {
        let edge = self.edge(oe.edge)?;
        Ok(if oe.forward {
            (edge.start, edge.end)
        } else {
            (edge.end, edge.start)
        })
    }
}
