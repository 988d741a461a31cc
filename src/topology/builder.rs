use std::sync::Arc;

use crate::error::{GeometryError, Result};
use crate::geometry::curve::{Circle, Curve, Line};
use crate::geometry::surface::{Plane, Surface, SurfaceDomain};
use crate::math::{Point3, TOLERANCE};

use super::{
    CurveHandle, EdgeData, EdgeId, FaceData, FaceId, OrientedEdge, ShapeId, SurfaceHandle,
    TopologyStore, VertexData, VertexId, WireData, WireId,
};

/// Incrementally creates the entities of one shape in a [`TopologyStore`].
///
/// Every entity added through the builder is registered with the shape
/// created in [`ShapeBuilder::new`].
pub struct ShapeBuilder<'a> {
    store: &'a mut TopologyStore,
    shape: ShapeId,
}

impl<'a> ShapeBuilder<'a> {
    /// Creates a new, empty shape in `store`.
    pub fn new(store: &'a mut TopologyStore) -> Self {
        let shape = store.add_shape();
        Self { store, shape }
    }

    /// Returns the ID of the shape under construction.
    #[must_use]
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Adds a vertex using the engine's default tolerance.
    pub fn vertex(&mut self, point: Point3) -> VertexId {
        self.store.add_vertex(VertexData::new(self.shape, point))
    }

    /// Adds a vertex with its own tolerance.
    pub fn vertex_with_tolerance(&mut self, point: Point3, tolerance: f64) -> VertexId {
        self.store
            .add_vertex(VertexData::new(self.shape, point).with_tolerance(tolerance))
    }

    /// Adds an edge over an arbitrary curve range.
    pub fn curve_edge(
        &mut self,
        curve: CurveHandle,
        start: VertexId,
        end: VertexId,
        t_start: f64,
        t_end: f64,
    ) -> EdgeId {
        self.store.add_edge(EdgeData {
            start,
            end,
            curve,
            t_start,
            t_end,
            tolerance: None,
            shape: self.shape,
        })
    }

    /// Adds a straight edge between two existing vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex is missing or the two vertices coincide.
    pub fn line_edge(&mut self, start: VertexId, end: VertexId) -> Result<EdgeId> {
        let a = self.store.vertex(start)?.point;
        let b = self.store.vertex(end)?.point;
        let (line, t_end) = Line::through(a, b)?;
        Ok(self.curve_edge(Arc::new(line), start, end, 0.0, t_end))
    }

    /// Adds a closed edge covering a full circle. The single vertex sits at
    /// the circle's parameter origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the circle cannot be evaluated.
    pub fn circle_edge(&mut self, circle: Circle) -> Result<EdgeId> {
        let domain = circle.domain();
        let vertex = self.vertex(circle.evaluate(domain.t_min)?);
        Ok(self.curve_edge(Arc::new(circle), vertex, vertex, domain.t_min, domain.t_max))
    }

    /// Adds a wire from oriented edges forming a cycle.
    pub fn wire(&mut self, edges: Vec<OrientedEdge>) -> WireId {
        self.store.add_wire(WireData { edges })
    }

    /// Adds a face on `surface` bounded by `wires`.
    pub fn face(&mut self, surface: SurfaceHandle, wires: Vec<WireId>) -> FaceId {
        self.store.add_face(FaceData {
            surface,
            wires,
            domain: None,
            same_sense: true,
            tolerance: None,
            shape: self.shape,
        })
    }

    /// Adds a face bounded only by a parameter rectangle, without wires.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipped domain is empty or unbounded.
    pub fn trimmed_face(&mut self, surface: SurfaceHandle, limits: SurfaceDomain) -> Result<FaceId> {
        let domain = surface.domain().intersect(&limits);
        if !domain.is_bounded()
            || domain.u_max - domain.u_min < TOLERANCE
            || domain.v_max - domain.v_min < TOLERANCE
        {
            return Err(GeometryError::Degenerate(format!(
                "face limits [{}, {}] x [{}, {}] are empty or unbounded",
                domain.u_min, domain.u_max, domain.v_min, domain.v_max
            ))
            .into());
        }
        Ok(self.store.add_face(FaceData {
            surface,
            wires: Vec::new(),
            domain: Some(limits),
            same_sense: true,
            tolerance: None,
            shape: self.shape,
        }))
    }

    /// Adds a rectangular planar face `[u0, u1] x [v0, v1]` in the plane's
    /// parameter space, with four vertices, four line edges and one wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the rectangle is degenerate.
    pub fn rectangle_face(&mut self, plane: Plane, u0: f64, u1: f64, v0: f64, v1: f64) -> Result<FaceId> {
        let corners = [(u0, v0), (u1, v0), (u1, v1), (u0, v1)];
        let mut vertices = Vec::with_capacity(4);
        for (u, v) in corners {
            vertices.push(self.vertex(plane.evaluate(u, v)?));
        }
        let mut edges = Vec::with_capacity(4);
        for i in 0..4 {
            let edge = self.line_edge(vertices[i], vertices[(i + 1) % 4])?;
            edges.push(OrientedEdge::new(edge, true));
        }
        let wire = self.wire(edges);
        Ok(self.face(Arc::new(plane), vec![wire]))
    }

    /// Finishes the shape and returns its ID.
    #[must_use]
    pub fn finish(self) -> ShapeId {
        self.shape
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::surface::Cylinder;
    use crate::math::Vector3;
    use std::f64::consts::TAU;

    #[test]
    fn rectangle_face_is_valid() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let shape = builder.finish();

        let data = store.shape(shape).unwrap();
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.edges.len(), 4);
        assert_eq!(data.faces, vec![face]);
        store.validate_face(face).unwrap();
        for &edge in &data.edges {
            store.validate_edge(edge, 1e-7).unwrap();
        }
    }

    #[test]
    fn circle_edge_is_closed() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let circle = Circle::in_xy(Point3::origin(), 1.0).unwrap();
        let edge = builder.circle_edge(circle).unwrap();
        let data = store.edge(edge).unwrap();
        assert_eq!(data.start, data.end);
        assert!((data.t_end - TAU).abs() < 1e-12);
        store.validate_edge(edge, 1e-7).unwrap();
    }

    #[test]
    fn coincident_line_vertices_fail() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let a = builder.vertex(Point3::origin());
        let b = builder.vertex(Point3::origin());
        assert!(builder.line_edge(a, b).is_err());
    }

    #[test]
    fn trimmed_face_requires_bounds() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let cylinder = Cylinder::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let unbounded = SurfaceDomain::new(0.0, TAU, f64::NEG_INFINITY, f64::INFINITY);
        assert!(builder.trimmed_face(Arc::new(cylinder.clone()), unbounded).is_err());
        let bounded = SurfaceDomain::new(0.0, TAU, -1.0, 1.0);
        let face = builder.trimmed_face(Arc::new(cylinder), bounded).unwrap();
        store.validate_face(face).unwrap();
    }
}
