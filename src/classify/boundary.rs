use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::geometry::adapter::face_parameter_box;
use crate::geometry::surface::SurfaceDomain;
use crate::math::distance_2d::point_to_segment_dist;
use crate::math::{unwrap_near, Point2, Point3, TOLERANCE};
use crate::topology::{CurveHandle, EdgeId, EntityId, FaceId, SurfaceHandle, TopologyStore};

/// Initial segments per edge before adaptive refinement.
const INITIAL_SEGMENTS: usize = 4;

/// One boundary edge re-expressed as a polyline in the face's parameter
/// space.
#[derive(Debug, Clone)]
pub struct BoundaryArc {
    /// The edge this arc comes from.
    pub edge: EdgeId,
    /// Polyline vertices, in edge parameter order.
    pub points: Vec<Point2>,
    /// Parameter-space tolerance: the edge tolerance mapped through the
    /// surface metric, plus the chord error of the polyline.
    pub tolerance: f64,
}

/// The compiled 2D boundary of a face.
#[derive(Debug, Clone)]
pub struct FaceBoundary {
    pub arcs: Vec<BoundaryArc>,
    /// Parameter box of the face.
    pub domain: SurfaceDomain,
}

impl FaceBoundary {
    /// Compiles the wires of `face`.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or its edges cannot be read or
    /// evaluated.
    pub fn compile(
        store: &TopologyStore,
        face: FaceId,
        default_tolerance: f64,
        config: &ClassifierConfig,
    ) -> Result<Self> {
        let data = store.face(face)?;
        let domain = face_parameter_box(store, EntityId::Face(face))?;
        let face_tol = store.tolerance_of(EntityId::Face(face), default_tolerance)?;
        let chord = config.chord_tolerance * domain.scale().max(TOLERANCE);

        let mut arcs = Vec::new();
        for &wire in &data.wires {
            let mut previous: Option<Point2> = None;
            for oe in &store.wire(wire)?.edges {
                let edge = store.edge(oe.edge)?;
                let edge_tol = store
                    .tolerance_of(EntityId::Edge(oe.edge), default_tolerance)?
                    .max(face_tol);
                let mut compiler = ArcCompiler {
                    surface: &data.surface,
                    curve: &edge.curve,
                    chord,
                    max_depth: config.max_depth,
                    max_dev: 0.0,
                    metric_sum: 0.0,
                    metric_count: 0,
                };
                let (t0, t1) = if oe.forward {
                    (edge.t_start, edge.t_end)
                } else {
                    (edge.t_end, edge.t_start)
                };
                let points = compiler.compile(t0, t1, previous)?;
                previous = points.last().copied();
                let metric = if compiler.metric_count > 0 {
                    compiler.metric_sum / compiler.metric_count as f64
                } else {
                    1.0
                };
                arcs.push(BoundaryArc {
                    edge: oe.edge,
                    points,
                    tolerance: edge_tol / metric.max(TOLERANCE) + compiler.max_dev,
                });
            }
        }
        Ok(Self { arcs, domain })
    }
}

struct ArcCompiler<'a> {
    surface: &'a SurfaceHandle,
    curve: &'a CurveHandle,
    chord: f64,
    max_depth: usize,
    max_dev: f64,
    metric_sum: f64,
    metric_count: usize,
}

impl ArcCompiler<'_> {
    fn compile(&mut self, t0: f64, t1: f64, previous: Option<Point2>) -> Result<Vec<Point2>> {
        let mut points = Vec::new();
        let mut prev_t = t0;
        let mut prev_p = self.project(&self.curve.evaluate(t0)?, previous)?;
        points.push(prev_p);
        for i in 1..=INITIAL_SEGMENTS {
            let t = t0 + (t1 - t0) * i as f64 / INITIAL_SEGMENTS as f64;
            let p = self.project(&self.curve.evaluate(t)?, Some(prev_p))?;
            self.refine(prev_t, prev_p, t, p, 0, &mut points)?;
            prev_t = t;
            prev_p = p;
        }
        Ok(points)
    }

    fn refine(
        &mut self,
        ta: f64,
        pa: Point2,
        tb: f64,
        pb: Point2,
        depth: usize,
        out: &mut Vec<Point2>,
    ) -> Result<()> {
        let tm = 0.5 * (ta + tb);
        let pm = self.project(&self.curve.evaluate(tm)?, Some(pa))?;
        let dev = point_to_segment_dist(&pm, &pa, &pb);
        if dev > self.chord && depth < self.max_depth {
            self.refine(ta, pa, tm, pm, depth + 1, out)?;
            self.refine(tm, pm, tb, pb, depth + 1, out)?;
        } else {
            self.max_dev = self.max_dev.max(dev);
            out.push(pb);
        }
        Ok(())
    }

    /// Projects a boundary point into parameter space, unwrapping periodic
    /// coordinates next to `near`.
    fn project(&mut self, point: &Point3, near: Option<Point2>) -> Result<Point2> {
        let mut uv = self.surface.inverse(point);
        if let Some(near) = near {
            if let Some(p) = self.surface.u_period() {
                uv.x = unwrap_near(uv.x, near.x, p);
            }
            if let Some(p) = self.surface.v_period() {
                uv.y = unwrap_near(uv.y, near.y, p);
            }
        }
        let (su, sv) = self.surface.derivatives(uv.x, uv.y)?;
        self.metric_sum += su.norm().max(sv.norm());
        self.metric_count += 1;
        Ok(uv)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::curve::Circle;
    use crate::geometry::surface::Plane;
    use crate::topology::{OrientedEdge, ShapeBuilder};
    use std::sync::Arc;

    #[test]
    fn square_compiles_to_straight_arcs() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let boundary = FaceBoundary::compile(&store, face, 1e-7, &ClassifierConfig::default()).unwrap();
        assert_eq!(boundary.arcs.len(), 4);
        for arc in &boundary.arcs {
            // Straight edges need no refinement.
            assert_eq!(arc.points.len(), INITIAL_SEGMENTS + 1);
            assert!(arc.tolerance < 1e-6);
        }
    }

    #[test]
    fn circle_is_refined() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let edge = builder
            .circle_edge(Circle::in_xy(Point3::origin(), 1.0).unwrap())
            .unwrap();
        let wire = builder.wire(vec![OrientedEdge::new(edge, true)]);
        let face = builder.face(Arc::new(Plane::xy()), vec![wire]);
        let config = ClassifierConfig::default();
        let boundary = FaceBoundary::compile(&store, face, 1e-7, &config).unwrap();
        let arc = &boundary.arcs[0];
        assert!(arc.points.len() > 32);
        let first = arc.points[0];
        let last = arc.points[arc.points.len() - 1];
        assert!((first - last).norm() < 1e-9);
        for p in &arc.points {
            assert!((p.coords.norm() - 1.0).abs() < 1e-9);
        }
    }
}
