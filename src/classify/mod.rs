//! Point-in-face classification in parameter space.
//!
//! A face's wires are compiled once into parameter-space polylines
//! ([`FaceBoundary`]); queries then run an even-odd ray cast against them.

mod boundary;

pub use boundary::{BoundaryArc, FaceBoundary};

use std::f64::consts::TAU;

use tracing::trace;

use crate::config::{ClassifierConfig, EngineConfig};
use crate::error::Result;
use crate::geometry::surface::SurfaceDomain;
use crate::math::distance_2d::{point_to_segment_dist, ray_segment_crossing, RayCrossing};
use crate::math::{unwrap_near, Point2, Vector2, TOLERANCE};
use crate::topology::{EntityId, FaceId, SurfaceHandle, TopologyStore};

/// Where a parameter point lies relative to a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaceState {
    In,
    Out,
    On,
    /// Every ray direction tried was tangent to the boundary.
    Unknown,
}

enum RayCastResult {
    Clear(FaceState),
    Degenerate,
}

/// A face with its boundary compiled, ready for repeated queries.
#[derive(Debug, Clone)]
pub struct FaceClassifier {
    face: FaceId,
    surface: SurfaceHandle,
    boundary: FaceBoundary,
    /// Face limits on the surface domain.
    limits: SurfaceDomain,
    tolerance: f64,
    has_wires: bool,
    config: ClassifierConfig,
}

impl FaceClassifier {
    /// Compiles the boundary of `face`.
    ///
    /// # Errors
    ///
    /// Returns an error if the face is missing or its boundary cannot be
    /// evaluated.
    pub fn new(store: &TopologyStore, face: FaceId, default_tolerance: f64, config: &ClassifierConfig) -> Result<Self> {
        let data = store.face(face)?;
        let boundary = FaceBoundary::compile(store, face, default_tolerance, config)?;
        Ok(Self {
            face,
            surface: data.surface.clone(),
            boundary,
            limits: data.parameter_domain(),
            tolerance: store.tolerance_of(EntityId::Face(face), default_tolerance)?,
            has_wires: !data.wires.is_empty(),
            config: config.clone(),
        })
    }

    /// The classified face.
    #[must_use]
    pub fn face(&self) -> FaceId {
        self.face
    }

    /// The compiled boundary.
    #[must_use]
    pub fn boundary(&self) -> &FaceBoundary {
        &self.boundary
    }

    /// Classifies `(u, v)` casting the first ray along +U.
    #[must_use]
    pub fn classify(&self, u: f64, v: f64) -> FaceState {
        self.classify_with_direction(u, v, 0.0)
    }

    /// Classifies `(u, v)` casting the first ray at `angle` from +U.
    /// Degenerate rays are retried at multiples of the perturbation angle.
    #[must_use]
    pub fn classify_with_direction(&self, u: f64, v: f64, angle: f64) -> FaceState {
        let q = self.canonical(Point2::new(u, v));

        if let Some(state) = self.classify_limits(&q) {
            return state;
        }
        if !self.has_wires {
            return FaceState::In;
        }

        // ON short-circuit.
        for arc in &self.boundary.arcs {
            for seg in arc.points.windows(2) {
                if point_to_segment_dist(&q, &seg[0], &seg[1]) <= arc.tolerance {
                    return FaceState::On;
                }
            }
        }

        let eps = TOLERANCE * self.boundary.domain.scale().max(1.0);
        for attempt in 0..self.config.max_retries {
            let theta = (angle + attempt as f64 * self.config.perturb_angle) % TAU;
            let dir = Vector2::new(theta.cos(), theta.sin());
            match self.ray_cast(&q, &dir, eps) {
                RayCastResult::Clear(state) => return state,
                RayCastResult::Degenerate => {
                    trace!(face = ?self.face, attempt, "degenerate ray, perturbing");
                }
            }
        }
        FaceState::Unknown
    }

    fn ray_cast(&self, q: &Point2, dir: &Vector2, eps: f64) -> RayCastResult {
        let mut crossings = 0u32;
        for arc in &self.boundary.arcs {
            for seg in arc.points.windows(2) {
                match ray_segment_crossing(q, dir, &seg[0], &seg[1], eps) {
                    RayCrossing::Miss => {}
                    RayCrossing::Cross => crossings += 1,
                    RayCrossing::Degenerate => return RayCastResult::Degenerate,
                }
            }
        }
        if crossings % 2 == 1 {
            RayCastResult::Clear(FaceState::In)
        } else {
            RayCastResult::Clear(FaceState::Out)
        }
    }

    /// Shifts periodic coordinates next to the centre of the boundary box.
    fn canonical(&self, mut q: Point2) -> Point2 {
        let d = &self.boundary.domain;
        if let Some(p) = self.surface.u_period() {
            q.x = unwrap_near(q.x, 0.5 * (d.u_min + d.u_max), p);
        }
        if let Some(p) = self.surface.v_period() {
            q.y = unwrap_near(q.y, 0.5 * (d.v_min + d.v_max), p);
        }
        q
    }

    /// Checks the point against the face limits on non-periodic axes.
    /// Returns `None` when the limits alone do not decide.
    fn classify_limits(&self, q: &Point2) -> Option<FaceState> {
        let eps = self.parameter_tolerance(q);
        let axes = [
            (q.x, self.limits.u_min, self.limits.u_max, self.surface.u_period()),
            (q.y, self.limits.v_min, self.limits.v_max, self.surface.v_period()),
        ];
        let mut on = false;
        for (value, lo, hi, period) in axes {
            if period.is_some() || !(lo.is_finite() || hi.is_finite()) {
                continue;
            }
            if value < lo - eps || value > hi + eps {
                return Some(FaceState::Out);
            }
            if (value - lo).abs() <= eps || (value - hi).abs() <= eps {
                on = true;
            }
        }
        on.then_some(FaceState::On)
    }

    /// The face tolerance mapped into parameter space at `q`.
    fn parameter_tolerance(&self, q: &Point2) -> f64 {
        let metric = self
            .surface
            .derivatives(q.x, q.y)
            .map_or(1.0, |(su, sv)| su.norm().max(sv.norm()));
        self.tolerance / metric.max(TOLERANCE)
    }
}

/// Classifies a single parameter point against a face without keeping the
/// compiled boundary.
///
/// # Errors
///
/// Returns an error if the face is missing or its boundary cannot be
/// evaluated.
pub fn classify_point(store: &TopologyStore, face: FaceId, uv: Point2, config: &EngineConfig) -> Result<FaceState> {
    let classifier = FaceClassifier::new(store, face, config.tolerance, &config.classifier)?;
    Ok(classifier.classify(uv.x, uv.y))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::curve::Circle;
    use crate::geometry::surface::{Cylinder, Plane};
    use crate::math::{Point3, Vector3};
    use crate::topology::{OrientedEdge, ShapeBuilder};
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn unit_square() -> (TopologyStore, FaceId) {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        (store, face)
    }

    #[test]
    fn square_in_out_on() {
        let (store, face) = unit_square();
        let c = FaceClassifier::new(&store, face, 1e-7, &ClassifierConfig::default()).unwrap();
        assert_eq!(c.classify(0.0, 0.0), FaceState::In);
        assert_eq!(c.classify(2.0, 2.0), FaceState::Out);
        assert_eq!(c.classify(1.0, 0.0), FaceState::On);
        assert_eq!(c.classify(-1.0, -1.0), FaceState::On);
    }

    #[test]
    fn ray_through_vertex_is_retried() {
        let (store, face) = unit_square();
        let c = FaceClassifier::new(&store, face, 1e-7, &ClassifierConfig::default()).unwrap();
        // 45 degrees from the origin hits the corner (1, 1) exactly.
        assert_eq!(c.classify_with_direction(0.0, 0.0, PI / 4.0), FaceState::In);
        assert_eq!(c.classify_with_direction(-2.0, -2.0, PI / 4.0), FaceState::Out);
    }

    #[test]
    fn single_retry_on_tangent_ray_is_unknown() {
        let (store, face) = unit_square();
        let config = ClassifierConfig {
            max_retries: 1,
            ..ClassifierConfig::default()
        };
        let c = FaceClassifier::new(&store, face, 1e-7, &config).unwrap();
        // Ray along y = 1 runs over the top edge.
        assert_eq!(c.classify_with_direction(-3.0, 1.0, 0.0), FaceState::Unknown);
    }

    #[test]
    fn disc_with_hole() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let outer = builder
            .circle_edge(Circle::in_xy(Point3::origin(), 2.0).unwrap())
            .unwrap();
        let inner = builder
            .circle_edge(Circle::in_xy(Point3::origin(), 1.0).unwrap())
            .unwrap();
        let w0 = builder.wire(vec![OrientedEdge::new(outer, true)]);
        let w1 = builder.wire(vec![OrientedEdge::new(inner, false)]);
        let face = builder.face(Arc::new(Plane::xy()), vec![w0, w1]);
        let c = FaceClassifier::new(&store, face, 1e-7, &ClassifierConfig::default()).unwrap();
        assert_eq!(c.classify(0.0, 0.0), FaceState::Out);
        assert_eq!(c.classify(1.5, 0.0), FaceState::In);
        assert_eq!(c.classify(0.0, -1.5), FaceState::In);
        assert_eq!(c.classify(3.0, 0.0), FaceState::Out);
    }

    #[test]
    fn trimmed_cylinder_uses_limits() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let cylinder = Cylinder::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let face = builder
            .trimmed_face(Arc::new(cylinder), SurfaceDomain::new(0.0, TAU, -1.0, 1.0))
            .unwrap();
        let config = EngineConfig::default();
        assert_eq!(classify_point(&store, face, Point2::new(-3.0, 0.0), &config).unwrap(), FaceState::In);
        assert_eq!(classify_point(&store, face, Point2::new(0.5, 1.0), &config).unwrap(), FaceState::On);
        assert_eq!(classify_point(&store, face, Point2::new(0.5, 1.5), &config).unwrap(), FaceState::Out);
    }
}
