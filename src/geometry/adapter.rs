//! Uniform evaluation over the geometry carried by an entity.
//!
//! A [`Patch`] hides whether an entity is a point, a curve range or a
//! surface region: it evaluates a position and the partial derivatives
//! for a flat parameter slice of length [`Patch::dim`]. Seed refinement
//! and bounding-volume sampling work only against this interface.

use crate::error::{Result, TopologyError};
use crate::math::{unwrap_near, wrap_into, Point2, Point3, Vector3, TOLERANCE};
use crate::topology::{CurveHandle, EntityId, SurfaceHandle, TopologyStore};

use super::surface::SurfaceDomain;

/// Number of samples per edge used to estimate a face's parameter box.
const FACE_BOX_SAMPLES: usize = 32;

/// The geometry of one entity, restricted to the entity's parameter range.
#[derive(Debug, Clone)]
pub enum Patch {
    /// A vertex: no parameters.
    Point(Point3),
    /// An edge: one parameter in `[t0, t1]`.
    Curve {
        curve: CurveHandle,
        t0: f64,
        t1: f64,
    },
    /// A face: two parameters inside `domain`.
    Surface {
        surface: SurfaceHandle,
        domain: SurfaceDomain,
    },
}

impl Patch {
    /// Builds the patch for an entity and returns it with the entity's
    /// tolerance.
    ///
    /// Edges and faces are validated first, so malformed input is reported
    /// against the entity before any numeric work starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or malformed.
    pub fn of_entity(store: &TopologyStore, entity: EntityId, default_tolerance: f64) -> Result<(Self, f64)> {
        let tolerance = store.tolerance_of(entity, default_tolerance)?;
        let patch = match entity {
            EntityId::Vertex(id) => Self::Point(store.vertex(id)?.point),
            EntityId::Edge(id) => {
                store.validate_edge(id, default_tolerance)?;
                let edge = store.edge(id)?;
                Self::Curve {
                    curve: edge.curve.clone(),
                    t0: edge.t_start,
                    t1: edge.t_end,
                }
            }
            EntityId::Face(id) => {
                store.validate_face(id)?;
                let face = store.face(id)?;
                let domain = face_parameter_box(store, entity)?;
                Self::Surface {
                    surface: face.surface.clone(),
                    domain,
                }
            }
        };
        Ok((patch, tolerance))
    }

    /// Number of parameters: 0, 1 or 2.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::Point(_) => 0,
            Self::Curve { .. } => 1,
            Self::Surface { .. } => 2,
        }
    }

    /// Evaluates the position at `params` (length [`Patch::dim`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying geometry fails to evaluate.
    pub fn eval(&self, params: &[f64]) -> Result<Point3> {
        match self {
            Self::Point(p) => Ok(*p),
            Self::Curve { curve, .. } => curve.evaluate(params[0]),
            Self::Surface { surface, .. } => surface.evaluate(params[0], params[1]),
        }
    }

    /// Returns the partial derivatives at `params`, one column per
    /// parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying geometry fails to evaluate.
    pub fn jacobian(&self, params: &[f64]) -> Result<Vec<Vector3>> {
        match self {
            Self::Point(_) => Ok(Vec::new()),
            Self::Curve { curve, .. } => Ok(vec![curve.derivative(params[0])?]),
            Self::Surface { surface, .. } => {
                let (su, sv) = surface.derivatives(params[0], params[1])?;
                Ok(vec![su, sv])
            }
        }
    }

    /// Lower and upper bound of parameter `axis`.
    #[must_use]
    pub fn bounds(&self, axis: usize) -> (f64, f64) {
        match self {
            Self::Point(_) => (0.0, 0.0),
            Self::Curve { t0, t1, .. } => (*t0, *t1),
            Self::Surface { domain, .. } => {
                if axis == 0 {
                    (domain.u_min, domain.u_max)
                } else {
                    (domain.v_min, domain.v_max)
                }
            }
        }
    }

    /// Returns the period of parameter `axis` when the patch covers the
    /// whole period, so that the parameter wraps instead of ending.
    #[must_use]
    pub fn wrap_period(&self, axis: usize) -> Option<f64> {
        let period = match self {
            Self::Point(_) => None,
            Self::Curve { curve, .. } => curve.period(),
            Self::Surface { surface, .. } => {
                if axis == 0 {
                    surface.u_period()
                } else {
                    surface.v_period()
                }
            }
        }?;
        let (lo, hi) = self.bounds(axis);
        (hi - lo >= period - TOLERANCE).then_some(period)
    }

    /// Moves wrapping parameters into their canonical period and clamps
    /// the others into bounds. Returns `true` if any parameter had to be
    /// clamped by more than `eps`.
    pub fn clamp(&self, params: &mut [f64], eps: f64) -> bool {
        let mut clamped = false;
        for (axis, value) in params.iter_mut().enumerate().take(self.dim()) {
            let (lo, hi) = self.bounds(axis);
            if let Some(period) = self.wrap_period(axis) {
                *value = wrap_into(*value, lo, period);
                continue;
            }
            if *value < lo - eps || *value > hi + eps {
                clamped = true;
            }
            *value = value.clamp(lo, hi);
        }
        clamped
    }

    /// Returns `true` if `params` lies inside the bounds, allowing `eps`.
    /// Wrapping parameters are always inside.
    #[must_use]
    pub fn contains(&self, params: &[f64], eps: f64) -> bool {
        params.iter().enumerate().take(self.dim()).all(|(axis, &value)| {
            if self.wrap_period(axis).is_some() {
                return true;
            }
            let (lo, hi) = self.bounds(axis);
            value >= lo - eps && value <= hi + eps
        })
    }

    /// Returns `true` if `params` is within `eps` of a non-wrapping bound.
    #[must_use]
    pub fn on_bound(&self, params: &[f64], eps: f64) -> bool {
        params.iter().enumerate().take(self.dim()).any(|(axis, &value)| {
            if self.wrap_period(axis).is_some() {
                return false;
            }
            let (lo, hi) = self.bounds(axis);
            (value - lo).abs() <= eps || (value - hi).abs() <= eps
        })
    }

    /// Largest parameter extent, used to scale convergence thresholds.
    #[must_use]
    pub fn scale(&self) -> f64 {
        (0..self.dim())
            .map(|axis| {
                let (lo, hi) = self.bounds(axis);
                hi - lo
            })
            .fold(1.0_f64, f64::max)
    }

    /// Uniform parameter samples: `curve_samples` along a curve (ends
    /// included), a `grid` x `grid` lattice over a surface.
    #[must_use]
    pub fn samples(&self, curve_samples: usize, grid: usize) -> Vec<Vec<f64>> {
        match self.dim() {
            0 => vec![Vec::new()],
            1 => self.axis_samples(0, curve_samples).into_iter().map(|t| vec![t]).collect(),
            _ => {
                let us = self.axis_samples(0, grid);
                let vs = self.axis_samples(1, grid);
                us.iter()
                    .flat_map(|&u| vs.iter().map(move |&v| vec![u, v]))
                    .collect()
            }
        }
    }

    fn axis_samples(&self, axis: usize, count: usize) -> Vec<f64> {
        let (lo, hi) = self.bounds(axis);
        let count = count.max(2);
        // A wrapping axis would sample its seam twice.
        let divisions = if self.wrap_period(axis).is_some() {
            count
        } else {
            count - 1
        };
        (0..count)
            .map(|i| lo + (hi - lo) * i as f64 / divisions as f64)
            .collect()
    }

    /// Returns the surface handle for a face patch.
    #[must_use]
    pub fn surface(&self) -> Option<&SurfaceHandle> {
        match self {
            Self::Surface { surface, .. } => Some(surface),
            _ => None,
        }
    }

    /// Returns the curve handle for an edge patch.
    #[must_use]
    pub fn curve(&self) -> Option<&CurveHandle> {
        match self {
            Self::Curve { curve, .. } => Some(curve),
            _ => None,
        }
    }
}

/// Computes the parameter rectangle of a face.
///
/// Without wires this is the face's limits on the surface domain. With
/// wires it is the box of the boundary's image in parameter space, clipped
/// by the limits. A wrapping direction keeps the full period.
///
/// # Errors
///
/// Returns an error if the face is missing or its rectangle is unbounded.
pub fn face_parameter_box(store: &TopologyStore, entity: EntityId) -> Result<SurfaceDomain> {
    let EntityId::Face(id) = entity else {
        return Err(TopologyError::Malformed {
            entity,
            reason: "not a face".into(),
        }
        .into());
    };
    let face = store.face(id)?;
    let limits = face.parameter_domain();
    if face.wires.is_empty() {
        return bounded(entity, limits);
    }

    let surface = &face.surface;
    let u_period = surface.u_period();
    let v_period = surface.v_period();
    let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut previous: Option<Point2> = None;
    for oe in store.face_edges(id)? {
        let edge = store.edge(oe.edge)?;
        for i in 0..=FACE_BOX_SAMPLES {
            let t = edge.t_start + (edge.t_end - edge.t_start) * i as f64 / FACE_BOX_SAMPLES as f64;
            let mut uv = surface.inverse(&edge.curve.evaluate(t)?);
            if let Some(prev) = previous {
                if let Some(p) = u_period {
                    uv.x = unwrap_near(uv.x, prev.x, p);
                }
                if let Some(p) = v_period {
                    uv.y = unwrap_near(uv.y, prev.y, p);
                }
            }
            min = min.inf(&uv);
            max = max.sup(&uv);
            previous = Some(uv);
        }
    }

    let mut domain = SurfaceDomain::new(min.x, max.x, min.y, max.y);
    if let Some(p) = u_period {
        if domain.u_max - domain.u_min >= p * 0.99 {
            domain.u_min = limits.u_min;
            domain.u_max = limits.u_min + p;
        }
    }
    if let Some(p) = v_period {
        if domain.v_max - domain.v_min >= p * 0.99 {
            domain.v_min = limits.v_min;
            domain.v_max = limits.v_min + p;
        }
    }
    // Periodic directions were unwrapped freely, so only clip the others.
    if u_period.is_none() {
        domain.u_min = domain.u_min.max(limits.u_min);
        domain.u_max = domain.u_max.min(limits.u_max);
    }
    if v_period.is_none() {
        domain.v_min = domain.v_min.max(limits.v_min);
        domain.v_max = domain.v_max.min(limits.v_max);
    }
    bounded(entity, domain)
}

fn bounded(entity: EntityId, domain: SurfaceDomain) -> Result<SurfaceDomain> {
    if domain.is_bounded() && domain.u_max >= domain.u_min && domain.v_max >= domain.v_min {
        Ok(domain)
    } else {
        Err(TopologyError::Malformed {
            entity,
            reason: format!(
                "unbounded or empty parameter box [{}, {}] x [{}, {}]",
                domain.u_min, domain.u_max, domain.v_min, domain.v_max
            ),
        }
        .into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::curve::Circle;
    use crate::geometry::surface::{Cylinder, Plane};
    use crate::topology::ShapeBuilder;
    use std::f64::consts::TAU;
    use std::sync::Arc;

    #[test]
    fn rectangle_face_box() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 2.0, -3.0, 4.0).unwrap();
        let domain = face_parameter_box(&store, face.into()).unwrap();
        assert!((domain.u_min + 1.0).abs() < 1e-9);
        assert!((domain.u_max - 2.0).abs() < 1e-9);
        assert!((domain.v_min + 3.0).abs() < 1e-9);
        assert!((domain.v_max - 4.0).abs() < 1e-9);
    }

    #[test]
    fn face_without_wires_on_plane_is_malformed() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.face(Arc::new(Plane::xy()), Vec::new());
        let err = Patch::of_entity(&store, face.into(), 1e-7).unwrap_err();
        assert_eq!(err.entity(), Some(EntityId::Face(face)));
    }

    #[test]
    fn full_circle_wraps() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let edge = builder
            .circle_edge(Circle::in_xy(Point3::origin(), 1.0).unwrap())
            .unwrap();
        let (patch, _) = Patch::of_entity(&store, edge.into(), 1e-7).unwrap();
        assert_eq!(patch.wrap_period(0), Some(TAU));
        let mut t = [-0.5];
        assert!(!patch.clamp(&mut t, 1e-9));
        assert!((t[0] - (TAU - 0.5)).abs() < 1e-12);
        // Seam not sampled twice.
        assert_eq!(patch.samples(8, 4).len(), 8);
    }

    #[test]
    fn trimmed_cylinder_clamps_height() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let cylinder = Cylinder::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let face = builder
            .trimmed_face(Arc::new(cylinder), SurfaceDomain::new(0.0, TAU, -1.0, 1.0))
            .unwrap();
        let (patch, _) = Patch::of_entity(&store, face.into(), 1e-7).unwrap();
        let mut uv = [7.0, 3.0];
        assert!(patch.clamp(&mut uv, 1e-9));
        assert!((uv[0] - (7.0 - TAU)).abs() < 1e-12);
        assert!((uv[1] - 1.0).abs() < 1e-12);
        assert!(patch.on_bound(&uv, 1e-9));
        assert_eq!(patch.samples(8, 4).len(), 16);
    }

    #[test]
    fn jacobian_columns_match_dimension() {
        let patch = Patch::Point(Point3::origin());
        assert!(patch.jacobian(&[]).unwrap().is_empty());
        assert_eq!(patch.samples(4, 4), vec![Vec::<f64>::new()]);
    }
}
