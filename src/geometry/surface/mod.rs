mod cylinder;
mod plane;
mod sphere;

pub use cylinder::Cylinder;
pub use plane::Plane;
pub use sphere::Sphere;

use std::fmt::Debug;

use crate::error::{GeometryError, Result};
use crate::math::{Point2, Point3, Vector3, TOLERANCE};

/// Parameter domain for a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDomain {
    /// Start of the U parameter range.
    pub u_min: f64,
    /// End of the U parameter range.
    pub u_max: f64,
    /// Start of the V parameter range.
    pub v_min: f64,
    /// End of the V parameter range.
    pub v_max: f64,
}

impl SurfaceDomain {
    /// Creates a new surface domain.
    #[must_use]
    pub fn new(u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            u_min,
            u_max,
            v_min,
            v_max,
        }
    }

    /// Returns `true` if all four limits are finite.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.u_min.is_finite()
            && self.u_max.is_finite()
            && self.v_min.is_finite()
            && self.v_max.is_finite()
    }

    /// Returns `true` if `uv` lies in the domain, allowing `eps` of slack.
    #[must_use]
    pub fn contains(&self, uv: &Point2, eps: f64) -> bool {
        uv.x >= self.u_min - eps
            && uv.x <= self.u_max + eps
            && uv.y >= self.v_min - eps
            && uv.y <= self.v_max + eps
    }

    /// Returns the intersection of two domains.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.u_min.max(other.u_min),
            self.u_max.min(other.u_max),
            self.v_min.max(other.v_min),
            self.v_max.min(other.v_max),
        )
    }

    /// Returns the larger of the two parameter extents.
    #[must_use]
    pub fn scale(&self) -> f64 {
        (self.u_max - self.u_min).max(self.v_max - self.v_min)
    }
}

/// Capability interface for parametric surfaces in 3D space.
///
/// The engine is polymorphic over this trait only; every surface family
/// (plane, cylinder, sphere, ...) implements it.
pub trait Surface: Debug + Send + Sync {
    /// Evaluates the surface at parameters `(u, v)`, returning the 3D point.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are out of range or evaluation fails.
    fn evaluate(&self, u: f64, v: f64) -> Result<Point3>;

    /// Computes the first partial derivatives `(dP/du, dP/dv)` at `(u, v)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are out of range.
    fn derivatives(&self, u: f64, v: f64) -> Result<(Vector3, Vector3)>;

    /// Computes the unit surface normal at parameters `(u, v)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the normal is degenerate (singular point).
    fn normal(&self, u: f64, v: f64) -> Result<Vector3> {
        let (su, sv) = self.derivatives(u, v)?;
        let n = su.cross(&sv);
        let len = n.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        Ok(n / len)
    }

    /// Returns the natural parameter domain of the surface.
    fn domain(&self) -> SurfaceDomain;

    /// Returns the U period, if the surface is periodic in U.
    fn u_period(&self) -> Option<f64> {
        None
    }

    /// Returns the V period, if the surface is periodic in V.
    fn v_period(&self) -> Option<f64> {
        None
    }

    /// Returns whether the surface is periodic in either direction.
    fn is_periodic(&self) -> bool {
        self.u_period().is_some() || self.v_period().is_some()
    }

    /// Projects a 3D point onto the surface's parameter space.
    ///
    /// For points on the surface this inverts [`Surface::evaluate`].
    fn inverse(&self, point: &Point3) -> Point2;
}
