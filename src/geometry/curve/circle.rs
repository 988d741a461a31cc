use std::f64::consts::TAU;

use crate::error::{GeometryError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

use super::{Curve, CurveDomain};

/// A full circle in 3D space.
///
/// Defined by a center, radius, normal axis, and a reference direction
/// for the zero-angle. The parametric domain is `[0, 2*pi]` and the
/// parameterization is periodic.
///
/// `P(t) = center + radius * cos(t) * ref_dir + radius * sin(t) * binormal`
/// where `binormal = normal x ref_dir`.
#[derive(Debug, Clone)]
pub struct Circle {
    center: Point3,
    radius: f64,
    normal: Vector3,
    ref_dir: Vector3,
}

impl Circle {
    /// Creates a new circle.
    ///
    /// # Arguments
    ///
    /// * `center` - Center of the circle
    /// * `radius` - Radius (must be positive)
    /// * `normal` - Normal vector defining the circle plane
    /// * `ref_dir` - Reference direction for angle = 0 (must be perpendicular to normal)
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is non-positive, the normal is zero-length,
    /// or the reference direction is not perpendicular to the normal.
    pub fn new(center: Point3, radius: f64, normal: Vector3, ref_dir: Vector3) -> Result<Self> {
        if radius < TOLERANCE {
            return Err(
                GeometryError::Degenerate("circle radius must be positive".into()).into(),
            );
        }

        let normal_len = normal.norm();
        if normal_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = normal / normal_len;

        let ref_len = ref_dir.norm();
        if ref_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let ref_dir = ref_dir / ref_len;

        if normal.dot(&ref_dir).abs() > TOLERANCE {
            return Err(GeometryError::Degenerate(
                "reference direction must be perpendicular to normal".into(),
            )
            .into());
        }

        Ok(Self {
            center,
            radius,
            normal,
            ref_dir,
        })
    }

    /// Creates a circle in a plane parallel to XY, starting on the +X side.
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is non-positive.
    pub fn in_xy(center: Point3, radius: f64) -> Result<Self> {
        Self::new(center, radius, Vector3::z(), Vector3::x())
    }

    /// Returns the center of the circle.
    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Returns the radius of the circle.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns the normal vector of the circle plane.
    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Computes the binormal direction (`normal x ref_dir`).
    fn binormal(&self) -> Vector3 {
        self.normal.cross(&self.ref_dir)
    }
}

impl Curve for Circle {
    fn evaluate(&self, t: f64) -> Result<Point3> {
        let x = self.radius * t.cos();
        let y = self.radius * t.sin();
        Ok(self.center + self.ref_dir * x + self.binormal() * y)
    }

    fn derivative(&self, t: f64) -> Result<Vector3> {
        let dx = -self.radius * t.sin();
        let dy = self.radius * t.cos();
        Ok(self.ref_dir * dx + self.binormal() * dy)
    }

    fn domain(&self) -> CurveDomain {
        CurveDomain::new(0.0, TAU)
    }

    fn period(&self) -> Option<f64> {
        Some(TAU)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn evaluate_quarter_turn() {
        let c = Circle::in_xy(Point3::new(1.0, 0.0, 0.0), 2.0).unwrap();
        let p = c.evaluate(FRAC_PI_2).unwrap();
        assert_abs_diff_eq!(p, Point3::new(1.0, 2.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn derivative_has_radius_length() {
        let c = Circle::in_xy(Point3::origin(), 3.0).unwrap();
        let d = c.derivative(0.7).unwrap();
        assert_abs_diff_eq!(d.norm(), 3.0, epsilon = 1e-12);
        let radial = c.evaluate(0.7).unwrap() - c.center();
        assert_abs_diff_eq!(d.dot(&radial), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn periodic_domain() {
        let c = Circle::in_xy(Point3::origin(), 1.0).unwrap();
        assert!(c.is_periodic());
        assert_abs_diff_eq!(c.domain().t_max, TAU);
    }

    #[test]
    fn invalid_radius() {
        assert!(Circle::in_xy(Point3::origin(), 0.0).is_err());
    }
}
