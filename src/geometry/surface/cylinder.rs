use std::f64::consts::TAU;

use crate::error::{GeometryError, Result};
use crate::math::{Point2, Point3, Vector3, TOLERANCE};

use super::{Surface, SurfaceDomain};

/// A cylindrical surface in 3D space.
///
/// Defined by a center point on the axis, radius, axis direction, and
/// a reference direction for u=0.
///
/// `P(u, v) = center + radius * cos(u) * ref_dir + radius * sin(u) * binormal + v * axis`
/// where `binormal = axis x ref_dir`.
///
/// The outward normal is `cos(u) * ref_dir + sin(u) * binormal`.
#[derive(Debug, Clone)]
pub struct Cylinder {
    center: Point3,
    radius: f64,
    axis: Vector3,
    ref_dir: Vector3,
}

impl Cylinder {
    /// Creates a new cylinder.
    ///
    /// # Arguments
    ///
    /// * `center` - A point on the cylinder axis
    /// * `radius` - Radius (must be positive)
    /// * `axis` - Axis direction (will be normalized)
    /// * `ref_dir` - Reference direction for u=0 (must be perpendicular to axis)
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is non-positive, axis is zero-length,
    /// or the reference direction is not perpendicular to the axis.
    pub fn new(center: Point3, radius: f64, axis: Vector3, ref_dir: Vector3) -> Result<Self> {
        if radius < TOLERANCE {
            return Err(
                GeometryError::Degenerate("cylinder radius must be positive".into()).into(),
            );
        }

        let axis_len = axis.norm();
        if axis_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let axis = axis / axis_len;

        let ref_len = ref_dir.norm();
        if ref_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let ref_dir = ref_dir / ref_len;

        if axis.dot(&ref_dir).abs() > TOLERANCE {
            return Err(GeometryError::Degenerate(
                "reference direction must be perpendicular to axis".into(),
            )
            .into());
        }

        Ok(Self {
            center,
            radius,
            axis,
            ref_dir,
        })
    }

    /// Returns the center point on the axis.
    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Returns the radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns the axis direction (unit vector).
    #[must_use]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }

    /// Computes the binormal direction (`axis x ref_dir`).
    fn binormal(&self) -> Vector3 {
        self.axis.cross(&self.ref_dir)
    }
}

impl Surface for Cylinder {
    fn evaluate(&self, u: f64, v: f64) -> Result<Point3> {
        let x = self.radius * u.cos();
        let y = self.radius * u.sin();
        Ok(self.center + self.ref_dir * x + self.binormal() * y + self.axis * v)
    }

    fn derivatives(&self, u: f64, _v: f64) -> Result<(Vector3, Vector3)> {
        let su = self.ref_dir * (-self.radius * u.sin()) + self.binormal() * (self.radius * u.cos());
        Ok((su, self.axis))
    }

    fn normal(&self, u: f64, _v: f64) -> Result<Vector3> {
        Ok(self.ref_dir * u.cos() + self.binormal() * u.sin())
    }

    fn domain(&self) -> SurfaceDomain {
        SurfaceDomain::new(0.0, TAU, f64::NEG_INFINITY, f64::INFINITY)
    }

    fn u_period(&self) -> Option<f64> {
        Some(TAU)
    }

    /// `u` is returned in `(-pi, pi]` (atan2-based), `v` as the signed
    /// distance along the axis from the center.
    fn inverse(&self, point: &Point3) -> Point2 {
        let dp = point - self.center;
        let v = dp.dot(&self.axis);
        let u = dp.dot(&self.binormal()).atan2(dp.dot(&self.ref_dir));
        Point2::new(u, v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn unit_cylinder() -> Cylinder {
        Cylinder::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap()
    }

    #[test]
    fn evaluate_on_axis_height() {
        let c = unit_cylinder();
        let p = c.evaluate(FRAC_PI_2, 2.0).unwrap();
        assert_abs_diff_eq!(p, Point3::new(0.0, 1.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn normal_matches_derivative_cross() {
        let c = unit_cylinder();
        let (su, sv) = c.derivatives(0.4, 1.0).unwrap();
        let n = su.cross(&sv).normalize();
        assert_abs_diff_eq!(n, c.normal(0.4, 1.0).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_roundtrip() {
        let c = unit_cylinder();
        let p = c.evaluate(-2.0, 0.5).unwrap();
        let uv = c.inverse(&p);
        assert_abs_diff_eq!(c.evaluate(uv.x, uv.y).unwrap(), p, epsilon = 1e-12);
    }

    #[test]
    fn periodic_in_u_only() {
        let c = unit_cylinder();
        assert_eq!(c.u_period(), Some(TAU));
        assert_eq!(c.v_period(), None);
        assert!(!c.domain().is_bounded());
    }
}
