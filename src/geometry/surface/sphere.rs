use std::f64::consts::{FRAC_PI_2, TAU};

use crate::error::{GeometryError, Result};
use crate::math::{Point2, Point3, Vector3, TOLERANCE};

use super::{Surface, SurfaceDomain};

/// A spherical surface in 3D space.
///
/// Defined by a center, radius, axis (north pole direction), and a
/// reference direction for the equator at u=0.
///
/// `P(u, v) = center + r * cos(v) * cos(u) * ref_dir + r * cos(v) * sin(u) * binormal + r * sin(v) * axis`
/// where `binormal = axis x ref_dir`.
///
/// Parameters: `u` = longitude `[0, 2*pi)`, `v` = latitude `[-pi/2, pi/2]`.
/// The outward normal is `(P - center) / radius`.
#[derive(Debug, Clone)]
pub struct Sphere {
    center: Point3,
    radius: f64,
    axis: Vector3,
    ref_dir: Vector3,
}

impl Sphere {
    /// Creates a new sphere.
    ///
    /// # Arguments
    ///
    /// * `center` - Center of the sphere
    /// * `radius` - Radius (must be positive)
    /// * `axis` - North pole direction (will be normalized)
    /// * `ref_dir` - Equatorial reference direction for u=0 (must be perpendicular to axis)
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is non-positive, axis is zero-length,
    /// or the reference direction is not perpendicular to the axis.
    pub fn new(center: Point3, radius: f64, axis: Vector3, ref_dir: Vector3) -> Result<Self> {
        if radius < TOLERANCE {
            return Err(
                GeometryError::Degenerate("sphere radius must be positive".into()).into(),
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

    /// Returns the center of the sphere.
    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Returns the radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Computes the binormal direction (`axis x ref_dir`).
    fn binormal(&self) -> Vector3 {
        self.axis.cross(&self.ref_dir)
    }
}

impl Surface for Sphere {
    fn evaluate(&self, u: f64, v: f64) -> Result<Point3> {
        let (cv, sv) = (v.cos(), v.sin());
        let (cu, su) = (u.cos(), u.sin());
        Ok(self.center
            + self.ref_dir * (self.radius * cv * cu)
            + self.binormal() * (self.radius * cv * su)
            + self.axis * (self.radius * sv))
    }

    fn derivatives(&self, u: f64, v: f64) -> Result<(Vector3, Vector3)> {
        let binormal = self.binormal();
        let (cv, sv) = (v.cos(), v.sin());
        let (cu, su) = (u.cos(), u.sin());
        let r = self.radius;
        let d_u = self.ref_dir * (-r * cv * su) + binormal * (r * cv * cu);
        let d_v = self.ref_dir * (-r * sv * cu) + binormal * (-r * sv * su) + self.axis * (r * cv);
        Ok((d_u, d_v))
    }

    // Defined from the position so the poles stay regular.
    fn normal(&self, u: f64, v: f64) -> Result<Vector3> {
        let n = (self.evaluate(u, v)? - self.center) / self.radius;
        let len = n.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        Ok(n / len)
    }

    fn domain(&self) -> SurfaceDomain {
        SurfaceDomain::new(0.0, TAU, -FRAC_PI_2, FRAC_PI_2)
    }

    fn u_period(&self) -> Option<f64> {
        Some(TAU)
    }

    /// `u` = longitude in `(-pi, pi]`, `v` = latitude in `[-pi/2, pi/2]`.
    fn inverse(&self, point: &Point3) -> Point2 {
        let dp = point - self.center;
        let len = dp.norm();
        if len < TOLERANCE {
            return Point2::origin();
        }
        let dp = dp / len;
        let v = dp.dot(&self.axis).clamp(-1.0, 1.0).asin();
        let u = dp.dot(&self.binormal()).atan2(dp.dot(&self.ref_dir));
        Point2::new(u, v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_sphere() -> Sphere {
        Sphere::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap()
    }

    #[test]
    fn evaluate_north_pole() {
        let s = unit_sphere();
        let p = s.evaluate(0.0, FRAC_PI_2).unwrap();
        assert!((p - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn normal_at_south_pole() {
        let s = unit_sphere();
        let n = s.normal(0.0, -FRAC_PI_2).unwrap();
        assert!((n - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-9);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let s = unit_sphere();
        let (u, v, h) = (0.8, 0.3, 1e-6);
        let (su, sv) = s.derivatives(u, v).unwrap();
        let fu = (s.evaluate(u + h, v).unwrap() - s.evaluate(u - h, v).unwrap()) / (2.0 * h);
        let fv = (s.evaluate(u, v + h).unwrap() - s.evaluate(u, v - h).unwrap()) / (2.0 * h);
        assert_abs_diff_eq!(su, fu, epsilon = 1e-8);
        assert_abs_diff_eq!(sv, fv, epsilon = 1e-8);
    }

    #[test]
    fn inverse_roundtrip() {
        let s = unit_sphere();
        for &(u, v) in &[(0.0, 0.0), (FRAC_PI_2, 0.0), (1.0, 0.5), (0.0, -FRAC_PI_2 * 0.9)] {
            let p = s.evaluate(u, v).unwrap();
            let uv = s.inverse(&p);
            let p2 = s.evaluate(uv.x, uv.y).unwrap();
            assert!((p - p2).norm() < 1e-9, "roundtrip failed for u={u}, v={v}");
        }
    }

    #[test]
    fn invalid_radius() {
        let r = Sphere::new(Point3::origin(), 0.0, Vector3::z(), Vector3::x());
        assert!(r.is_err());
    }
}
