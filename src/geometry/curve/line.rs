use crate::error::Result;
use crate::math::{Point3, Vector3};

use super::{Curve, CurveDomain};

/// An infinite line defined by an origin point and a direction vector.
///
/// The parametric form is: `P(t) = origin + t * direction`, with a unit
/// direction so that `t` is arc length.
#[derive(Debug, Clone)]
pub struct Line {
    origin: Point3,
    direction: Vector3,
}

impl Line {
    /// Creates a new line from an origin and direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the direction vector is zero-length.
    pub fn new(origin: Point3, direction: Vector3) -> Result<Self> {
        let len = direction.norm();
        if len < crate::math::TOLERANCE {
            return Err(crate::error::GeometryError::ZeroVector.into());
        }
        Ok(Self {
            origin,
            direction: direction / len,
        })
    }

    /// Creates the line through `start` and `end`, returning it with the
    /// parameter of `end` (`start` is at `t = 0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the two points coincide.
    pub fn through(start: Point3, end: Point3) -> Result<(Self, f64)> {
        let line = Self::new(start, end - start)?;
        Ok((line, (end - start).norm()))
    }

    /// Returns the origin point of the line.
    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Returns the unit direction vector of the line.
    #[must_use]
    pub fn direction(&self) -> &Vector3 {
        &self.direction
    }
}

impl Curve for Line {
    fn evaluate(&self, t: f64) -> Result<Point3> {
        Ok(self.origin + self.direction * t)
    }

    fn derivative(&self, _t: f64) -> Result<Vector3> {
        Ok(self.direction)
    }

    fn domain(&self) -> CurveDomain {
        CurveDomain::new(f64::NEG_INFINITY, f64::INFINITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn through_two_points() {
        let (line, t_end) =
            Line::through(Point3::new(0.0, 0.0, -1.0), Point3::new(0.0, 0.0, 1.0)).unwrap();
        assert_abs_diff_eq!(t_end, 2.0, epsilon = 1e-12);
        let mid = line.evaluate(1.0).unwrap();
        assert_abs_diff_eq!(mid, Point3::origin(), epsilon = 1e-12);
    }

    #[test]
    fn coincident_points_rejected() {
        assert!(Line::through(Point3::origin(), Point3::origin()).is_err());
    }

    #[test]
    fn not_periodic() {
        let line = Line::new(Point3::origin(), Vector3::x()).unwrap();
        assert!(!line.is_periodic());
        assert!(!line.domain().is_bounded());
    }
}
