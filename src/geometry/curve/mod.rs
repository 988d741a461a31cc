mod circle;
mod line;

pub use circle::Circle;
pub use line::Line;

use std::fmt::Debug;

use crate::error::Result;
use crate::math::{Point3, Vector3};

/// Parameter domain for a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveDomain {
    /// Start of the parameter range.
    pub t_min: f64,
    /// End of the parameter range.
    pub t_max: f64,
}

impl CurveDomain {
    /// Creates a new curve domain.
    #[must_use]
    pub fn new(t_min: f64, t_max: f64) -> Self {
        Self { t_min, t_max }
    }

    /// Returns `true` if both ends are finite.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.t_min.is_finite() && self.t_max.is_finite()
    }

    /// Returns `true` if `t` lies in the domain, allowing `eps` of slack.
    #[must_use]
    pub fn contains(&self, t: f64, eps: f64) -> bool {
        t >= self.t_min - eps && t <= self.t_max + eps
    }
}

/// Capability interface for parametric curves in 3D space.
///
/// The engine is polymorphic over this trait only; every curve family
/// (line, circle, ...) implements it.
pub trait Curve: Debug + Send + Sync {
    /// Evaluates the curve at parameter `t`, returning the 3D point.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is out of range or evaluation fails.
    fn evaluate(&self, t: f64) -> Result<Point3>;

    /// Computes the first derivative `dP/dt` at parameter `t` (not normalized).
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is out of range.
    fn derivative(&self, t: f64) -> Result<Vector3>;

    /// Returns the natural parameter domain of the curve.
    fn domain(&self) -> CurveDomain;

    /// Returns the period of the parameterization, if the curve is periodic.
    fn period(&self) -> Option<f64> {
        None
    }

    /// Returns whether the curve is periodic.
    fn is_periodic(&self) -> bool {
        self.period().is_some()
    }
}
