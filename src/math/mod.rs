pub mod distance_2d;
pub mod solve;

/// 2D point type.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 2D vector type.
pub type Vector2 = nalgebra::Vector2<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global numeric tolerance for floating-point comparisons.
///
/// This guards divisions and normalizations. Geometric coincidence uses
/// entity tolerances instead.
pub const TOLERANCE: f64 = 1e-10;

/// Wraps `value` into `[start, start + period)`.
#[must_use]
pub fn wrap_into(value: f64, start: f64, period: f64) -> f64 {
    let shifted = (value - start).rem_euclid(period);
    start + shifted
}

/// Shifts `value` by whole periods so that it lies closest to `reference`.
#[must_use]
pub fn unwrap_near(value: f64, reference: f64, period: f64) -> f64 {
    let k = ((reference - value) / period).round();
    value + k * period
}
