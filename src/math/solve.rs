//! Small dense solvers shared by seed refinement and marching.

use nalgebra::{DMatrix, DVector, Matrix2, Matrix4, Vector4};

use super::{Vector2, Vector3, TOLERANCE};

/// Minimum-norm least-squares Newton step: solves `J * delta = -residual`.
///
/// Works for under-determined systems (surface/surface, where the solution
/// set is a curve) as well as over-determined ones (curve/curve in 3D).
/// Returns `None` when the SVD cannot be formed.
#[must_use]
pub fn least_squares_step(jacobian: &DMatrix<f64>, residual: &DVector<f64>) -> Option<DVector<f64>> {
    if jacobian.ncols() == 0 {
        return Some(DVector::zeros(0));
    }
    let svd = jacobian.clone().svd(true, true);
    let scale = svd.singular_values.max().max(1.0);
    svd.solve(&(-residual), TOLERANCE * scale).ok()
}

/// Expresses the 3D direction `dir` in the tangent basis `(su, sv)` of a
/// surface, in the least-squares sense.
///
/// Returns `None` if the basis is singular (e.g. at a sphere pole).
#[must_use]
pub fn tangent_to_params(su: &Vector3, sv: &Vector3, dir: &Vector3) -> Option<Vector2> {
    let uu = su.dot(su);
    let uv = su.dot(sv);
    let vv = sv.dot(sv);
    let gram = Matrix2::new(uu, uv, uv, vv);
    if gram.determinant().abs() < TOLERANCE * TOLERANCE * (uu * vv).max(1.0) {
        return None;
    }
    gram.lu().solve(&Vector2::new(su.dot(dir), sv.dot(dir)))
}

/// Solves a square 4x4 system with partial-pivot LU.
#[must_use]
pub fn solve_4x4(matrix: Matrix4<f64>, rhs: &Vector4<f64>) -> Option<Vector4<f64>> {
    matrix.lu().solve(rhs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn least_squares_exact_square_system() {
        let j = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let r = DVector::from_vec(vec![2.0, -8.0]);
        let step = least_squares_step(&j, &r).unwrap();
        assert_abs_diff_eq!(step[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(step[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn least_squares_minimum_norm_when_underdetermined() {
        // x + y = 2 has minimum-norm solution (1, 1).
        let j = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let r = DVector::from_vec(vec![-2.0]);
        let step = least_squares_step(&j, &r).unwrap();
        assert_abs_diff_eq!(step[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(step[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn tangent_in_orthonormal_basis() {
        let a = tangent_to_params(&Vector3::x(), &Vector3::y(), &Vector3::new(0.6, 0.8, 0.0))
            .unwrap();
        assert_abs_diff_eq!(a.x, 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn tangent_in_singular_basis() {
        assert!(tangent_to_params(&Vector3::x(), &Vector3::zeros(), &Vector3::x()).is_none());
    }
}
