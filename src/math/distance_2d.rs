use super::{Point2, Vector2};

/// Returns the minimum distance from `p` to the line segment `a`–`b`.
#[must_use]
pub fn point_to_segment_dist(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();

    if len_sq < 1e-20 {
        // Degenerate segment (zero length).
        return (p - a).norm();
    }

    // Project point onto the infinite line, clamp to [0, 1].
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// 2D cross product (z component of the 3D cross product).
#[must_use]
pub fn cross_2d(a: &Vector2, b: &Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Outcome of casting a ray against one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayCrossing {
    /// The ray does not cross the segment.
    Miss,
    /// The ray crosses the segment interior transversally.
    Cross,
    /// The ray grazes an endpoint or runs along the segment.
    Degenerate,
}

/// Casts the ray `origin + s * dir` (`s > 0`) against segment `a`–`b`.
///
/// An endpoint lying within `eps` of the ray reports [`RayCrossing::Degenerate`]
/// so the caller can retry with another direction. `dir` must be a unit vector.
#[must_use]
pub fn ray_segment_crossing(
    origin: &Point2,
    dir: &Vector2,
    a: &Point2,
    b: &Point2,
    eps: f64,
) -> RayCrossing {
    let oa = a - origin;
    let ob = b - origin;
    let fa = cross_2d(dir, &oa);
    let fb = cross_2d(dir, &ob);

    let grazes = |f: f64, v: &Vector2| f.abs() <= eps && dir.dot(v) >= -eps;
    if grazes(fa, &oa) || grazes(fb, &ob) {
        return RayCrossing::Degenerate;
    }

    if (fa > 0.0) == (fb > 0.0) {
        return RayCrossing::Miss;
    }

    let lambda = fa / (fa - fb);
    let hit = oa + (ob - oa) * lambda;
    if dir.dot(&hit) > 0.0 {
        RayCrossing::Cross
    } else {
        RayCrossing::Miss
    }
}
