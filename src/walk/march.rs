//! Predictor-corrector marching along a face/face intersection.
//!
//! The state is the four surface parameters `(ua, va, ub, vb)`. A step
//! predicts along `n_a x n_b` mapped into each parameter plane, then
//! corrects with a 4x4 Newton iteration on `A(pa) - B(pb) = 0` plus the
//! arc-length constraint `(A(pa) - anchor) . dir = h`.

use nalgebra::{Matrix4, Vector4};
use tracing::trace;

use crate::config::MarchConfig;
use crate::engine::CancelToken;
use crate::geometry::adapter::Patch;
use crate::math::solve::{solve_4x4, tangent_to_params};
use crate::math::{wrap_into, Point3, Vector3};
use crate::seed::{PairGeometry, Seed};

use super::line::Termination;

/// Below this sine of the angle between the normals the march stops as
/// tangent; the corrector is ill-conditioned past it.
const MARCH_TANGENT_SINE: f64 = 1e-4;

/// A point of the march: surface parameters and the 3D midpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MarchState {
    pub params: [f64; 4],
    pub position: Point3,
}

impl MarchState {
    pub fn pa(&self) -> [f64; 2] {
        [self.params[0], self.params[1]]
    }

    pub fn pb(&self) -> [f64; 2] {
        [self.params[2], self.params[3]]
    }
}

/// Result of marching in one direction: the points after the start, in
/// marching order.
#[derive(Debug)]
pub(crate) struct MarchLeg {
    pub states: Vec<MarchState>,
    pub end: Termination,
}

pub(crate) struct Marcher<'a> {
    geom: &'a PairGeometry,
    config: &'a MarchConfig,
    cancel: &'a CancelToken,
    tolerance: f64,
    newton_eps: f64,
    h_init: f64,
    h_min: f64,
    h_max: f64,
}

impl<'a> Marcher<'a> {
    pub fn new(geom: &'a PairGeometry, config: &'a MarchConfig, cancel: &'a CancelToken) -> Self {
        let tolerance = geom.tolerance();
        let extent = geom.extent;
        Self {
            geom,
            config,
            cancel,
            tolerance,
            newton_eps: (0.01 * tolerance).max(1e-13 * extent),
            h_init: config.initial_step * extent,
            h_min: config.min_step * extent,
            h_max: config.max_step * extent,
        }
    }

    /// The state at a seed, or `None` if the seed is not on two surfaces.
    pub fn start(&self, seed: &Seed) -> Option<MarchState> {
        let (pa, pb) = (seed.params_a.as_slice(), seed.params_b.as_slice());
        let ([ua, va], [ub, vb]) = (pa, pb) else {
            return None;
        };
        self.state([*ua, *va, *ub, *vb])
    }

    fn state(&self, mut params: [f64; 4]) -> Option<MarchState> {
        wrap(&self.geom.a.patch, &mut params[0..2]);
        wrap(&self.geom.b.patch, &mut params[2..4]);
        let a = self.geom.a.patch.eval(&params[0..2]).ok()?;
        let b = self.geom.b.patch.eval(&params[2..4]).ok()?;
        Some(MarchState {
            params,
            position: nalgebra::center(&a, &b),
        })
    }

    /// Unit direction of the intersection, `n_a x n_b`, or `None` where
    /// the surfaces are tangent or singular.
    pub fn tangent(&self, state: &MarchState) -> Option<Vector3> {
        let na = self.geom.a.normal(&state.pa()).ok()?;
        let nb = self.geom.b.normal(&state.pb()).ok()?;
        let t = na.cross(&nb);
        (t.norm() >= MARCH_TANGENT_SINE).then(|| t.normalize())
    }

    /// Whether the state lies inside both parameter ranges and faces.
    fn inside(&self, state: &MarchState) -> bool {
        let eps_a = 1e-9 * self.geom.a.patch.scale();
        let eps_b = 1e-9 * self.geom.b.patch.scale();
        self.geom.a.admits(&state.pa(), eps_a) && self.geom.b.admits(&state.pb(), eps_b)
    }

    /// Marches from `start` along `sign * tangent` until a termination.
    pub fn march(&self, start: &MarchState, sign: f64) -> MarchLeg {
        let mut states = Vec::new();
        let Some(t0) = self.tangent(start) else {
            return MarchLeg {
                states,
                end: Termination::Tangent,
            };
        };
        let mut dir = t0 * sign;
        let mut current = *start;
        let mut h = self.h_init;
        let mut streak = 0;
        let mut left_start = false;

        let mut steps = 0;
        while steps < self.config.max_steps {
            if self.cancel.is_cancelled() {
                return MarchLeg {
                    states,
                    end: Termination::Cancelled,
                };
            }
            let Some((next, iterations)) = self.step(&current, &dir, h) else {
                h *= 0.5;
                streak = 0;
                if h < self.h_min {
                    return MarchLeg {
                        states,
                        end: Termination::Diverged,
                    };
                }
                continue;
            };

            if !self.inside(&next) {
                if let Some(edge) = self.locate_boundary(&current, &dir, h) {
                    states.push(edge);
                }
                return MarchLeg {
                    states,
                    end: Termination::BoundaryHit,
                };
            }

            let Some(next_dir) = self.tangent(&next) else {
                states.push(next);
                return MarchLeg {
                    states,
                    end: Termination::Tangent,
                };
            };
            let next_dir = if next_dir.dot(&dir) < 0.0 { -next_dir } else { next_dir };
            if dir.angle(&next_dir) > self.config.max_turn {
                h *= 0.5;
                streak = 0;
                if h < self.h_min {
                    return MarchLeg {
                        states,
                        end: Termination::Diverged,
                    };
                }
                continue;
            }

            let close = self.tolerance.max(self.config.close_fraction * h);
            if left_start && segment_distance(&start.position, &current.position, &next.position) <= close {
                return MarchLeg {
                    states,
                    end: Termination::Closed,
                };
            }

            states.push(next);
            steps += 1;
            if (next.position - start.position).norm() > 1.5 * h {
                left_start = true;
            }
            if iterations <= self.config.fast_iterations {
                streak += 1;
                if streak >= self.config.fast_streak {
                    h = (2.0 * h).min(self.h_max);
                    streak = 0;
                }
            } else {
                streak = 0;
            }
            current = next;
            dir = next_dir;
        }
        trace!(pair = %self.geom.pair, steps, "march stalled");
        MarchLeg {
            states,
            end: Termination::Stalled,
        }
    }

    /// One predictor-corrector step of length `h`. Returns the corrected
    /// state and the Newton iterations it took.
    fn step(&self, current: &MarchState, dir: &Vector3, h: f64) -> Option<(MarchState, usize)> {
        let predict = |patch: &Patch, uv: [f64; 2]| -> Option<[f64; 2]> {
            let columns = patch.jacobian(&uv).ok()?;
            let d = tangent_to_params(&columns[0], &columns[1], dir)?;
            Some([uv[0] + h * d.x, uv[1] + h * d.y])
        };
        let [ua, va] = predict(&self.geom.a.patch, current.pa())?;
        let [ub, vb] = predict(&self.geom.b.patch, current.pb())?;
        let (next, iterations) = self.correct([ua, va, ub, vb], &current.position, dir, h)?;
        // A corrector that slid along the surfaces to a far point has left
        // the branch.
        if (next.position - current.position).norm() > 2.0 * h {
            return None;
        }
        Some((next, iterations))
    }

    fn correct(&self, guess: [f64; 4], anchor: &Point3, dir: &Vector3, h: f64) -> Option<(MarchState, usize)> {
        let (pa, pb) = (&self.geom.a.patch, &self.geom.b.patch);
        let mut x = Vector4::from(guess);
        for iteration in 0..=self.config.newton_iterations {
            let a = pa.eval(&[x[0], x[1]]).ok()?;
            let b = pb.eval(&[x[2], x[3]]).ok()?;
            let gap = a - b;
            let along = (a - anchor).dot(dir) - h;
            if gap.norm() <= self.newton_eps && along.abs() <= self.newton_eps {
                return self.state([x[0], x[1], x[2], x[3]]).map(|s| (s, iteration));
            }
            if iteration == self.config.newton_iterations {
                break;
            }
            let ja = pa.jacobian(&[x[0], x[1]]).ok()?;
            let jb = pb.jacobian(&[x[2], x[3]]).ok()?;
            #[rustfmt::skip]
            let jacobian = Matrix4::new(
                ja[0].x, ja[1].x, -jb[0].x, -jb[1].x,
                ja[0].y, ja[1].y, -jb[0].y, -jb[1].y,
                ja[0].z, ja[1].z, -jb[0].z, -jb[1].z,
                ja[0].dot(dir), ja[1].dot(dir), 0.0, 0.0,
            );
            let residual = Vector4::new(gap.x, gap.y, gap.z, along);
            x += solve_4x4(jacobian, &(-residual))?;
            if !x.iter().all(|v| v.is_finite()) {
                return None;
            }
        }
        None
    }

    /// Bisects the step length between `current` (inside) and `h`
    /// (outside) and returns the last inside state, if any.
    fn locate_boundary(&self, current: &MarchState, dir: &Vector3, h: f64) -> Option<MarchState> {
        let (mut lo, mut hi) = (0.0, h);
        let mut best = None;
        for _ in 0..self.config.boundary_iterations {
            if hi - lo <= 0.1 * self.tolerance {
                break;
            }
            let mid = 0.5 * (lo + hi);
            match self.step(current, dir, mid) {
                Some((state, _)) if self.inside(&state) => {
                    lo = mid;
                    best = Some(state);
                }
                _ => hi = mid,
            }
        }
        best
    }
}

/// Moves wrapping parameters into their canonical period.
fn wrap(patch: &Patch, params: &mut [f64]) {
    for (axis, value) in params.iter_mut().enumerate() {
        if let Some(period) = patch.wrap_period(axis) {
            *value = wrap_into(*value, patch.bounds(axis).0, period);
        }
    }
}

/// Distance from `p` to the segment `[a, b]` in 3D.
fn segment_distance(p: &Point3, a: &Point3, b: &Point3) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
