//! Transition labels of intersection points.
//!
//! - curve / surface: the sign of `c' . n` on both sides
//! - surface / surface: the sign of `(n_a x n_b) . d` along the line
//!   direction `d`; side B gets the opposite label
//! - curve / curve: tangent when the tangents are parallel, otherwise
//!   undecided
//! - any vertex side: undecided

use crate::math::Vector3;
use crate::seed::PairGeometry;

use super::line::{SideTransition, Transition, TransitionKind};

/// Below this sine of the angle between two directions they count as
/// parallel.
pub const TANGENT_SINE: f64 = 1e-6;

/// Computes the transition of the point at `(pa, pb)`. `direction` is the
/// walking direction for points on a face/face line.
#[must_use]
pub fn point_transition(geom: &PairGeometry, pa: &[f64], pb: &[f64], direction: Option<&Vector3>) -> Transition {
    let state_a = geom.a.face_state(pa);
    let state_b = geom.b.face_state(pb);
    let (kind_a, kind_b) = kinds(geom, pa, pb, direction).unwrap_or((TransitionKind::Undecided, TransitionKind::Undecided));
    Transition {
        a: SideTransition {
            kind: kind_a,
            state: state_a,
        },
        b: SideTransition {
            kind: kind_b,
            state: state_b,
        },
    }
}

fn kinds(
    geom: &PairGeometry,
    pa: &[f64],
    pb: &[f64],
    direction: Option<&Vector3>,
) -> Option<(TransitionKind, TransitionKind)> {
    use TransitionKind::{Forward, Reversed, Tangent, Undecided};

    let sign = |s: f64| if s > 0.0 { Forward } else { Reversed };
    match (geom.a.patch.dim(), geom.b.patch.dim()) {
        (0, _) | (_, 0) => Some((Undecided, Undecided)),
        (1, 1) => {
            let ta = geom.a.patch.jacobian(pa).ok()?[0].try_normalize(0.0)?;
            let tb = geom.b.patch.jacobian(pb).ok()?[0].try_normalize(0.0)?;
            if ta.cross(&tb).norm() < TANGENT_SINE {
                Some((Tangent, Tangent))
            } else {
                Some((Undecided, Undecided))
            }
        }
        (1, _) | (_, 1) => {
            let (curve, face, pc, pf) = if geom.a.patch.dim() == 1 {
                (&geom.a, &geom.b, pa, pb)
            } else {
                (&geom.b, &geom.a, pb, pa)
            };
            let t = curve.patch.jacobian(pc).ok()?[0].try_normalize(0.0)?;
            let n = face.normal(pf).ok()?;
            let d = t.dot(&n);
            if d.abs() < TANGENT_SINE {
                Some((Tangent, Tangent))
            } else {
                Some((sign(d), sign(d)))
            }
        }
        _ => {
            let na = geom.a.normal(pa).ok()?;
            let nb = geom.b.normal(pb).ok()?;
            let t = na.cross(&nb);
            if t.norm() < TANGENT_SINE {
                return Some((Tangent, Tangent));
            }
            let d = direction?;
            let s = t.dot(d);
            if s > 0.0 {
                Some((Forward, Reversed))
            } else {
                Some((Reversed, Forward))
            }
        }
    }
}
