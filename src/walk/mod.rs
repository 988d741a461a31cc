//! Walking lines: the intersection of a pair as ordered point sequences.
//!
//! Pairs whose parameter counts add up to at most three meet in isolated
//! points, and every seed becomes a one-point line. Face/face pairs are
//! marched from each seed in both directions.

mod line;
mod march;
pub mod transition;

pub use line::{
    Closure, IntersectionPoint, LineStatus, SideParams, SideTransition, Termination, Transition,
    TransitionKind, WalkingLine,
};

use tracing::{debug, trace};

use crate::config::MarchConfig;
use crate::engine::CancelToken;
use crate::math::{Point3, Vector3};
use crate::seed::{PairGeometry, Seed};

use march::{MarchState, Marcher};
use transition::point_transition;

/// Seeds within this many pair tolerances of an earlier line are covered.
const COVER_FACTOR: f64 = 10.0;

/// A seed is also covered when it lies within this fraction of a
/// segment's length from the segment.
const COVER_SEGMENT_FRACTION: f64 = 0.2;

/// Traces the walking lines of a pair from its seeds.
///
/// Lines come back in seed order. A seed already covered by an earlier
/// line of the pair starts no new line.
#[must_use]
pub fn trace_pair(geom: &PairGeometry, seeds: &[Seed], config: &MarchConfig, cancel: &CancelToken) -> Vec<WalkingLine> {
    if geom.dim() < 4 {
        return seeds
            .iter()
            .map(|seed| {
                WalkingLine::isolated(IntersectionPoint {
                    position: seed.position,
                    params_a: SideParams::from_slice(&seed.params_a),
                    params_b: SideParams::from_slice(&seed.params_b),
                    pair: geom.index,
                    registry_id: None,
                    transition: point_transition(geom, &seed.params_a, &seed.params_b, None),
                    tolerance: geom.tolerance(),
                })
            })
            .collect();
    }

    let marcher = Marcher::new(geom, config, cancel);
    let mut lines: Vec<WalkingLine> = Vec::new();
    for seed in seeds {
        if cancel.is_cancelled() {
            break;
        }
        if lines.iter().any(|line| covers(line, &seed.position, geom.tolerance())) {
            trace!(pair = %geom.pair, "seed covered by an earlier line");
            continue;
        }
        let Some(start) = marcher.start(seed) else {
            continue;
        };
        lines.push(trace_seed(geom, &marcher, &start, config.purge_distance));
    }
    debug!(pair = %geom.pair, seeds = seeds.len(), lines = lines.len(), "pair traced");
    lines
}

fn trace_seed(geom: &PairGeometry, marcher: &Marcher<'_>, start: &MarchState, purge: f64) -> WalkingLine {
    if marcher.tangent(start).is_none() {
        let points = assemble(geom, &[*start]);
        return WalkingLine::from_march(geom.index, points, [Termination::Tangent, Termination::Tangent]);
    }

    let forward = marcher.march(start, 1.0);
    let (states, ends) = if forward.end == Termination::Closed {
        let mut states = Vec::with_capacity(forward.states.len() + 1);
        states.push(*start);
        states.extend(forward.states);
        (states, [Termination::Closed, Termination::Closed])
    } else {
        let backward = marcher.march(start, -1.0);
        let mut states: Vec<MarchState> = backward.states.into_iter().rev().collect();
        states.push(*start);
        states.extend(forward.states);
        (states, [backward.end, forward.end])
    };

    let mut points = purge_close(assemble(geom, &states), purge);
    if ends[0] == Termination::Closed && points.len() > 1 {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if (first.position - last.position).norm() <= purge {
                points.pop();
            }
        }
    }
    let line = WalkingLine::from_march(geom.index, points, ends);
    trace!(pair = %geom.pair, points = line.points.len(), start = %ends[0], end = %ends[1], "line traced");
    line
}

/// Converts march states into intersection points, labelling each with the
/// transition along the line order.
fn assemble(geom: &PairGeometry, states: &[MarchState]) -> Vec<IntersectionPoint> {
    let n = states.len();
    (0..n)
        .map(|i| {
            let state = &states[i];
            let direction: Option<Vector3> = (n > 1).then(|| {
                let prev = &states[i.saturating_sub(1)];
                let next = &states[(i + 1).min(n - 1)];
                next.position - prev.position
            });
            let (pa, pb) = (state.pa(), state.pb());
            IntersectionPoint {
                position: state.position,
                params_a: SideParams::from_slice(&pa),
                params_b: SideParams::from_slice(&pb),
                pair: geom.index,
                registry_id: None,
                transition: point_transition(geom, &pa, &pb, direction.as_ref()),
                tolerance: geom.tolerance(),
            }
        })
        .collect()
}

/// Drops points closer than `distance` to the previously kept point. The
/// first and last points are always kept.
fn purge_close(points: Vec<IntersectionPoint>, distance: f64) -> Vec<IntersectionPoint> {
    let n = points.len();
    let mut kept: Vec<IntersectionPoint> = Vec::with_capacity(n);
    for (i, point) in points.into_iter().enumerate() {
        let close = kept
            .last()
            .is_some_and(|prev| (point.position - prev.position).norm() <= distance);
        if !close {
            kept.push(point);
        } else if i + 1 == n && kept.len() > 1 {
            kept.pop();
            kept.push(point);
        }
    }
    kept
}

/// Whether `p` lies on `line` closely enough to be the same branch.
fn covers(line: &WalkingLine, p: &Point3, tolerance: f64) -> bool {
    let near = COVER_FACTOR * tolerance;
    let positions: Vec<Point3> = line.points.iter().map(|q| q.position).collect();
    if positions.iter().any(|q| (q - p).norm() <= near) {
        return true;
    }
    let closing = match (line.closure, positions.first(), positions.last()) {
        (Closure::Closed, Some(first), Some(last)) if positions.len() > 2 => Some([*last, *first]),
        _ => None,
    };
    positions
        .windows(2)
        .map(|w| [w[0], w[1]])
        .chain(closing)
        .any(|[a, b]| {
            let ab = b - a;
            let len2 = ab.norm_squared();
            if len2 <= f64::EPSILON {
                return false;
            }
            let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
            let d = (p - (a + ab * t)).norm();
            d <= near.max(COVER_SEGMENT_FRACTION * len2.sqrt())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{CheckLevel, EngineConfig, SeedConfig};
    use crate::filter::CandidatePair;
    use crate::geometry::surface::{Cylinder, Plane, Sphere, Surface};
    use crate::seed::find_seeds;
    use crate::topology::{EntityId, ShapeBuilder, TopologyStore};
    use approx::assert_abs_diff_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn trace(store: &TopologyStore, a: EntityId, b: EntityId) -> Vec<WalkingLine> {
        trace_with(store, a, b, &EngineConfig::default())
    }

    fn trace_with(store: &TopologyStore, a: EntityId, b: EntityId, config: &EngineConfig) -> Vec<WalkingLine> {
        let pair = CandidatePair::new(a, b, CheckLevel::All);
        let geom = PairGeometry::new(store, 3, pair, config, &HashMap::new()).unwrap();
        let seeds = find_seeds(&geom, &SeedConfig::default()).unwrap();
        trace_pair(&geom, &seeds, &config.march, &CancelToken::new())
    }

    fn crossing_squares(store: &mut TopologyStore) -> (EntityId, EntityId) {
        let mut builder = ShapeBuilder::new(store);
        let fa = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let vertical = Plane::new(Point3::origin(), Vector3::x(), Vector3::z()).unwrap();
        let fb = builder.rectangle_face(vertical, -0.5, 0.5, -1.0, 1.0).unwrap();
        (fa.into(), fb.into())
    }

    #[test]
    fn crossing_squares_give_one_segment() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let fa = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let vertical = Plane::new(Point3::origin(), Vector3::x(), Vector3::z()).unwrap();
        let fb = builder.rectangle_face(vertical, -0.5, 0.5, -1.0, 1.0).unwrap();
        let lines = trace(&store, fa.into(), fb.into());
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.pair, 3);
        assert_eq!(line.status, LineStatus::Complete);
        assert_eq!(line.closure, Closure::Open);
        assert_eq!(line.ends, [Termination::BoundaryHit, Termination::BoundaryHit]);
        assert_abs_diff_eq!(line.length(), 1.0, epsilon = 1e-6);
        for p in &line.points {
            assert_abs_diff_eq!(p.position.y, 0.0, epsilon = 1e-7);
            assert_abs_diff_eq!(p.position.z, 0.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn plane_cuts_sphere_in_a_closed_circle() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let plane = builder.rectangle_face(Plane::xy(), -2.0, 2.0, -2.0, 2.0).unwrap();
        let sphere = Sphere::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let limits = sphere.domain();
        let ball = builder.trimmed_face(Arc::new(sphere), limits).unwrap();
        let lines = trace(&store, plane.into(), ball.into());
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.closure, Closure::Closed);
        assert_eq!(line.status, LineStatus::Complete);
        assert!(line.points.len() > 8);
        for p in &line.points {
            assert_abs_diff_eq!(p.position.coords.norm(), 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(p.position.z, 0.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(line.length(), std::f64::consts::TAU, epsilon = 0.05);
    }

    #[test]
    fn plane_along_cylinder_gives_two_lines() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let cylinder = Cylinder::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let tube = builder
            .trimmed_face(
                Arc::new(cylinder),
                crate::geometry::SurfaceDomain::new(0.0, std::f64::consts::TAU, -1.0, 1.0),
            )
            .unwrap();
        let cut = Plane::new(Point3::new(0.5, 0.0, 0.0), Vector3::y(), Vector3::z()).unwrap();
        let plane = builder.rectangle_face(cut, -2.0, 2.0, -2.0, 2.0).unwrap();
        let lines = trace(&store, tube.into(), plane.into());
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert_eq!(line.ends, [Termination::BoundaryHit, Termination::BoundaryHit]);
            assert_abs_diff_eq!(line.length(), 2.0, epsilon = 1e-6);
            for p in &line.points {
                assert_abs_diff_eq!(p.position.x, 0.5, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn cancelled_run_traces_nothing() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let fa = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let vertical = Plane::new(Point3::origin(), Vector3::x(), Vector3::z()).unwrap();
        let fb = builder.rectangle_face(vertical, -1.0, 1.0, -1.0, 1.0).unwrap();
        let config = EngineConfig::default();
        let geom = PairGeometry::new(
            &store,
            0,
            CandidatePair::new(fa.into(), fb.into(), CheckLevel::All),
            &config,
            &HashMap::new(),
        )
        .unwrap();
        let seeds = find_seeds(&geom, &config.seed).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(trace_pair(&geom, &seeds, &config.march, &cancel).is_empty());
    }

    #[test]
    fn step_cap_leaves_partial_lines() {
        let mut store = TopologyStore::new();
        let (fa, fb) = crossing_squares(&mut store);
        let mut config = EngineConfig::default();
        config.march.max_steps = 2;
        let lines = trace_with(&store, fa, fb, &config);
        assert!(!lines.is_empty());
        assert!(lines.iter().any(|l| l.ends.contains(&Termination::Stalled)));
        for line in &lines {
            assert_eq!(line.status, LineStatus::Partial);
            assert!(line.points.len() <= 5);
        }
    }

    #[test]
    fn no_usable_step_diverges() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let plane = builder.rectangle_face(Plane::xy(), -2.0, 2.0, -2.0, 2.0).unwrap();
        let sphere = Sphere::new(Point3::origin(), 1.0, Vector3::z(), Vector3::x()).unwrap();
        let limits = sphere.domain();
        let ball = builder.trimmed_face(Arc::new(sphere), limits).unwrap();
        // Every step along the circle turns more than allowed, and the
        // step may not shrink.
        let mut config = EngineConfig::default();
        config.march.min_step = config.march.initial_step;
        config.march.max_turn = 1e-6;
        let lines = trace_with(&store, plane.into(), ball.into(), &config);
        assert!(!lines.is_empty());
        for line in &lines {
            assert_eq!(line.status, LineStatus::Partial);
            assert_eq!(line.ends, [Termination::Diverged, Termination::Diverged]);
            assert_eq!(line.points.len(), 1);
        }
    }

    #[test]
    fn cancel_during_march_keeps_partial_line() {
        let mut store = TopologyStore::new();
        let (fa, fb) = crossing_squares(&mut store);
        let config = EngineConfig::default();
        let pair = CandidatePair::new(fa, fb, CheckLevel::All);
        let geom = PairGeometry::new(&store, 0, pair, &config, &HashMap::new()).unwrap();
        let seeds = find_seeds(&geom, &config.seed).unwrap();
        let cancel = CancelToken::new();
        let marcher = Marcher::new(&geom, &config.march, &cancel);
        let start = marcher.start(&seeds[0]).unwrap();
        // The pair is already being traced when the cancel arrives.
        cancel.cancel();
        let line = trace_seed(&geom, &marcher, &start, config.march.purge_distance);
        assert_eq!(line.status, LineStatus::Partial);
        assert_eq!(line.ends, [Termination::Cancelled, Termination::Cancelled]);
        assert_eq!(line.points.len(), 1);
    }

    #[test]
    fn coplanar_faces_are_tangent_points() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let fa = builder.rectangle_face(Plane::xy(), 0.0, 1.0, 0.0, 1.0).unwrap();
        let fb = builder.rectangle_face(Plane::xy(), 0.5, 1.5, 0.0, 1.0).unwrap();
        let lines = trace(&store, fa.into(), fb.into());
        assert!(!lines.is_empty());
        for line in &lines {
            assert_eq!(line.status, LineStatus::Degenerate);
            assert_eq!(line.ends, [Termination::Tangent, Termination::Tangent]);
            assert_eq!(line.points[0].transition.a.kind, TransitionKind::Tangent);
        }
    }

    fn bare_point(x: f64) -> IntersectionPoint {
        IntersectionPoint {
            position: Point3::new(x, 0.0, 0.0),
            params_a: SideParams::Vertex,
            params_b: SideParams::Vertex,
            pair: 0,
            registry_id: None,
            transition: Transition {
                a: SideTransition::undecided(None),
                b: SideTransition::undecided(None),
            },
            tolerance: 1e-7,
        }
    }

    #[test]
    fn purge_keeps_both_ends() {
        let xs = [0.0, 1e-12, 0.5, 1.0 - 1e-12, 1.0];
        let points = purge_close(xs.iter().map(|&x| bare_point(x)).collect(), 1e-9);
        let kept: Vec<f64> = points.iter().map(|p| p.position.x).collect();
        assert_eq!(kept, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn covered_by_segment() {
        let line = WalkingLine::from_march(
            0,
            vec![bare_point(0.0), bare_point(1.0)],
            [Termination::BoundaryHit, Termination::BoundaryHit],
        );
        assert!(covers(&line, &Point3::new(0.5, 0.01, 0.0), 1e-7));
        assert!(!covers(&line, &Point3::new(0.5, 0.5, 0.0), 1e-7));
    }
}
