use std::fmt;

use crate::classify::FaceState;
use crate::math::{Point2, Point3};
use crate::registry::PointId;

/// Parameters of an intersection point on one side of its pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SideParams {
    Vertex,
    Curve(f64),
    Surface(Point2),
}

impl SideParams {
    /// Builds the side parameters from a flat slice of length 0, 1 or 2.
    #[must_use]
    pub fn from_slice(params: &[f64]) -> Self {
        match params {
            [] => Self::Vertex,
            [t] => Self::Curve(*t),
            [u, v, ..] => Self::Surface(Point2::new(*u, *v)),
        }
    }

    /// The flat parameter slice.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Self::Vertex => Vec::new(),
            Self::Curve(t) => vec![*t],
            Self::Surface(uv) => vec![uv.x, uv.y],
        }
    }
}

/// How an intersection crosses one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Forward,
    Reversed,
    Tangent,
    Undecided,
}

/// Transition on one side, with the face-relative state when the side is
/// a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SideTransition {
    pub kind: TransitionKind,
    pub state: Option<FaceState>,
}

impl SideTransition {
    #[must_use]
    pub fn undecided(state: Option<FaceState>) -> Self {
        Self {
            kind: TransitionKind::Undecided,
            state,
        }
    }
}

/// Transitions of both sides at a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub a: SideTransition,
    pub b: SideTransition,
}

/// A point on the intersection of a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionPoint {
    pub position: Point3,
    pub params_a: SideParams,
    pub params_b: SideParams,
    /// Index of the originating pair in the run's pair list.
    pub pair: usize,
    /// Canonical registry point, assigned after reconciliation.
    pub registry_id: Option<PointId>,
    pub transition: Transition,
    /// Coincidence tolerance of the originating pair.
    pub tolerance: f64,
}

/// Whether a walking line returns to its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Closure {
    Open,
    Closed,
}

/// How complete a walking line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineStatus {
    /// Traced until it closed, left the domain or went tangent.
    Complete,
    /// Stopped early: the march diverged, stalled or was cancelled.
    Partial,
    /// A single point.
    Degenerate,
}

/// Why a march in one direction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Returned to the start point.
    Closed,
    /// Reached a parameter bound or face boundary.
    BoundaryHit,
    /// The surfaces became tangent.
    Tangent,
    /// Corrections failed down to the minimum step.
    Diverged,
    /// The step cap was reached.
    Stalled,
    /// The run was cancelled.
    Cancelled,
    /// The pair meets in isolated points; there is nothing to march.
    Isolated,
}

impl Termination {
    /// Whether the march ended for a geometric reason rather than a limit.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Closed | Self::BoundaryHit | Self::Tangent | Self::Isolated)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::BoundaryHit => "boundary",
            Self::Tangent => "tangent",
            Self::Diverged => "diverged",
            Self::Stalled => "stalled",
            Self::Cancelled => "cancelled",
            Self::Isolated => "isolated",
        };
        f.write_str(s)
    }
}

/// An ordered sequence of intersection points from one pair.
///
/// For a closed line the last point connects back to the first; the first
/// point is not repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkingLine {
    pub pair: usize,
    pub points: Vec<IntersectionPoint>,
    pub closure: Closure,
    pub status: LineStatus,
    /// Termination at the start and at the end of the point order.
    pub ends: [Termination; 2],
}

impl WalkingLine {
    /// A one-point line for an isolated intersection.
    #[must_use]
    pub fn isolated(point: IntersectionPoint) -> Self {
        Self {
            pair: point.pair,
            points: vec![point],
            closure: Closure::Open,
            status: LineStatus::Degenerate,
            ends: [Termination::Isolated, Termination::Isolated],
        }
    }

    /// Builds a line from its points and end terminations, deriving the
    /// closure and status.
    #[must_use]
    pub fn from_march(pair: usize, points: Vec<IntersectionPoint>, ends: [Termination; 2]) -> Self {
        let closure = if ends.contains(&Termination::Closed) {
            Closure::Closed
        } else {
            Closure::Open
        };
        // An interrupted march is partial even if it never left its seed.
        let status = if !ends.iter().all(|e| e.is_complete()) {
            LineStatus::Partial
        } else if points.len() < 2 {
            LineStatus::Degenerate
        } else {
            LineStatus::Complete
        };
        Self {
            pair,
            points,
            closure,
            status,
            ends,
        }
    }

    /// Chord length of the polyline, including the closing segment of a
    /// closed line.
    #[must_use]
    pub fn length(&self) -> f64 {
        let open: f64 = self
            .points
            .windows(2)
            .map(|w| (w[1].position - w[0].position).norm())
            .sum();
        match (self.closure, self.points.first(), self.points.last()) {
            (Closure::Closed, Some(first), Some(last)) => open + (first.position - last.position).norm(),
            _ => open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64) -> IntersectionPoint {
        let undecided = SideTransition::undecided(None);
        IntersectionPoint {
            position: Point3::new(x, 0.0, 0.0),
            params_a: SideParams::Vertex,
            params_b: SideParams::Vertex,
            pair: 0,
            registry_id: None,
            transition: Transition {
                a: undecided,
                b: undecided,
            },
            tolerance: 1e-7,
        }
    }

    #[test]
    fn interrupted_single_point_is_partial() {
        for end in [Termination::Cancelled, Termination::Diverged, Termination::Stalled] {
            let line = WalkingLine::from_march(0, vec![point(0.0)], [end, end]);
            assert_eq!(line.status, LineStatus::Partial);
            assert_eq!(line.closure, Closure::Open);
        }
        let line = WalkingLine::from_march(0, vec![point(0.0)], [Termination::BoundaryHit, Termination::Cancelled]);
        assert_eq!(line.status, LineStatus::Partial);
    }

    #[test]
    fn complete_single_point_is_degenerate() {
        let line = WalkingLine::from_march(0, vec![point(0.0)], [Termination::Tangent, Termination::Tangent]);
        assert_eq!(line.status, LineStatus::Degenerate);
    }

    #[test]
    fn status_from_ends() {
        let points = vec![point(0.0), point(1.0)];
        let done = WalkingLine::from_march(0, points.clone(), [Termination::BoundaryHit, Termination::BoundaryHit]);
        assert_eq!(done.status, LineStatus::Complete);
        let cut = WalkingLine::from_march(0, points, [Termination::BoundaryHit, Termination::Stalled]);
        assert_eq!(cut.status, LineStatus::Partial);
        assert!((cut.length() - 1.0).abs() < 1e-12);
    }
}
