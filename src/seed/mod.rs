//! Seed finding: approximate intersection points of a candidate pair.
//!
//! Both entities are sampled on a coarse lattice, close sample pairs are
//! refined with a least-squares Newton iteration on `A(pa) - B(pb) = 0`,
//! and converged points are deduplicated and filtered against the faces'
//! boundaries.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::classify::{FaceClassifier, FaceState};
use crate::config::{EngineConfig, SeedConfig};
use crate::error::{GeometryError, Result};
use crate::filter::CandidatePair;
use crate::geometry::adapter::Patch;
use crate::math::solve::least_squares_step;
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::topology::{EntityId, FaceId, TopologyStore};

/// One side of a candidate pair, ready for numeric work.
#[derive(Debug, Clone)]
pub struct PairSide {
    pub entity: EntityId,
    pub patch: Patch,
    pub tolerance: f64,
    /// Boundary classifier when the side is a face.
    pub classifier: Option<Arc<FaceClassifier>>,
    /// Whether the face normal agrees with the surface normal.
    pub same_sense: bool,
}

impl PairSide {
    fn new(
        store: &TopologyStore,
        entity: EntityId,
        config: &EngineConfig,
        classifiers: &HashMap<FaceId, Arc<FaceClassifier>>,
    ) -> Result<Self> {
        let (patch, tolerance) = Patch::of_entity(store, entity, config.tolerance)?;
        let (classifier, same_sense) = match entity {
            EntityId::Face(face) => {
                let classifier = match classifiers.get(&face) {
                    Some(c) => c.clone(),
                    None => Arc::new(FaceClassifier::new(store, face, config.tolerance, &config.classifier)?),
                };
                (Some(classifier), store.face(face)?.same_sense)
            }
            _ => (None, true),
        };
        Ok(Self {
            entity,
            patch,
            tolerance,
            classifier,
            same_sense,
        })
    }

    /// Classifies face parameters against the face boundary. Sides that
    /// are not faces have no state.
    #[must_use]
    pub fn face_state(&self, params: &[f64]) -> Option<FaceState> {
        self.classifier
            .as_ref()
            .map(|c| c.classify(params[0], params[1]))
    }

    /// Whether `params` is inside the side: within the parameter range and
    /// not outside the face boundary.
    #[must_use]
    pub fn admits(&self, params: &[f64], eps: f64) -> bool {
        self.patch.contains(params, eps)
            && !matches!(self.face_state(params), Some(FaceState::Out))
    }

    /// Surface normal at `params`, flipped for reversed faces.
    ///
    /// # Errors
    ///
    /// Returns an error if the side is not a face or the surface is
    /// singular at `params`.
    pub fn normal(&self, params: &[f64]) -> Result<Vector3> {
        let columns = self.patch.jacobian(params)?;
        let [su, sv] = columns.as_slice() else {
            return Err(GeometryError::Degenerate(format!("{} has no normal", self.entity)).into());
        };
        let n = su.cross(sv).try_normalize(TOLERANCE).ok_or(GeometryError::ZeroVector)?;
        Ok(if self.same_sense { n } else { -n })
    }
}

/// The two resolved sides of a candidate pair.
#[derive(Debug, Clone)]
pub struct PairGeometry {
    /// Position of the pair in the run's candidate list.
    pub index: usize,
    pub pair: CandidatePair,
    pub a: PairSide,
    pub b: PairSide,
    /// Length scale of the pair, used for step sizes.
    pub extent: f64,
}

impl PairGeometry {
    /// Resolves both entities of `pair`. Face classifiers are taken from
    /// `classifiers` when present and compiled otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if either entity is missing or malformed.
    pub fn new(
        store: &TopologyStore,
        index: usize,
        pair: CandidatePair,
        config: &EngineConfig,
        classifiers: &HashMap<FaceId, Arc<FaceClassifier>>,
    ) -> Result<Self> {
        let a = PairSide::new(store, pair.a, config, classifiers)?;
        let b = PairSide::new(store, pair.b, config, classifiers)?;
        let diag = |side: &PairSide| -> Result<f64> {
            let mut lo = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
            let mut hi = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
            for params in side.patch.samples(9, 5) {
                let p = side.patch.eval(&params)?;
                lo = lo.inf(&p);
                hi = hi.sup(&p);
            }
            Ok((hi - lo).norm())
        };
        let (da, db) = (diag(&a)?, diag(&b)?);
        let extent = match (da > TOLERANCE, db > TOLERANCE) {
            (true, true) => da.min(db),
            (true, false) => da,
            (false, true) => db,
            (false, false) => 1.0,
        };
        Ok(Self {
            index,
            pair,
            a,
            b,
            extent,
        })
    }

    /// Coincidence tolerance of the pair: the sum of both sides'.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        (self.a.tolerance + self.b.tolerance).max(TOLERANCE * TOLERANCE)
    }

    /// Total parameter count of both sides.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.a.patch.dim() + self.b.patch.dim()
    }

    /// Largest parameter scale of both sides.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.a.patch.scale().max(self.b.patch.scale())
    }
}

/// A refined approximate intersection point.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Midpoint of both sides' positions.
    pub position: Point3,
    pub params_a: Vec<f64>,
    pub params_b: Vec<f64>,
    /// `|A(pa) - B(pb)|` after refinement.
    pub residual: f64,
    /// Whether either side's parameters lie on a domain bound or face
    /// boundary.
    pub on_boundary: bool,
}

/// Finds the seeds of a pair.
///
/// Seeds come back sorted by position, at most one per
/// `merge_factor * tolerance` neighbourhood. Seeds whose face parameters
/// classify OUT of their face are dropped.
///
/// # Errors
///
/// Returns an error if the geometry fails to evaluate at a sample.
pub fn find_seeds(geom: &PairGeometry, config: &SeedConfig) -> Result<Vec<Seed>> {
    let tol = geom.tolerance();
    let starts = start_pairs(geom, config, tol)?;
    let merge = config.merge_factor * tol;

    let mut seeds: Vec<Seed> = Vec::new();
    for (pa, pb) in starts {
        let Some(seed) = refine(geom, pa, pb, config)? else {
            continue;
        };
        if seeds.iter().any(|s| (s.position - seed.position).norm() <= merge) {
            continue;
        }
        let states = [
            geom.a.face_state(&seed.params_a),
            geom.b.face_state(&seed.params_b),
        ];
        if states.contains(&Some(FaceState::Out)) {
            trace!(pair = %geom.pair, "seed outside face boundary");
            continue;
        }
        let mut seed = seed;
        if states.contains(&Some(FaceState::On)) {
            seed.on_boundary = true;
        }
        seeds.push(seed);
    }

    seeds.sort_by(|s, t| {
        s.position
            .x
            .total_cmp(&t.position.x)
            .then_with(|| s.position.y.total_cmp(&t.position.y))
            .then_with(|| s.position.z.total_cmp(&t.position.z))
    });
    trace!(pair = %geom.pair, seeds = seeds.len(), "seeds found");
    Ok(seeds)
}

/// Sample pairs worth refining, nearest first.
fn start_pairs(geom: &PairGeometry, config: &SeedConfig, tol: f64) -> Result<Vec<(Vec<f64>, Vec<f64>)>> {
    let sample = |patch: &Patch| -> Result<(Vec<Vec<f64>>, Vec<Point3>)> {
        let params = patch.samples(config.curve_samples, config.surface_grid);
        let points = params
            .iter()
            .map(|p| patch.eval(p))
            .collect::<Result<Vec<_>>>()?;
        Ok((params, points))
    };
    let (params_a, points_a) = sample(&geom.a.patch)?;
    let (params_b, points_b) = sample(&geom.b.patch)?;
    let spacing_a = sample_spacing(&points_a, geom.a.patch.dim(), config.surface_grid);
    let spacing_b = sample_spacing(&points_b, geom.b.patch.dim(), config.surface_grid);
    let range = config.range_factor * tol + spacing_a + spacing_b;

    let mut starts = Vec::new();
    for (i, pa) in points_a.iter().enumerate() {
        let nearest = points_b
            .iter()
            .enumerate()
            .map(|(j, pb)| (j, (pa - pb).norm()))
            .filter(|&(_, d)| d <= range)
            .min_by(|x, y| x.1.total_cmp(&y.1).then_with(|| x.0.cmp(&y.0)));
        if let Some((j, d)) = nearest {
            starts.push((d, i, j));
        }
    }
    // Also start from each B sample so that a short A is not missed
    // between its samples.
    for (j, pb) in points_b.iter().enumerate() {
        let nearest = points_a
            .iter()
            .enumerate()
            .map(|(i, pa)| (i, (pa - pb).norm()))
            .filter(|&(_, d)| d <= range)
            .min_by(|x, y| x.1.total_cmp(&y.1).then_with(|| x.0.cmp(&y.0)));
        if let Some((i, d)) = nearest {
            starts.push((d, i, j));
        }
    }
    starts.sort_by(|x, y| x.0.total_cmp(&y.0).then_with(|| (x.1, x.2).cmp(&(y.1, y.2))));
    starts.dedup_by(|x, y| x.1 == y.1 && x.2 == y.2);
    starts.truncate(config.max_starts);
    Ok(starts
        .into_iter()
        .map(|(_, i, j)| (params_a[i].clone(), params_b[j].clone()))
        .collect())
}

/// Largest distance between neighbouring samples.
fn sample_spacing(points: &[Point3], dim: usize, grid: usize) -> f64 {
    match dim {
        0 => 0.0,
        1 => points
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .fold(0.0, f64::max),
        _ => {
            let n = grid.max(2);
            let mut spacing = 0.0_f64;
            for (k, p) in points.iter().enumerate() {
                let (i, j) = (k / n, k % n);
                if j + 1 < n {
                    spacing = spacing.max((points[k + 1] - p).norm());
                }
                if i + 1 < n {
                    if let Some(q) = points.get(k + n) {
                        spacing = spacing.max((q - p).norm());
                    }
                }
            }
            spacing
        }
    }
}

/// Gauss-Newton refinement of one start. Returns `None` when the iteration
/// does not reach the pair tolerance.
fn refine(geom: &PairGeometry, mut pa: Vec<f64>, mut pb: Vec<f64>, config: &SeedConfig) -> Result<Option<Seed>> {
    let (da, db) = (geom.a.patch.dim(), geom.b.patch.dim());
    let tol = geom.tolerance();
    let step_tol = config.convergence * geom.scale();

    for _ in 0..config.max_iterations {
        let residual = geom.a.patch.eval(&pa)? - geom.b.patch.eval(&pb)?;
        if residual.norm() <= TOLERANCE * tol {
            break;
        }
        let ja = geom.a.patch.jacobian(&pa)?;
        let jb = geom.b.patch.jacobian(&pb)?;
        let mut jacobian = DMatrix::zeros(3, da + db);
        for r in 0..3 {
            for (c, col) in ja.iter().enumerate() {
                jacobian[(r, c)] = col[r];
            }
            for (c, col) in jb.iter().enumerate() {
                jacobian[(r, da + c)] = -col[r];
            }
        }
        let Some(delta) = least_squares_step(&jacobian, &DVector::from_column_slice(residual.as_slice())) else {
            return Ok(None);
        };

        let (old_a, old_b) = (pa.clone(), pb.clone());
        for (k, value) in pa.iter_mut().enumerate() {
            *value += delta[k];
        }
        for (k, value) in pb.iter_mut().enumerate() {
            *value += delta[da + k];
        }
        geom.a.patch.clamp(&mut pa, 0.0);
        geom.b.patch.clamp(&mut pb, 0.0);

        // Movement after clamping; a start pinned against a bound stops.
        let moved = old_a
            .iter()
            .zip(&pa)
            .chain(old_b.iter().zip(&pb))
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        if delta.norm() < step_tol || moved < step_tol {
            break;
        }
    }

    let a = geom.a.patch.eval(&pa)?;
    let b = geom.b.patch.eval(&pb)?;
    let residual = (a - b).norm();
    if residual > tol {
        return Ok(None);
    }
    let eps = TOLERANCE * geom.scale();
    let on_boundary = geom.a.patch.on_bound(&pa, eps) || geom.b.patch.on_bound(&pb, eps);
    Ok(Some(Seed {
        position: nalgebra::center(&a, &b),
        params_a: pa,
        params_b: pb,
        residual,
        on_boundary,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CheckLevel;
    use crate::geometry::curve::Circle;
    use crate::geometry::surface::Plane;
    use crate::math::Vector3;
    use crate::topology::ShapeBuilder;
    use approx::assert_abs_diff_eq;

    fn geometry(store: &TopologyStore, a: EntityId, b: EntityId) -> PairGeometry {
        let pair = CandidatePair::new(a, b, CheckLevel::All);
        PairGeometry::new(store, 0, pair, &EngineConfig::default(), &HashMap::new()).unwrap()
    }

    #[test]
    fn two_circles_meet_twice() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let c1 = builder
            .circle_edge(Circle::in_xy(Point3::origin(), 1.0).unwrap())
            .unwrap();
        let c2 = builder
            .circle_edge(Circle::in_xy(Point3::new(1.0, 0.0, 0.0), 1.0).unwrap())
            .unwrap();
        let geom = geometry(&store, c1.into(), c2.into());
        let seeds = find_seeds(&geom, &SeedConfig::default()).unwrap();
        assert_eq!(seeds.len(), 2);
        let half = 3.0_f64.sqrt() / 2.0;
        let mut ys: Vec<f64> = seeds.iter().map(|s| s.position.y).collect();
        ys.sort_by(f64::total_cmp);
        assert_abs_diff_eq!(ys[0], -half, epsilon = 1e-7);
        assert_abs_diff_eq!(ys[1], half, epsilon = 1e-7);
        for seed in &seeds {
            assert_abs_diff_eq!(seed.position.x, 0.5, epsilon = 1e-7);
            assert!(seed.residual <= geom.tolerance());
        }
    }

    #[test]
    fn line_through_square() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let v0 = builder.vertex(Point3::new(0.2, 0.3, -1.0));
        let v1 = builder.vertex(Point3::new(0.2, 0.3, 1.0));
        let edge = builder.line_edge(v0, v1).unwrap();
        let geom = geometry(&store, edge.into(), face.into());
        let seeds = find_seeds(&geom, &SeedConfig::default()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_abs_diff_eq!(seeds[0].position.z, 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(seeds[0].params_b[0], 0.2, epsilon = 1e-7);
        assert!(!seeds[0].on_boundary);
    }

    #[test]
    fn line_missing_the_face_has_no_seed() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let face = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        // Crosses the plane at x = 1.05, just outside the square.
        let v0 = builder.vertex(Point3::new(1.05, 0.0, -1.0));
        let v1 = builder.vertex(Point3::new(1.05, 0.0, 1.0));
        let edge = builder.line_edge(v0, v1).unwrap();
        let geom = geometry(&store, edge.into(), face.into());
        assert!(find_seeds(&geom, &SeedConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn vertex_on_edge() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let v0 = builder.vertex(Point3::origin());
        let v1 = builder.vertex(Point3::new(2.0, 0.0, 0.0));
        let edge = builder.line_edge(v0, v1).unwrap();
        let v = builder.vertex(Point3::new(0.7, 0.0, 0.0));
        let geom = geometry(&store, v.into(), edge.into());
        let seeds = find_seeds(&geom, &SeedConfig::default()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert!(seeds[0].params_a.is_empty());
        assert_abs_diff_eq!(seeds[0].params_b[0], 0.7, epsilon = 1e-9);
    }

    #[test]
    fn crossing_planes_give_many_seeds_on_the_line() {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        let fa = builder.rectangle_face(Plane::xy(), -1.0, 1.0, -1.0, 1.0).unwrap();
        let vertical = Plane::new(Point3::origin(), Vector3::x(), Vector3::z()).unwrap();
        let fb = builder.rectangle_face(vertical, -1.0, 1.0, -1.0, 1.0).unwrap();
        let geom = geometry(&store, fa.into(), fb.into());
        let seeds = find_seeds(&geom, &SeedConfig::default()).unwrap();
        assert!(seeds.len() > 1);
        for seed in &seeds {
            assert_abs_diff_eq!(seed.position.y, 0.0, epsilon = 1e-7);
            assert_abs_diff_eq!(seed.position.z, 0.0, epsilon = 1e-7);
        }
    }
}
