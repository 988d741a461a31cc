//! The intersection run: broad phase, per-pair seeding and marching on a
//! worker pool, and registry reconciliation.

mod cancel;
mod scheduler;

pub use cancel::CancelToken;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::bounds::{Aabb, BoundsIndex};
use crate::classify::FaceClassifier;
use crate::config::EngineConfig;
use crate::error::{IntersectError, Result};
use crate::filter::{candidate_pairs, CandidatePair, KindPair};
use crate::math::Point3;
use crate::registry::{PointRegistry, PointTag, ShardedRegistry};
use crate::seed::{find_seeds, PairGeometry};
use crate::topology::{EntityId, FaceId, ShapeId, TopologyStore};
use crate::walk::{trace_pair, IntersectionPoint, LineStatus, Termination, WalkingLine};

/// A pair that could not be processed because its input was malformed.
#[derive(Debug)]
pub struct PairFailure {
    pub pair: CandidatePair,
    pub error: IntersectError,
}

/// Counters of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Candidate pairs per kind pair.
    pub candidates: BTreeMap<KindPair, usize>,
    /// Seeds found over all processed pairs.
    pub seeds: usize,
    /// Pairs that were processed, successfully or not.
    pub processed: usize,
    /// Walking lines with [`LineStatus::Partial`].
    pub partial_lines: usize,
    /// Whether the run was cancelled, either before every pair was
    /// processed or while lines were being marched.
    pub cancelled: bool,
}

/// The result of a run.
#[derive(Debug)]
pub struct IntersectionReport {
    /// Every candidate pair, in filter order. Points and lines refer to
    /// pairs by index into this list.
    pub pairs: Vec<CandidatePair>,
    /// Walking lines, ordered by pair and then by seed.
    pub lines: Vec<WalkingLine>,
    /// Canonical points; every line point carries its registry id.
    pub registry: PointRegistry,
    pub failures: Vec<PairFailure>,
    pub stats: RunStats,
}

impl IntersectionReport {
    /// Every point of every line.
    pub fn points(&self) -> impl Iterator<Item = &IntersectionPoint> {
        self.lines.iter().flat_map(|line| line.points.iter())
    }

    /// Positions of the canonical points, sorted lexicographically.
    #[must_use]
    pub fn canonical_points(&self) -> Vec<Point3> {
        let mut points: Vec<Point3> = self.registry.iter().map(|(_, e)| e.position).collect();
        points.sort_by(|p, q| {
            p.x.total_cmp(&q.x)
                .then_with(|| p.y.total_cmp(&q.y))
                .then_with(|| p.z.total_cmp(&q.z))
        });
        points
    }

    /// Lines produced by the pair at `index`.
    pub fn lines_of(&self, index: usize) -> impl Iterator<Item = &WalkingLine> {
        self.lines.iter().filter(move |line| line.pair == index)
    }
}

/// Output of one pair on a worker.
struct PairTrace {
    seeds: usize,
    lines: Vec<WalkingLine>,
}

/// Owns the configuration and cancellation state of intersection runs.
///
/// Nothing is shared between runs: each [`EngineContext::run`] builds its
/// own bounds, classifiers and registry.
#[derive(Debug, Clone)]
pub struct EngineContext {
    config: EngineConfig,
    cancel: CancelToken,
}

impl EngineContext {
    /// Creates a context after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::InvalidConfig`] if a limit is
    /// unusable.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A handle that cancels runs of this context.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Intersects `shape_a` with `shape_b`.
    ///
    /// Malformed entities fail only the pairs they belong to; those
    /// failures are listed in the report and the rest of the run
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns an error if a shape is missing or a worker fails.
    #[instrument(skip(self, store))]
    pub fn run(&self, store: &TopologyStore, shape_a: ShapeId, shape_b: ShapeId) -> Result<IntersectionReport> {
        let config = &self.config;

        // Step 1: bounding volumes and candidate pairs
        let mut bounds = BoundsIndex::new();
        let pairs = candidate_pairs(store, &mut bounds, shape_a, shape_b, config)?;
        let mut stats = RunStats::default();
        for pair in &pairs {
            *stats.candidates.entry(pair.kind).or_default() += 1;
        }

        // Step 2: compile the boundaries of every face that takes part
        let classifiers = compile_classifiers(store, &pairs, config);

        // Step 3: seed and march each pair on the worker pool
        let region = shared_region(store, &bounds, &[shape_a, shape_b])?;
        let registry = ShardedRegistry::new(region, &config.registry);
        let outcomes = scheduler::run_indexed(
            pairs.len(),
            config.workers,
            config.queue_capacity,
            &self.cancel,
            |index| self.trace_one(store, index, pairs[index], &classifiers, &registry),
        )?;

        // Step 4: reconcile the registry and attach canonical ids
        let reconciled = registry.reconcile()?;
        let mut lines = Vec::new();
        let mut failures = Vec::new();
        stats.processed = outcomes.len();
        stats.cancelled = self.cancel.is_cancelled();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(trace) => {
                    stats.seeds += trace.seeds;
                    for (line_index, mut line) in trace.lines.into_iter().enumerate() {
                        for (point_index, point) in line.points.iter_mut().enumerate() {
                            point.registry_id = reconciled.resolve(PointTag {
                                pair: index,
                                line: line_index,
                                index: point_index,
                            });
                        }
                        if line.status == LineStatus::Partial {
                            stats.partial_lines += 1;
                        }
                        if line.ends.contains(&Termination::Cancelled) {
                            stats.cancelled = true;
                        }
                        lines.push(line);
                    }
                }
                Err(IntersectError::Engine(error)) => return Err(error.into()),
                Err(error) => {
                    warn!(pair = %pairs[index], %error, "pair failed");
                    failures.push(PairFailure {
                        pair: pairs[index],
                        error,
                    });
                }
            }
        }

        info!(
            pairs = pairs.len(),
            lines = lines.len(),
            points = reconciled.registry.len(),
            failures = failures.len(),
            "intersection run finished"
        );
        Ok(IntersectionReport {
            pairs,
            lines,
            registry: reconciled.registry,
            failures,
            stats,
        })
    }

    fn trace_one(
        &self,
        store: &TopologyStore,
        index: usize,
        pair: CandidatePair,
        classifiers: &HashMap<FaceId, Arc<FaceClassifier>>,
        registry: &ShardedRegistry,
    ) -> Result<PairTrace> {
        let geom = PairGeometry::new(store, index, pair, &self.config, classifiers)?;
        let seeds = find_seeds(&geom, &self.config.seed)?;
        let lines = trace_pair(&geom, &seeds, &self.config.march, &self.cancel);
        for (line_index, line) in lines.iter().enumerate() {
            for (point_index, p) in line.points.iter().enumerate() {
                let tag = PointTag {
                    pair: index,
                    line: line_index,
                    index: point_index,
                };
                registry.insert_tagged(p.position, p.tolerance, tag)?;
            }
        }
        registry.rescan()?;
        Ok(PairTrace {
            seeds: seeds.len(),
            lines,
        })
    }
}

/// Compiles a classifier for each face named by a pair. Faces that fail
/// to compile are left out; their pairs report the error.
fn compile_classifiers(
    store: &TopologyStore,
    pairs: &[CandidatePair],
    config: &EngineConfig,
) -> HashMap<FaceId, Arc<FaceClassifier>> {
    let faces: BTreeSet<FaceId> = pairs
        .iter()
        .flat_map(|p| [p.a, p.b])
        .filter_map(|e| match e {
            EntityId::Face(face) => Some(face),
            _ => None,
        })
        .collect();
    let compiled: HashMap<FaceId, Arc<FaceClassifier>> = faces
        .into_par_iter()
        .filter_map(|face| {
            FaceClassifier::new(store, face, config.tolerance, &config.classifier)
                .map(|c| (face, Arc::new(c)))
                .ok()
        })
        .collect();
    debug!(faces = compiled.len(), "face classifiers compiled");
    compiled
}

/// Union of the finite entity boxes of the shapes, used to lay out the
/// registry shards.
fn shared_region(store: &TopologyStore, bounds: &BoundsIndex, shapes: &[ShapeId]) -> Result<Aabb> {
    let mut region = Aabb::empty();
    for &shape in shapes {
        for entity in store.shape(shape)?.entities() {
            if let Some(b) = bounds.get(entity) {
                if b.is_valid() && b.diagonal().is_finite() {
                    region.expand(b);
                }
            }
        }
    }
    Ok(region)
}
