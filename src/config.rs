//! Engine configuration and presets.
//!
//! [`EngineConfig`] groups every tuning knob of a run: the candidate-pair
//! gate, the default tolerance, and the numeric limits of each stage.
//!
//! # Presets
//!
//! - [`EngineConfig::default()`] - balanced settings for general use
//! - [`EngineConfig::precise()`] - denser sampling and smaller steps
//! - [`EngineConfig::coarse()`] - sparser sampling for quick overlap checks

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::filter::KindPair;

/// Which entity-kind pairs the candidate filter emits.
///
/// Each level enables the kinds of the previous level plus one more:
/// 0 vertex/vertex, 1 vertex/edge, 2 edge/edge, 3 vertex/face,
/// 4 edge/face. [`CheckLevel::All`] also enables face/face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CheckLevel {
    Level(u8),
    #[default]
    All,
}

impl CheckLevel {
    /// Builds a level from an integer; anything above 4 means [`CheckLevel::All`].
    #[must_use]
    pub fn from_index(level: u8) -> Self {
        if level <= 4 {
            Self::Level(level)
        } else {
            Self::All
        }
    }

    /// Returns `true` if pairs of `kind` are emitted at this level.
    #[must_use]
    pub fn enables(self, kind: KindPair) -> bool {
        match self {
            Self::All => true,
            Self::Level(level) => kind.level() <= level,
        }
    }
}

/// Seed finding limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Samples along a curve (ends included).
    pub curve_samples: usize,
    /// Samples per direction of a surface grid.
    pub surface_grid: usize,
    /// Sample pairs closer than `range_factor` times the tolerance sum,
    /// plus the sample spacing, are refined.
    pub range_factor: f64,
    /// Newton iteration cap per start.
    pub max_iterations: usize,
    /// Convergence when `|delta| < convergence * domain scale`.
    pub convergence: f64,
    /// Refined seeds closer than `merge_factor` times the tolerance sum
    /// are one seed.
    pub merge_factor: f64,
    /// Upper bound on refined starts per pair.
    pub max_starts: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            curve_samples: 33,
            surface_grid: 17,
            range_factor: 10.0,
            max_iterations: 25,
            convergence: 1e-9,
            merge_factor: 100.0,
            max_starts: 4096,
        }
    }
}

/// Walking (marching) limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarchConfig {
    /// First step length, relative to the larger patch scale.
    pub initial_step: f64,
    /// Smallest step before giving up, relative to the larger patch scale.
    pub min_step: f64,
    /// Largest step, relative to the larger patch scale.
    pub max_step: f64,
    /// Step cap per direction.
    pub max_steps: usize,
    /// Newton iteration cap per correction.
    pub newton_iterations: usize,
    /// Consecutive fast corrections before the step doubles.
    pub fast_streak: usize,
    /// Iterations at or below which a correction counts as fast.
    pub fast_iterations: usize,
    /// Largest allowed turn of the tangent between steps, in radians.
    pub max_turn: f64,
    /// Bisection iterations when locating a boundary exit.
    pub boundary_iterations: usize,
    /// Consecutive points closer than this are purged.
    pub purge_distance: f64,
    /// A line closes when it passes within `max(tolerance, close_fraction * step)`
    /// of its first point.
    pub close_fraction: f64,
}

impl Default for MarchConfig {
    fn default() -> Self {
        Self {
            initial_step: 0.02,
            min_step: 1e-6,
            max_step: 0.1,
            max_steps: 5000,
            newton_iterations: 12,
            fast_streak: 3,
            fast_iterations: 3,
            max_turn: 0.35,
            boundary_iterations: 40,
            purge_distance: 1e-9,
            close_fraction: 0.5,
        }
    }
}

/// Boundary classifier limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Angle between successive ray directions, in radians.
    pub perturb_angle: f64,
    /// Attempts before the verdict is UNKNOWN.
    pub max_retries: usize,
    /// Largest chord deviation of a compiled boundary arc, relative to the
    /// face's parameter scale.
    pub chord_tolerance: f64,
    /// Recursion cap when subdividing boundary arcs.
    pub max_depth: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            perturb_angle: 0.618_033_988_75,
            max_retries: 8,
            chord_tolerance: 1e-4,
            max_depth: 12,
        }
    }
}

/// Point registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Grid cell size of the proximity hash. Grows to cover the largest
    /// search radius seen.
    pub cell_size: f64,
    /// Shards per axis of the concurrent registry.
    pub shards_per_axis: usize,
    /// Chains are re-checked within `chain_factor` times the tolerance.
    pub chain_factor: f64,
    /// Re-scan pass cap.
    pub max_passes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cell_size: 1e-3,
            shards_per_axis: 4,
            chain_factor: 2.0,
            max_passes: 4,
        }
    }
}

/// Configuration for an engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Candidate-pair kind gate.
    pub level: CheckLevel,
    /// Default tolerance for entities without their own.
    pub tolerance: f64,
    pub seed: SeedConfig,
    pub march: MarchConfig,
    pub classifier: ClassifierConfig,
    pub registry: RegistryConfig,
    /// Worker threads for the pair stage.
    pub workers: usize,
    /// Capacity of the bounded pair queue.
    pub queue_capacity: usize,
    /// Up to this many box tests the filter uses the plain cross product.
    pub naive_filter_threshold: usize,
    /// Maximum entities per BVH leaf.
    pub bvh_leaf_size: usize,
    /// Edge sampling stops once the box changes by less than this fraction
    /// of the tolerance.
    pub bounds_refine_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: CheckLevel::All,
            tolerance: 1e-7,
            seed: SeedConfig::default(),
            march: MarchConfig::default(),
            classifier: ClassifierConfig::default(),
            registry: RegistryConfig::default(),
            workers: std::thread::available_parallelism().map_or(1, usize::from),
            queue_capacity: 256,
            naive_filter_threshold: 1024,
            bvh_leaf_size: 8,
            bounds_refine_fraction: 0.1,
        }
    }
}

impl EngineConfig {
    /// Denser sampling and smaller steps, for closely spaced branches.
    #[must_use]
    pub fn precise() -> Self {
        let mut config = Self::default();
        config.tolerance = 1e-9;
        config.seed.curve_samples = 129;
        config.seed.surface_grid = 41;
        config.march.initial_step = 0.005;
        config.march.max_step = 0.02;
        config.march.max_steps = 20_000;
        config.classifier.chord_tolerance = 1e-6;
        config
    }

    /// Sparser sampling and larger steps, for quick overlap checks.
    #[must_use]
    pub fn coarse() -> Self {
        let mut config = Self::default();
        config.tolerance = 1e-5;
        config.seed.curve_samples = 17;
        config.seed.surface_grid = 9;
        config.march.initial_step = 0.05;
        config.march.max_step = 0.25;
        config.march.max_steps = 1000;
        config.classifier.chord_tolerance = 1e-3;
        config
    }

    /// Set the candidate-pair kind gate.
    #[must_use]
    pub fn with_level(mut self, level: CheckLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the default tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    /// Set the number of worker threads (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the pair queue capacity (at least one).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the naive filter threshold; `0` always uses the BVH.
    #[must_use]
    pub fn with_naive_filter_threshold(mut self, threshold: usize) -> Self {
        self.naive_filter_threshold = threshold;
        self
    }

    /// Set the seed finding limits.
    #[must_use]
    pub fn with_seed(mut self, seed: SeedConfig) -> Self {
        self.seed = seed;
        self
    }

    /// Set the marching limits.
    #[must_use]
    pub fn with_march(mut self, march: MarchConfig) -> Self {
        self.march = march;
        self
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: &str| -> Result<()> { Err(EngineError::InvalidConfig(msg.into()).into()) };
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return invalid("tolerance must be finite and non-negative");
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.bvh_leaf_size == 0 {
            return invalid("bvh_leaf_size must be at least 1");
        }
        if self.bounds_refine_fraction <= 0.0 {
            return invalid("bounds_refine_fraction must be positive");
        }
        if self.seed.curve_samples < 2 || self.seed.surface_grid < 2 {
            return invalid("seed sampling needs at least 2 samples per direction");
        }
        if self.seed.max_iterations == 0 || self.seed.convergence <= 0.0 {
            return invalid("seed iteration cap and convergence must be positive");
        }
        let m = &self.march;
        if !(m.min_step > 0.0 && m.min_step <= m.initial_step && m.initial_step <= m.max_step) {
            return invalid("march steps must satisfy 0 < min_step <= initial_step <= max_step");
        }
        if m.max_steps == 0 || m.newton_iterations == 0 {
            return invalid("march step and iteration caps must be positive");
        }
        if self.classifier.max_retries == 0 || self.classifier.chord_tolerance <= 0.0 {
            return invalid("classifier retries and chord tolerance must be positive");
        }
        if self.registry.cell_size <= 0.0 || self.registry.shards_per_axis == 0 {
            return invalid("registry cell size and shard count must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        EngineConfig::default().validate().unwrap();
        EngineConfig::precise().validate().unwrap();
        EngineConfig::coarse().validate().unwrap();
    }

    #[test]
    fn presets_order_tolerances() {
        let default = EngineConfig::default();
        assert!(EngineConfig::precise().tolerance < default.tolerance);
        assert!(EngineConfig::coarse().tolerance > default.tolerance);
    }

    #[test]
    fn builder_methods() {
        let config = EngineConfig::default()
            .with_level(CheckLevel::from_index(2))
            .with_tolerance(-1e-6)
            .with_workers(0)
            .with_queue_capacity(0);
        assert_eq!(config.level, CheckLevel::Level(2));
        assert!((config.tolerance - 1e-6).abs() < 1e-18);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn bad_steps_rejected() {
        let mut config = EngineConfig::default();
        config.march.min_step = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn level_gate() {
        assert!(CheckLevel::Level(0).enables(KindPair::VertexVertex));
        assert!(!CheckLevel::Level(0).enables(KindPair::VertexEdge));
        assert!(CheckLevel::Level(4).enables(KindPair::EdgeFace));
        assert!(!CheckLevel::Level(4).enables(KindPair::FaceFace));
        assert!(CheckLevel::from_index(9).enables(KindPair::FaceFace));
    }
}
