use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::bounds::Aabb;
use crate::config::RegistryConfig;
use crate::error::{EngineError, Result};
use crate::math::{Point3, TOLERANCE};

use super::{PointId, PointRegistry, PointTag};

/// Id of a point inside one shard of a [`ShardedRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardedPointId {
    pub shard: usize,
    pub id: PointId,
}

/// A point contributed by a worker, kept verbatim for reconciliation.
#[derive(Debug, Clone, Copy)]
struct Contribution {
    tag: PointTag,
    position: Point3,
    tolerance: f64,
}

/// One lock's worth of the registry.
#[derive(Debug)]
struct Shard {
    registry: PointRegistry,
    contributions: Vec<Contribution>,
}

/// A point registry split into a coarse grid of independently locked
/// shards, for concurrent inserts from pair workers.
///
/// Shard-local merging only sees points of the same shard, and its
/// clusters depend on the order workers inserted in. [`ShardedRegistry::reconcile`]
/// therefore rebuilds the final registry from the contributed points in
/// tag order.
#[derive(Debug)]
pub struct ShardedRegistry {
    bounds: Aabb,
    per_axis: usize,
    shards: Vec<Mutex<Shard>>,
    config: RegistryConfig,
}

impl ShardedRegistry {
    /// Creates `shards_per_axis^3` empty shards over `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb, config: &RegistryConfig) -> Self {
        let per_axis = config.shards_per_axis.max(1);
        let bounds = if bounds.is_valid() && bounds.diagonal().is_finite() {
            bounds
        } else {
            Aabb::from_point(&Point3::origin())
        };
        let shards = (0..per_axis.pow(3))
            .map(|_| {
                Mutex::new(Shard {
                    registry: PointRegistry::new(config),
                    contributions: Vec::new(),
                })
            })
            .collect();
        Self {
            bounds,
            per_axis,
            shards,
            config: config.clone(),
        }
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Inserts a point into the shard owning its cell.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if the shard lock is poisoned.
    pub fn insert_tagged(&self, point: Point3, tolerance: f64, tag: PointTag) -> Result<ShardedPointId> {
        let shard = self.shard_of(&point);
        let mut guard = self.lock(shard)?;
        let id = guard.registry.insert_tagged(point, tolerance, tag);
        guard.contributions.push(Contribution {
            tag,
            position: point,
            tolerance: tolerance.max(0.0),
        });
        Ok(ShardedPointId { shard, id })
    }

    /// Re-scans every shard for chains formed by the latest inserts.
    /// Returns the number of merges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if a shard lock is poisoned.
    pub fn rescan(&self) -> Result<usize> {
        let mut merges = 0;
        for shard in 0..self.shards.len() {
            merges += self.lock(shard)?.registry.rescan();
        }
        Ok(merges)
    }

    fn lock(&self, shard: usize) -> Result<std::sync::MutexGuard<'_, Shard>> {
        self.shards[shard]
            .lock()
            .map_err(|_| EngineError::Worker(format!("registry shard {shard} poisoned")).into())
    }

    fn axis_cell(&self, value: f64, lo: f64, hi: f64) -> usize {
        let extent = hi - lo;
        if extent <= TOLERANCE {
            return 0;
        }
        let f = ((value - lo) / extent * self.per_axis as f64).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i = f.clamp(0.0, (self.per_axis - 1) as f64) as usize;
        i
    }

    fn shard_of(&self, p: &Point3) -> usize {
        let (lo, hi) = (self.bounds.min, self.bounds.max);
        let ix = self.axis_cell(p.x, lo.x, hi.x);
        let iy = self.axis_cell(p.y, lo.y, hi.y);
        let iz = self.axis_cell(p.z, lo.z, hi.z);
        (ix * self.per_axis + iy) * self.per_axis + iz
    }

    /// Merges the shards into one registry.
    ///
    /// Every contributed point is re-inserted in canonical order (by tag,
    /// then position), across shard walls, and chains are re-scanned. The
    /// result depends only on the set of contributions, not on which
    /// worker inserted first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if a shard lock is poisoned.
    pub fn reconcile(self) -> Result<ReconciledRegistry> {
        let Self { shards, config, .. } = self;
        let mut staged = Vec::new();
        for (index, mutex) in shards.into_iter().enumerate() {
            let shard = mutex
                .into_inner()
                .map_err(|_| EngineError::Worker(format!("registry shard {index} poisoned")))?;
            staged.extend(shard.contributions);
        }
        staged.sort_by(|a, b| {
            a.tag
                .cmp(&b.tag)
                .then_with(|| a.position.x.total_cmp(&b.position.x))
                .then_with(|| a.position.y.total_cmp(&b.position.y))
                .then_with(|| a.position.z.total_cmp(&b.position.z))
                .then_with(|| a.tolerance.total_cmp(&b.tolerance))
        });

        let mut registry = PointRegistry::new(&config);
        let mut ids = HashMap::with_capacity(staged.len());
        let contributions = staged.len();
        for c in staged {
            let id = registry.insert_tagged(c.position, c.tolerance, c.tag);
            ids.entry(c.tag).or_insert(id);
        }
        let merges = registry.rescan();
        debug!(points = registry.len(), contributions, merges, "registry reconciled");

        Ok(ReconciledRegistry { registry, ids })
    }
}

/// The merged registry plus the canonical id of every contributed point.
#[derive(Debug)]
pub struct ReconciledRegistry {
    pub registry: PointRegistry,
    ids: HashMap<PointTag, PointId>,
}

impl ReconciledRegistry {
    /// The canonical id of the point contributed under `tag`.
    #[must_use]
    pub fn resolve(&self, tag: PointTag) -> Option<PointId> {
        self.ids.get(&tag).and_then(|&id| self.registry.resolve(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tag(pair: usize) -> PointTag {
        PointTag {
            pair,
            line: 0,
            index: 0,
        }
    }

    fn cube() -> Aabb {
        let mut b = Aabb::from_point(&Point3::new(-1.0, -1.0, -1.0));
        b.expand_point(&Point3::new(1.0, 1.0, 1.0));
        b
    }

    #[test]
    fn points_across_wall_are_joined() {
        let sharded = ShardedRegistry::new(cube(), &RegistryConfig::default());
        assert_eq!(sharded.shard_count(), 64);
        // x = 0 is a shard wall with 4 shards per axis.
        let a = sharded.insert_tagged(Point3::new(-1e-8, 0.3, 0.3), 1e-7, tag(0)).unwrap();
        let b = sharded.insert_tagged(Point3::new(1e-8, 0.3, 0.3), 1e-7, tag(1)).unwrap();
        assert_ne!(a.shard, b.shard);
        let merged = sharded.reconcile().unwrap();
        assert_eq!(merged.registry.len(), 1);
        assert_eq!(merged.resolve(tag(0)), merged.resolve(tag(1)));
    }

    #[test]
    fn interior_points_keep_identity() {
        let sharded = ShardedRegistry::new(cube(), &RegistryConfig::default());
        let a = sharded.insert_tagged(Point3::new(0.25, 0.25, 0.25), 1e-7, tag(0)).unwrap();
        let b = sharded.insert_tagged(Point3::new(0.25, 0.25, 0.25), 1e-7, tag(1)).unwrap();
        assert_eq!(a, b);
        sharded.insert_tagged(Point3::new(-0.75, 0.25, 0.25), 1e-7, tag(2)).unwrap();
        let merged = sharded.reconcile().unwrap();
        assert_eq!(merged.registry.len(), 2);
        let entry = merged.registry.entry(merged.resolve(tag(0)).unwrap()).unwrap();
        assert_eq!(entry.contributors.len(), 2);
        assert_ne!(merged.resolve(tag(0)), merged.resolve(tag(2)));
        assert_eq!(merged.resolve(tag(9)), None);
    }

    fn canonical(merged: &ReconciledRegistry) -> Vec<(i64, usize)> {
        let mut out: Vec<(i64, usize)> = merged
            .registry
            .iter()
            .map(|(_, e)| ((e.position.x * 1e7).round() as i64, e.contributors.len()))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let points: Vec<Point3> = (0..20)
            .map(|i| Point3::new(-0.9 + 0.09 * i as f64, 0.1, -0.2))
            .collect();
        let run = |order: Vec<usize>| {
            let sharded = ShardedRegistry::new(cube(), &RegistryConfig::default());
            for i in order {
                sharded.insert_tagged(points[i], 1e-7, tag(i)).unwrap();
            }
            canonical(&sharded.reconcile().unwrap())
        };
        let forward = run((0..20).collect());
        let backward = run((0..20).rev().collect());
        assert_eq!(forward, backward);
    }

    #[test]
    fn chain_inside_one_shard_is_order_independent() {
        // Neighbours are within tolerance, the ends are not.
        let xs = [0.25, 0.25 + 0.9e-3, 0.25 + 1.8e-3];
        let run = |order: [usize; 3]| {
            let sharded = ShardedRegistry::new(cube(), &RegistryConfig::default());
            let mut shards = Vec::new();
            for i in order {
                let sid = sharded
                    .insert_tagged(Point3::new(xs[i], 0.25, 0.25), 1e-3, tag(i))
                    .unwrap();
                shards.push(sid.shard);
                sharded.rescan().unwrap();
            }
            assert!(shards.iter().all(|&s| s == shards[0]));
            let merged = sharded.reconcile().unwrap();
            assert_eq!(merged.resolve(tag(0)), merged.resolve(tag(2)));
            canonical(&merged)
        };
        let reference = run([0, 1, 2]);
        assert_eq!(reference.len(), 1);
        assert_eq!(reference[0].1, 3);
        for order in [[0, 2, 1], [1, 2, 0], [2, 1, 0], [2, 0, 1], [1, 0, 2]] {
            assert_eq!(run(order), reference);
        }
    }
}
