//! Tolerance-aware deduplication of intersection points.
//!
//! Points closer than the larger of their tolerances are one canonical
//! point. Merges are recorded union-find style, so an id handed out before
//! a merge still resolves to the surviving entry.

mod sharded;

pub use sharded::{ReconciledRegistry, ShardedPointId, ShardedRegistry};

use std::collections::{BTreeSet, HashMap};

use slotmap::SlotMap;
use tracing::trace;

use crate::config::RegistryConfig;
use crate::math::{Point3, TOLERANCE};

slotmap::new_key_type! {
    /// Unique identifier for a canonical point in the registry.
    pub struct PointId;
}

/// Identifies one contributed point: the pair it came from, its walking
/// line within the pair, and its index on that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointTag {
    pub pair: usize,
    pub line: usize,
    pub index: usize,
}

/// A canonical point.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Tolerance-weighted centroid of the merged points.
    pub position: Point3,
    /// Largest tolerance among the merged points.
    pub tolerance: f64,
    /// Sum of the merged points' weights (`1 / tolerance`).
    weight: f64,
    /// Points merged into this entry.
    pub contributors: BTreeSet<PointTag>,
}

impl RegistryEntry {
    fn new(position: Point3, tolerance: f64) -> Self {
        Self {
            position,
            tolerance,
            weight: weight_of(tolerance),
            contributors: BTreeSet::new(),
        }
    }

    /// Folds `other` into `self`.
    fn absorb(&mut self, other: &Self) {
        let total = self.weight + other.weight;
        self.position = Point3::from(
            (self.position.coords * self.weight + other.position.coords * other.weight) / total,
        );
        self.weight = total;
        self.tolerance = self.tolerance.max(other.tolerance);
        self.contributors.extend(other.contributors.iter().copied());
    }
}

fn weight_of(tolerance: f64) -> f64 {
    1.0 / tolerance.max(TOLERANCE)
}

type Cell = (i64, i64, i64);

/// Canonical intersection points with union-find merging.
#[derive(Debug, Clone)]
pub struct PointRegistry {
    entries: SlotMap<PointId, RegistryEntry>,
    /// Merged-away id to the id it merged into.
    aliases: HashMap<PointId, PointId>,
    grid: HashMap<Cell, Vec<PointId>>,
    cell: f64,
    max_tolerance: f64,
    /// Entries whose position moved since the last re-scan.
    dirty: Vec<PointId>,
    config: RegistryConfig,
}

impl Default for PointRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl PointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            entries: SlotMap::with_key(),
            aliases: HashMap::new(),
            grid: HashMap::new(),
            cell: config.cell_size.max(TOLERANCE),
            max_tolerance: 0.0,
            dirty: Vec::new(),
            config: config.clone(),
        }
    }

    /// Number of canonical points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a point, merging it into an existing canonical point lying
    /// within `max(tolerance, existing tolerance)`.
    pub fn insert(&mut self, point: Point3, tolerance: f64) -> PointId {
        self.insert_entry(RegistryEntry::new(point, tolerance.max(0.0)))
    }

    /// Like [`PointRegistry::insert`], recording `tag` as a contributor.
    pub fn insert_tagged(&mut self, point: Point3, tolerance: f64, tag: PointTag) -> PointId {
        let mut entry = RegistryEntry::new(point, tolerance.max(0.0));
        entry.contributors.insert(tag);
        self.insert_entry(entry)
    }

    /// Inserts a prepared entry (possibly already a cluster).
    fn insert_entry(&mut self, entry: RegistryEntry) -> PointId {
        self.ensure_cell(entry.tolerance);
        let nearest = self
            .neighbors(&entry.position, entry.tolerance.max(self.max_tolerance))
            .into_iter()
            .filter_map(|id| {
                let e = &self.entries[id];
                let d = (e.position - entry.position).norm();
                (d <= entry.tolerance.max(e.tolerance)).then_some((d, id))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        match nearest {
            Some((_, id)) => {
                self.update(id, |e| e.absorb(&entry));
                trace!(?id, "point merged");
                id
            }
            None => {
                let position = entry.position;
                let id = self.entries.insert(entry);
                self.grid.entry(self.cell_of(&position)).or_default().push(id);
                id
            }
        }
    }

    /// Follows merges to the surviving id.
    #[must_use]
    pub fn resolve(&self, mut id: PointId) -> Option<PointId> {
        while let Some(&next) = self.aliases.get(&id) {
            id = next;
        }
        self.entries.contains_key(id).then_some(id)
    }

    /// Returns the canonical position of `id`.
    #[must_use]
    pub fn lookup(&self, id: PointId) -> Option<Point3> {
        self.entry(id).map(|e| e.position)
    }

    /// Returns the canonical entry of `id`.
    #[must_use]
    pub fn entry(&self, id: PointId) -> Option<&RegistryEntry> {
        self.resolve(id).and_then(|id| self.entries.get(id))
    }

    /// Iterates over canonical points.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &RegistryEntry)> {
        self.entries.iter()
    }

    /// Explicitly merges two points; the lower id survives. Returns the
    /// surviving id, or `None` if either id is unknown.
    pub fn merge(&mut self, a: PointId, b: PointId) -> Option<PointId> {
        let a = self.resolve(a)?;
        let b = self.resolve(b)?;
        if a == b {
            return Some(a);
        }
        let (keep, gone) = if a < b { (a, b) } else { (b, a) };
        let removed = self.remove(gone)?;
        self.update(keep, |e| e.absorb(&removed));
        self.aliases.insert(gone, keep);
        Some(keep)
    }

    /// Re-checks entries moved by merges against their neighbours within
    /// `chain_factor` times the tolerance and merges chains found, for at
    /// most `max_passes` passes. Returns the number of merges.
    pub fn rescan(&mut self) -> usize {
        let mut merges = 0;
        for _ in 0..self.config.max_passes {
            let mut dirty = std::mem::take(&mut self.dirty);
            dirty.sort();
            dirty.dedup();
            if dirty.is_empty() {
                break;
            }
            for id in dirty {
                let Some(id) = self.resolve(id) else { continue };
                let Some(entry) = self.entries.get(id) else { continue };
                let position = entry.position;
                let tol = entry.tolerance;
                let reach = self.config.chain_factor * tol.max(self.max_tolerance);
                let mut partners: Vec<PointId> = self
                    .neighbors(&position, reach)
                    .into_iter()
                    .filter(|&other| {
                        other != id && {
                            let e = &self.entries[other];
                            (e.position - position).norm()
                                <= self.config.chain_factor * tol.max(e.tolerance)
                        }
                    })
                    .collect();
                partners.sort();
                let mut current = id;
                for other in partners {
                    if let Some(keep) = self.merge(current, other) {
                        current = keep;
                        merges += 1;
                    }
                }
            }
        }
        self.dirty.clear();
        merges
    }

    fn update(&mut self, id: PointId, f: impl FnOnce(&mut RegistryEntry)) {
        let Some(entry) = self.entries.get_mut(id) else { return };
        let old_cell = cell_at(&entry.position, self.cell);
        f(entry);
        let new_cell = cell_at(&entry.position, self.cell);
        let tol = entry.tolerance;
        if old_cell != new_cell {
            if let Some(bucket) = self.grid.get_mut(&old_cell) {
                bucket.retain(|&x| x != id);
            }
            self.grid.entry(new_cell).or_default().push(id);
        }
        self.ensure_cell(tol);
        self.dirty.push(id);
    }

    fn remove(&mut self, id: PointId) -> Option<RegistryEntry> {
        let entry = self.entries.remove(id)?;
        if let Some(bucket) = self.grid.get_mut(&cell_at(&entry.position, self.cell)) {
            bucket.retain(|&x| x != id);
        }
        Some(entry)
    }

    /// Grows the grid cell so that a neighbourhood search of one cell
    /// covers every tolerance seen, re-bucketing if needed.
    fn ensure_cell(&mut self, tolerance: f64) {
        self.max_tolerance = self.max_tolerance.max(tolerance);
        let needed = self.max_tolerance * self.config.chain_factor.max(1.0);
        if needed <= self.cell {
            return;
        }
        self.cell = needed * 2.0;
        self.grid.clear();
        for (id, e) in &self.entries {
            self.grid.entry(cell_at(&e.position, self.cell)).or_default().push(id);
        }
    }

    fn cell_of(&self, p: &Point3) -> Cell {
        cell_at(p, self.cell)
    }

    /// Ids in the 27 cells around `p`. `radius` must not exceed the cell.
    fn neighbors(&self, p: &Point3, radius: f64) -> Vec<PointId> {
        debug_assert!(radius <= self.cell);
        let (cx, cy, cz) = self.cell_of(p);
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        out.extend_from_slice(bucket);
                    }
                }
            }
        }
        out
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cell_at(p: &Point3, cell: f64) -> Cell {
    (
        (p.x / cell).floor() as i64,
        (p.y / cell).floor() as i64,
        (p.z / cell).floor() as i64,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_twice_is_idempotent() {
        let mut reg = PointRegistry::default();
        let p = Point3::new(0.3, -1.0, 2.0);
        let a = reg.insert(p, 1e-7);
        let b = reg.insert(p, 1e-7);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        assert!((reg.lookup(a).unwrap() - p).norm() <= 1e-7);
    }

    #[test]
    fn merge_keeps_larger_tolerance_and_weighted_centroid() {
        let mut reg = PointRegistry::default();
        let a = reg.insert(Point3::new(0.0, 0.0, 0.0), 1e-3);
        let b = reg.insert(Point3::new(5e-4, 0.0, 0.0), 1e-4);
        assert_eq!(a, b);
        let e = reg.entry(a).unwrap();
        assert!((e.tolerance - 1e-3).abs() < 1e-15);
        // Weights 1e3 and 1e4: centroid closer to the precise point.
        let expected = 5e-4 * 1e4 / (1e3 + 1e4);
        assert!((e.position.x - expected).abs() < 1e-12);
    }

    #[test]
    fn distant_points_stay_apart() {
        let mut reg = PointRegistry::default();
        let a = reg.insert(Point3::origin(), 1e-7);
        let b = reg.insert(Point3::new(1e-3, 0.0, 0.0), 1e-7);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn explicit_merge_aliases_old_id() {
        let mut reg = PointRegistry::default();
        let a = reg.insert(Point3::origin(), 1e-7);
        let b = reg.insert(Point3::new(1.0, 0.0, 0.0), 1e-7);
        let keep = reg.merge(a, b).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.resolve(a), Some(keep));
        assert_eq!(reg.resolve(b), Some(keep));
        assert!((reg.lookup(b).unwrap().x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rescan_joins_chain() {
        let mut reg = PointRegistry::default();
        let tol = 1e-3;
        let a = reg.insert(Point3::new(0.0, 0.0, 0.0), tol);
        let c = reg.insert(Point3::new(1.8e-3, 0.0, 0.0), tol);
        assert_ne!(a, c);
        // The middle point merges into one end; the moved centroid is now
        // within the chain distance of the other end.
        let b = reg.insert(Point3::new(0.9e-3, 0.0, 0.0), tol);
        assert!(b == a || b == c);
        assert!(reg.rescan() >= 1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.resolve(a), reg.resolve(c));
    }

    #[test]
    fn large_tolerance_grows_grid() {
        let mut reg = PointRegistry::default();
        let a = reg.insert(Point3::origin(), 1e-7);
        let b = reg.insert(Point3::new(0.4, 0.0, 0.0), 0.5);
        assert_eq!(a, b);
    }
}
