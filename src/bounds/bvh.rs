use crate::topology::EntityId;

use super::Aabb;

/// BVH node containing either leaf entities or child nodes.
#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        items: Vec<usize>,
    },
    Internal {
        bbox: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Bounding volume hierarchy over the entity boxes of one shape.
///
/// Built by median split along the longest axis of each node's box.
#[derive(Debug)]
pub struct Bvh {
    root: Option<BvhNode>,
    entities: Vec<(EntityId, Aabb)>,
}

impl Bvh {
    /// Builds a hierarchy over `entities` with at most `max_leaf_size`
    /// entities per leaf.
    #[must_use]
    pub fn build(entities: Vec<(EntityId, Aabb)>, max_leaf_size: usize) -> Self {
        if entities.is_empty() {
            return Self { root: None, entities };
        }
        let indices: Vec<usize> = (0..entities.len()).collect();
        let root = Self::build_recursive(&entities, indices, max_leaf_size.max(1));
        Self {
            root: Some(root),
            entities,
        }
    }

    fn build_recursive(entities: &[(EntityId, Aabb)], indices: Vec<usize>, max_leaf_size: usize) -> BvhNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand(&entities[i].1);
        }

        if indices.len() <= max_leaf_size {
            return BvhNode::Leaf { bbox, items: indices };
        }

        let axis = bbox.longest_axis();
        let mut sorted = indices;
        sorted.sort_by(|&a, &b| {
            let ca = entities[a].1.center()[axis];
            let cb = entities[b].1.center()[axis];
            ca.total_cmp(&cb).then(entities[a].0.cmp(&entities[b].0))
        });

        let right_indices = sorted.split_off(sorted.len() / 2);
        let left = Self::build_recursive(entities, sorted, max_leaf_size);
        let right = Self::build_recursive(entities, right_indices, max_leaf_size);

        BvhNode::Internal {
            bbox,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Returns the entities whose boxes overlap `query` within `eps`.
    #[must_use]
    pub fn query(&self, query: &Aabb, eps: f64) -> Vec<EntityId> {
        let mut result = Vec::new();
        if let Some(ref root) = self.root {
            self.query_recursive(root, query, eps, &mut result);
        }
        result
    }

    fn query_recursive(&self, node: &BvhNode, query: &Aabb, eps: f64, result: &mut Vec<EntityId>) {
        if !node.bbox().overlaps(query, eps) {
            return;
        }
        match node {
            BvhNode::Leaf { items, .. } => {
                result.extend(
                    items
                        .iter()
                        .filter(|&&i| self.entities[i].1.overlaps(query, eps))
                        .map(|&i| self.entities[i].0),
                );
            }
            BvhNode::Internal { left, right, .. } => {
                self.query_recursive(left, query, eps, result);
                self.query_recursive(right, query, eps, result);
            }
        }
    }

    /// Number of entities in the hierarchy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the hierarchy is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use crate::topology::{ShapeBuilder, TopologyStore};

    fn grid_entities(n: usize) -> Vec<(EntityId, Aabb)> {
        let mut store = TopologyStore::new();
        let mut builder = ShapeBuilder::new(&mut store);
        (0..n)
            .map(|i| {
                let p = Point3::new(i as f64, (i % 3) as f64, 0.0);
                let v = builder.vertex(p);
                (EntityId::Vertex(v), Aabb::from_point(&p).padded(0.1))
            })
            .collect()
    }

    #[test]
    fn query_matches_brute_force() {
        let entities = grid_entities(50);
        let bvh = Bvh::build(entities.clone(), 4);
        assert_eq!(bvh.len(), 50);
        let query = Aabb::from_point(&Point3::new(10.0, 1.0, 0.0)).padded(2.0);
        let mut found = bvh.query(&query, 0.0);
        found.sort();
        let mut expected: Vec<EntityId> = entities
            .iter()
            .filter(|(_, b)| b.overlaps(&query, 0.0))
            .map(|(e, _)| *e)
            .collect();
        expected.sort();
        assert_eq!(found, expected);
        assert!(!found.is_empty());
    }

    #[test]
    fn empty_hierarchy() {
        let bvh = Bvh::build(Vec::new(), 8);
        assert!(bvh.is_empty());
        assert!(bvh.query(&Aabb::unbounded(), 0.0).is_empty());
    }

    #[test]
    fn unbounded_entity_always_found() {
        let mut entities = grid_entities(20);
        entities[3].1 = Aabb::unbounded();
        let bvh = Bvh::build(entities.clone(), 2);
        let query = Aabb::from_point(&Point3::new(-100.0, -100.0, 0.0));
        assert_eq!(bvh.query(&query, 0.0), vec![entities[3].0]);
    }
}
