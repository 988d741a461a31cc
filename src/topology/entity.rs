use std::fmt;

use slotmap::Key;

use super::{EdgeId, FaceId, VertexId};

/// The kind of a topological entity, ordered by dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
}

impl EntityKind {
    /// Number of parameters needed to locate a point on this kind.
    #[must_use]
    pub fn dimension(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Edge => 1,
            Self::Face => 2,
        }
    }
}

/// A reference to any vertex, edge, or face in the topology store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Vertex(VertexId),
    Edge(EdgeId),
    Face(FaceId),
}

impl EntityId {
    /// Returns the kind of the referenced entity.
    #[must_use]
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Vertex(_) => EntityKind::Vertex,
            Self::Edge(_) => EntityKind::Edge,
            Self::Face(_) => EntityKind::Face,
        }
    }

    /// Returns the raw slot value, used for deterministic ordering in logs.
    #[must_use]
    pub fn raw(self) -> u64 {
        match self {
            Self::Vertex(id) => id.data().as_ffi(),
            Self::Edge(id) => id.data().as_ffi(),
            Self::Face(id) => id.data().as_ffi(),
        }
    }
}

impl From<VertexId> for EntityId {
    fn from(id: VertexId) -> Self {
        Self::Vertex(id)
    }
}

impl From<EdgeId> for EntityId {
    fn from(id: EdgeId) -> Self {
        Self::Edge(id)
    }
}

impl From<FaceId> for EntityId {
    fn from(id: FaceId) -> Self {
        Self::Face(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex(id) => write!(f, "vertex {:?}", id.data()),
            Self::Edge(id) => write!(f, "edge {:?}", id.data()),
            Self::Face(id) => write!(f, "face {:?}", id.data()),
        }
    }
}
