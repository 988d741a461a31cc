use thiserror::Error;

use crate::topology::EntityId;

/// Top-level error type for the intersection engine.
#[derive(Debug, Error)]
pub enum IntersectError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntersectError {
    /// Returns the entity blamed by a malformed-input error, if any.
    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::Topology(TopologyError::Malformed { entity, .. }) => Some(*entity),
            _ => None,
        }
    }
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("zero-length vector")]
    ZeroVector,
}

/// Errors related to the shape model handed to the engine.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("wire is not closed")]
    WireNotClosed,

    #[error("malformed {entity}: {reason}")]
    Malformed { entity: EntityId, reason: String },
}

/// Errors raised by the engine itself rather than by its input.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Convenience type alias for results using [`IntersectError`].
pub type Result<T> = std::result::Result<T, IntersectError>;
