use std::sync::Arc;

use crate::geometry::surface::{Surface, SurfaceDomain};

use super::wire::WireId;
use super::ShapeId;

slotmap::new_key_type! {
    /// Unique identifier for a face in the topology store.
    pub struct FaceId;
}

/// Shared handle to the surface carried by a face.
pub type SurfaceHandle = Arc<dyn Surface>;

/// Data associated with a topological face.
///
/// A face is a bounded region on a surface. The region is delimited by
/// its wires (outer boundary and holes, in any order since classification
/// is even-odd). A face without wires is bounded by `domain` alone.
#[derive(Debug, Clone)]
pub struct FaceData {
    /// The geometric surface on which this face lies.
    pub surface: SurfaceHandle,
    /// Bounding wires.
    pub wires: Vec<WireId>,
    /// Parametric limits of the face, intersected with the surface domain.
    pub domain: Option<SurfaceDomain>,
    /// If `true`, the face normal agrees with the surface normal.
    pub same_sense: bool,
    /// Positional uncertainty radius; `None` uses the engine default.
    pub tolerance: Option<f64>,
    /// The shape owning this face.
    pub shape: ShapeId,
}

impl FaceData {
    /// Returns the face's parametric limits (surface domain clipped by the
    /// face's own limits).
    #[must_use]
    pub fn parameter_domain(&self) -> SurfaceDomain {
        let natural = self.surface.domain();
        match self.domain {
            Some(limits) => natural.intersect(&limits),
            None => natural,
        }
    }
}
