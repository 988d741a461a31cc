pub mod adapter;
pub mod curve;
pub mod surface;

pub use adapter::Patch;
pub use curve::{Circle, Curve, CurveDomain, Line};
pub use surface::{Cylinder, Plane, Sphere, Surface, SurfaceDomain};
