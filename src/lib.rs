pub mod bounds;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod math;
pub mod registry;
pub mod seed;
pub mod topology;
pub mod walk;

pub use config::{CheckLevel, EngineConfig};
pub use engine::{CancelToken, EngineContext, IntersectionReport, PairFailure, RunStats};
pub use error::{IntersectError, Result};
