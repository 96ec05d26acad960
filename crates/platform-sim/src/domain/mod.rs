//! In-memory state engine of the mock GPU platform

pub mod admission;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod seed;
pub mod store;
pub mod types;

pub use engine::PlatformEngine;
pub use error::PlatformError;
