pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod logging;
mod util;
pub mod waiter;

pub use domain::PlatformEngine;
pub use domain::PlatformError;
