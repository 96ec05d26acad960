pub mod cli;
pub mod daemon;
pub mod engine;
pub mod users;

pub use cli::*;
pub use daemon::*;
pub use engine::*;
pub use users::*;
