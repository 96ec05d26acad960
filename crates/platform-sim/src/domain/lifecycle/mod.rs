//! Resource state machines and the background tasks that drive them
//!
//! Every lifecycle task only suspends inside [`LifecycleContext::pause`]. A
//! task that wakes up to find its resource gone (or moved on by a client
//! request) stops without touching the store; this is best-effort
//! cancellation, not an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod delay;
pub mod instance;
pub mod job;

pub use delay::DelayProvider;
pub use delay::DelayStage;
pub use delay::FixedDelay;
pub use delay::RandomDelay;

use super::store::ResourceStore;

/// Shared handles every lifecycle task works with
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    pub store: Arc<ResourceStore>,
    pub delays: Arc<dyn DelayProvider>,
    /// Probability in `[0, 1]` that a job resolves to `failed`
    pub job_failure_probability: f64,
    pub cancel: CancellationToken,
}

impl LifecycleContext {
    /// Sleeps for the stage's delay. Returns `false` when the platform is
    /// shutting down and the task should stop.
    pub async fn pause(&self, stage: DelayStage) -> bool {
        let delay = self.delays.delay(stage);
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(%stage, "Lifecycle task cancelled");
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
