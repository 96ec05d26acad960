//! Delay injection for lifecycle tasks

use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

/// Point of a lifecycle at which a simulated delay is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStage {
    /// `provisioning -> active`
    Provisioning,
    /// Each step of a job's lifecycle
    JobStage,
    /// Between `terminating` and removal
    Termination,
}

impl fmt::Display for DelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayStage::Provisioning => f.write_str("provisioning"),
            DelayStage::JobStage => f.write_str("job-stage"),
            DelayStage::Termination => f.write_str("termination"),
        }
    }
}

/// Source of simulated latencies
pub trait DelayProvider: Send + Sync + fmt::Debug {
    /// How long the given stage should take this time
    fn delay(&self, stage: DelayStage) -> Duration;
}

/// Draws each delay uniformly from a configured range
#[derive(Debug, Clone)]
pub struct RandomDelay {
    pub provisioning: RangeInclusive<Duration>,
    pub job_stage: RangeInclusive<Duration>,
    pub termination: Duration,
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self {
            provisioning: Duration::from_secs(3)..=Duration::from_secs(8),
            job_stage: Duration::from_secs(2)..=Duration::from_secs(5),
            termination: Duration::from_secs(2),
        }
    }
}

fn draw(range: &RangeInclusive<Duration>) -> Duration {
    let (low, high) = (*range.start(), *range.end());
    if high <= low {
        return low;
    }
    rand::rng().random_range(low..=high)
}

impl DelayProvider for RandomDelay {
    fn delay(&self, stage: DelayStage) -> Duration {
        match stage {
            DelayStage::Provisioning => draw(&self.provisioning),
            DelayStage::JobStage => draw(&self.job_stage),
            DelayStage::Termination => self.termination,
        }
    }
}

/// Same delay for every stage; `FixedDelay::zero()` makes lifecycles advance
/// as fast as the scheduler allows
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn zero() -> Self {
        Self(Duration::ZERO)
    }
}

impl DelayProvider for FixedDelay {
    fn delay(&self, _stage: DelayStage) -> Duration {
        self.0
    }
}
