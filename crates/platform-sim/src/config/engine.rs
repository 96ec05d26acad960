use std::ops::RangeInclusive;
use std::time::Duration;

use error_stack::Report;

use crate::config::daemon::DaemonArgs;
use crate::config::users::UsersFileError;
use crate::domain::lifecycle::RandomDelay;
use crate::domain::types::User;

/// Samples generated per instance by one metrics query
pub const DEFAULT_SAMPLES_PER_QUERY: usize = 10;
/// Most recent samples returned by one metrics query
pub const DEFAULT_METRICS_RESPONSE_LIMIT: usize = 100;

/// Tunables of the platform engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provisioning_delay: RangeInclusive<Duration>,
    pub job_stage_delay: RangeInclusive<Duration>,
    pub termination_delay: Duration,
    /// Probability in `[0, 1]` that a job resolves to `failed`
    pub job_failure_probability: f64,
    /// Elapsed time at which a running job would report 100% progress
    pub progress_horizon: Duration,
    pub metrics_history_capacity: usize,
    pub metrics_samples_per_query: usize,
    pub metrics_response_limit: usize,
    /// Accounts registered on startup
    pub users: Vec<User>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let delays = RandomDelay::default();
        Self {
            provisioning_delay: delays.provisioning,
            job_stage_delay: delays.job_stage,
            termination_delay: delays.termination,
            job_failure_probability: 0.1,
            progress_horizon: Duration::from_secs(30),
            metrics_history_capacity: 10_000,
            metrics_samples_per_query: DEFAULT_SAMPLES_PER_QUERY,
            metrics_response_limit: DEFAULT_METRICS_RESPONSE_LIMIT,
            users: vec![User::default_test_user()],
        }
    }
}

impl EngineConfig {
    /// Values outside `[0, 1]` are clamped
    pub fn with_job_failure_probability(mut self, probability: f64) -> Self {
        self.job_failure_probability = clamp_probability(probability);
        self
    }

    pub fn with_progress_horizon(mut self, horizon: Duration) -> Self {
        self.progress_horizon = horizon;
        self
    }

    pub fn with_metrics_history_capacity(mut self, capacity: usize) -> Self {
        self.metrics_history_capacity = capacity;
        self
    }

    /// Adds accounts next to the ones already configured; a user with an
    /// existing id replaces the earlier entry. Tokens must stay unique across
    /// all accounts.
    pub fn with_users(
        mut self,
        users: impl IntoIterator<Item = User>,
    ) -> Result<Self, Report<UsersFileError>> {
        for user in users {
            self.users.retain(|existing| existing.user_id != user.user_id);
            if self.users.iter().any(|existing| existing.token == user.token) {
                return Err(Report::new(UsersFileError::DuplicateToken {
                    token: user.token,
                })
                .attach_printable(format!("user_id: {}", user.user_id)));
            }
            self.users.push(user);
        }
        Ok(self)
    }

    pub fn random_delays(&self) -> RandomDelay {
        RandomDelay {
            provisioning: self.provisioning_delay.clone(),
            job_stage: self.job_stage_delay.clone(),
            termination: self.termination_delay,
        }
    }
}

/// Maps `probability` into `[0, 1]`; NaN becomes 0
pub(crate) fn clamp_probability(probability: f64) -> f64 {
    if probability.is_nan() {
        return 0.0;
    }
    probability.clamp(0.0, 1.0)
}

impl From<&DaemonArgs> for EngineConfig {
    fn from(args: &DaemonArgs) -> Self {
        Self {
            provisioning_delay: Duration::from_millis(args.provisioning_delay_min_ms)
                ..=Duration::from_millis(args.provisioning_delay_max_ms),
            job_stage_delay: Duration::from_millis(args.job_stage_delay_min_ms)
                ..=Duration::from_millis(args.job_stage_delay_max_ms),
            termination_delay: Duration::from_millis(args.termination_delay_ms),
            job_failure_probability: clamp_probability(args.job_failure_probability),
            progress_horizon: Duration::from_secs(args.progress_horizon_secs),
            metrics_history_capacity: args.metrics_history_capacity,
            ..Self::default()
        }
    }
}
