//! Records held by the resource store

use std::time::Duration;

use api_types::GpuKind;
use api_types::InstanceInfo;
use api_types::InstanceStatus;
use api_types::JobInfo;
use api_types::JobKind;
use api_types::JobResult;
use api_types::JobStatus;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Progress reported for a job that is running but not yet finished.
pub const PROGRESS_CAP_WHILE_RUNNING: f64 = 95.0;

/// Account known to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub password: String,
    /// Capability token handed out at login
    pub token: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    /// Total GPU units the user may hold at once
    pub gpu_quota: u32,
}

fn default_plan() -> String {
    "standard".to_string()
}

impl User {
    /// The account every fresh platform starts with
    pub fn default_test_user() -> Self {
        Self {
            user_id: "usr_001".to_string(),
            username: "test_user".to_string(),
            password: "test_pass".to_string(),
            token: "mock_token_test_user".to_string(),
            plan: "premium".to_string(),
            gpu_quota: 16,
        }
    }
}

/// Authenticated identity attached to every protected operation.
///
/// Only the engine can construct one, so holding a `Caller` proves the token
/// was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: String,
}

impl Caller {
    pub(crate) fn from_user(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Generates a short random identifier such as `inst_1a2b3c4d`.
pub fn new_resource_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Hourly price of one unit of the given GPU kind
pub fn unit_hourly_rate(kind: GpuKind) -> f64 {
    match kind {
        GpuKind::A100 => 3.50,
        GpuKind::H100 | GpuKind::V100 | GpuKind::Rtx4090 => 4.50,
    }
}

/// Compute instance state
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub user_id: String,
    pub gpu_type: GpuKind,
    pub count: u32,
    pub status: InstanceStatus,
    pub region: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub hourly_rate: f64,
}

impl Instance {
    /// Creates an instance in its initial `provisioning` status
    pub fn provisioning(
        user_id: &str,
        gpu_type: GpuKind,
        count: u32,
        region: String,
        name: Option<String>,
    ) -> Self {
        Self {
            id: new_resource_id("inst"),
            user_id: user_id.to_string(),
            gpu_type,
            count,
            status: InstanceStatus::Provisioning,
            region,
            name: name.unwrap_or_else(|| format!("{gpu_type}-instance")),
            created_at: Utc::now(),
            ip_address: None,
            hourly_rate: unit_hourly_rate(gpu_type) * f64::from(count),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    pub fn to_info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            gpu_type: self.gpu_type,
            count: self.count,
            status: self.status,
            region: self.region.clone(),
            instance_name: self.name.clone(),
            created_at: self.created_at,
            ip_address: self.ip_address.clone(),
            hourly_rate: self.hourly_rate,
        }
    }
}

/// Submitted job state
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub instance_id: String,
    pub kind: JobKind,
    pub script_path: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<JobResult>,
}

impl Job {
    /// Creates a job in its initial `queued` status
    pub fn queued(
        user_id: &str,
        instance_id: &str,
        kind: JobKind,
        script_path: String,
        parameters: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: new_resource_id("job"),
            user_id: user_id.to_string(),
            instance_id: instance_id.to_string(),
            kind,
            script_path,
            parameters,
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            completed_at: None,
            results: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Progress in percent as observed at `now`.
    ///
    /// Derived from the time elapsed since submission over `horizon`, capped
    /// at 95 until the job completes. A failed job keeps the value it had
    /// reached when it failed.
    pub fn progress_at(&self, now: DateTime<Utc>, horizon: Duration) -> f64 {
        match self.status {
            JobStatus::Queued | JobStatus::Initializing => 0.0,
            JobStatus::Running | JobStatus::Completing => self.elapsed_progress(now, horizon),
            JobStatus::Completed => 100.0,
            JobStatus::Failed => {
                self.elapsed_progress(self.completed_at.unwrap_or(now), horizon)
            }
        }
    }

    fn elapsed_progress(&self, at: DateTime<Utc>, horizon: Duration) -> f64 {
        let elapsed = (at - self.submitted_at).to_std().unwrap_or_default();
        if horizon.is_zero() {
            return PROGRESS_CAP_WHILE_RUNNING;
        }
        let ratio = elapsed.as_secs_f64() / horizon.as_secs_f64();
        (ratio * 100.0).min(PROGRESS_CAP_WHILE_RUNNING)
    }

    pub fn to_info(&self, now: DateTime<Utc>, horizon: Duration) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            instance_id: self.instance_id.clone(),
            user_id: self.user_id.clone(),
            job_type: self.kind,
            script_path: self.script_path.clone(),
            parameters: self.parameters.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            completed_at: self.completed_at,
            progress: self.progress_at(now, horizon),
            results: self.results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use similar_asserts::assert_eq;

    use super::*;

    fn job_with_status(status: JobStatus) -> Job {
        let mut job = Job::queued(
            "usr_001",
            "inst_00000001",
            JobKind::Training,
            "train.py".to_string(),
            serde_json::Map::new(),
        );
        job.status = status;
        job
    }

    #[test]
    fn resource_ids_carry_prefix() {
        let id = new_resource_id("inst");
        assert!(id.starts_with("inst_"));
        assert_eq!(id.len(), "inst_".len() + 8);
        assert_ne!(id, new_resource_id("inst"));
    }

    #[test]
    fn new_instance_is_provisioning_without_address() {
        let instance = Instance::provisioning(
            "usr_001",
            GpuKind::A100,
            4,
            "us-east-1".to_string(),
            None,
        );
        assert_eq!(instance.status, InstanceStatus::Provisioning);
        assert!(instance.ip_address.is_none());
        assert_eq!(instance.name, "A100-instance");
        assert_eq!(instance.hourly_rate, 14.0);
    }

    #[test]
    fn progress_tracks_elapsed_time_while_running() {
        let horizon = Duration::from_secs(30);
        let job = job_with_status(JobStatus::Running);

        let at_15s = job.submitted_at + ChronoDuration::seconds(15);
        assert_eq!(job.progress_at(at_15s, horizon), 50.0);

        let at_10m = job.submitted_at + ChronoDuration::minutes(10);
        assert_eq!(job.progress_at(at_10m, horizon), PROGRESS_CAP_WHILE_RUNNING);
    }

    #[test]
    fn progress_before_running_is_zero() {
        let horizon = Duration::from_secs(30);
        let later = Utc::now() + ChronoDuration::seconds(20);
        assert_eq!(
            job_with_status(JobStatus::Queued).progress_at(later, horizon),
            0.0
        );
        assert_eq!(
            job_with_status(JobStatus::Initializing).progress_at(later, horizon),
            0.0
        );
    }

    #[test]
    fn progress_snaps_to_100_only_on_completion() {
        let horizon = Duration::from_secs(30);
        let completed = job_with_status(JobStatus::Completed);
        assert_eq!(completed.progress_at(Utc::now(), horizon), 100.0);

        let mut failed = job_with_status(JobStatus::Failed);
        failed.completed_at = Some(failed.submitted_at + ChronoDuration::milliseconds(7500));
        let much_later = failed.submitted_at + ChronoDuration::minutes(5);
        assert_eq!(failed.progress_at(much_later, horizon), 25.0);
    }
}
