//! Shared API type definitions
//!
//! This crate contains the wire types exchanged with the mock GPU platform:
//! resource kinds and lifecycle statuses, request bodies, response formats and
//! the telemetry sample shape. The engine reuses the enums directly so the
//! serialized form and the domain form never drift apart.

use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Maximum number of GPU units a single instance may request.
pub const MAX_UNITS_PER_INSTANCE: u32 = 8;

/// Accelerator model backing an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GpuKind {
    #[default]
    A100,
    H100,
    V100,
    #[serde(rename = "RTX4090")]
    Rtx4090,
}

impl GpuKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuKind::A100 => "A100",
            GpuKind::H100 => "H100",
            GpuKind::V100 => "V100",
            GpuKind::Rtx4090 => "RTX4090",
        }
    }
}

impl fmt::Display for GpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible status of a compute instance.
///
/// Removal is not a status: a terminated instance disappears from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning,
    Active,
    Terminating,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Active => "active",
            InstanceStatus::Terminating => "terminating",
        }
    }

    /// Position in the lifecycle; statuses only ever move forward.
    pub fn ordinal(&self) -> u8 {
        match self {
            InstanceStatus::Provisioning => 0,
            InstanceStatus::Active => 1,
            InstanceStatus::Terminating => 2,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of workload a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    #[default]
    Training,
    Inference,
    FineTuning,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Training => f.write_str("training"),
            JobKind::Inference => f.write_str("inference"),
            JobKind::FineTuning => f.write_str("fine-tuning"),
        }
    }
}

/// Lifecycle status of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Initializing,
    Running,
    Completing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Initializing => "initializing",
            JobStatus::Running => "running",
            JobStatus::Completing => "completing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time telemetry for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub instance_id: String,
    /// GPU utilization in percent
    pub gpu_utilization: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub power_draw_w: f64,
    pub temperature_c: f64,
}

/// Metrics recorded for a job that completed successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub accuracy: f64,
    pub loss: f64,
    pub training_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: String,
    pub plan: String,
    pub gpu_quota: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: String,
}

fn default_unit_count() -> u32 {
    1
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Request body for instance creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    #[serde(default)]
    pub gpu_type: GpuKind,
    #[serde(default = "default_unit_count")]
    pub count: u32,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub instance_name: Option<String>,
}

impl Default for CreateInstanceRequest {
    fn default() -> Self {
        Self {
            gpu_type: GpuKind::default(),
            count: default_unit_count(),
            region: default_region(),
            instance_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceResponse {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub message: String,
}

/// Instance record as exposed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    pub user_id: String,
    pub gpu_type: GpuKind,
    pub count: u32,
    pub status: InstanceStatus,
    pub region: String,
    pub instance_name: String,
    pub created_at: DateTime<Utc>,
    /// Assigned once the instance becomes active
    pub ip_address: Option<String>,
    pub hourly_rate: f64,
}

/// Instance record plus a live telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDetail {
    #[serde(flatten)]
    pub instance: InstanceInfo,
    pub current_metrics: MetricSample,
    pub uptime_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListInstancesQuery {
    #[serde(default)]
    pub status: Option<InstanceStatus>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInstancesResponse {
    pub count: usize,
    pub instances: Vec<InstanceInfo>,
    pub total_gpus: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteInstanceResponse {
    pub message: String,
    pub instance_id: String,
}

/// Request body for job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub instance_id: String,
    #[serde(default)]
    pub job_type: JobKind,
    pub script_path: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// Job record with progress computed at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub instance_id: String,
    pub user_id: String,
    pub job_type: JobKind,
    pub script_path: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Percentage in `0.0..=100.0`
    pub progress: f64,
    pub results: Option<JobResult>,
}

fn default_window_minutes() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default = "default_window_minutes")]
    pub minutes: u32,
}

impl Default for MetricsQuery {
    fn default() -> Self {
        Self {
            instance_id: None,
            minutes: default_window_minutes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub count: usize,
    pub metrics: Vec<MetricSample>,
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatistics {
    pub users: usize,
    pub instances: usize,
    pub jobs: usize,
    pub metrics: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    pub statistics: HealthStatistics,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine readable error kind, e.g. `quota_exceeded`
    pub error: String,
    pub message: String,
    /// Remaining quota, only set for quota rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_units: Option<u32>,
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn enums_use_platform_spelling() {
        assert_eq!(
            serde_json::to_string(&GpuKind::Rtx4090).unwrap(),
            "\"RTX4090\""
        );
        assert_eq!(
            serde_json::to_string(&JobKind::FineTuning).unwrap(),
            "\"fine-tuning\""
        );
        assert_eq!(
            serde_json::to_string(&InstanceStatus::Provisioning).unwrap(),
            "\"provisioning\""
        );
        assert_eq!(JobStatus::Completing.to_string(), "completing");
        assert_eq!(GpuKind::H100.to_string(), "H100");
    }

    #[test]
    fn create_request_fills_defaults() {
        let req: CreateInstanceRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.gpu_type, GpuKind::A100);
        assert_eq!(req.count, 1);
        assert_eq!(req.region, "us-east-1");
        assert!(req.instance_name.is_none());
    }

    #[test]
    fn unknown_gpu_kind_is_rejected() {
        let result = serde_json::from_str::<CreateInstanceRequest>(r#"{"gpu_type":"T4"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = [
            JobStatus::Queued,
            JobStatus::Initializing,
            JobStatus::Running,
            JobStatus::Completing,
            JobStatus::Completed,
            JobStatus::Failed,
        ]
        .into_iter()
        .filter(JobStatus::is_terminal)
        .collect();
        assert_eq!(terminal, vec![JobStatus::Completed, JobStatus::Failed]);
    }

    #[test]
    fn error_response_omits_missing_units() {
        let body = ErrorResponse {
            error: "not_found".to_string(),
            message: "Instance not found".to_string(),
            available_units: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("available_units").is_none());
    }
}
