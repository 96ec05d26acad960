//! Job state machine:
//! `queued -> initializing -> running -> completing -> {completed | failed}`

use api_types::JobResult;
use api_types::JobStatus;
use chrono::Utc;
use rand::Rng;
use tracing::debug;
use tracing::info;

use super::DelayStage;
use super::LifecycleContext;
use crate::config::engine::clamp_probability;

/// Intermediate steps taken before the job resolves
const STAGES: [(JobStatus, JobStatus); 3] = [
    (JobStatus::Queued, JobStatus::Initializing),
    (JobStatus::Initializing, JobStatus::Running),
    (JobStatus::Running, JobStatus::Completing),
];

/// How far a job task got
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job reached a terminal status
    Finished(JobStatus),
    /// The job or its instance disappeared, or the job was moved by someone
    /// else; the task stopped without writing
    Abandoned,
    /// The platform shut down mid-flight
    Cancelled,
}

/// Whether `from -> to` is a legal job transition
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    STAGES.contains(&(from, to))
        || matches!(
            (from, to),
            (JobStatus::Completing, JobStatus::Completed)
                | (JobStatus::Completing, JobStatus::Failed)
        )
}

/// Synthetic metrics reported by a successful job
pub fn synthetic_result() -> JobResult {
    let mut rng = rand::rng();
    JobResult {
        accuracy: rng.random_range(0.85..=0.99),
        loss: rng.random_range(0.01..=0.2),
        training_time_secs: rng.random_range(300..=1800),
    }
}

/// Background task body: walks the job through every stage and resolves it
pub async fn drive_job(ctx: LifecycleContext, job_id: String) -> JobOutcome {
    for (from, to) in STAGES {
        if !ctx.pause(DelayStage::JobStage).await {
            return JobOutcome::Cancelled;
        }
        if !advance(&ctx, &job_id, from, to) {
            return JobOutcome::Abandoned;
        }
    }

    if !ctx.pause(DelayStage::JobStage).await {
        return JobOutcome::Cancelled;
    }
    match resolve(&ctx, &job_id) {
        Some(status) => JobOutcome::Finished(status),
        None => JobOutcome::Abandoned,
    }
}

fn instance_of(ctx: &LifecycleContext, job_id: &str) -> Option<String> {
    let job = ctx.store.jobs.get(job_id).ok()?;
    ctx.store
        .instances
        .contains(&job.instance_id)
        .then_some(job.instance_id)
}

/// Moves the job from `from` to `to`. Returns `false` when the job or its
/// instance is gone or the job is no longer in `from`.
fn advance(ctx: &LifecycleContext, job_id: &str, from: JobStatus, to: JobStatus) -> bool {
    if instance_of(ctx, job_id).is_none() {
        debug!(job_id = %job_id, "Job or its instance removed, stopping");
        return false;
    }

    let moved = ctx
        .store
        .jobs
        .compare_and_update(job_id, |job| {
            if job.status != from {
                return Ok(false);
            }
            job.status = to;
            Ok(true)
        })
        .unwrap_or(false);

    if moved {
        debug!(job_id = %job_id, status = %to.as_str(), "Job advanced");
    } else {
        debug!(job_id = %job_id, expected = %from.as_str(), "Job moved on, stopping");
    }
    moved
}

/// `completing -> completed | failed`, with the configured failure chance
fn resolve(ctx: &LifecycleContext, job_id: &str) -> Option<JobStatus> {
    instance_of(ctx, job_id)?;

    let failed = rand::rng().random_bool(clamp_probability(ctx.job_failure_probability));

    let status = ctx
        .store
        .jobs
        .compare_and_update(job_id, |job| {
            if job.status != JobStatus::Completing {
                return Ok(None);
            }
            if failed {
                job.status = JobStatus::Failed;
                job.results = None;
            } else {
                job.status = JobStatus::Completed;
                job.results = Some(synthetic_result());
            }
            job.completed_at = Some(Utc::now());
            Ok(Some(job.status))
        })
        .ok()
        .flatten()?;

    info!(job_id = %job_id, status = %status.as_str(), "Job finished");
    Some(status)
}
