//! Instance state machine: `provisioning -> active -> terminating -> removed`
//!
//! Removal is not a status; a terminated instance is deleted from the store.

use api_types::InstanceStatus;
use rand::Rng;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::DelayStage;
use super::LifecycleContext;
use crate::domain::error::PlatformError;
use crate::domain::error::Result;
use crate::domain::store::LockKey;
use crate::domain::types::Instance;

/// Whether `from -> to` is a legal instance transition
pub fn can_transition(from: InstanceStatus, to: InstanceStatus) -> bool {
    matches!(
        (from, to),
        (InstanceStatus::Provisioning, InstanceStatus::Active)
            | (InstanceStatus::Provisioning, InstanceStatus::Terminating)
            | (InstanceStatus::Active, InstanceStatus::Terminating)
    )
}

/// Outcome of the provisioning task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// The instance is now active with this address
    Activated { ip_address: String },
    /// The instance had already moved on; nothing changed
    Skipped { status: InstanceStatus },
    /// The instance was removed before the task ran
    Gone,
    /// The platform shut down while the task was waiting
    Cancelled,
}

fn random_private_address() -> String {
    let mut rng = rand::rng();
    format!(
        "10.0.{}.{}",
        rng.random_range(1..=255u8),
        rng.random_range(1..=255u8)
    )
}

/// Background task body: waits the provisioning delay, then activates
pub async fn drive_provisioning(ctx: LifecycleContext, instance_id: String) -> ProvisioningOutcome {
    if !ctx.pause(DelayStage::Provisioning).await {
        return ProvisioningOutcome::Cancelled;
    }
    complete_provisioning(&ctx, &instance_id).await
}

/// `provisioning -> active`, a checked no-op if the instance is gone or no
/// longer provisioning
pub async fn complete_provisioning(ctx: &LifecycleContext, instance_id: &str) -> ProvisioningOutcome {
    let _guard = ctx.store.lock(LockKey::Instance(instance_id.to_string())).await;

    let result = ctx.store.instances.compare_and_update(instance_id, |instance| {
        if !can_transition(instance.status, InstanceStatus::Active) {
            return Ok(ProvisioningOutcome::Skipped {
                status: instance.status,
            });
        }
        let ip_address = random_private_address();
        instance.status = InstanceStatus::Active;
        instance.ip_address = Some(ip_address.clone());
        Ok(ProvisioningOutcome::Activated { ip_address })
    });

    match result {
        Ok(outcome @ ProvisioningOutcome::Activated { .. }) => {
            info!(instance_id = %instance_id, "Instance provisioned successfully");
            outcome
        }
        Ok(outcome) => {
            debug!(instance_id = %instance_id, ?outcome, "Provisioning skipped");
            outcome
        }
        Err(_) => {
            debug!(instance_id = %instance_id, "Instance removed before provisioning completed");
            ProvisioningOutcome::Gone
        }
    }
}

/// `active -> terminating -> removed` for an instance owned by `user_id`.
///
/// The instance lock is held for the whole sequence, so a concurrent
/// terminate waits and then finds the instance gone, and a concurrent job
/// submission cannot slip in between the dependents check and the removal.
pub async fn terminate(ctx: &LifecycleContext, user_id: &str, instance_id: &str) -> Result<Instance> {
    let _guard = ctx.store.lock(LockKey::Instance(instance_id.to_string())).await;

    let instance = ctx.store.owned_instance(instance_id, user_id)?;
    if !can_transition(instance.status, InstanceStatus::Terminating) {
        return Err(PlatformError::Conflict {
            reason: format!("Instance is already {}", instance.status),
        });
    }

    let active_jobs = ctx.store.active_jobs_on(instance_id);
    if !active_jobs.is_empty() {
        warn!(
            instance_id = %instance_id,
            active_jobs = active_jobs.len(),
            "Refusing to terminate instance with running jobs"
        );
        return Err(PlatformError::Conflict {
            reason: "Cannot delete instance with running jobs. Stop jobs first.".to_string(),
        });
    }

    ctx.store.instances.compare_and_update(instance_id, |instance| {
        instance.status = InstanceStatus::Terminating;
        Ok(())
    })?;
    info!(instance_id = %instance_id, "Instance terminating");

    // Shutdown only shortens the wait; removal still happens.
    ctx.pause(DelayStage::Termination).await;

    let removed = ctx.store.instances.delete(instance_id)?;
    info!(instance_id = %instance_id, "Instance terminated");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use api_types::GpuKind;
    use api_types::JobKind;
    use api_types::JobStatus;
    use similar_asserts::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::lifecycle::FixedDelay;
    use crate::domain::store::ResourceStore;
    use crate::domain::types::Job;

    fn context(delay: Duration) -> LifecycleContext {
        LifecycleContext {
            store: Arc::new(ResourceStore::new(16)),
            delays: Arc::new(FixedDelay(delay)),
            job_failure_probability: 0.0,
            cancel: CancellationToken::new(),
        }
    }

    fn insert_instance(ctx: &LifecycleContext, status: InstanceStatus) -> String {
        let mut instance =
            Instance::provisioning("usr_001", GpuKind::A100, 2, "us-east-1".to_string(), None);
        instance.status = status;
        let id = instance.id.clone();
        ctx.store.instances.put(id.clone(), instance);
        id
    }

    #[test]
    fn transitions_only_move_forward() {
        use InstanceStatus::*;
        assert!(can_transition(Provisioning, Active));
        assert!(can_transition(Active, Terminating));
        assert!(can_transition(Provisioning, Terminating));
        assert!(!can_transition(Active, Provisioning));
        assert!(!can_transition(Terminating, Active));
        assert!(!can_transition(Terminating, Terminating));
        assert!(!can_transition(Active, Active));
    }

    #[tokio::test]
    async fn provisioning_activates_and_assigns_address() {
        let ctx = context(Duration::ZERO);
        let id = insert_instance(&ctx, InstanceStatus::Provisioning);

        let outcome = drive_provisioning(ctx.clone(), id.clone()).await;
        let ProvisioningOutcome::Activated { ip_address } = outcome else {
            panic!("expected activation, got {outcome:?}");
        };
        assert!(ip_address.starts_with("10.0."));

        let instance = ctx.store.instances.get(&id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Active);
        assert_eq!(instance.ip_address, Some(ip_address));
    }

    #[tokio::test]
    async fn provisioning_is_a_noop_for_removed_instance() {
        let ctx = context(Duration::ZERO);
        let outcome = complete_provisioning(&ctx, "inst_gone").await;
        assert_eq!(outcome, ProvisioningOutcome::Gone);
        assert!(ctx.store.instances.is_empty());
    }

    #[tokio::test]
    async fn provisioning_never_resurrects_terminating_instance() {
        let ctx = context(Duration::ZERO);
        let id = insert_instance(&ctx, InstanceStatus::Terminating);

        let outcome = complete_provisioning(&ctx, &id).await;
        assert_eq!(
            outcome,
            ProvisioningOutcome::Skipped {
                status: InstanceStatus::Terminating
            }
        );
        assert_eq!(
            ctx.store.instances.get(&id).unwrap().status,
            InstanceStatus::Terminating
        );
    }

    #[tokio::test]
    async fn cancelled_provisioning_leaves_instance_untouched() {
        let ctx = context(Duration::from_secs(3600));
        let id = insert_instance(&ctx, InstanceStatus::Provisioning);
        ctx.cancel.cancel();

        let outcome = drive_provisioning(ctx.clone(), id.clone()).await;
        assert_eq!(outcome, ProvisioningOutcome::Cancelled);
        assert_eq!(
            ctx.store.instances.get(&id).unwrap().status,
            InstanceStatus::Provisioning
        );
    }

    #[tokio::test]
    async fn terminate_removes_instance() {
        let ctx = context(Duration::ZERO);
        let id = insert_instance(&ctx, InstanceStatus::Active);

        let removed = terminate(&ctx, "usr_001", &id).await.unwrap();
        assert_eq!(removed.status, InstanceStatus::Terminating);
        assert!(!ctx.store.instances.contains(&id));
    }

    #[tokio::test]
    async fn terminate_rejects_foreign_and_terminating_instances() {
        let ctx = context(Duration::ZERO);
        let id = insert_instance(&ctx, InstanceStatus::Active);
        assert_eq!(
            terminate(&ctx, "usr_999", &id).await,
            Err(PlatformError::instance_not_found(&id))
        );

        let terminating = insert_instance(&ctx, InstanceStatus::Terminating);
        assert!(matches!(
            terminate(&ctx, "usr_001", &terminating).await,
            Err(PlatformError::Conflict { .. })
        ));
        assert!(ctx.store.instances.contains(&terminating));
    }

    #[tokio::test]
    async fn terminate_is_blocked_by_unfinished_jobs() {
        let ctx = context(Duration::ZERO);
        let id = insert_instance(&ctx, InstanceStatus::Active);
        let mut job = Job::queued(
            "usr_001",
            &id,
            JobKind::Training,
            "train.py".to_string(),
            serde_json::Map::new(),
        );
        job.status = JobStatus::Running;
        let job_id = job.id.clone();
        ctx.store.jobs.put(job_id.clone(), job);

        assert!(matches!(
            terminate(&ctx, "usr_001", &id).await,
            Err(PlatformError::Conflict { .. })
        ));
        assert_eq!(
            ctx.store.instances.get(&id).unwrap().status,
            InstanceStatus::Active
        );

        ctx.store
            .jobs
            .compare_and_update(&job_id, |job| {
                job.status = JobStatus::Completed;
                Ok(())
            })
            .unwrap();
        assert!(terminate(&ctx, "usr_001", &id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_terminates_yield_one_success() {
        let ctx = context(Duration::from_millis(20));
        let id = insert_instance(&ctx, InstanceStatus::Active);

        let mut handles = vec![];
        for _ in 0..2 {
            let ctx = ctx.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                terminate(&ctx, "usr_001", &id).await
            }));
        }

        let mut successes = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(PlatformError::NotFound { .. }) => not_found += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((successes, not_found), (1, 1));
    }
}
