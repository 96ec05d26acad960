//! Demo fixtures: a few active instances with finished jobs

use std::sync::Arc;

use api_types::GpuKind;
use api_types::InstanceStatus;
use api_types::JobKind;
use api_types::JobStatus;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use rand::Rng;
use tracing::info;
use tracing::warn;

use super::admission::Admission;
use super::admission::AdmissionController;
use super::engine::PlatformEngine;
use super::error::PlatformError;
use super::error::Result;
use super::lifecycle::job::synthetic_result;
use super::store::LockKey;
use super::types::Instance;
use super::types::Job;

const DEMO_INSTANCES: [(GpuKind, u32, &str); 3] = [
    (GpuKind::A100, 4, "us-east-1"),
    (GpuKind::H100, 2, "us-west-2"),
    (GpuKind::V100, 1, "eu-west-1"),
];

const DEMO_SCRIPTS: [(JobKind, &str); 3] = [
    (JobKind::Training, "train_resnet.py"),
    (JobKind::Inference, "serve_bert.py"),
    (JobKind::FineTuning, "finetune_llama.py"),
];

impl PlatformEngine {
    /// Inserts active demo instances for `user_id`, each with one to three
    /// terminal jobs. Instances that would exceed the quota are skipped.
    /// Returns the ids of the seeded instances.
    pub async fn seed_demo_data(&self, user_id: &str) -> Result<Vec<String>> {
        let store = self.store();
        let user = store.user(user_id).ok_or(PlatformError::Unauthorized)?;
        let admission = AdmissionController::new(Arc::clone(store));
        let _guard = store.lock(LockKey::User(user.user_id.clone())).await;

        let mut seeded = Vec::new();
        let mut rng = rand::rng();
        for (index, (gpu_type, count, region)) in DEMO_INSTANCES.into_iter().enumerate() {
            if let Admission::Rejected { available } = admission.try_reserve(&user, count) {
                warn!(user_id = %user.user_id, %gpu_type, count, available, "Skipping demo instance");
                continue;
            }

            let mut instance = Instance::provisioning(
                &user.user_id,
                gpu_type,
                count,
                region.to_string(),
                Some(format!("demo-{}", index + 1)),
            );
            instance.status = InstanceStatus::Active;
            instance.created_at = Utc::now() - ChronoDuration::hours(rng.random_range(1..=48));
            instance.ip_address = Some(format!("10.0.{}.{}", index + 1, rng.random_range(2..=254)));

            for _ in 0..rng.random_range(1..=3) {
                let (kind, script) = DEMO_SCRIPTS[rng.random_range(0..DEMO_SCRIPTS.len())];
                let mut job = Job::queued(
                    &user.user_id,
                    &instance.id,
                    kind,
                    script.to_string(),
                    serde_json::Map::new(),
                );
                job.submitted_at = instance.created_at + ChronoDuration::minutes(10);
                job.completed_at = Some(job.submitted_at + ChronoDuration::minutes(30));
                if rng.random_bool(0.8) {
                    job.status = JobStatus::Completed;
                    job.results = Some(synthetic_result());
                } else {
                    job.status = JobStatus::Failed;
                }
                store.jobs.put(job.id.clone(), job);
            }

            seeded.push(instance.id.clone());
            store.instances.put(instance.id.clone(), instance);
        }

        info!(user_id = %user.user_id, instances = seeded.len(), "Demo data seeded");
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::types::User;

    #[tokio::test]
    async fn seeds_active_instances_with_finished_jobs() {
        let engine = PlatformEngine::new(EngineConfig::default());
        let seeded = engine.seed_demo_data("usr_001").await.unwrap();
        assert_eq!(seeded.len(), 3);

        let store = engine.store();
        for id in &seeded {
            let instance = store.instances.get(id).unwrap();
            assert_eq!(instance.status, InstanceStatus::Active);
            assert!(instance.ip_address.is_some());
            assert!(store.active_jobs_on(id).is_empty());
            assert!(!store.jobs.list(|job| &job.instance_id == id).is_empty());
        }
        assert!(store
            .jobs
            .list(|_| true)
            .iter()
            .all(|job| job.status.is_terminal() && job.completed_at.is_some()));
    }

    #[tokio::test]
    async fn seeding_respects_quota() {
        let small = User {
            user_id: "usr_small".to_string(),
            username: "small".to_string(),
            password: "small".to_string(),
            token: "mock_token_small".to_string(),
            plan: "standard".to_string(),
            gpu_quota: 5,
        };
        let engine = PlatformEngine::new(EngineConfig::default().with_users([small]).unwrap());

        let seeded = engine.seed_demo_data("usr_small").await.unwrap();
        assert_eq!(seeded.len(), 2);
        let units: u32 = seeded
            .iter()
            .map(|id| engine.store().instances.get(id).unwrap().count)
            .sum();
        assert_eq!(units, 5);
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let engine = PlatformEngine::new(EngineConfig::default());
        assert_eq!(
            engine.seed_demo_data("usr_404").await,
            Err(PlatformError::Unauthorized)
        );
    }
}
