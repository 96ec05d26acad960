//! Platform operations exposed to API handlers

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use api_types::CreateInstanceRequest;
use api_types::CreateInstanceResponse;
use api_types::DeleteInstanceResponse;
use api_types::HealthResponse;
use api_types::HealthStatistics;
use api_types::InstanceDetail;
use api_types::InstanceStatus;
use api_types::JobInfo;
use api_types::ListInstancesQuery;
use api_types::ListInstancesResponse;
use api_types::LoginResponse;
use api_types::MetricsQuery;
use api_types::MetricsResponse;
use api_types::SubmitJobRequest;
use api_types::SubmitJobResponse;
use api_types::VerifyResponse;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing::warn;

use super::admission::validate_unit_count;
use super::admission::Admission;
use super::admission::AdmissionController;
use super::error::PlatformError;
use super::error::Result;
use super::lifecycle;
use super::lifecycle::DelayProvider;
use super::lifecycle::LifecycleContext;
use super::metrics::MetricsGenerator;
use super::store::LockKey;
use super::store::ResourceStore;
use super::types::Caller;
use super::types::Instance;
use super::types::Job;
use crate::config::engine::clamp_probability;
use crate::config::EngineConfig;

pub const SERVICE_NAME: &str = "mock-gpu-platform";

/// The platform state engine
///
/// Owns the resource store and every background lifecycle task spawned on
/// its behalf.
#[derive(Debug)]
pub struct PlatformEngine {
    store: Arc<ResourceStore>,
    admission: AdmissionController,
    metrics: MetricsGenerator,
    lifecycle: LifecycleContext,
    config: EngineConfig,
    tasks: TaskTracker,
}

impl PlatformEngine {
    /// Engine with random delays drawn from the configured ranges
    pub fn new(config: EngineConfig) -> Self {
        let delays = Arc::new(config.random_delays());
        Self::with_delays(config, delays)
    }

    pub fn with_delays(config: EngineConfig, delays: Arc<dyn DelayProvider>) -> Self {
        let store = Arc::new(ResourceStore::new(config.metrics_history_capacity));
        for user in &config.users {
            store.add_user(user.clone());
        }

        let lifecycle = LifecycleContext {
            store: Arc::clone(&store),
            delays,
            job_failure_probability: clamp_probability(config.job_failure_probability),
            cancel: CancellationToken::new(),
        };

        Self {
            admission: AdmissionController::new(Arc::clone(&store)),
            store,
            metrics: MetricsGenerator,
            lifecycle,
            config,
            tasks: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Exchanges credentials for the user's access token
    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let user = self
            .store
            .user_by_username(username)
            .filter(|user| user.password == password)
            .ok_or_else(|| {
                warn!(username = %username, "Login rejected");
                PlatformError::Unauthorized
            })?;

        info!(user_id = %user.user_id, "User logged in");
        Ok(LoginResponse {
            access_token: user.token,
            token_type: "bearer".to_string(),
            user_id: user.user_id,
            plan: user.plan,
            gpu_quota: user.gpu_quota,
        })
    }

    /// Resolves a capability token to the identity it was issued to
    pub fn authenticate(&self, token: &str) -> Result<Caller> {
        self.store
            .user_by_token(token)
            .map(|user| Caller::from_user(&user))
            .ok_or(PlatformError::Unauthorized)
    }

    pub fn verify(&self, token: &str) -> Result<VerifyResponse> {
        let caller = self.authenticate(token)?;
        Ok(VerifyResponse {
            valid: true,
            user_id: caller.user_id().to_string(),
        })
    }

    /// Admits and inserts a new instance in `provisioning`, then schedules
    /// its activation
    pub async fn create_instance(
        &self,
        caller: &Caller,
        request: CreateInstanceRequest,
    ) -> Result<CreateInstanceResponse> {
        validate_unit_count(request.count)?;
        let user = self
            .store
            .user(caller.user_id())
            .ok_or(PlatformError::Unauthorized)?;

        let instance = {
            let _guard = self.store.lock(LockKey::User(user.user_id.clone())).await;

            if let Admission::Rejected { available } =
                self.admission.try_reserve(&user, request.count)
            {
                warn!(
                    user_id = %user.user_id,
                    requested = request.count,
                    available,
                    "GPU quota exceeded"
                );
                return Err(PlatformError::QuotaExceeded {
                    requested: request.count,
                    available,
                });
            }

            let instance = Instance::provisioning(
                &user.user_id,
                request.gpu_type,
                request.count,
                request.region,
                request.instance_name,
            );
            self.store.instances.put(instance.id.clone(), instance.clone());
            instance
        };

        info!(
            instance_id = %instance.id,
            user_id = %instance.user_id,
            gpu_type = %instance.gpu_type,
            count = instance.count,
            "Instance created"
        );
        self.spawn(lifecycle::instance::drive_provisioning(
            self.lifecycle.clone(),
            instance.id.clone(),
        ));

        Ok(CreateInstanceResponse {
            instance_id: instance.id,
            status: instance.status,
            message: "Instance provisioning started".to_string(),
        })
    }

    /// Instance record with a fresh telemetry sample and uptime
    pub fn get_instance(&self, caller: &Caller, instance_id: &str) -> Result<InstanceDetail> {
        let instance = self.store.owned_instance(instance_id, caller.user_id())?;
        let now = Utc::now();
        Ok(InstanceDetail {
            current_metrics: self.metrics.sample_at(&instance.id, now),
            uptime_secs: instance.uptime(now).as_secs_f64(),
            instance: instance.to_info(),
        })
    }

    /// The caller's instances, oldest first
    pub fn list_instances(
        &self,
        caller: &Caller,
        query: &ListInstancesQuery,
    ) -> ListInstancesResponse {
        let mut instances = self.store.instances.list(|instance| {
            instance.is_owned_by(caller.user_id())
                && query.status.is_none_or(|status| instance.status == status)
                && query
                    .region
                    .as_deref()
                    .is_none_or(|region| instance.region == region)
        });
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let total_gpus = instances.iter().map(|instance| instance.count).sum();
        ListInstancesResponse {
            count: instances.len(),
            instances: instances.iter().map(Instance::to_info).collect(),
            total_gpus,
        }
    }

    /// Terminates and removes an instance; returns once it is gone
    pub async fn delete_instance(
        &self,
        caller: &Caller,
        instance_id: &str,
    ) -> Result<DeleteInstanceResponse> {
        let removed =
            lifecycle::instance::terminate(&self.lifecycle, caller.user_id(), instance_id).await?;
        Ok(DeleteInstanceResponse {
            message: "Instance terminated successfully".to_string(),
            instance_id: removed.id,
        })
    }

    /// Queues a job on an active instance and schedules its execution
    pub async fn submit_job(
        &self,
        caller: &Caller,
        request: SubmitJobRequest,
    ) -> Result<SubmitJobResponse> {
        if request.script_path.trim().is_empty() {
            return Err(PlatformError::InvalidRequest {
                reason: "script_path must not be empty".to_string(),
            });
        }

        let job = {
            let _guard = self
                .store
                .lock(LockKey::Instance(request.instance_id.clone()))
                .await;

            let instance = self
                .store
                .owned_instance(&request.instance_id, caller.user_id())?;
            if instance.status != InstanceStatus::Active {
                return Err(PlatformError::PreconditionFailed {
                    reason: format!("Instance is not active. Current status: {}", instance.status),
                });
            }

            let job = Job::queued(
                caller.user_id(),
                &instance.id,
                request.job_type,
                request.script_path,
                request.parameters,
            );
            self.store.jobs.put(job.id.clone(), job.clone());
            job
        };

        info!(
            job_id = %job.id,
            instance_id = %job.instance_id,
            job_type = %job.kind,
            "Job submitted"
        );
        self.spawn(lifecycle::job::drive_job(self.lifecycle.clone(), job.id.clone()));

        Ok(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
            message: "Job submitted successfully".to_string(),
        })
    }

    /// Job record with progress computed as of now
    pub fn get_job(&self, caller: &Caller, job_id: &str) -> Result<JobInfo> {
        let job = self.store.owned_job(job_id, caller.user_id())?;
        Ok(job.to_info(Utc::now(), self.config.progress_horizon))
    }

    /// Generates fresh samples for the targeted instances, records them and
    /// returns the most recent ones for those instances
    pub fn query_metrics(&self, caller: &Caller, query: &MetricsQuery) -> MetricsResponse {
        let targets: Vec<String> = match query.instance_id.as_deref() {
            Some(id) => self
                .store
                .owned_instance(id, caller.user_id())
                .map(|instance| vec![instance.id])
                .unwrap_or_default(),
            None => self
                .store
                .instances
                .list(|instance| instance.is_owned_by(caller.user_id()))
                .into_iter()
                .map(|instance| instance.id)
                .collect(),
        };

        let now = Utc::now();
        for id in &targets {
            self.store.metrics.extend(self.metrics.series(
                id,
                self.config.metrics_samples_per_query,
                now,
            ));
        }

        let targets: HashSet<String> = targets.into_iter().collect();
        let metrics = if targets.is_empty() {
            Vec::new()
        } else {
            self.store
                .metrics
                .recent_matching(self.config.metrics_response_limit, |sample| {
                    targets.contains(&sample.instance_id)
                })
        };

        MetricsResponse {
            count: metrics.len(),
            metrics,
            time_range: format!("last {} minutes", query.minutes),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            statistics: HealthStatistics {
                users: self.store.user_count(),
                instances: self.store.instances.len(),
                jobs: self.store.jobs.len(),
                metrics: self.store.metrics.len(),
            },
        }
    }

    /// Number of lifecycle tasks still running
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels every pending lifecycle task and waits for them to stop
    pub async fn shutdown(&self) {
        info!(pending = self.tasks.len(), "Stopping lifecycle tasks");
        self.lifecycle.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Lifecycle tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use api_types::GpuKind;
    use api_types::JobKind;
    use api_types::JobStatus;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::lifecycle::FixedDelay;

    const TOKEN: &str = "mock_token_test_user";

    fn engine() -> PlatformEngine {
        PlatformEngine::with_delays(
            EngineConfig::default().with_job_failure_probability(0.0),
            Arc::new(FixedDelay::zero()),
        )
    }

    fn slow_engine() -> PlatformEngine {
        PlatformEngine::with_delays(
            EngineConfig::default(),
            Arc::new(FixedDelay(Duration::from_secs(3600))),
        )
    }

    fn request(gpu_type: GpuKind, count: u32) -> CreateInstanceRequest {
        CreateInstanceRequest {
            gpu_type,
            count,
            ..CreateInstanceRequest::default()
        }
    }

    fn job_request(instance_id: &str) -> SubmitJobRequest {
        SubmitJobRequest {
            instance_id: instance_id.to_string(),
            job_type: JobKind::Training,
            script_path: "train.py".to_string(),
            parameters: serde_json::Map::new(),
        }
    }

    #[test]
    fn login_and_authenticate() {
        let engine = engine();
        let login = engine.login("test_user", "test_pass").unwrap();
        assert_eq!(login.access_token, TOKEN);
        assert_eq!(login.gpu_quota, 16);

        assert_eq!(
            engine.login("test_user", "wrong"),
            Err(PlatformError::Unauthorized)
        );
        assert_eq!(engine.authenticate("nope"), Err(PlatformError::Unauthorized));
        assert_eq!(engine.verify(TOKEN).unwrap().user_id, "usr_001");
    }

    #[tokio::test]
    async fn create_rejects_bad_unit_counts() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        for count in [0, 9] {
            assert!(matches!(
                engine.create_instance(&caller, request(GpuKind::A100, count)).await,
                Err(PlatformError::InvalidRequest { .. })
            ));
        }
        assert!(engine.store().instances.is_empty());
    }

    #[tokio::test]
    async fn quota_counts_provisioning_instances() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        engine
            .create_instance(&caller, request(GpuKind::A100, 8))
            .await
            .unwrap();
        engine
            .create_instance(&caller, request(GpuKind::H100, 6))
            .await
            .unwrap();

        assert_eq!(
            engine
                .create_instance(&caller, request(GpuKind::V100, 4))
                .await,
            Err(PlatformError::QuotaExceeded {
                requested: 4,
                available: 2
            })
        );
        assert_eq!(engine.store().instances.len(), 2);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn job_on_provisioning_instance_is_rejected() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        let created = engine
            .create_instance(&caller, request(GpuKind::A100, 1))
            .await
            .unwrap();

        let result = engine.submit_job(&caller, job_request(&created.instance_id)).await;
        assert!(matches!(result, Err(PlatformError::PreconditionFailed { .. })));
        assert!(engine.store().jobs.is_empty());

        assert_eq!(
            engine.submit_job(&caller, job_request("inst_missing")).await,
            Err(PlatformError::instance_not_found("inst_missing"))
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn list_filters_by_status_and_region() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        engine
            .create_instance(
                &caller,
                CreateInstanceRequest {
                    region: "eu-west-1".to_string(),
                    ..request(GpuKind::A100, 2)
                },
            )
            .await
            .unwrap();
        engine
            .create_instance(&caller, request(GpuKind::H100, 3))
            .await
            .unwrap();

        let all = engine.list_instances(&caller, &ListInstancesQuery::default());
        assert_eq!(all.count, 2);
        assert_eq!(all.total_gpus, 5);

        let eu = engine.list_instances(
            &caller,
            &ListInstancesQuery {
                region: Some("eu-west-1".to_string()),
                ..ListInstancesQuery::default()
            },
        );
        assert_eq!(eu.count, 1);
        assert_eq!(eu.instances[0].gpu_type, GpuKind::A100);

        let active = engine.list_instances(
            &caller,
            &ListInstancesQuery {
                status: Some(InstanceStatus::Active),
                ..ListInstancesQuery::default()
            },
        );
        assert_eq!(active.count, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_for_foreign_or_unknown_instance_are_empty() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        let created = engine
            .create_instance(&caller, request(GpuKind::A100, 1))
            .await
            .unwrap();

        let own = engine.query_metrics(
            &caller,
            &MetricsQuery {
                instance_id: Some(created.instance_id.clone()),
                ..MetricsQuery::default()
            },
        );
        assert_eq!(own.count, 10);
        assert!(own
            .metrics
            .iter()
            .all(|sample| sample.instance_id == created.instance_id));
        assert_eq!(own.time_range, "last 30 minutes");

        let unknown = engine.query_metrics(
            &caller,
            &MetricsQuery {
                instance_id: Some("inst_missing".to_string()),
                ..MetricsQuery::default()
            },
        );
        assert_eq!(unknown.count, 0);
        assert_eq!(engine.health().statistics.metrics, 10);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn job_runs_to_completion_on_active_instance() {
        let engine = engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        let created = engine
            .create_instance(&caller, request(GpuKind::A100, 4))
            .await
            .unwrap();

        while engine.get_instance(&caller, &created.instance_id).unwrap().instance.status
            != InstanceStatus::Active
        {
            tokio::task::yield_now().await;
        }

        let submitted = engine
            .submit_job(&caller, job_request(&created.instance_id))
            .await
            .unwrap();
        assert_eq!(submitted.status, JobStatus::Queued);

        loop {
            let job = engine.get_job(&caller, &submitted.job_id).unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, JobStatus::Completed);
                assert_eq!(job.progress, 100.0);
                assert!(job.results.is_some());
                break;
            }
            tokio::task::yield_now().await;
        }

        engine
            .delete_instance(&caller, &created.instance_id)
            .await
            .unwrap();
        assert_eq!(
            engine.get_instance(&caller, &created.instance_id).unwrap_err(),
            PlatformError::instance_not_found(&created.instance_id)
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn nan_failure_probability_still_resolves_jobs() {
        let config = EngineConfig {
            job_failure_probability: f64::NAN,
            ..EngineConfig::default()
        };
        let engine = PlatformEngine::with_delays(config, Arc::new(FixedDelay::zero()));
        let caller = engine.authenticate(TOKEN).unwrap();
        let created = engine
            .create_instance(&caller, request(GpuKind::H100, 1))
            .await
            .unwrap();
        while engine.get_instance(&caller, &created.instance_id).unwrap().instance.status
            != InstanceStatus::Active
        {
            tokio::task::yield_now().await;
        }

        let submitted = engine
            .submit_job(&caller, job_request(&created.instance_id))
            .await
            .unwrap();
        let job = loop {
            let job = engine.get_job(&caller, &submitted.job_id).unwrap();
            if job.status.is_terminal() {
                break job;
            }
            tokio::task::yield_now().await;
        };

        assert_eq!(job.status, JobStatus::Completed);
        engine
            .delete_instance(&caller, &created.instance_id)
            .await
            .unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_pending_lifecycles() {
        let engine = slow_engine();
        let caller = engine.authenticate(TOKEN).unwrap();
        let created = engine
            .create_instance(&caller, request(GpuKind::A100, 1))
            .await
            .unwrap();
        assert_eq!(engine.pending_tasks(), 1);

        engine.shutdown().await;
        assert_eq!(engine.pending_tasks(), 0);
        assert_eq!(
            engine.store().instances.get(&created.instance_id).unwrap().status,
            InstanceStatus::Provisioning
        );
    }
}
