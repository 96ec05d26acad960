//! Client-side polling for eventually consistent state
//!
//! Lifecycle transitions happen in the background, so a caller that needs a
//! resource in a given state polls for it. Polling is bounded by a deadline
//! measured from the first attempt; the predicate's own latency counts
//! against it.

use core::error::Error;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use api_types::InstanceDetail;
use api_types::InstanceStatus;
use api_types::JobInfo;
use error_stack::Report;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::types::Caller;
use crate::domain::PlatformEngine;
use crate::domain::PlatformError;

#[derive(Debug, derive_more::Display)]
pub enum WaitError {
    #[display("{message} (timed out after {timeout:?}, {attempts} attempts)")]
    Timeout {
        message: String,
        timeout: Duration,
        attempts: u32,
        /// Most recent predicate failure, if any attempt failed
        last_error: Option<String>,
    },
}

impl Error for WaitError {}

/// Polling bounds and the message reported on timeout
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub message: String,
}

impl WaitConfig {
    pub fn new(timeout: Duration, interval: Duration, message: impl Into<String>) -> Self {
        Self {
            timeout,
            interval,
            message: message.into(),
        }
    }

    /// Defaults for waiting on an instance transition
    pub fn instance_status() -> Self {
        Self::new(
            Duration::from_secs(60),
            Duration::from_secs(5),
            "Instance did not reach the expected status",
        )
    }

    /// Defaults for waiting on a job to finish
    pub fn job_completion() -> Self {
        Self::new(
            Duration::from_secs(300),
            Duration::from_secs(10),
            "Job did not finish",
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Polls `probe` until it yields a value or the timeout elapses.
///
/// A probe error counts as "not yet" and is logged; the last one is carried
/// by the timeout error. The probe runs at least once.
pub async fn poll_until<T, E, F, Fut>(
    config: &WaitConfig,
    mut probe: F,
) -> Result<T, Report<WaitError>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        match probe().await {
            Ok(Some(value)) => {
                debug!(attempts, elapsed = ?started.elapsed(), "Wait condition satisfied");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(attempt = attempts, error = %e, "Wait probe failed");
                last_error = Some(e.to_string());
            }
        }

        tokio::time::sleep(config.interval).await;
        if started.elapsed() >= config.timeout {
            break;
        }
    }

    let mut report = Report::new(WaitError::Timeout {
        message: config.message.clone(),
        timeout: config.timeout,
        attempts,
        last_error: last_error.clone(),
    });
    if let Some(last_error) = last_error {
        report = report.attach_printable(format!("last error: {last_error}"));
    }
    Err(report)
}

/// Polls `predicate` until it returns `true` or the timeout elapses
pub async fn wait_until<E, F, Fut>(
    config: &WaitConfig,
    mut predicate: F,
) -> Result<(), Report<WaitError>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    poll_until(config, || {
        let check = predicate();
        async move { check.await.map(|done| done.then_some(())) }
    })
    .await
}

/// Waits until the caller's instance reports `status`
pub async fn wait_for_instance_status(
    engine: &PlatformEngine,
    caller: &Caller,
    instance_id: &str,
    status: InstanceStatus,
    config: &WaitConfig,
) -> Result<InstanceDetail, Report<WaitError>> {
    poll_until(config, || async move {
        let detail = engine.get_instance(caller, instance_id)?;
        Ok::<_, PlatformError>((detail.instance.status == status).then_some(detail))
    })
    .await
}

/// Waits until the caller's job reaches `completed` or `failed`
pub async fn wait_for_job_terminal(
    engine: &PlatformEngine,
    caller: &Caller,
    job_id: &str,
    config: &WaitConfig,
) -> Result<JobInfo, Report<WaitError>> {
    poll_until(config, || async move {
        let job = engine.get_job(caller, job_id)?;
        Ok::<_, PlatformError>(job.status.is_terminal().then_some(job))
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn times_out_after_deadline_with_several_attempts() {
        let config = WaitConfig::new(
            Duration::from_secs(1),
            Duration::from_millis(200),
            "never true",
        );
        let started = Instant::now();

        let err = wait_until(&config, || async { Ok::<_, String>(false) })
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed <= Duration::from_millis(1200));

        let WaitError::Timeout {
            message,
            attempts,
            last_error,
            ..
        } = err.current_context();
        assert_eq!(message.as_str(), "never true");
        assert!(*attempts >= 4, "only {attempts} attempts");
        assert!(last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let config = WaitConfig::new(Duration::from_secs(5), Duration::from_millis(100), "flaky");

        wait_until(&config, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match call {
                    0 | 1 => Err("connection reset".to_string()),
                    2 => Ok(false),
                    _ => Ok(true),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_error_is_reported() {
        let config = WaitConfig::new(Duration::from_millis(500), Duration::from_millis(100), "down");

        let err = wait_until(&config, || async { Err::<bool, _>("service unavailable") })
            .await
            .unwrap_err();

        let WaitError::Timeout { last_error, .. } = err.current_context();
        assert_eq!(last_error.as_deref(), Some("service unavailable"));
        assert!(format!("{err:?}").contains("service unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_probes_once() {
        let calls = AtomicU32::new(0);
        let config = WaitConfig::new(Duration::ZERO, Duration::from_millis(10), "instant");

        let result = poll_until(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<()>, String>(None) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_the_observed_value() {
        let calls = AtomicU32::new(0);
        let config = WaitConfig::new(Duration::from_secs(1), Duration::from_millis(10), "value");

        let value = poll_until(&config, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>((call == 2).then_some(call * 10)) }
        })
        .await
        .unwrap();

        assert_eq!(value, 20);
    }
}
