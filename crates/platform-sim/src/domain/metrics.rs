//! Synthetic GPU telemetry
//!
//! Samples are generated on demand from fixed device-realistic ranges. The
//! only state is a bounded history of samples handed out by metric queries.

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::MetricSample;
use chrono::DateTime;
use chrono::Utc;
use rand::Rng;

pub const UTILIZATION_RANGE: RangeInclusive<f64> = 10.0..=99.0;
pub const MEMORY_TOTAL_MB: u64 = 4096;
pub const MEMORY_USED_RANGE_MB: RangeInclusive<u64> = 1024..=MEMORY_TOTAL_MB;
pub const POWER_DRAW_RANGE_W: RangeInclusive<f64> = 250.0..=400.0;
pub const TEMPERATURE_RANGE_C: RangeInclusive<f64> = 40.0..=85.0;

/// Produces synthetic telemetry samples
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsGenerator;

impl MetricsGenerator {
    /// One sample for `instance_id` stamped with the current time
    pub fn sample(&self, instance_id: &str) -> MetricSample {
        self.sample_at(instance_id, Utc::now())
    }

    pub fn sample_at(&self, instance_id: &str, timestamp: DateTime<Utc>) -> MetricSample {
        let mut rng = rand::rng();
        MetricSample {
            timestamp,
            instance_id: instance_id.to_string(),
            gpu_utilization: rng.random_range(UTILIZATION_RANGE),
            memory_used_mb: rng.random_range(MEMORY_USED_RANGE_MB),
            memory_total_mb: MEMORY_TOTAL_MB,
            power_draw_w: rng.random_range(POWER_DRAW_RANGE_W),
            temperature_c: rng.random_range(TEMPERATURE_RANGE_C),
        }
    }

    /// `count` samples with non-decreasing timestamps, never earlier than
    /// `not_before`
    pub fn series(
        &self,
        instance_id: &str,
        count: usize,
        not_before: DateTime<Utc>,
    ) -> Vec<MetricSample> {
        let mut last = not_before;
        (0..count)
            .map(|_| {
                last = last.max(Utc::now());
                self.sample_at(instance_id, last)
            })
            .collect()
    }
}

/// Append-only sample buffer that evicts the oldest entries once full
#[derive(Debug)]
pub struct MetricHistory {
    capacity: usize,
    samples: Mutex<VecDeque<MetricSample>>,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn extend(&self, new_samples: impl IntoIterator<Item = MetricSample>) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        for sample in new_samples {
            if self.capacity == 0 {
                return;
            }
            if samples.len() == self.capacity {
                samples.pop_front();
            }
            samples.push_back(sample);
        }
    }

    /// Up to `limit` most recent samples, oldest first
    pub fn recent(&self, limit: usize) -> Vec<MetricSample> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = samples.len().saturating_sub(limit);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` most recent samples accepted by `predicate`, oldest first
    pub fn recent_matching(
        &self,
        limit: usize,
        predicate: impl Fn(&MetricSample) -> bool,
    ) -> Vec<MetricSample> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<_> = samples
            .iter()
            .rev()
            .filter(|sample| predicate(sample))
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
