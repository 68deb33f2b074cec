use crate::config::Step;
use crate::runner::StepOutcome;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A request is a failure when nothing came back or the status is an error
/// the step's check does not explicitly accept.
pub fn is_failure(status: u16, accepted: &[u16]) -> bool {
    status == 0 || (status >= 400 && !accepted.contains(&status))
}

/// Raw samples in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct Trend {
    samples: Vec<f64>,
}

impl Trend {
    pub fn add(&mut self, value: Duration) {
        self.samples.push(value.as_secs_f64() * 1000.0);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> TrendStats {
        if self.samples.is_empty() {
            return TrendStats::default();
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        TrendStats {
            count: count as u64,
            avg: sum / count as f64,
            min: sorted[0],
            med: nearest_rank(&sorted, 50.0),
            max: sorted[count - 1],
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rate {
    trues: u64,
    total: u64,
}

impl Rate {
    pub fn add(&mut self, value: bool) {
        self.total += 1;
        if value {
            self.trues += 1;
        }
    }

    pub fn summary(&self) -> RateSummary {
        RateSummary {
            rate: if self.total > 0 {
                self.trues as f64 / self.total as f64
            } else {
                0.0
            },
            trues: self.trues,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub rate: f64,
    pub trues: u64,
    pub total: u64,
}

impl RateSummary {
    pub fn falses(&self) -> u64 {
        self.total - self.trues
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CheckTally {
    passes: u64,
    fails: u64,
}

/// The scenario's custom metric group (`<prefix>_duration`, `_reqs`, ...).
#[derive(Debug, Clone, Default)]
struct MetricGroup {
    duration: Trend,
    reqs: u64,
    fail_rate: Rate,
    success_rate: Rate,
    errors: u64,
}

/// Live metrics of one run, shared by every VU behind a mutex.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    run_id: Uuid,
    scenario: String,
    prefix: String,
    started_at: DateTime<Utc>,
    start_time: Instant,
    http_reqs: u64,
    http_req_failed: Rate,
    http_req_duration: Trend,
    step_durations: IndexMap<String, Trend>,
    status_codes: BTreeMap<u16, u64>,
    group: MetricGroup,
    checks: IndexMap<String, CheckTally>,
    iterations: u64,
    iterations_interrupted: u64,
    iteration_duration: Trend,
    current_vus: u64,
    vus_max: u64,
    bytes_sent: u64,
    bytes_received: u64,
    transport_errors: u64,
}

impl RunMetrics {
    pub fn new(scenario: &str, prefix: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.to_string(),
            prefix: prefix.to_string(),
            started_at: Utc::now(),
            start_time: Instant::now(),
            http_reqs: 0,
            http_req_failed: Rate::default(),
            http_req_duration: Trend::default(),
            step_durations: IndexMap::new(),
            status_codes: BTreeMap::new(),
            group: MetricGroup::default(),
            checks: IndexMap::new(),
            iterations: 0,
            iterations_interrupted: 0,
            iteration_duration: Trend::default(),
            current_vus: 0,
            vus_max: 0,
            bytes_sent: 0,
            bytes_received: 0,
            transport_errors: 0,
        }
    }

    pub fn record_request(&mut self, step: &Step, outcome: &StepOutcome) {
        let failed = is_failure(outcome.status, step.accepted_statuses());

        self.http_reqs += 1;
        self.http_req_failed.add(failed);
        self.http_req_duration.add(outcome.duration);
        self.step_durations
            .entry(step.name.clone())
            .or_default()
            .add(outcome.duration);
        *self.status_codes.entry(outcome.status).or_insert(0) += 1;
        self.bytes_sent += outcome.bytes_sent;
        self.bytes_received += outcome.bytes_received;

        if outcome.is_transport_error() {
            self.transport_errors += 1;
        }

        if step.track {
            self.group.duration.add(outcome.duration);
            self.group.reqs += 1;
            self.group.fail_rate.add(failed);
            self.group.success_rate.add(!failed);
        }
    }

    pub fn record_check(&mut self, name: &str, passed: bool) {
        let tally = self.checks.entry(name.to_string()).or_default();
        if passed {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }

    /// Failed check or value that could not be extracted.
    pub fn record_error(&mut self) {
        self.group.errors += 1;
    }

    pub fn record_iteration(&mut self, duration: Duration) {
        self.iterations += 1;
        self.iteration_duration.add(duration);
    }

    pub fn record_interrupted(&mut self, count: u64) {
        self.iterations_interrupted += count;
    }

    pub fn set_active_vus(&mut self, vus: u64) {
        self.current_vus = vus;
        self.vus_max = self.vus_max.max(vus);
    }

    pub fn active_vus(&self) -> u64 {
        self.current_vus
    }

    pub fn request_count(&self) -> u64 {
        self.http_reqs
    }

    pub fn failed_count(&self) -> u64 {
        self.http_req_failed.trues
    }

    pub fn error_count(&self) -> u64 {
        self.group.errors
    }

    pub fn calculate_results(&self) -> PerformanceResults {
        let total_duration = self.start_time.elapsed();

        let checks: Vec<CheckSummary> = self
            .checks
            .iter()
            .map(|(name, tally)| CheckSummary {
                name: name.clone(),
                passes: tally.passes,
                fails: tally.fails,
            })
            .collect();
        let check_passes: u64 = checks.iter().map(|c| c.passes).sum();
        let check_total: u64 = checks.iter().map(|c| c.passes + c.fails).sum();

        let steps = self
            .step_durations
            .iter()
            .map(|(name, trend)| StepSummary {
                name: name.clone(),
                duration: trend.stats(),
            })
            .collect();

        let secs = total_duration.as_secs_f64();
        let requests_per_second = if secs > 0.0 {
            self.http_reqs as f64 / secs
        } else {
            0.0
        };

        PerformanceResults {
            run_id: self.run_id,
            scenario: self.scenario.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            total_duration,
            http_reqs: self.http_reqs,
            http_req_failed: self.http_req_failed.summary(),
            http_req_duration: self.http_req_duration.stats(),
            requests_per_second,
            steps,
            status_code_distribution: self.status_codes.clone(),
            group: MetricGroupSummary {
                prefix: self.prefix.clone(),
                duration: self.group.duration.stats(),
                reqs: self.group.reqs,
                fail_rate: self.group.fail_rate.summary(),
                success_rate: self.group.success_rate.summary(),
                errors: self.group.errors,
            },
            checks_rate: RateSummary {
                rate: if check_total > 0 {
                    check_passes as f64 / check_total as f64
                } else {
                    0.0
                },
                trues: check_passes,
                total: check_total,
            },
            checks,
            iterations: self.iterations,
            iterations_interrupted: self.iterations_interrupted,
            iteration_duration: self.iteration_duration.stats(),
            vus_max: self.vus_max,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            transport_errors: self.transport_errors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub duration: TrendStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn passed(&self) -> bool {
        self.fails == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricGroupSummary {
    pub prefix: String,
    pub duration: TrendStats,
    pub reqs: u64,
    pub fail_rate: RateSummary,
    pub success_rate: RateSummary,
    pub errors: u64,
}

impl MetricGroupSummary {
    pub fn metric_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceResults {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,

    pub http_reqs: u64,
    pub http_req_failed: RateSummary,
    pub http_req_duration: TrendStats,
    pub requests_per_second: f64,
    pub steps: Vec<StepSummary>,
    pub status_code_distribution: BTreeMap<u16, u64>,

    pub group: MetricGroupSummary,

    pub checks: Vec<CheckSummary>,
    pub checks_rate: RateSummary,

    pub iterations: u64,
    pub iterations_interrupted: u64,
    pub iteration_duration: TrendStats,
    pub vus_max: u64,

    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub transport_errors: u64,
}

// Duration as milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
