use crate::config::Thresholds;
use crate::performance::PerformanceResults;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub metric: String,
    pub limit: String,
    pub actual: String,
}

impl fmt::Display for ThresholdBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (actual {})", self.metric, self.limit, self.actual)
    }
}

/// Returns every breached threshold; an empty vec means the run passed.
pub fn evaluate(thresholds: &Thresholds, results: &PerformanceResults) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();
    let group = &results.group;

    if let Some(max) = thresholds.max_fail_rate {
        let actual = group.fail_rate.rate;
        if actual > max {
            breaches.push(ThresholdBreach {
                metric: group.metric_name("fail_rate"),
                limit: format!("rate <= {:.2}%", max * 100.0),
                actual: format!("{:.2}%", actual * 100.0),
            });
        }
    }

    if let Some(max) = thresholds.max_p95_ms {
        let actual = group.duration.p95;
        if actual > max {
            breaches.push(ThresholdBreach {
                metric: group.metric_name("duration"),
                limit: format!("p(95) <= {}ms", max),
                actual: format!("{:.2}ms", actual),
            });
        }
    }

    if let Some(min) = thresholds.min_checks_rate {
        let actual = results.checks_rate.rate;
        if results.checks_rate.total > 0 && actual < min {
            breaches.push(ThresholdBreach {
                metric: "checks".to_string(),
                limit: format!("rate >= {:.2}%", min * 100.0),
                actual: format!("{:.2}%", actual * 100.0),
            });
        }
    }

    breaches
}
