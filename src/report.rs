use crate::config::{Scenario, Thresholds};
use crate::performance::{PerformanceResults, Schedule, ThresholdBreach};
use crate::utils::format_duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub duration: String,
    pub target: u64,
}

/// Everything known about a finished run, as exported to JSON and HTML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub description: Option<String>,
    pub start_vus: u64,
    pub stages: Vec<StageReport>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    pub breaches: Vec<ThresholdBreach>,
    pub results: PerformanceResults,
}

impl RunReport {
    pub fn new(
        scenario: &Scenario,
        schedule: &Schedule,
        results: PerformanceResults,
        breaches: Vec<ThresholdBreach>,
    ) -> Self {
        let stages = schedule
            .stages()
            .iter()
            .map(|stage| StageReport {
                duration: format_duration(stage.duration),
                target: stage.target,
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            description: scenario.description.clone(),
            start_vus: schedule.target_at(std::time::Duration::ZERO),
            stages,
            thresholds: scenario.thresholds.clone(),
            breaches,
            results,
        }
    }

    pub fn passed(&self) -> bool {
        self.breaches.is_empty()
    }
}

pub struct ReportGenerator;

impl ReportGenerator {
    pub fn write_json(report: &RunReport, path: &Path) -> Result<PathBuf> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write summary: {}", path.display()))?;
        Ok(path.to_path_buf())
    }

    pub fn write_html(report: &RunReport, path: &Path) -> Result<PathBuf> {
        ensure_parent(path)?;
        let html = Self::render_html(report)?;
        fs::write(path, html)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(path.to_path_buf())
    }

    pub fn render_html(report: &RunReport) -> Result<String> {
        use tera::{Context, Tera};

        let mut tera = Tera::default();
        tera.add_raw_template("report.html", include_str!("../templates/report.html"))
            .map_err(|e| anyhow::anyhow!("Failed to add template: {}", e))?;

        let results = &report.results;
        let mut context = Context::new();
        context.insert("report", report);
        context.insert("r", results);
        context.insert(
            "started_at",
            &results.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        context.insert("total_duration", &format_duration(results.total_duration));
        context.insert(
            "group_metrics",
            &serde_json::json!({
                "duration": results.group.metric_name("duration"),
                "reqs": results.group.metric_name("reqs"),
                "fail_rate": results.group.metric_name("fail_rate"),
                "success_rate": results.group.metric_name("success_rate"),
                "errors": results.group.metric_name("errors"),
            }),
        );

        context.insert(
            "pct",
            &serde_json::json!({
                "http_req_failed": percent(results.http_req_failed.rate),
                "checks": percent(results.checks_rate.rate),
                "fail_rate": percent(results.group.fail_rate.rate),
                "success_rate": percent(results.group.success_rate.rate),
            }),
        );
        context.insert(
            "trend_rows",
            &serde_json::json!([
                { "name": results.group.metric_name("duration"), "stats": results.group.duration },
                { "name": "http_req_duration", "stats": results.http_req_duration },
                { "name": "iteration_duration", "stats": results.iteration_duration },
            ]),
        );
        let status_rows: Vec<_> = results
            .status_code_distribution
            .iter()
            .map(|(code, count)| {
                let (label, class) = match *code {
                    0 => ("no response".to_string(), "bad"),
                    200..=299 => (code.to_string(), "ok"),
                    400.. => (code.to_string(), "bad"),
                    _ => (code.to_string(), ""),
                };
                serde_json::json!({ "label": label, "class": class, "count": count })
            })
            .collect();
        context.insert("status_rows", &status_rows);

        let html = tera.render("report.html", &context)?;
        Ok(html)
    }
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
