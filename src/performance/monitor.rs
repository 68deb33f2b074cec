use crate::performance::metrics::{RunMetrics, TrendStats};
use crate::performance::thresholds::ThresholdBreach;
use crate::performance::{PerformanceResults, Schedule};
use crate::ui::progress::create_run_bar;
use crate::utils::format_duration;
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const REPORT_INTERVAL: Duration = Duration::from_millis(500);
const LABEL_WIDTH: usize = 32;

/// Live progress line for a running load, refreshed in the background.
pub struct LoadMonitor {
    bar: ProgressBar,
    handle: JoinHandle<()>,
}

impl LoadMonitor {
    pub fn start(metrics: Arc<Mutex<RunMetrics>>, schedule: Schedule) -> Self {
        let total = schedule.total_duration();
        let bar = create_run_bar(total.as_secs().max(1));
        let task_bar = bar.clone();
        let start_time = Instant::now();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPORT_INTERVAL);
            loop {
                interval.tick().await;
                let elapsed = start_time.elapsed();
                let message = {
                    let metrics = metrics.lock().await;
                    progress_message(&schedule.phase_description(elapsed), &metrics)
                };

                task_bar.set_position(elapsed.as_secs().min(total.as_secs()));
                task_bar.set_message(message);
            }
        });

        Self { bar, handle }
    }

    pub fn finish(self) {
        self.handle.abort();
        self.bar.finish_and_clear();
    }
}

fn progress_message(phase: &str, metrics: &RunMetrics) -> String {
    format!(
        "{} • VUs {} • reqs {} • failed {} • errors {}",
        phase,
        metrics.active_vus(),
        metrics.request_count(),
        metrics.failed_count(),
        metrics.error_count()
    )
}

fn label(name: &str) -> String {
    let dots = LABEL_WIDTH.saturating_sub(name.chars().count());
    format!("{}{}:", name, ".".repeat(dots))
}

fn ms(value: f64) -> String {
    if value >= 1000.0 {
        format!("{:.2}s", value / 1000.0)
    } else {
        format!("{:.2}ms", value)
    }
}

fn trend_line(stats: &TrendStats) -> String {
    format!(
        "avg={} min={} med={} max={} p(90)={} p(95)={}",
        ms(stats.avg),
        ms(stats.min),
        ms(stats.med),
        ms(stats.max),
        ms(stats.p90),
        ms(stats.p95)
    )
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

/// End-of-run summary in the familiar k6 layout.
pub fn print_final_summary(results: &PerformanceResults) {
    println!();
    println!("{}", "=".repeat(72).dimmed());
    println!(
        "{} {} ({})",
        "🎯".bright_white(),
        results.scenario.bold(),
        format_duration(results.total_duration).dimmed()
    );
    println!("{}", "=".repeat(72).dimmed());

    if !results.checks.is_empty() {
        println!();
        for check in &results.checks {
            if check.passed() {
                println!("  {} {}", "✓".green(), check.name);
            } else {
                let total = check.passes + check.fails;
                let pct = if total > 0 {
                    check.passes * 100 / total
                } else {
                    0
                };
                println!("  {} {}", "✗".red(), check.name);
                println!(
                    "   {} {}% ✓ {} / ✗ {}",
                    "↳".dimmed(),
                    pct,
                    check.passes,
                    check.fails
                );
            }
        }
    }

    println!();
    let checks = &results.checks_rate;
    if checks.total > 0 {
        println!(
            "  {} {} {} {} {} {}",
            label("checks"),
            percent(checks.rate).bright_white(),
            "✓".green(),
            checks.trues,
            "✗".red(),
            checks.falses()
        );
    }

    let group = &results.group;
    println!(
        "  {} {}",
        label(&group.metric_name("duration")),
        trend_line(&group.duration)
    );
    println!(
        "  {} {}",
        label(&group.metric_name("errors")),
        group.errors.bright_white()
    );
    println!(
        "  {} {} {} {} {} {}",
        label(&group.metric_name("fail_rate")),
        percent(group.fail_rate.rate).bright_white(),
        "✓".green(),
        group.fail_rate.trues,
        "✗".red(),
        group.fail_rate.falses()
    );
    println!(
        "  {} {}",
        label(&group.metric_name("reqs")),
        group.reqs.bright_white()
    );
    println!(
        "  {} {} {} {} {} {}",
        label(&group.metric_name("success_rate")),
        percent(group.success_rate.rate).bright_white(),
        "✓".green(),
        group.success_rate.trues,
        "✗".red(),
        group.success_rate.falses()
    );

    println!(
        "  {} {}",
        label("http_req_duration"),
        trend_line(&results.http_req_duration)
    );
    for step in &results.steps {
        println!(
            "  {} {}",
            label(&format!("  {{ step:{} }}", step.name)),
            trend_line(&step.duration)
        );
    }
    println!(
        "  {} {} {} {}",
        label("http_req_failed"),
        percent(results.http_req_failed.rate).bright_white(),
        "✓".green(),
        results.http_req_failed.trues
    );
    println!(
        "  {} {} {:.2}/s",
        label("http_reqs"),
        results.http_reqs.bright_white(),
        results.requests_per_second
    );
    println!(
        "  {} {}",
        label("iteration_duration"),
        trend_line(&results.iteration_duration)
    );
    println!(
        "  {} {}",
        label("iterations"),
        results.iterations.bright_white()
    );
    if results.iterations_interrupted > 0 {
        println!(
            "  {} {}",
            label("iterations_interrupted"),
            results.iterations_interrupted.yellow()
        );
    }
    println!("  {} {}", label("vus_max"), results.vus_max.bright_white());
    println!(
        "  {} {} sent, {} received",
        label("data"),
        results.bytes_sent,
        results.bytes_received
    );

    if !results.status_code_distribution.is_empty() {
        println!();
        println!("{} Status codes:", "🔍".bright_white());
        for (code, count) in &results.status_code_distribution {
            let count = count.to_string();
            match *code {
                0 => println!("  no response: {}", count.red()),
                200..=299 => println!("  {}: {}", code, count.green()),
                400.. => println!("  {}: {}", code, count.red()),
                _ => println!("  {}: {}", code, count.yellow()),
            }
        }
    }

    println!("{}", "=".repeat(72).dimmed());
}

pub fn print_threshold_report(breaches: &[ThresholdBreach]) {
    if breaches.is_empty() {
        println!("{} All thresholds passed", "✅".green());
        return;
    }

    println!("{} {} threshold(s) crossed:", "❌".red(), breaches.len());
    for breach in breaches {
        println!("  {} {}", "✗".red(), breach);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message_shows_errors() {
        let mut metrics = RunMetrics::new("serap-login", "login");
        metrics.set_active_vus(2);
        metrics.record_error();
        metrics.record_error();
        assert_eq!(
            progress_message("Holding 2→2 VUs (stage 1/1)", &metrics),
            "Holding 2→2 VUs (stage 1/1) • VUs 2 • reqs 0 • failed 0 • errors 2"
        );
    }

    #[test]
    fn test_label_pads_with_dots() {
        assert_eq!(label("checks").len(), LABEL_WIDTH + 1);
        assert!(label("checks").starts_with("checks...."));
        assert_eq!(label(&"x".repeat(40)), format!("{}:", "x".repeat(40)));
    }

    #[test]
    fn test_ms_formatting() {
        assert_eq!(ms(12.3456), "12.35ms");
        assert_eq!(ms(1500.0), "1.50s");
    }
}
