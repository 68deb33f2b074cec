use crate::config::{HumanDuration, LoadOptions, Scenario, StageConfig, UserConfig, UsersRequirement};
use crate::performance::monitor::{print_final_summary, print_threshold_report};
use crate::performance::{evaluate, LoadDriver};
use crate::report::{ReportGenerator, RunReport};
use crate::runner::parser::resolve_scenario;
use crate::runner::data::UsersError;
use crate::runner::{load_users, User, VariableContext};
use crate::utils::{format_duration, parse_duration, parse_env_pairs};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RunOptions {
    pub target: String,
    pub env: Vec<String>,
    pub users: Option<PathBuf>,
    pub vus: Option<u64>,
    pub duration: Option<String>,
    pub stages: Vec<String>,
    pub report: Option<PathBuf>,
    pub no_report: bool,
    pub summary_export: Option<PathBuf>,
    pub timeout: Option<String>,
    pub insecure: bool,
    pub quiet: bool,
}

pub async fn handle_run(options: RunOptions) -> Result<()> {
    let user_config = UserConfig::load().unwrap_or_else(|e| {
        debug!(error = %format!("{:#}", e), "using default user config");
        UserConfig::default()
    });

    let mut scenario = resolve_scenario(&options.target).await?;
    apply_load_overrides(
        &mut scenario.options,
        options.vus,
        options.duration.as_deref(),
        &options.stages,
    )?;
    scenario
        .validate()
        .with_context(|| format!("Scenario '{}' is invalid", scenario.name))?;

    let overrides = parse_env_pairs(&options.env)?;
    let vars = VariableContext::from_scenario_vars(&scenario.vars, &overrides);
    check_required_vars(&scenario, &vars)?;

    let users_path = options
        .users
        .clone()
        .unwrap_or_else(|| user_config.users_file.clone());
    let users = users_for(&scenario, &users_path).await?;

    let timeout_str = options
        .timeout
        .clone()
        .unwrap_or_else(|| user_config.request_timeout.clone());
    let timeout = parse_duration(&timeout_str)?;

    let driver = LoadDriver::new(
        &scenario.options,
        timeout,
        options.insecure || user_config.insecure,
    )?
    .with_progress(!options.quiet && atty::is(atty::Stream::Stderr));

    println!("{} Running {}", "→".cyan(), scenario.name.bright_white());
    if let Some(description) = &scenario.description {
        println!("  {}", description.dimmed());
    }
    println!(
        "  {} VUs max over {} ({} stage(s)), graceful stop {}",
        driver.schedule().max_target(),
        format_duration(driver.schedule().total_duration()),
        driver.schedule().stages().len(),
        format_duration(scenario.options.graceful_stop())
    );
    if !users.is_empty() {
        println!("  {} user(s) from {}", users.len(), users_path.display());
    }

    let scenario = Arc::new(scenario);
    let results = driver
        .run(Arc::clone(&scenario), Arc::new(users), vars)
        .await?;

    print_final_summary(&results);

    let breaches = scenario
        .thresholds
        .as_ref()
        .map(|thresholds| evaluate(thresholds, &results))
        .unwrap_or_default();
    if scenario.thresholds.is_some() {
        print_threshold_report(&breaches);
    }

    let report = RunReport::new(&scenario, driver.schedule(), results, breaches);

    if let Some(path) = report_path(
        &scenario,
        options.report.as_deref(),
        options.no_report,
        user_config.report_dir.as_deref(),
    ) {
        let written = ReportGenerator::write_html(&report, &path)?;
        info!(path = %written.display(), "HTML report written");
        println!("{} Report written to {}", "✔".green(), written.display());
    }

    if let Some(path) = &options.summary_export {
        let written = ReportGenerator::write_json(&report, path)?;
        println!("{} Summary exported to {}", "✔".green(), written.display());
    }

    if !report.passed() {
        anyhow::bail!("{} threshold(s) crossed", report.breaches.len());
    }

    Ok(())
}

/// `--stage` replaces the scenario's stages; `--vus`/`--duration` replace
/// the whole schedule with a constant one.
pub fn apply_load_overrides(
    options: &mut LoadOptions,
    vus: Option<u64>,
    duration: Option<&str>,
    stages: &[String],
) -> Result<()> {
    if !stages.is_empty() {
        options.stages = stages
            .iter()
            .map(|s| parse_stage(s))
            .collect::<Result<_>>()?;
        options.vus = None;
        options.duration = None;
        return Ok(());
    }

    if vus.is_none() && duration.is_none() {
        return Ok(());
    }

    let duration = match duration {
        Some(raw) => parse_duration(raw)?,
        None => options.total_duration(),
    };
    let vus = vus.or(options.vus).unwrap_or(1);

    options.stages.clear();
    options.start_vus = None;
    options.vus = Some(vus);
    options.duration = Some(HumanDuration(duration));
    Ok(())
}

/// Parses `DURATION:TARGET`, e.g. `30s:10`.
pub fn parse_stage(raw: &str) -> Result<StageConfig> {
    let (duration, target) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid stage '{}', expected DURATION:TARGET", raw))?;
    let target = target
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid stage target in '{}'", raw))?;

    Ok(StageConfig {
        duration: HumanDuration(parse_duration(duration.trim())?),
        target,
    })
}

pub fn check_required_vars(scenario: &Scenario, vars: &VariableContext) -> Result<()> {
    let missing: Vec<&str> = scenario
        .required_vars
        .iter()
        .filter(|name| {
            vars.get_str(name)
                .map(|value| value.trim().is_empty())
                .unwrap_or(true)
        })
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        anyhow::bail!(
            "Required variable(s) not set: {} (pass them with -e KEY=VALUE or the environment)",
            missing.join(", ")
        );
    }
    Ok(())
}

async fn users_for(scenario: &Scenario, path: &Path) -> Result<Vec<User>> {
    match scenario.users {
        UsersRequirement::None => Ok(Vec::new()),
        UsersRequirement::Required => load_users(path)
            .await
            .with_context(|| format!("Scenario '{}' needs a users file", scenario.name)),
        UsersRequirement::Optional if path.exists() => match load_users(path).await {
            Err(UsersError::Empty(_)) => Ok(Vec::new()),
            other => Ok(other?),
        },
        UsersRequirement::Optional => Ok(Vec::new()),
    }
}

/// Where the HTML report goes: `--report`, else the scenario's own path,
/// relative paths resolved under the configured report directory.
pub fn report_path(
    scenario: &Scenario,
    cli_report: Option<&Path>,
    no_report: bool,
    report_dir: Option<&Path>,
) -> Option<PathBuf> {
    if no_report {
        return None;
    }
    let path = cli_report
        .map(Path::to_path_buf)
        .or_else(|| scenario.report.clone())?;

    match report_dir {
        Some(dir) if path.is_relative() => Some(dir.join(path)),
        _ => Some(path),
    }
}
