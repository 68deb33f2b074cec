use crate::config::Scenario;
use crate::runner::parser::load_scenarios;
use crate::scenarios;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// Validates scenario files (a file or a directory), or every built-in
/// scenario when no path is given. Fails if any scenario is invalid.
pub async fn handle_validate(target: Option<PathBuf>) -> Result<()> {
    let scenarios: Vec<(String, Scenario)> = match target {
        Some(path) => load_scenarios(&path).await?,
        None => scenarios::all_builtins()?
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect(),
    };

    let mut invalid = 0;
    for (label, scenario) in &scenarios {
        match scenario.validate() {
            Ok(()) => println!("{} {} ({})", "✔".green(), label, scenario.name.dimmed()),
            Err(e) => {
                invalid += 1;
                println!("{} {}: {}", "✖".red(), label, e);
            }
        }
    }

    println!();
    if invalid > 0 {
        anyhow::bail!("{} of {} scenario(s) invalid", invalid, scenarios.len());
    }
    println!("{} {} scenario(s) valid", "✔".green().bold(), scenarios.len());
    Ok(())
}
