use crate::performance::Schedule;
use crate::scenarios;
use crate::utils::format_duration;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn handle_list() -> Result<()> {
    println!("{} Built-in scenarios", "→".cyan());
    println!();

    for scenario in scenarios::all_builtins()? {
        let schedule = Schedule::from_options(&scenario.options);
        println!(
            "  {:<22} {:>3} VUs max • {:>6} • {} step(s)",
            scenario.name.bright_white(),
            schedule.max_target(),
            format_duration(schedule.total_duration()),
            scenario.steps.len()
        );
        if let Some(description) = &scenario.description {
            println!("  {:<22} {}", "", description.dimmed());
        }
    }

    println!();
    println!(
        "Run one with {} or pass a path to a .scenario.yaml file.",
        "sme-load run <name>".cyan()
    );
    Ok(())
}

/// Prints the YAML of a built-in scenario, or of a scenario file.
pub fn handle_show(target: &str) -> Result<()> {
    if let Some(source) = scenarios::builtin_source(target) {
        print!("{}", source);
        return Ok(());
    }

    let path = Path::new(target);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        print!("{}", content);
        return Ok(());
    }

    anyhow::bail!(
        "'{}' is neither a built-in scenario nor an existing file (see `sme-load list`)",
        target
    );
}
