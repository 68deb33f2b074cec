use crate::config::Scenario;
use crate::scenarios;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

/// A built-in scenario name wins over a file path of the same spelling.
pub async fn resolve_scenario(target: &str) -> Result<Scenario> {
    if let Some(scenario) = scenarios::builtin(target)? {
        return Ok(scenario);
    }

    let path = Path::new(target);
    if !path.exists() {
        anyhow::bail!(
            "'{}' is neither a built-in scenario nor an existing file (see `sme-load list`)",
            target
        );
    }
    load_scenario(path).await
}

pub async fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let scenario: Scenario = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML in file: {}", path.display()))?;

    Ok(scenario)
}

/// Loads a single scenario file, or every `*.scenario.yaml|yml` below a directory.
pub async fn load_scenarios(path: &Path) -> Result<Vec<(String, Scenario)>> {
    if path.is_file() {
        let scenario = load_scenario(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(vec![(file_name, scenario)])
    } else if path.is_dir() {
        load_directory(path).await
    } else {
        anyhow::bail!("Path does not exist: {}", path.display());
    }
}

async fn load_directory(path: &Path) -> Result<Vec<(String, Scenario)>> {
    let mut scenarios = Vec::new();

    for entry in WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".scenario.yaml") || name.ends_with(".scenario.yml"))
                .unwrap_or(false)
        })
    {
        let scenario = load_scenario(entry.path()).await?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        scenarios.push((file_name, scenario));
    }

    if scenarios.is_empty() {
        anyhow::bail!(
            "No .scenario.yaml files found in directory: {}",
            path.display()
        );
    }

    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs::write;

    const SAMPLE: &str = r#"
name: sample
options:
  vus: 1
  duration: 1s
steps:
  - name: Home
    request:
      method: GET
      url: "https://example.com/"
"#;

    #[tokio::test]
    async fn test_load_scenario_valid() {
        let temp_file = NamedTempFile::new().unwrap();
        write(temp_file.path(), SAMPLE).await.unwrap();

        let scenario = load_scenario(temp_file.path()).await.unwrap();
        assert_eq!(scenario.name, "sample");
        assert_eq!(scenario.steps.len(), 1);
        scenario.validate().unwrap();
    }

    #[tokio::test]
    async fn test_load_scenario_invalid_yaml() {
        let temp_file = NamedTempFile::new().unwrap();
        write(temp_file.path(), "invalid: yaml: content: [")
            .await
            .unwrap();

        let result = load_scenario(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse YAML"));
    }

    #[tokio::test]
    async fn test_load_scenario_nonexistent() {
        let result = load_scenario(Path::new("/nonexistent/file.yaml")).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read file"));
    }

    #[tokio::test]
    async fn test_load_directory_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path().join("b.scenario.yml"), SAMPLE)
            .await
            .unwrap();
        write(temp_dir.path().join("a.scenario.yaml"), SAMPLE)
            .await
            .unwrap();
        write(temp_dir.path().join("config.yaml"), "some: config")
            .await
            .unwrap();
        write(temp_dir.path().join("c.scenario.txt"), SAMPLE)
            .await
            .unwrap();

        let result = load_scenarios(temp_dir.path()).await.unwrap();
        let names: Vec<&str> = result.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.scenario.yaml", "b.scenario.yml"]);
    }

    #[tokio::test]
    async fn test_load_directory_without_scenarios() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path().join("config.yaml"), "some: config")
            .await
            .unwrap();

        let err = load_scenarios(temp_dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("No .scenario.yaml files found"));
    }

    #[tokio::test]
    async fn test_resolve_prefers_builtin() {
        let scenario = resolve_scenario("serap-home-front").await.unwrap();
        assert_eq!(scenario.name, "serap-home-front");
    }

    #[tokio::test]
    async fn test_resolve_unknown_target() {
        let err = resolve_scenario("does-not-exist").await.unwrap_err();
        assert!(err.to_string().contains("neither a built-in scenario"));
    }
}
