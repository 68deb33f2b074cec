use crate::utils::{format_duration, parse_duration};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Placeholders available to every step without being declared in `vars`.
pub const BUILTIN_VARS: &[&str] = &["vu", "iter", "now_ms", "login", "senha"];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UserConfig {
    pub users_file: PathBuf,
    pub request_timeout: String,
    pub insecure: bool,
    pub report_dir: Option<PathBuf>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            users_file: PathBuf::from("usuarios.txt"),
            request_timeout: "60s".to_string(),
            insecure: false,
            report_dir: None,
        }
    }
}

impl UserConfig {
    pub fn load() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let default_config = UserConfig::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid user config {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::get_config_dir()?;
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn get_config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| anyhow::anyhow!("Unable to find home directory"))?;

        Ok(PathBuf::from(home).join(".sme-load"))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("scenario name must not be empty")]
    EmptyName,
    #[error("scenario '{0}' has no steps")]
    NoSteps(String),
    #[error("step '{0}' is defined more than once")]
    DuplicateStep(String),
    #[error("step '{step}' uses invalid HTTP method '{method}'")]
    InvalidMethod { step: String, method: String },
    #[error("step '{0}' sets both `json` and `body`")]
    ConflictingBody(String),
    #[error("step '{step}' references unknown variable '{var}'")]
    UnknownVariable { step: String, var: String },
    #[error("required variable '{0}' is not declared in `vars`")]
    UndeclaredRequiredVar(String),
    #[error("options must define `stages` or both `vus` and `duration`")]
    NoLoad,
    #[error("load schedule has zero total duration")]
    ZeroDuration,
}

/// A scenario file: what one VU does per iteration, plus how much load to apply.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
    #[serde(default)]
    pub users: UsersRequirement,
    #[serde(default)]
    pub vars: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_vars: Vec<String>,
    #[serde(default)]
    pub metrics: MetricGroupConfig,
    pub options: LoadOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsersRequirement {
    Required,
    Optional,
    #[default]
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricGroupConfig {
    pub prefix: String,
}

impl Default for MetricGroupConfig {
    fn default() -> Self {
        Self {
            prefix: "scenario".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_stop: Option<HumanDuration>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageConfig {
    pub duration: HumanDuration,
    pub target: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fail_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_p95_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_checks_rate: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Step {
    pub name: String,
    pub request: Request,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Check>,
    /// Variable name to JSONPath, evaluated against the JSON response body.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extract: IndexMap<String, String>,
    #[serde(default)]
    pub abort_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<HumanDuration>,
    /// Whether the request feeds the scenario's metric group.
    #[serde(default = "default_track")]
    pub track: bool,
}

fn default_track() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Check {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: Vec<u16>,
}

impl Check {
    pub fn passes(&self, status: u16) -> bool {
        self.status.contains(&status)
    }
}

impl Step {
    pub fn check_name(&self) -> Option<String> {
        self.check.as_ref().map(|check| match &check.name {
            Some(name) => name.clone(),
            None => {
                let codes: Vec<String> = check.status.iter().map(|c| c.to_string()).collect();
                format!("{} - status {}", self.name, codes.join("|"))
            }
        })
    }

    /// Statuses the step treats as acceptable even when they are >= 400.
    pub fn accepted_statuses(&self) -> &[u16] {
        self.check.as_ref().map(|c| c.status.as_slice()).unwrap_or(&[])
    }
}

/// A duration written as `10s`, `2m`, `1m30s` in scenario files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn get(self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format_duration(self.0))
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(HumanDuration(Duration::from_secs(secs))),
            Raw::Text(text) => parse_duration(&text)
                .map(HumanDuration)
                .map_err(serde::de::Error::custom),
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("static placeholder regex"))
}

/// Every `{{name}}` placeholder in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn json_placeholders(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.extend(placeholders(s)),
        serde_json::Value::Array(items) => items.iter().for_each(|v| json_placeholders(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| json_placeholders(v, out)),
        _ => {}
    }
}

impl Request {
    pub fn placeholders(&self) -> Vec<String> {
        let mut found = placeholders(&self.url);
        for value in self.headers.values() {
            found.extend(placeholders(value));
        }
        if let Some(json) = &self.json {
            json_placeholders(json, &mut found);
        }
        if let Some(body) = &self.body {
            found.extend(placeholders(body));
        }
        found
    }
}

impl LoadOptions {
    pub fn total_duration(&self) -> Duration {
        if !self.stages.is_empty() {
            self.stages.iter().map(|s| s.duration.get()).sum()
        } else {
            self.duration.map(HumanDuration::get).unwrap_or(Duration::ZERO)
        }
    }

    pub fn graceful_stop(&self) -> Duration {
        self.graceful_stop
            .map(HumanDuration::get)
            .unwrap_or(Duration::from_secs(30))
    }
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ScenarioError::NoSteps(self.name.clone()));
        }

        if self.options.stages.is_empty()
            && (self.options.vus.is_none() || self.options.duration.is_none())
        {
            return Err(ScenarioError::NoLoad);
        }
        if self.options.total_duration().is_zero() {
            return Err(ScenarioError::ZeroDuration);
        }

        for var in &self.required_vars {
            if !self.vars.contains_key(var) {
                return Err(ScenarioError::UndeclaredRequiredVar(var.clone()));
            }
        }

        let mut known: HashSet<String> = self.vars.keys().cloned().collect();
        known.extend(BUILTIN_VARS.iter().map(|v| v.to_string()));

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(ScenarioError::DuplicateStep(step.name.clone()));
            }

            if step.request.method.parse::<reqwest::Method>().is_err()
                || step.request.method.is_empty()
            {
                return Err(ScenarioError::InvalidMethod {
                    step: step.name.clone(),
                    method: step.request.method.clone(),
                });
            }

            if step.request.json.is_some() && step.request.body.is_some() {
                return Err(ScenarioError::ConflictingBody(step.name.clone()));
            }

            for var in step.request.placeholders() {
                if !known.contains(&var) {
                    return Err(ScenarioError::UnknownVariable {
                        step: step.name.clone(),
                        var,
                    });
                }
            }

            known.extend(step.extract.keys().cloned());
        }

        Ok(())
    }
}
