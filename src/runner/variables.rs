use crate::runner::data::User;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("static var regex"))
}

fn env_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").expect("static env regex"))
}

const NUMERIC_VARS: &[&str] = &["vu", "iter", "now_ms"];

/// Variables visible to one VU iteration.
///
/// Values keep their JSON type so that numeric built-ins (`vu`, `iter`,
/// `now_ms`) land in request bodies as numbers.
#[derive(Clone, Debug, Default)]
pub struct VariableContext {
    pub vars: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// Resolves scenario `vars` once per run. `${NAME:default}` is looked up
    /// in `overrides` first, then the process environment, then the default.
    /// Earlier vars may be referenced from later ones with `{{name}}`.
    pub fn from_scenario_vars(
        scenario_vars: &IndexMap<String, String>,
        overrides: &IndexMap<String, String>,
    ) -> Self {
        let mut ctx = Self::new();
        for (key, raw) in scenario_vars {
            let expanded = expand_env(raw, overrides);
            let value = ctx.substitute_variables(&expanded);
            ctx.set(key.clone(), Value::String(value));
        }
        ctx
    }

    pub fn with_user(mut self, user: &User) -> Self {
        self.set("login".to_string(), Value::String(user.login.clone()));
        self.set("senha".to_string(), Value::String(user.senha.clone()));
        self
    }

    pub fn with_iteration(mut self, vu: u64, iter: u64) -> Self {
        self.set("vu".to_string(), Value::from(vu));
        self.set("iter".to_string(), Value::from(iter));
        self
    }

    pub fn set(&mut self, key: String, value: Value) {
        self.vars.insert(key, value);
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.lookup(key).map(|v| render(&v))
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        match self.vars.get(name) {
            Some(value) => Some(value.clone()),
            None if name == "now_ms" => Some(Value::from(chrono::Utc::now().timestamp_millis())),
            None => None,
        }
    }

    /// Replaces `{{name}}` placeholders; unknown ones are left verbatim.
    pub fn substitute_variables(&self, text: &str) -> String {
        var_regex()
            .replace_all(text, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.lookup(var_name)
                    .map(|v| render(&v))
                    .unwrap_or_else(|| format!("{{{{{}}}}}", var_name))
            })
            .to_string()
    }

    /// Substitutes placeholders in every string leaf of a JSON document.
    /// A leaf that is exactly one `vu`, `iter` or `now_ms` placeholder
    /// becomes a JSON number; everything else stays a string.
    pub fn substitute_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(caps) = var_regex().captures(s) {
                    let whole = caps.get(0).map(|m| m.as_str().len()).unwrap_or(0);
                    if whole == s.len() && NUMERIC_VARS.contains(&&caps[1]) {
                        if let Some(found @ Value::Number(_)) = self.lookup(&caps[1]) {
                            return found;
                        }
                    }
                }
                Value::String(self.substitute_variables(s))
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.substitute_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Expands `${NAME}` and `${NAME:default}`.
pub fn expand_env(text: &str, overrides: &IndexMap<String, String>) -> String {
    env_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");

            overrides
                .get(var_name)
                .cloned()
                .or_else(|| env::var(var_name).ok())
                .unwrap_or_else(|| default_value.to_string())
        })
        .to_string()
}
