use crate::config::Step;
use crate::runner::variables::VariableContext;
use anyhow::{Context, Result};
use jsonpath_rust::JsonPathFinder;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

/// What happened when a VU sent one step's request.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub name: String,
    /// HTTP status, or 0 when no response was received.
    pub status: u16,
    pub duration: Duration,
    pub body: Option<String>,
    pub error: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl StepOutcome {
    pub fn is_transport_error(&self) -> bool {
        self.status == 0
    }
}

#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
}

impl RequestExecutor {
    pub fn new(timeout: Duration, insecure: bool) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub async fn execute_step(&self, step: &Step, context: &VariableContext) -> StepOutcome {
        let start_time = Instant::now();

        let (builder, bytes_sent) = match self.build_request(step, context) {
            Ok(built) => built,
            Err(e) => {
                return StepOutcome {
                    name: step.name.clone(),
                    status: 0,
                    duration: start_time.elapsed(),
                    body: None,
                    error: Some(format!("{:#}", e)),
                    bytes_sent: 0,
                    bytes_received: 0,
                }
            }
        };

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => StepOutcome {
                        name: step.name.clone(),
                        status,
                        duration: start_time.elapsed(),
                        bytes_sent,
                        bytes_received: body.len() as u64,
                        body: Some(body),
                        error: None,
                    },
                    Err(e) => StepOutcome {
                        name: step.name.clone(),
                        status,
                        duration: start_time.elapsed(),
                        body: None,
                        error: Some(format!("Failed to read response body: {}", e)),
                        bytes_sent,
                        bytes_received: 0,
                    },
                }
            }
            Err(e) => StepOutcome {
                name: step.name.clone(),
                status: 0,
                duration: start_time.elapsed(),
                body: None,
                error: Some(e.to_string()),
                bytes_sent,
                bytes_received: 0,
            },
        }
    }

    fn build_request(
        &self,
        step: &Step,
        context: &VariableContext,
    ) -> Result<(reqwest::RequestBuilder, u64)> {
        let request = &step.request;

        let url_str = context.substitute_variables(&request.url);
        let url = Url::parse(&url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

        let method = request
            .method
            .to_uppercase()
            .parse::<Method>()
            .with_context(|| format!("Invalid HTTP method: {}", request.method))?;

        let mut req_builder = self.client.request(method, url);

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), context.substitute_variables(value));
        }

        let mut bytes_sent = 0;
        if let Some(json) = &request.json {
            let body = serde_json::to_vec(&context.substitute_json(json))
                .context("Failed to encode JSON body")?;
            bytes_sent = body.len() as u64;
            if !request
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                req_builder = req_builder.header("Content-Type", "application/json");
            }
            req_builder = req_builder.body(body);
        } else if let Some(body) = &request.body {
            let body = context.substitute_variables(body);
            bytes_sent = body.len() as u64;
            req_builder = req_builder.body(body);
        }

        Ok((req_builder, bytes_sent))
    }
}

/// Evaluates a JSONPath against a response body. Returns `None` when the
/// body is not JSON or the path selects nothing (or only `null`).
pub fn extract_json_path(body: &str, path: &str) -> Option<Value> {
    let finder = JsonPathFinder::from_str(body, path).ok()?;
    let found = match finder.find() {
        Value::Array(mut items) => {
            if items.is_empty() {
                return None;
            }
            items.swap_remove(0)
        }
        other => other,
    };

    match found {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        value => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_token() {
        let body = r#"{"token": "abc.def", "expiracao": 3600}"#;
        assert_eq!(extract_json_path(body, "$.token"), Some(json!("abc.def")));
    }

    #[test]
    fn test_extract_missing_or_null() {
        assert_eq!(extract_json_path(r#"{"ok": true}"#, "$.token"), None);
        assert_eq!(extract_json_path(r#"{"token": null}"#, "$.token"), None);
        assert_eq!(extract_json_path(r#"{"token": ""}"#, "$.token"), None);
    }

    #[test]
    fn test_extract_non_json_body() {
        assert_eq!(extract_json_path("<html></html>", "$.token"), None);
    }

    #[test]
    fn test_executor_creation() {
        assert!(RequestExecutor::new(Duration::from_secs(5), false).is_ok());
        assert!(RequestExecutor::new(Duration::from_secs(5), true).is_ok());
    }
}
