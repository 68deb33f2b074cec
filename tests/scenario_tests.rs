use indexmap::IndexMap;
use serde_json::json;
use sme_load::commands::run::{apply_load_overrides, check_required_vars};
use sme_load::commands::validate::handle_validate;
use sme_load::config::ScenarioError;
use sme_load::performance::LoadDriver;
use sme_load::report::{ReportGenerator, RunReport};
use sme_load::runner::parser::{load_scenarios, resolve_scenario};
use sme_load::runner::{load_users, VariableContext};
use sme_load::scenarios;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn overrides(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_sgp_load_end_to_end_against_mock() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/autenticacao"))
        .and(body_json(json!({"login": "professor", "senha": "segredo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "sgp-token"})))
        .expect(1..)
        .mount(&server)
        .await;
    Mock::given(header("Authorization", "Bearer sgp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(10..)
        .mount(&server)
        .await;

    let mut scenario = resolve_scenario("sgp-load").await.unwrap();
    for step in &mut scenario.steps {
        step.sleep = None;
    }
    apply_load_overrides(&mut scenario.options, Some(1), Some("300ms"), &[]).unwrap();
    scenario.validate().unwrap();

    let base_url = format!("{}/api/v1", server.uri());
    let vars = VariableContext::from_scenario_vars(
        &scenario.vars,
        &overrides(&[
            ("BASE_URL", base_url.as_str()),
            ("SGP_USER", "professor"),
            ("SGP_PASS", "segredo"),
        ]),
    );
    check_required_vars(&scenario, &vars).unwrap();

    let driver = LoadDriver::new(&scenario.options, Duration::from_secs(5), false).unwrap();
    let scenario = Arc::new(scenario);
    let results = driver
        .run(Arc::clone(&scenario), Arc::new(Vec::new()), vars)
        .await
        .unwrap();

    assert!(results.iterations >= 1);
    assert_eq!(results.http_reqs, results.iterations * 11);
    assert_eq!(results.checks.len(), 11);
    assert_eq!(results.checks_rate.falses(), 0);
    assert_eq!(results.group.prefix, "sgp");
    assert_eq!(results.group.errors, 0);
    assert_eq!(results.group.success_rate.rate, 1.0);

    let dir = TempDir::new().unwrap();
    let report = RunReport::new(&scenario, driver.schedule(), results, Vec::new());
    let html = dir.path().join("report").join("load_teste.html");
    ReportGenerator::write_html(&report, &html).unwrap();
    let content = fs::read_to_string(&html).unwrap();
    assert!(content.contains("sgp_duration"));
    assert!(content.contains("Diário de Bordo"));
}

#[tokio::test]
async fn test_required_var_missing_fails_before_run() {
    let scenario = resolve_scenario("serap-iniciar-prova").await.unwrap();
    let vars = VariableContext::from_scenario_vars(
        &scenario.vars,
        &overrides(&[("PROVA_ID", "")]),
    );
    let err = check_required_vars(&scenario, &vars).unwrap_err();
    assert!(err.to_string().contains("prova_id"));
}

#[tokio::test]
async fn test_validate_directory_reports_invalid_scenarios() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ok.scenario.yaml"),
        scenarios::builtin_source("serap-home-front").unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("broken.scenario.yaml"),
        r#"
name: broken
options: { vus: 1, duration: 1s }
steps:
  - name: Provas
    request: { method: GET, url: "https://example.com/provas/{{prova_id}}" }
"#,
    )
    .unwrap();

    let loaded = load_scenarios(dir.path()).await.unwrap();
    assert_eq!(loaded.len(), 2);
    let broken = &loaded[0].1;
    assert_eq!(
        broken.validate(),
        Err(ScenarioError::UnknownVariable {
            step: "Provas".to_string(),
            var: "prova_id".to_string()
        })
    );

    let err = handle_validate(Some(dir.path().to_path_buf()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 of 2"));
}

#[tokio::test]
async fn test_validate_all_builtins() {
    handle_validate(None).await.unwrap();
}

#[tokio::test]
async fn test_users_file_feeds_serap_login() {
    let dir = TempDir::new().unwrap();
    let users_path = dir.path().join("usuarios.txt");
    fs::write(&users_path, "1234567,senha1\n\n7654321 , senha2\n").unwrap();
    let users = load_users(&users_path).await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].login, "7654321");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/autenticacao"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
        .expect(2..)
        .mount(&server)
        .await;

    let mut scenario = resolve_scenario("serap-login").await.unwrap();
    for step in &mut scenario.steps {
        step.sleep = Some(sme_load::config::HumanDuration(Duration::from_millis(50)));
    }
    apply_load_overrides(&mut scenario.options, Some(2), Some("300ms"), &[]).unwrap();
    let vars = VariableContext::from_scenario_vars(
        &scenario.vars,
        &overrides(&[("SERAP_BASE_URL", server.uri().as_str())]),
    );

    let driver = LoadDriver::new(&scenario.options, Duration::from_secs(5), false).unwrap();
    let results = driver
        .run(Arc::new(scenario), Arc::new(users), vars)
        .await
        .unwrap();

    assert_eq!(results.vus_max, 2);
    assert_eq!(results.checks_rate.falses(), 0);
}
