//! Scenarios compiled into the binary, derived from the SERAp Estudante and
//! Novo SGP load scripts.

use crate::config::Scenario;
use anyhow::{Context, Result};

const BUILTINS: &[(&str, &str)] = &[
    (
        "serap-home-front",
        include_str!("../../scenarios/serap-home-front.scenario.yaml"),
    ),
    (
        "serap-login",
        include_str!("../../scenarios/serap-login.scenario.yaml"),
    ),
    (
        "serap-obter-provas",
        include_str!("../../scenarios/serap-obter-provas.scenario.yaml"),
    ),
    (
        "serap-iniciar-prova",
        include_str!("../../scenarios/serap-iniciar-prova.scenario.yaml"),
    ),
    (
        "serap-obter-questao",
        include_str!("../../scenarios/serap-obter-questao.scenario.yaml"),
    ),
    (
        "serap-proximo",
        include_str!("../../scenarios/serap-proximo.scenario.yaml"),
    ),
    (
        "serap-prova-completa",
        include_str!("../../scenarios/serap-prova-completa.scenario.yaml"),
    ),
    (
        "serap-load",
        include_str!("../../scenarios/serap-load.scenario.yaml"),
    ),
    (
        "serap-ramp",
        include_str!("../../scenarios/serap-ramp.scenario.yaml"),
    ),
    (
        "sgp-load",
        include_str!("../../scenarios/sgp-load.scenario.yaml"),
    ),
    (
        "sgp-stress",
        include_str!("../../scenarios/sgp-stress.scenario.yaml"),
    ),
];

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Raw YAML of a built-in scenario, for `sme-load show`.
pub fn builtin_source(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, source)| *source)
}

pub fn builtin(name: &str) -> Result<Option<Scenario>> {
    let Some(source) = builtin_source(name) else {
        return Ok(None);
    };

    let scenario: Scenario = serde_yaml::from_str(source)
        .with_context(|| format!("Built-in scenario '{}' is not valid YAML", name))?;
    Ok(Some(scenario))
}

pub fn all_builtins() -> Result<Vec<Scenario>> {
    builtin_names()
        .filter_map(|name| builtin(name).transpose())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UsersRequirement;

    #[test]
    fn test_every_builtin_parses_and_validates() {
        for name in builtin_names() {
            let scenario = builtin(name).unwrap().unwrap();
            assert_eq!(scenario.name, name, "file name and `name:` must agree");
            scenario
                .validate()
                .unwrap_or_else(|e| panic!("{} failed validation: {}", name, e));
        }
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin("nope").unwrap().is_none());
        assert!(builtin_source("nope").is_none());
    }

    #[test]
    fn test_serap_scenarios_need_users() {
        for scenario in all_builtins().unwrap() {
            let logs_in_students = scenario
                .steps
                .iter()
                .any(|s| s.request.placeholders().iter().any(|v| v == "login"));
            if logs_in_students {
                assert_eq!(scenario.users, UsersRequirement::Required, "{}", scenario.name);
            }
        }
    }

    #[test]
    fn test_prova_completa_flow() {
        let scenario = builtin("serap-prova-completa").unwrap().unwrap();
        let names: Vec<&str> = scenario.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Página de login",
                "Login",
                "Iniciar prova",
                "Enviar resposta",
                "Obter próxima questão"
            ]
        );
        assert_eq!(scenario.required_vars, vec!["prova_id".to_string()]);
        assert_eq!(scenario.steps[2].accepted_statuses(), &[200, 411]);
        assert!(scenario.steps[1].abort_on_failure);
    }

    #[test]
    fn test_sgp_stress_uses_alternate_token_for_writes() {
        let scenario = builtin("sgp-stress").unwrap().unwrap();
        let diario = scenario
            .steps
            .iter()
            .find(|s| s.name == "Diário de Bordo")
            .unwrap();
        assert_eq!(
            diario.request.headers.get("Authorization").map(String::as_str),
            Some("Bearer {{token_alt}}")
        );
        assert!(!scenario.steps[0].track);
    }
}
