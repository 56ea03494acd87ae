use std::env;
use std::sync::{Mutex, OnceLock};

use saralytics_agent::manager::MANAGER_NOT_CONFIGURED_MESSAGE;
use saralytics_cli::commands::{ask, config, doctor, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn seed_loads_demo_dataset_into_fresh_store() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["rows_inserted"], 144);
        assert_eq!(payload["details"]["distinct_items"], 6);
    });
}

#[test]
fn seed_is_repeatable_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        let first = parse_payload(&seed::run().output);
        let second = parse_payload(&seed::run().output);

        assert_eq!(first["status"], "ok");
        assert_eq!(second["status"], "ok");
        assert_eq!(first["details"], second["details"]);
    });
}

#[test]
fn seed_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("SARALYTICS_DATABASE_URL", "postgres://localhost/sales")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("database.url must be a sqlite URL")));
    });
}

#[test]
fn doctor_fails_when_data_file_is_missing() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report: Value = serde_json::from_str(&result.output).expect("doctor json");
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "config_validation"), "pass");
        assert_eq!(check_status(&report, "data_store"), "fail");
        assert_eq!(check_status(&report, "manager_credentials"), "warn");
    });
}

#[test]
fn doctor_passes_with_warning_after_seed_without_manager_key() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.starts_with("doctor: ready with warnings"));
        assert!(result.output.contains("- [ok] data_store:"));
        assert!(result.output.contains("- [warn] manager_credentials:"));
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("SARALYTICS_SERVER_PORT", "not-a-port")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report: Value = serde_json::from_str(&result.output).expect("doctor json");
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "data_store"), "skipped");
        assert_eq!(check_status(&report, "specialist_endpoint"), "skipped");
    });
}

#[test]
fn config_attributes_sources_and_redacts_manager_key() {
    with_env(
        &[("GEMINI_API_KEY", "AIzaSyTopSecretValue"), ("SARALYTICS_MANAGER_MODEL", "gemini-test")],
        || {
            let output = config::run();
            assert!(output.contains("- manager.api_key = AIza*** (source: env (GEMINI_API_KEY))"));
            assert!(!output.contains("TopSecret"));
            assert!(output
                .contains("- manager.model = gemini-test (source: env (SARALYTICS_MANAGER_MODEL))"));
            assert!(output.contains("- database.url = sqlite://MRF.db (source: default)"));
        },
    );
}

#[test]
fn ask_without_manager_key_reports_not_configured() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        let mut out = Vec::new();
        let result = ask::run("What is the total profit for MRF ZVTV?", None, &mut out);
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "routing");
        assert_eq!(payload["message"], MANAGER_NOT_CONFIGURED_MESSAGE);
        assert_eq!(String::from_utf8(out).expect("utf8"), "\n");
    });
}

#[test]
fn ask_rejects_unknown_agent() {
    with_env(&[], || {
        let mut out = Vec::new();
        let result = ask::run("How are sales?", Some("marketing"), &mut out);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_request");
        assert!(out.is_empty());
    });
}

#[test]
fn ask_rejects_blank_question_before_contacting_models() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("SARALYTICS_DATABASE_URL", &url)], || {
        let mut out = Vec::new();
        let result = ask::run("   ", Some("finance"), &mut out);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_request");
    });
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("MRF.db").display())
}

fn check_status<'a>(report: &'a Value, name: &str) -> &'a str {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
}

fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test: impl FnOnce()) {
    const KEYS: [&str; 17] = [
        "SARALYTICS_DATABASE_URL",
        "SARALYTICS_DATABASE_TIMEOUT_SECS",
        "SARALYTICS_MANAGER_API_KEY",
        "GEMINI_API_KEY",
        "SARALYTICS_MANAGER_BASE_URL",
        "SARALYTICS_MANAGER_MODEL",
        "SARALYTICS_MANAGER_TIMEOUT_SECS",
        "SARALYTICS_SPECIALIST_BASE_URL",
        "SARALYTICS_SPECIALIST_MODEL",
        "SARALYTICS_SPECIALIST_TIMEOUT_SECS",
        "SARALYTICS_SERVER_BIND_ADDRESS",
        "SARALYTICS_SERVER_PORT",
        "SARALYTICS_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SARALYTICS_LOGGING_LEVEL",
        "SARALYTICS_LOGGING_FORMAT",
        "SARALYTICS_LOG_LEVEL",
        "SARALYTICS_LOG_FORMAT",
    ];

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let saved: Vec<(&str, Option<String>)> =
        KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test();

    for (key, value) in saved {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
