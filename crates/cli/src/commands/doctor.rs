use saralytics_core::config::{AppConfig, LoadOptions};
use saralytics_core::data::TabularDataSource;
use saralytics_db::SqliteDataSource;
use serde::Serialize;

use crate::commands::{command_runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_data_store(&config));
            checks.push(check_manager_credentials(&config));
            checks.push(check_specialist_endpoint(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["data_store", "manager_credentials", "specialist_endpoint"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_data_store(config: &AppConfig) -> DoctorCheck {
    let source = match SqliteDataSource::new(&config.database.url, config.database.timeout_secs) {
        Ok(source) => source,
        Err(error) => {
            return DoctorCheck::new(
                "data_store",
                CheckStatus::Fail,
                format!("invalid database url: {error}"),
            );
        }
    };

    let runtime = match command_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(_) => {
            return DoctorCheck::new(
                "data_store",
                CheckStatus::Fail,
                "failed to initialize async runtime",
            );
        }
    };

    match runtime.block_on(source.ping()) {
        Ok(()) => DoctorCheck::new(
            "data_store",
            CheckStatus::Pass,
            format!("read-only query succeeded against `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::new(
            "data_store",
            CheckStatus::Fail,
            format!("{error} (run `saralytics seed` to create the demo dataset)"),
        ),
    }
}

fn check_manager_credentials(config: &AppConfig) -> DoctorCheck {
    if config.manager.is_enabled() {
        DoctorCheck::new(
            "manager_credentials",
            CheckStatus::Pass,
            format!("api key configured for `{}`", config.manager.model),
        )
    } else {
        DoctorCheck::new(
            "manager_credentials",
            CheckStatus::Warn,
            "no api key; /api/agent_chat/ will answer with the not-configured error",
        )
    }
}

fn check_specialist_endpoint(config: &AppConfig) -> DoctorCheck {
    DoctorCheck::new(
        "specialist_endpoint",
        CheckStatus::Pass,
        format!("`{}` via {}", config.specialist.model, config.specialist.base_url),
    )
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
