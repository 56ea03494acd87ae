use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use saralytics_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One rendered config field: dotted key path, display value and the
/// environment variables that can override it, highest precedence first.
struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let manager_key = match config.manager.api_key.as_ref() {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        Field {
            key_path: "database.url",
            value: config.database.url.clone(),
            env_keys: &["SARALYTICS_DATABASE_URL"],
        },
        Field {
            key_path: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["SARALYTICS_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key_path: "manager.api_key",
            value: manager_key,
            env_keys: &["SARALYTICS_MANAGER_API_KEY", "GEMINI_API_KEY"],
        },
        Field {
            key_path: "manager.base_url",
            value: config.manager.base_url.clone(),
            env_keys: &["SARALYTICS_MANAGER_BASE_URL"],
        },
        Field {
            key_path: "manager.model",
            value: config.manager.model.clone(),
            env_keys: &["SARALYTICS_MANAGER_MODEL"],
        },
        Field {
            key_path: "manager.timeout_secs",
            value: config.manager.timeout_secs.to_string(),
            env_keys: &["SARALYTICS_MANAGER_TIMEOUT_SECS"],
        },
        Field {
            key_path: "specialist.base_url",
            value: config.specialist.base_url.clone(),
            env_keys: &["SARALYTICS_SPECIALIST_BASE_URL"],
        },
        Field {
            key_path: "specialist.model",
            value: config.specialist.model.clone(),
            env_keys: &["SARALYTICS_SPECIALIST_MODEL"],
        },
        Field {
            key_path: "specialist.timeout_secs",
            value: config.specialist.timeout_secs.to_string(),
            env_keys: &["SARALYTICS_SPECIALIST_TIMEOUT_SECS"],
        },
        Field {
            key_path: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["SARALYTICS_SERVER_BIND_ADDRESS"],
        },
        Field {
            key_path: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["SARALYTICS_SERVER_PORT"],
        },
        Field {
            key_path: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["SARALYTICS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["SARALYTICS_LOGGING_LEVEL", "SARALYTICS_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["SARALYTICS_LOGGING_FORMAT", "SARALYTICS_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("saralytics.toml"), PathBuf::from("config/saralytics.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters of long keys so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        format!("{prefix}***")
    } else {
        "<redacted>".to_string()
    }
}
