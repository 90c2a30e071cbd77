use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use autoresponder_core::config::AppConfig;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("config", failure),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, value, env_keys)| ConfigEntry {
            key,
            value,
            source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect();

    CommandResult::success_with_report(
        "config",
        "effective config (source precedence: env > file > default)",
        serde_json::to_value(entries).ok(),
    )
}

type EnvKeys = &'static [&'static str];

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, EnvKeys)> {
    let webex = &config.webex;
    vec![
        entry("database.url", config.database.url.clone(), &["AUTORESPONDER_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["AUTORESPONDER_DATABASE_MAX_CONNECTIONS"],
        ),
        entry("webex.client_id", webex.client_id.clone(), &["AUTORESPONDER_WEBEX_CLIENT_ID"]),
        entry(
            "webex.client_secret",
            redact_secret(webex.client_secret.expose_secret()),
            &["AUTORESPONDER_WEBEX_CLIENT_SECRET"],
        ),
        entry("webex.api_base_url", webex.api_base_url.clone(), &["AUTORESPONDER_WEBEX_API_BASE_URL"]),
        entry("webex.public_url", webex.public_url.clone(), &["AUTORESPONDER_WEBEX_PUBLIC_URL"]),
        entry("webex.redirect_uri", webex.redirect_uri(), &["AUTORESPONDER_WEBEX_REDIRECT_URI"]),
        entry("webex.webhook_uri", webex.webhook_uri(), &["AUTORESPONDER_WEBEX_WEBHOOK_URI"]),
        entry("webex.state", webex.state.clone(), &["AUTORESPONDER_WEBEX_STATE"]),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["AUTORESPONDER_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port.to_string(), &["AUTORESPONDER_SERVER_PORT", "PORT"]),
        entry(
            "server.session_ttl_secs",
            config.server.session_ttl_secs.to_string(),
            &["AUTORESPONDER_SERVER_SESSION_TTL_SECS"],
        ),
        entry(
            "scheduler.suppression_sweep_minutes",
            config.scheduler.suppression_sweep_minutes.clone(),
            &["AUTORESPONDER_SCHEDULER_SUPPRESSION_SWEEP_MINUTES", "SUPPRESSION_TIME"],
        ),
        entry(
            "scheduler.token_refresh_days",
            config.scheduler.token_refresh_days.clone(),
            &["AUTORESPONDER_SCHEDULER_TOKEN_REFRESH_DAYS"],
        ),
        entry(
            "scheduler.token_refresh_hour",
            config.scheduler.token_refresh_hour.to_string(),
            &["AUTORESPONDER_SCHEDULER_TOKEN_REFRESH_HOUR"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["AUTORESPONDER_LOGGING_LEVEL", "AUTORESPONDER_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["AUTORESPONDER_LOGGING_FORMAT", "AUTORESPONDER_LOG_FORMAT"],
        ),
    ]
}

fn entry(key: &'static str, value: String, env_keys: EnvKeys) -> (&'static str, String, EnvKeys) {
    (key, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("autoresponder.toml"), PathBuf::from("config/autoresponder.toml")]
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

/// Keeps the last four characters so operators can tell secrets apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
