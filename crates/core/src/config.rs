use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.ciscospark.com/v1";
pub const DEFAULT_LOGOUT_URL: &str = "https://idbroker.webex.com/idb/oauth2/v1/logout";
pub const DEFAULT_OAUTH_STATE: &str = "autorespond3r";
pub const OAUTH_SCOPES: &str =
    "spark:kms spark:people_read spark:rooms_read spark:messages_write spark:messages_read";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub webex: WebexConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebexConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub api_base_url: String,
    pub public_url: String,
    pub redirect_uri: Option<String>,
    pub webhook_uri: Option<String>,
    pub state: String,
    pub timeout_secs: u64,
    pub logout_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub session_ttl_secs: u64,
}

/// Raw recurrence inputs; interpretation (and clamping) lives in `schedule`.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub suppression_sweep_minutes: String,
    pub token_refresh_days: String,
    pub token_refresh_hour: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub webex_client_id: Option<String>,
    pub webex_client_secret: Option<String>,
    pub webex_public_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://autoresponder.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            webex: WebexConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                public_url: String::new(),
                redirect_uri: None,
                webhook_uri: None,
                state: DEFAULT_OAUTH_STATE.to_string(),
                timeout_secs: 20,
                logout_url: DEFAULT_LOGOUT_URL.to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
                session_ttl_secs: 120,
            },
            scheduler: SchedulerConfig {
                suppression_sweep_minutes: "30".to_string(),
                token_refresh_days: "Sun,Tue,Thu,Sat".to_string(),
                token_refresh_hour: 12,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WebexConfig {
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/oauth", self.public_url.trim_end_matches('/')))
    }

    pub fn webhook_uri(&self) -> String {
        self.webhook_uri
            .clone()
            .unwrap_or_else(|| format!("{}/webhook", self.public_url.trim_end_matches('/')))
    }

    /// Login link handed to unauthenticated visitors.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?&client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.api_base_url.trim_end_matches('/'),
            self.client_id,
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(OAUTH_SCOPES),
            self.state,
        )
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("autoresponder.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(webex) = patch.webex {
            if let Some(client_id) = webex.client_id {
                self.webex.client_id = client_id;
            }
            if let Some(client_secret) = webex.client_secret {
                self.webex.client_secret = client_secret.into();
            }
            if let Some(api_base_url) = webex.api_base_url {
                self.webex.api_base_url = api_base_url;
            }
            if let Some(public_url) = webex.public_url {
                self.webex.public_url = public_url;
            }
            if let Some(redirect_uri) = webex.redirect_uri {
                self.webex.redirect_uri = Some(redirect_uri);
            }
            if let Some(webhook_uri) = webex.webhook_uri {
                self.webex.webhook_uri = Some(webhook_uri);
            }
            if let Some(state) = webex.state {
                self.webex.state = state;
            }
            if let Some(timeout_secs) = webex.timeout_secs {
                self.webex.timeout_secs = timeout_secs;
            }
            if let Some(logout_url) = webex.logout_url {
                self.webex.logout_url = logout_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_ttl_secs) = server.session_ttl_secs {
                self.server.session_ttl_secs = session_ttl_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(minutes) = scheduler.suppression_sweep_minutes {
                self.scheduler.suppression_sweep_minutes = minutes.into_string();
            }
            if let Some(days) = scheduler.token_refresh_days {
                self.scheduler.token_refresh_days = days;
            }
            if let Some(hour) = scheduler.token_refresh_hour {
                self.scheduler.token_refresh_hour = hour;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AUTORESPONDER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AUTORESPONDER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AUTORESPONDER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AUTORESPONDER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AUTORESPONDER_WEBEX_CLIENT_ID") {
            self.webex.client_id = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_CLIENT_SECRET") {
            self.webex.client_secret = value.into();
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_API_BASE_URL") {
            self.webex.api_base_url = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_PUBLIC_URL") {
            self.webex.public_url = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_REDIRECT_URI") {
            self.webex.redirect_uri = Some(value);
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_WEBHOOK_URI") {
            self.webex.webhook_uri = Some(value);
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_STATE") {
            self.webex.state = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_TIMEOUT_SECS") {
            self.webex.timeout_secs = parse_u64("AUTORESPONDER_WEBEX_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AUTORESPONDER_WEBEX_LOGOUT_URL") {
            self.webex.logout_url = value;
        }

        if let Some(value) = read_env("AUTORESPONDER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("AUTORESPONDER_SERVER_PORT").map(|v| ("AUTORESPONDER_SERVER_PORT", v));
        let port = port.or_else(|| read_env("PORT").map(|v| ("PORT", v)));
        if let Some((key, value)) = port {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("AUTORESPONDER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AUTORESPONDER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("AUTORESPONDER_SERVER_SESSION_TTL_SECS") {
            self.server.session_ttl_secs =
                parse_u64("AUTORESPONDER_SERVER_SESSION_TTL_SECS", &value)?;
        }

        // Left unparsed: an unusable interval falls back at schedule time.
        let sweep = read_env("AUTORESPONDER_SCHEDULER_SUPPRESSION_SWEEP_MINUTES")
            .or_else(|| read_env("SUPPRESSION_TIME"));
        if let Some(value) = sweep {
            self.scheduler.suppression_sweep_minutes = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_SCHEDULER_TOKEN_REFRESH_DAYS") {
            self.scheduler.token_refresh_days = value;
        }
        if let Some(value) = read_env("AUTORESPONDER_SCHEDULER_TOKEN_REFRESH_HOUR") {
            self.scheduler.token_refresh_hour =
                parse_u32("AUTORESPONDER_SCHEDULER_TOKEN_REFRESH_HOUR", &value)?;
        }

        let log_level = read_env("AUTORESPONDER_LOGGING_LEVEL")
            .or_else(|| read_env("AUTORESPONDER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("AUTORESPONDER_LOGGING_FORMAT")
            .or_else(|| read_env("AUTORESPONDER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(client_id) = overrides.webex_client_id {
            self.webex.client_id = client_id;
        }
        if let Some(client_secret) = overrides.webex_client_secret {
            self.webex.client_secret = client_secret.into();
        }
        if let Some(public_url) = overrides.webex_public_url {
            self.webex.public_url = public_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_webex(&self.webex)?;
        validate_server(&self.server)?;
        validate_scheduler(&self.scheduler)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("autoresponder.toml"), PathBuf::from("config/autoresponder.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_webex(webex: &WebexConfig) -> Result<(), ConfigError> {
    if webex.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "webex.client_id is required. Create an integration at https://developer.webex.com/my-apps".to_string(),
        ));
    }
    if webex.client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "webex.client_secret is required. It is shown once when the integration is created"
                .to_string(),
        ));
    }

    let public_url = webex.public_url.trim();
    if public_url.is_empty() {
        return Err(ConfigError::Validation(
            "webex.public_url is required so the platform can reach /oauth and /webhook"
                .to_string(),
        ));
    }
    for (key, value) in [
        ("webex.public_url", Some(public_url)),
        ("webex.api_base_url", Some(webex.api_base_url.as_str())),
        ("webex.redirect_uri", webex.redirect_uri.as_deref()),
        ("webex.webhook_uri", webex.webhook_uri.as_deref()),
    ] {
        if let Some(url) = value {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if webex.state.trim().is_empty() {
        return Err(ConfigError::Validation("webex.state must not be empty".to_string()));
    }

    if webex.timeout_secs == 0 || webex.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "webex.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "server.session_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.token_refresh_hour > 23 {
        return Err(ConfigError::Validation(
            "scheduler.token_refresh_hour must be in range 0..=23".to_string(),
        ));
    }

    crate::schedule::token_refresh_recurrence(
        &scheduler.token_refresh_days,
        scheduler.token_refresh_hour,
    )
    .map_err(|error| ConfigError::Validation(format!("scheduler.token_refresh_days: {error}")))?;

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    webex: Option<WebexPatch>,
    server: Option<ServerPatch>,
    scheduler: Option<SchedulerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebexPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    api_base_url: Option<String>,
    public_url: Option<String>,
    redirect_uri: Option<String>,
    webhook_uri: Option<String>,
    state: Option<String>,
    timeout_secs: Option<u64>,
    logout_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    suppression_sweep_minutes: Option<RawValue>,
    token_refresh_days: Option<String>,
    token_refresh_hour: Option<u32>,
}

/// Accepts `30` as well as `"30"` in the file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Integer(i64),
    Text(String),
}

impl RawValue {
    fn into_string(self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
