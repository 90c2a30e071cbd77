use std::env;
use std::sync::{Mutex, OnceLock};

use autoresponder_cli::commands::{config, lifecycle, migrate};
use autoresponder_core::domain::{SuppressionKey, SuppressionWindow};
use autoresponder_core::store::SuppressionRepository;
use autoresponder_db::{connect, migrations, SqlSuppressionRepository};
use serde_json::Value;

const VALID_ENV: [(&str, &str); 4] = [
    ("AUTORESPONDER_WEBEX_CLIENT_ID", "client-123"),
    ("AUTORESPONDER_WEBEX_CLIENT_SECRET", "integration-secret-9f3a"),
    ("AUTORESPONDER_WEBEX_PUBLIC_URL", "https://bot.example.com"),
    ("AUTORESPONDER_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_credentials() {
    with_env(&[("AUTORESPONDER_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_client_secret_and_attributes_sources() {
    with_env(&VALID_ENV, || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(!result.output.contains("integration-secret-9f3a"));

        let payload = parse_payload(&result.output);
        let entries = payload["report"].as_array().expect("config entries");
        let entry = |key: &str| {
            entries.iter().find(|item| item["key"] == key).cloned().expect("entry present")
        };

        assert_eq!(entry("webex.client_secret")["value"], "***9f3a");
        assert_eq!(entry("webex.client_id")["source"], "env (AUTORESPONDER_WEBEX_CLIENT_ID)");
        assert_eq!(entry("webex.webhook_uri")["value"], "https://bot.example.com/webhook");
        assert_eq!(entry("webex.state")["source"], "default");
    });
}

#[test]
fn refresh_on_empty_store_reports_nothing_refreshed() {
    with_env(&VALID_ENV, || {
        let result = lifecycle::refresh();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "refresh");
        assert_eq!(payload["report"]["refreshed"], Value::Array(Vec::new()));
    });
}

#[test]
fn sweep_removes_expired_windows_from_file_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!("sqlite://{}", dir.path().join("autoresponder.db").display());
    seed_windows(&database_url);

    let mut vars = VALID_ENV.to_vec();
    vars.retain(|(key, _)| *key != "AUTORESPONDER_DATABASE_URL");
    vars.push(("AUTORESPONDER_DATABASE_URL", database_url.as_str()));

    with_env(&vars, || {
        let result = lifecycle::sweep();
        assert_eq!(result.exit_code, 0, "sweep output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["report"]["examined"], 2);
        assert_eq!(payload["report"]["removed"], serde_json::json!(["OWNER-EXPIRED"]));
    });
}

#[test]
fn sweep_reports_store_connect_failure() {
    let mut vars = VALID_ENV.to_vec();
    vars.retain(|(key, _)| *key != "AUTORESPONDER_DATABASE_URL");
    vars.push(("AUTORESPONDER_DATABASE_URL", "sqlite:///nonexistent-autoresponder-dir/nested/app.db"));

    with_env(&vars, || {
        let result = lifecycle::sweep();
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

fn seed_windows(database_url: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect(database_url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repository = SqlSuppressionRepository::new(pool.clone());
        let now = epoch_now();
        repository
            .save(SuppressionWindow {
                key: SuppressionKey("OWNER-EXPIRED".to_owned()),
                suppress_until: now - 60,
            })
            .await
            .expect("seed expired");
        repository
            .save(SuppressionWindow {
                key: SuppressionKey("OWNER-ACTIVE".to_owned()),
                suppress_until: now + 3600,
            })
            .await
            .expect("seed active");
        pool.close().await;
    });
}

fn epoch_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .expect("clock after epoch")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "AUTORESPONDER_DATABASE_URL",
        "AUTORESPONDER_DATABASE_MAX_CONNECTIONS",
        "AUTORESPONDER_DATABASE_TIMEOUT_SECS",
        "AUTORESPONDER_WEBEX_CLIENT_ID",
        "AUTORESPONDER_WEBEX_CLIENT_SECRET",
        "AUTORESPONDER_WEBEX_API_BASE_URL",
        "AUTORESPONDER_WEBEX_PUBLIC_URL",
        "AUTORESPONDER_WEBEX_REDIRECT_URI",
        "AUTORESPONDER_WEBEX_WEBHOOK_URI",
        "AUTORESPONDER_WEBEX_STATE",
        "AUTORESPONDER_SERVER_PORT",
        "AUTORESPONDER_SCHEDULER_SUPPRESSION_SWEEP_MINUTES",
        "AUTORESPONDER_LOGGING_LEVEL",
        "AUTORESPONDER_LOGGING_FORMAT",
        "AUTORESPONDER_LOG_LEVEL",
        "AUTORESPONDER_LOG_FORMAT",
        "SUPPRESSION_TIME",
        "PORT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
