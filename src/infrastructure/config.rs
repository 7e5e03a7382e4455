use crate::domain::timer::DEFAULT_TIMER_SECONDS;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const REMOTE_JSON: &str = "remote.json";
const DEFAULT_COLLECTION: &str = "containers";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

pub const ENV_REMOTE_URL: &str = "FOCUS_PLANNER_REMOTE_URL";
pub const ENV_REMOTE_API_KEY: &str = "FOCUS_PLANNER_REMOTE_API_KEY";
pub const ENV_TIMEZONE: &str = "FOCUS_PLANNER_TIMEZONE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_collection")]
    pub local_store_key: String,
    #[serde(default = "default_timer_seconds")]
    pub timer_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub schema: u8,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Remote settings after environment overrides. `None` means stay local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub app: AppConfig,
    pub remote: Option<RemoteSettings>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_timer_seconds() -> u32 {
    DEFAULT_TIMER_SECONDS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Focus Planner",
                "timezone": null,
                "collection": DEFAULT_COLLECTION,
                "localStoreKey": DEFAULT_COLLECTION,
                "timerSeconds": DEFAULT_TIMER_SECONDS
            }),
        ),
        (
            REMOTE_JSON,
            serde_json::json!({
                "schema": 1,
                "enabled": false,
                "baseUrl": null,
                "pollIntervalMs": DEFAULT_POLL_INTERVAL_MS,
                "requestTimeoutMs": DEFAULT_REQUEST_TIMEOUT_MS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_typed<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InfraError> {
    let value = read_config(path)?;
    serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid structure in {}: {error}", path.display()))
    })
}

pub fn load_configs_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<PlannerConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut app: AppConfig = read_typed(&config_dir.join(APP_JSON))?;
    let remote: RemoteConfig = read_typed(&config_dir.join(REMOTE_JSON))?;

    if app.collection.trim().is_empty() {
        return Err(InfraError::InvalidConfig(
            "collection must not be empty".to_string(),
        ));
    }
    if app.local_store_key.trim().is_empty() {
        return Err(InfraError::InvalidConfig(
            "localStoreKey must not be empty".to_string(),
        ));
    }
    if app.timer_seconds == 0 {
        return Err(InfraError::InvalidConfig(
            "timerSeconds must be greater than zero".to_string(),
        ));
    }
    if let Some(timezone) = non_empty(lookup(ENV_TIMEZONE)) {
        app.timezone = Some(timezone);
    }

    Ok(PlannerConfig {
        remote: resolve_remote(&remote, &lookup),
        app,
    })
}

fn resolve_remote<F>(remote: &RemoteConfig, lookup: &F) -> Option<RemoteSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env_url = non_empty(lookup(ENV_REMOTE_URL));
    let base_url = match env_url {
        Some(url) => url,
        None if remote.enabled => non_empty(remote.base_url.clone())?,
        None => return None,
    };

    Some(RemoteSettings {
        base_url,
        api_key: non_empty(lookup(ENV_REMOTE_API_KEY)),
        poll_interval: Duration::from_millis(remote.poll_interval_ms.max(10)),
        request_timeout: Duration::from_millis(remote.request_timeout_ms.max(1)),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_remote(config_dir: &Path, value: serde_json::Value) {
        fs::write(
            config_dir.join(REMOTE_JSON),
            serde_json::to_string_pretty(&value).expect("serialize"),
        )
        .expect("write remote config");
    }

    #[test]
    fn defaults_are_written_and_loaded() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let config = load_configs_with_lookup(dir.path(), no_env).expect("load");
        assert_eq!(config.app.app_name, "Focus Planner");
        assert_eq!(config.app.collection, "containers");
        assert_eq!(config.app.local_store_key, "containers");
        assert_eq!(config.app.timer_seconds, 1500);
        assert_eq!(config.app.timezone, None);
        assert_eq!(config.remote, None);
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        write_remote(
            dir.path(),
            serde_json::json!({ "schema": 1, "enabled": true, "baseUrl": "https://docs.example.com" }),
        );
        ensure_default_configs(dir.path()).expect("rewrite defaults");

        let config = load_configs_with_lookup(dir.path(), no_env).expect("load");
        let remote = config.remote.expect("remote enabled");
        assert_eq!(remote.base_url, "https://docs.example.com");
        assert_eq!(remote.poll_interval, Duration::from_millis(1_000));
        assert_eq!(remote.api_key, None);
    }

    #[test]
    fn environment_overrides_remote_url_key_and_timezone() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let config = load_configs_with_lookup(dir.path(), |key| match key {
            ENV_REMOTE_URL => Some("http://127.0.0.1:8088".to_string()),
            ENV_REMOTE_API_KEY => Some(" key-1 ".to_string()),
            ENV_TIMEZONE => Some("Asia/Tokyo".to_string()),
            _ => None,
        })
        .expect("load");

        let remote = config.remote.expect("remote from env");
        assert_eq!(remote.base_url, "http://127.0.0.1:8088");
        assert_eq!(remote.api_key.as_deref(), Some("key-1"));
        assert_eq!(config.app.timezone.as_deref(), Some("Asia/Tokyo"));
    }

    #[test]
    fn enabled_remote_without_url_stays_local() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        write_remote(dir.path(), serde_json::json!({ "schema": 1, "enabled": true }));

        let config = load_configs_with_lookup(dir.path(), no_env).expect("load");
        assert_eq!(config.remote, None);
    }

    #[test]
    fn zero_timer_length_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        fs::write(
            dir.path().join(APP_JSON),
            serde_json::json!({ "schema": 1, "appName": "Focus Planner", "timerSeconds": 0 }).to_string(),
        )
        .expect("write app config");

        match load_configs_with_lookup(dir.path(), no_env) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("timerSeconds")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        write_remote(dir.path(), serde_json::json!({ "schema": 2 }));

        match load_configs_with_lookup(dir.path(), no_env) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
