//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The queue knobs accept the
//! same environment names as the TOML fields' deployment counterparts
//! (`QUEUE_POLL_INTERVAL_SECONDS`, `QUEUE_MAX_RETRIES`, ...), so the service
//! can run entirely from the environment. With no config file present the
//! pool is seeded with a built-in demo credential set.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use credential_pool::{Credential, CredentialStatus, Tier};
use retry_queue::QueueConfig;

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default = "default_credentials")]
    pub credentials: Vec<CredentialSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            queue: QueueSettings::default(),
            credentials: default_credentials(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Provider assumed when a request doesn't name one
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
            default_provider: default_provider(),
            default_model: default_model(),
        }
    }
}

/// Retry queue settings, mirrored into `retry_queue::QueueConfig`.
#[derive(Debug, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_overflow_threshold")]
    pub overflow_threshold: usize,
    #[serde(default = "default_dead_alert_threshold")]
    pub dead_alert_threshold: usize,
    #[serde(default = "default_dead_alert_window")]
    pub dead_alert_window_secs: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_replay_timeout")]
    pub replay_timeout_secs: u64,
    #[serde(default = "default_worker_enabled")]
    pub worker_enabled: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_retries: default_max_retries(),
            overflow_threshold: default_overflow_threshold(),
            dead_alert_threshold: default_dead_alert_threshold(),
            dead_alert_window_secs: default_dead_alert_window(),
            backoff_cap_secs: default_backoff_cap(),
            replay_timeout_secs: default_replay_timeout(),
            worker_enabled: default_worker_enabled(),
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_retries: self.max_retries,
            overflow_threshold: self.overflow_threshold,
            dead_alert_threshold: self.dead_alert_threshold,
            dead_alert_window: Duration::from_secs(self.dead_alert_window_secs),
            backoff_cap: Duration::from_secs(self.backoff_cap_secs),
            worker_enabled: self.worker_enabled,
        }
    }
}

/// One `[[credentials]]` entry. Tier and status arrive as strings and are
/// validated into their enums when the pool is seeded.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSeed {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub daily_call_limit: Option<u32>,
    #[serde(default)]
    pub max_calls_per_day: Option<u32>,
    #[serde(default)]
    pub max_tokens_per_day: Option<u64>,
    #[serde(default)]
    pub status_reason: Option<String>,
}

impl CredentialSeed {
    pub fn into_credential(self) -> Result<Credential> {
        let tier = match self.tier.as_str() {
            "primary" => Tier::Primary,
            "backup" => Tier::Backup,
            "free-tier" => Tier::FreeTier,
            "other" => Tier::Other,
            unknown => {
                return Err(Error::Config(format!(
                    "credential {}: unknown tier {unknown:?}",
                    self.id
                )));
            }
        };
        let status = match self.status.as_str() {
            "active" => CredentialStatus::Active,
            "exhausted" => CredentialStatus::Exhausted,
            "disabled" => CredentialStatus::Disabled,
            unknown => {
                return Err(Error::Config(format!(
                    "credential {}: unknown status {unknown:?}",
                    self.id
                )));
            }
        };

        let mut credential = Credential::new(self.id, self.provider, self.model, self.api_key);
        credential.tier = tier;
        credential.status = status;
        credential.daily_call_limit = self.daily_call_limit;
        credential.max_calls_per_day = self.max_calls_per_day;
        credential.max_tokens_per_day = self.max_tokens_per_day;
        if let Some(reason) = self.status_reason {
            credential.metadata.insert("status_reason".into(), reason);
        }
        Ok(credential)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables and validate.
    ///
    /// A missing file is not an error: the built-in defaults (including the
    /// demo credential seed) apply, so the service always comes up.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!(path = %path.display(), "config file not found, using built-in defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("QUEUE_POLL_INTERVAL_SECONDS", &mut self.queue.poll_interval_secs);
        override_from_env("QUEUE_MAX_RETRIES", &mut self.queue.max_retries);
        override_from_env("QUEUE_OVERFLOW_THRESHOLD", &mut self.queue.overflow_threshold);
        override_from_env(
            "QUEUE_DEAD_ALERT_THRESHOLD",
            &mut self.queue.dead_alert_threshold,
        );
        override_from_env(
            "QUEUE_DEAD_ALERT_WINDOW_SECONDS",
            &mut self.queue.dead_alert_window_secs,
        );
        if let Ok(value) = std::env::var("DISABLE_QUEUE_WORKER") {
            self.queue.worker_enabled = value != "1";
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be greater than 0".into()));
        }
        if self.queue.max_retries == 0 {
            return Err(Error::Config("max_retries must be greater than 0".into()));
        }
        if self.queue.backoff_cap_secs == 0 {
            return Err(Error::Config("backoff_cap_secs must be greater than 0".into()));
        }
        if self.queue.replay_timeout_secs == 0 {
            return Err(Error::Config("replay_timeout_secs must be greater than 0".into()));
        }
        if self.server.max_connections == 0 {
            return Err(Error::Config("max_connections must be greater than 0".into()));
        }

        let mut ids: Vec<&str> = self.credentials.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.credentials.len() {
            return Err(Error::Config("credential ids must be unique".into()));
        }
        let mut keys: Vec<&str> = self.credentials.iter().map(|c| c.api_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != self.credentials.len() {
            return Err(Error::Config("credential api keys must be unique".into()));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("healer-api.toml")
    }
}

fn override_from_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(var = name, value = %raw, "ignoring unparseable env override"),
        }
    }
}

/// Demo credential seed used when no config file names any.
fn default_credentials() -> Vec<CredentialSeed> {
    let seed = |id: &str, api_key: &str, tier: &str| CredentialSeed {
        id: id.into(),
        provider: default_provider(),
        model: default_model(),
        api_key: api_key.into(),
        tier: tier.into(),
        status: default_status(),
        daily_call_limit: None,
        max_calls_per_day: None,
        max_tokens_per_day: None,
        status_reason: None,
    };

    let mut primary = seed("cred-primary", "new-token-abc", "primary");
    primary.daily_call_limit = Some(200);
    let mut secondary = seed("cred-secondary", "token-backup-xyz", "backup");
    secondary.daily_call_limit = Some(150);
    let mut spiky = seed("cred-spiky", "spiky-token", "free-tier");
    spiky.daily_call_limit = Some(20);
    let mut chatty = seed("cred-chatty", "chatty-token", "free-tier");
    chatty.daily_call_limit = Some(40);
    let mut blocked = seed("cred-blocked", "blocked-token-001", "other");
    blocked.status = "disabled".into();
    blocked.status_reason =
        Some("API key blocked due to suspicious activity. Contact support.".into());
    let mut disabled_eu = seed("cred-disabled-eu", "disabled-token-eu", "other");
    disabled_eu.model = "eu".into();
    disabled_eu.status = "disabled".into();
    disabled_eu.status_reason =
        Some("API key disabled in the EU region. Provision a new key.".into());

    vec![primary, secondary, spiky, chatty, blocked, disabled_eu]
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8000".parse().expect("valid default listen addr")
}

fn default_max_connections() -> usize {
    1000
}

fn default_provider() -> String {
    "battle-healer".into()
}

fn default_model() -> String {
    "standard".into()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_overflow_threshold() -> usize {
    200
}

fn default_dead_alert_threshold() -> usize {
    20
}

fn default_dead_alert_window() -> u64 {
    300
}

fn default_backoff_cap() -> u64 {
    60
}

fn default_replay_timeout() -> u64 {
    10
}

fn default_worker_enabled() -> bool {
    true
}

fn default_tier() -> String {
    "other".into()
}

fn default_status() -> String {
    "active".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_queue_env() {
        for var in [
            "QUEUE_POLL_INTERVAL_SECONDS",
            "QUEUE_MAX_RETRIES",
            "QUEUE_OVERFLOW_THRESHOLD",
            "QUEUE_DEAD_ALERT_THRESHOLD",
            "QUEUE_DEAD_ALERT_WINDOW_SECONDS",
            "DISABLE_QUEUE_WORKER",
        ] {
            unsafe { remove_env(var) };
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:9000"

[queue]
max_retries = 3
backoff_cap_secs = 30

[[credentials]]
id = "cred-a"
provider = "demo"
model = "std"
api_key = "token-a"
tier = "primary"
daily_call_limit = 10

[[credentials]]
id = "cred-b"
provider = "demo"
model = "std"
api_key = "token-b"
tier = "backup"
"#
    }

    #[test]
    fn load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();
        let dir = std::env::temp_dir().join("healer-api-test-valid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.backoff_cap_secs, 30);
        assert_eq!(config.queue.poll_interval_secs, 5, "untouched knobs keep defaults");
        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.credentials[0].tier, "primary");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();
        let config = Config::load(Path::new("/nonexistent/healer-api.toml")).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.queue.overflow_threshold, 200);
        assert_eq!(config.credentials.len(), 6, "demo seed applies");
        assert!(config.queue.worker_enabled);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let dir = std::env::temp_dir().join("healer-api-test-badtoml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn env_overrides_file_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();
        let dir = std::env::temp_dir().join("healer-api-test-env");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { set_env("QUEUE_MAX_RETRIES", "7") };
        unsafe { set_env("DISABLE_QUEUE_WORKER", "1") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.queue.max_retries, 7);
        assert!(!config.queue.worker_enabled);
        clear_queue_env();

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unparseable_env_override_is_ignored() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();

        unsafe { set_env("QUEUE_MAX_RETRIES", "many") };
        let config = Config::load(Path::new("/nonexistent/healer-api.toml")).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        clear_queue_env();
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();
        unsafe { set_env("QUEUE_POLL_INTERVAL_SECONDS", "0") };
        let result = Config::load(Path::new("/nonexistent/healer-api.toml"));
        clear_queue_env();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_credential_ids_rejected() {
        let toml_content = r#"
[[credentials]]
id = "cred-a"
provider = "demo"
model = "std"
api_key = "token-a"

[[credentials]]
id = "cred-a"
provider = "demo"
model = "std"
api_key = "token-b"
"#;
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_queue_env();
        let dir = std::env::temp_dir().join("healer-api-test-dup");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, toml_content).unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unique"), "got: {err}");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn seed_converts_to_credential() {
        let seed = CredentialSeed {
            id: "cred-a".into(),
            provider: "demo".into(),
            model: "std".into(),
            api_key: "token-a".into(),
            tier: "free-tier".into(),
            status: "disabled".into(),
            daily_call_limit: Some(10),
            max_calls_per_day: Some(5),
            max_tokens_per_day: Some(1000),
            status_reason: Some("blocked".into()),
        };
        let credential = seed.into_credential().unwrap();
        assert_eq!(credential.tier, Tier::FreeTier);
        assert_eq!(credential.status, CredentialStatus::Disabled);
        assert_eq!(credential.effective_call_limit(), Some(5));
        assert_eq!(credential.metadata.get("status_reason").unwrap(), "blocked");
    }

    #[test]
    fn seed_rejects_unknown_tier() {
        let mut seed = default_credentials().remove(0);
        seed.tier = "platinum".into();
        let err = seed.into_credential().unwrap_err();
        assert!(err.to_string().contains("platinum"), "got: {err}");
    }

    #[test]
    fn seed_rejects_unknown_status() {
        let mut seed = default_credentials().remove(0);
        seed.status = "dormant".into();
        assert!(seed.into_credential().is_err());
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("healer-api.toml"));
    }

    #[test]
    fn queue_settings_convert_to_config() {
        let settings = QueueSettings {
            poll_interval_secs: 2,
            max_retries: 4,
            overflow_threshold: 10,
            dead_alert_threshold: 3,
            dead_alert_window_secs: 60,
            backoff_cap_secs: 8,
            replay_timeout_secs: 5,
            worker_enabled: false,
        };
        let config = settings.to_queue_config();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.backoff_cap, Duration::from_secs(8));
        assert!(!config.worker_enabled);
    }
}
