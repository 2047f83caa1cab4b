//! Configuration management for the throttling limiter.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThrottleError};
use crate::ratelimit::Mode;

/// Prefix for environment overrides, e.g. `THROTTLING__LIMITER__RATE=50`.
const ENV_PREFIX: &str = "THROTTLING";

/// Main configuration for a limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    /// Quota and namespace configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Coordination store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Single-process tracker configuration
    #[serde(default)]
    pub local: LocalConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admissions allowed per window
    #[serde(default = "default_rate")]
    pub rate: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Namespace for keys in a shared store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Default per-check timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Force local or distributed mode; inferred from the store when unset
    #[serde(default)]
    pub mode: Option<Mode>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            window_ms: default_window_ms(),
            key_prefix: default_key_prefix(),
            timeout_ms: None,
            mode: None,
        }
    }
}

fn default_rate() -> u64 {
    1000
}

fn default_window_ms() -> u64 {
    1000
}

fn default_key_prefix() -> String {
    "throttling".to_string()
}

/// Store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL; distributed mode is used when set
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// Local tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Evict keys idle for this many windows
    #[serde(default = "default_eviction_multiplier")]
    pub eviction_multiplier: u32,

    /// Minimum interval between eviction sweeps in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            eviction_multiplier: default_eviction_multiplier(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_eviction_multiplier() -> u32 {
    2
}

fn default_sweep_interval() -> u64 {
    10_000
}

impl ThrottlingConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file layered under
    /// `THROTTLING__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ThrottleError::Config(format!("Failed to load configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{const_mutex, Mutex};

    // Serializes tests that read or write THROTTLING__* variables.
    static ENV_LOCK: Mutex<()> = const_mutex(());

    #[test]
    fn test_defaults() {
        let config = ThrottlingConfig::default();
        assert_eq!(config.limiter.rate, 1000);
        assert_eq!(config.limiter.window_ms, 1000);
        assert_eq!(config.limiter.key_prefix, "throttling");
        assert_eq!(config.store.redis_url, None);
        assert_eq!(config.local.eviction_multiplier, 2);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limiter:
  rate: 10
store:
  redis_url: redis://cache:6379/
"#;
        let config = ThrottlingConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.rate, 10);
        assert_eq!(config.limiter.window_ms, 1000);
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379/"));
        assert_eq!(config.local.sweep_interval_ms, 10_000);
    }

    #[test]
    fn test_parse_mode() {
        let config = ThrottlingConfig::from_yaml("limiter:\n  mode: distributed\n").unwrap();
        assert_eq!(config.limiter.mode, Some(Mode::Distributed));
    }

    #[test]
    fn test_negative_rate_is_config_error() {
        let err = ThrottlingConfig::from_yaml("limiter:\n  rate: -5\n").unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ThrottlingConfig::from_file("/nonexistent/throttling.yaml").unwrap_err();
        assert!(matches!(err, ThrottleError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let _env = ENV_LOCK.lock();
        let path = std::env::temp_dir().join(format!("throttling-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  rate: 42\n  key_prefix: api\n").unwrap();

        let config = ThrottlingConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.rate, 42);
        assert_eq!(config.limiter.key_prefix, "api");
        assert_eq!(config.limiter.window_ms, 1000);
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = ENV_LOCK.lock();
        let path = std::env::temp_dir().join(format!("throttling-env-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  rate: 42\n  window_ms: 500\n").unwrap();

        std::env::set_var("THROTTLING__LIMITER__RATE", "17");
        std::env::set_var("THROTTLING__LIMITER__KEY_PREFIX", "edge");
        let result = ThrottlingConfig::load(path.to_str());
        std::env::remove_var("THROTTLING__LIMITER__RATE");
        std::env::remove_var("THROTTLING__LIMITER__KEY_PREFIX");
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.limiter.rate, 17);
        assert_eq!(config.limiter.key_prefix, "edge");
        assert_eq!(config.limiter.window_ms, 500);
    }
}
