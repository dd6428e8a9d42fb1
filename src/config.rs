use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "REGISTRY_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment override: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistrySettings,
    pub config_center: ConfigCenterSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// 心跳超过该时长视为失效
    pub health_threshold_secs: u64,
    /// 过期清理间隔
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            health_threshold_secs: 30,
            sweep_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigCenterSettings {
    /// 长轮询默认超时
    pub default_watch_timeout_ms: u64,
    /// 长轮询超时上限
    pub max_watch_timeout_ms: u64,
}

impl Default for ConfigCenterSettings {
    fn default() -> Self {
        Self {
            default_watch_timeout_ms: 30_000,
            max_watch_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// REGISTRY_ 前缀的环境变量覆盖
#[derive(Debug, Default, Deserialize)]
pub struct EnvOverrides {
    pub health_threshold_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub watch_timeout_ms: Option<u64>,
    pub max_watch_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

impl Config {
    /// 读取 .env、配置文件及环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path =
            std::env::var("REGISTRY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_toml_str(&fs::read_to_string(path)?)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(v) = overrides.health_threshold_secs {
            self.registry.health_threshold_secs = v;
        }
        if let Some(v) = overrides.sweep_interval_secs {
            self.registry.sweep_interval_secs = v;
        }
        if let Some(v) = overrides.watch_timeout_ms {
            self.config_center.default_watch_timeout_ms = v;
        }
        if let Some(v) = overrides.max_watch_timeout_ms {
            self.config_center.max_watch_timeout_ms = v;
        }
        if let Some(v) = overrides.log_level {
            self.log.level = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.health_threshold_secs == 0 {
            return Err(ConfigError::Invalid("registry.health_threshold_secs must be > 0".into()));
        }
        if self.registry.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("registry.sweep_interval_secs must be > 0".into()));
        }
        if self.config_center.default_watch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "config_center.default_watch_timeout_ms must be > 0".into(),
            ));
        }
        if self.config_center.max_watch_timeout_ms < self.config_center.default_watch_timeout_ms {
            return Err(ConfigError::Invalid(
                "config_center.max_watch_timeout_ms must not be below the default timeout".into(),
            ));
        }
        Ok(())
    }

    pub fn health_threshold(&self) -> Duration {
        Duration::from_secs(self.registry.health_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_secs)
    }

    /// 长轮询超时：未指定或为 0 时取默认值，并受上限约束
    pub fn watch_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = match requested_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.config_center.default_watch_timeout_ms,
        };
        Duration::from_millis(ms.min(self.config_center.max_watch_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_registry_contract() {
        let config = Config::default();
        assert_eq!(config.health_threshold(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(10));
        assert_eq!(config.watch_timeout(None), Duration::from_millis(30_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [registry]
            health_threshold_secs = 45

            [log]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.health_threshold_secs, 45);
        assert_eq!(config.registry.sweep_interval_secs, 10);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = Config::default();
        config.apply_overrides(EnvOverrides {
            sweep_interval_secs: Some(2),
            log_level: Some("trace".into()),
            ..Default::default()
        });
        assert_eq!(config.sweep_interval(), Duration::from_secs(2));
        assert_eq!(config.log.level, "trace");
        assert_eq!(config.registry.health_threshold_secs, 30);
    }

    #[test]
    fn watch_timeout_is_clamped() {
        let config = Config::default();
        assert_eq!(config.watch_timeout(Some(0)), Duration::from_millis(30_000));
        assert_eq!(config.watch_timeout(Some(500)), Duration::from_millis(500));
        assert_eq!(config.watch_timeout(Some(10_000_000)), Duration::from_millis(120_000));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = Config::default();
        config.registry.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[registry\nhealth_threshold_secs = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
