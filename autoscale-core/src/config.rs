use crate::error::{AutoscaleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the whole control plane, loaded once at
/// process start (spec §9 "global mutable state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    pub log_level: LogLevel,
    pub metrics: MetricsConfig,
    pub manager: ManagerConfig,
    pub node_executor: NodeExecutorConfig,
    pub idle: IdleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Metrics Gateway tunables (spec §4.1, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub base_url: String,
    #[serde(with = "humantime_secs")]
    pub query_timeout: Duration,
}

/// Scaling Manager tunables (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(with = "humantime_secs")]
    pub evaluation_interval: Duration,
    #[serde(with = "humantime_secs")]
    pub provider_timeout: Duration,
}

/// Node Executor tunables (spec §4.8, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutorConfig {
    #[serde(with = "humantime_secs")]
    pub node_ready_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub drain_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub drain_grace: Duration,
    #[serde(with = "humantime_secs")]
    pub max_op_age: Duration,
    #[serde(with = "humantime_secs")]
    pub reconcile_interval: Duration,
}

/// Idle Detector tunables (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    #[serde(with = "humantime_secs")]
    pub idle_check_interval: Duration,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            metrics: MetricsConfig::default(),
            manager: ManagerConfig::default(),
            node_executor: NodeExecutorConfig::default(),
            idle: IdleConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for NodeExecutorConfig {
    fn default() -> Self {
        Self {
            node_ready_timeout: Duration::from_secs(10 * 60),
            drain_timeout: Duration::from_secs(5 * 60),
            drain_grace: Duration::from_secs(30),
            max_op_age: Duration::from_secs(60 * 60),
            reconcile_interval: Duration::from_secs(120),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_check_interval: Duration::from_secs(60),
        }
    }
}

impl AutoscaleConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| AutoscaleError::Decode(format!("invalid YAML config: {}", e)))?
        } else if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| AutoscaleError::Decode(format!("invalid TOML config: {}", e)))?
        } else if path.ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            return Err(AutoscaleError::validation(
                "path",
                format!("unsupported config file extension: {}", path),
            ));
        };

        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::to_string(self)
                .map_err(|e| AutoscaleError::Decode(format!("cannot serialize YAML: {}", e)))?
        } else if path.ends_with(".toml") {
            toml::to_string(self)
                .map_err(|e| AutoscaleError::Decode(format!("cannot serialize TOML: {}", e)))?
        } else if path.ends_with(".json") {
            serde_json::to_string_pretty(self)?
        } else {
            return Err(AutoscaleError::validation(
                "path",
                format!("unsupported config file extension: {}", path),
            ));
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.manager.evaluation_interval.is_zero() {
            return Err(AutoscaleError::validation(
                "manager.evaluation_interval",
                "must be greater than zero",
            ));
        }

        if self.node_executor.node_ready_timeout.is_zero() {
            return Err(AutoscaleError::validation(
                "node_executor.node_ready_timeout",
                "must be greater than zero",
            ));
        }

        if self.metrics.base_url.is_empty() {
            return Err(AutoscaleError::validation(
                "metrics.base_url",
                "must not be empty",
            ));
        }

        Ok(())
    }
}

/// (De)serializes a `Duration` as whole seconds, so config files stay
/// human-editable plain integers instead of nested structs.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AutoscaleConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_evaluation_interval_is_rejected() {
        let mut cfg = AutoscaleConfig::default();
        cfg.manager.evaluation_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = AutoscaleConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AutoscaleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.manager.evaluation_interval, cfg.manager.evaluation_interval);
    }
}
