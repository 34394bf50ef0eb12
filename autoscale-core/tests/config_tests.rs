use autoscale_core::config::{AutoscaleConfig, LogLevel};
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = AutoscaleConfig::default();

    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.manager.evaluation_interval, Duration::from_secs(30));
    assert_eq!(config.node_executor.node_ready_timeout, Duration::from_secs(10 * 60));
    assert_eq!(config.node_executor.drain_timeout, Duration::from_secs(5 * 60));
    assert_eq!(config.idle.idle_check_interval, Duration::from_secs(60));
    assert_eq!(config.metrics.base_url, "http://localhost:9090");
}

#[test]
fn test_config_validation() {
    let mut config = AutoscaleConfig::default();
    assert!(config.validate().is_ok());

    config.manager.evaluation_interval = Duration::ZERO;
    assert!(config.validate().is_err());
    config.manager.evaluation_interval = Duration::from_secs(30);

    config.node_executor.node_ready_timeout = Duration::ZERO;
    assert!(config.validate().is_err());
    config.node_executor.node_ready_timeout = Duration::from_secs(600);

    config.metrics.base_url = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let config = AutoscaleConfig::default();

    let json = serde_json::to_string(&config).unwrap();
    let parsed: AutoscaleConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.manager.evaluation_interval, config.manager.evaluation_interval);

    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: AutoscaleConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.manager.evaluation_interval, config.manager.evaluation_interval);

    let toml = toml::to_string(&config).unwrap();
    let parsed: AutoscaleConfig = toml::from_str(&toml).unwrap();
    assert_eq!(parsed.manager.evaluation_interval, config.manager.evaluation_interval);
}

#[test]
fn test_save_and_load_round_trip_per_format() {
    let config = AutoscaleConfig::default();
    let dir = tempfile::tempdir().unwrap();

    for ext in ["yaml", "toml", "json"] {
        let path = dir.path().join(format!("autoscale.{ext}"));
        let path = path.to_str().unwrap();
        config.save_to_file(path).unwrap();
        let loaded = AutoscaleConfig::load_from_file(path).unwrap();
        assert_eq!(loaded.manager.evaluation_interval, config.manager.evaluation_interval);
    }
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let config = AutoscaleConfig::default();
    assert!(config.save_to_file("/tmp/autoscale.ini").is_err());
    assert!(AutoscaleConfig::load_from_file("/tmp/autoscale.ini").is_err());
}

#[test]
fn test_log_level_round_trips_through_json() {
    for level in [LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug, LogLevel::Trace] {
        let json = serde_json::to_string(&level).unwrap();
        let back: LogLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, level);
    }
}
