use crate::config::LogLevel;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initializes the global `tracing` subscriber once at process start.
pub struct Logger {
    level: LogLevel,
    log_file: Option<PathBuf>,
}

impl Logger {
    pub fn new(level: LogLevel, log_file: Option<PathBuf>) -> Self {
        Self { level, log_file }
    }

    pub fn init(&self) -> Result<(), Box<dyn std::error::Error>> {
        let filter = match self.level {
            LogLevel::Error => EnvFilter::new("error"),
            LogLevel::Warn => EnvFilter::new("warn"),
            LogLevel::Info => EnvFilter::new("info"),
            LogLevel::Debug => EnvFilter::new("debug"),
            LogLevel::Trace => EnvFilter::new("trace"),
        };

        let registry = Registry::default().with(filter);

        if let Some(log_file) = &self.log_file {
            let file_appender =
                tracing_appender::rolling::daily(log_file.parent().unwrap(), "autoscale.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true);

            let _ = registry.with(file_layer).try_init();
        } else {
            let stdout_layer = fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true);

            let _ = registry.with(stdout_layer).try_init();
        }

        Ok(())
    }
}

pub fn log_scaling_decision(policy_id: &str, action: &str, from: i64, to: i64, reason: &str) {
    info!(
        policy_id = %policy_id,
        action = %action,
        from_replicas = from,
        to_replicas = to,
        reason = %reason,
        "scaling decision executed"
    );
}

pub fn log_node_provisioned(pool_id: &str, node_id: &str, provider: &str) {
    info!(
        pool_id = %pool_id,
        node_id = %node_id,
        provider = %provider,
        "node provisioned"
    );
}

pub fn log_node_deleted(pool_id: &str, node_id: &str, reason: Option<&str>) {
    info!(
        pool_id = %pool_id,
        node_id = %node_id,
        reason = ?reason,
        "node deleted"
    );
}

pub fn log_scale_to_zero(policy_id: &str) {
    info!(policy_id = %policy_id, "policy scaled to zero on idleness");
}

pub fn log_wake(policy_id: &str, reason: &str) {
    info!(policy_id = %policy_id, reason = %reason, "policy woken");
}
