//! Progress/log streaming hub (spec §4.10, §6). One `broadcast` channel per
//! deployment multiplexes structured messages to every subscriber, the same
//! shape as the teacher orchestrator's `UnboundedSender`-based event fan-out
//! in `auto_scaling.rs`/`health_monitor.rs`, generalized to multiple
//! concurrent subscribers since a deployment stream may have more than one
//! watcher.

use crate::types::{ErrorInfo, StepId, StepRecord};
use autoscale_core::DeploymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Connected,
    Log,
    Status,
    Progress,
    Step,
    Error,
}

/// One wire message, JSON-encodable, matching spec §4.10's field set
/// (every field besides `type`/`deployment_id`/`timestamp` is optional and
/// populated according to `message_type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub deployment_id: DeploymentId,
    pub timestamp: DateTime<Utc>,
    pub level: Option<String>,
    pub step: Option<StepId>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub progress: Option<u8>,
    pub step_update: Option<StepRecord>,
    pub error_info: Option<ErrorInfo>,
}

impl StreamMessage {
    fn base(deployment_id: DeploymentId, message_type: MessageType, now: DateTime<Utc>) -> Self {
        Self {
            message_type,
            deployment_id,
            timestamp: now,
            level: None,
            step: None,
            message: None,
            status: None,
            progress: None,
            step_update: None,
            error_info: None,
        }
    }

    pub fn connected(deployment_id: DeploymentId, now: DateTime<Utc>) -> Self {
        Self::base(deployment_id, MessageType::Connected, now)
    }

    pub fn log(deployment_id: DeploymentId, level: &str, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut m = Self::base(deployment_id, MessageType::Log, now);
        m.level = Some(level.to_string());
        m.message = Some(message.into());
        m
    }

    pub fn progress(deployment_id: DeploymentId, percent: u8, now: DateTime<Utc>) -> Self {
        let mut m = Self::base(deployment_id, MessageType::Progress, now);
        m.progress = Some(percent);
        m
    }

    pub fn step(deployment_id: DeploymentId, record: StepRecord, now: DateTime<Utc>) -> Self {
        let mut m = Self::base(deployment_id, MessageType::Step, now);
        m.step = Some(record.id);
        m.step_update = Some(record);
        m
    }

    pub fn status(deployment_id: DeploymentId, status: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut m = Self::base(deployment_id, MessageType::Status, now);
        m.status = Some(status.into());
        m
    }

    pub fn error(deployment_id: DeploymentId, step: StepId, error: ErrorInfo, now: DateTime<Utc>) -> Self {
        let mut m = Self::base(deployment_id, MessageType::Error, now);
        m.step = Some(step);
        m.error_info = Some(error);
        m
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Keep-alive cadence and peer liveness window (spec §5).
pub const PING_INTERVAL_SECS: u64 = 30;
pub const PONG_TIMEOUT_SECS: u64 = 60;

/// Guarded map from deployment id to its broadcast sender (spec §9 "global
/// mutable state: subscriber sets per deployment, guarded map"). Senders are
/// created lazily on first subscribe/publish and kept for the deployment's
/// lifetime so a late subscriber still gets live messages.
#[derive(Default)]
pub struct DeploymentEventHub {
    channels: RwLock<HashMap<DeploymentId, broadcast::Sender<StreamMessage>>>,
}

impl DeploymentEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, id: DeploymentId) -> broadcast::Sender<StreamMessage> {
        if let Some(tx) = self.channels.read().unwrap().get(&id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribes to a deployment's stream; an immediate `connected` message
    /// is not sent here since the caller may want to batch it with replay of
    /// current state (spec §4.10 `connected` is one message among many).
    pub fn subscribe(&self, id: DeploymentId) -> broadcast::Receiver<StreamMessage> {
        self.sender_for(id).subscribe()
    }

    /// Publishes to every current subscriber. A `send` with zero receivers
    /// is not an error: streaming is best-effort and nobody may be watching.
    pub fn publish(&self, message: StreamMessage) {
        let tx = self.sender_for(message.deployment_id);
        let _ = tx.send(message);
    }

    /// Drops the channel once the deployment is done and nobody should be
    /// able to subscribe fresh (existing receivers keep draining buffered
    /// messages until they lag out).
    pub fn close(&self, id: DeploymentId) {
        self.channels.write().unwrap().remove(&id);
    }
}
