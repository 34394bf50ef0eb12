pub mod error_taxonomy;
pub mod estimates;
pub mod orchestrator;
pub mod provisioner;
pub mod store;
pub mod stream;
pub mod types;

pub use orchestrator::{DeploymentOrchestrator, RetryConfig};
pub use provisioner::{MockProvisioner, Provisioner, StepContext, StepOutcome};
pub use store::{DeploymentStore, InMemoryDeploymentStore};
pub use stream::{DeploymentEventHub, MessageType, StreamMessage, PING_INTERVAL_SECS, PONG_TIMEOUT_SECS};
pub use types::{
    CreatedResource, DeploymentProgress, DeploymentRequest, ErrorCode, ErrorInfo, RetryInfo, StepId, StepRecord,
    StepStatus, SubStep,
};
