pub mod executor;
pub mod idle_detector;
pub mod rule_evaluator;
pub mod scaling_manager;

pub use executor::{Executor, NodeExecutor, PoolLockRegistry, WorkloadExecutor};
pub use idle_detector::{IdleDetector, IdleWindowConfig, WakeResult};
pub use rule_evaluator::{evaluate, Decision, MetricResolver, ScalingAction};
pub use scaling_manager::{ResolvedMetrics, ScalingManager};
