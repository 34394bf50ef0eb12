pub mod http_plane;
pub mod mock;
pub mod plane;
pub mod types;

pub use http_plane::HttpClusterPlane;
pub use mock::MockClusterPlane;
pub use plane::{select_scale_down_candidates, ClusterPlane};
pub use types::{
    ClusterNode, DrainOptions, DrainOutcome, NodeCondition, NodeUtilization, PendingPodSummary,
    ResourceRequests, WorkloadKind,
};
