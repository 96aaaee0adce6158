//! Role and topology inference over matched pairs.

pub mod analyzer;
pub mod endpoints;
pub mod service;
pub mod ttl;

pub use analyzer::{
    capture_sequence, CapturePoint, CapturePosition, CaptureSequence, ServiceTopology,
    TopologyAnalyzer, TopologyInfo,
};
pub use endpoints::{EndpointPairStats, EndpointStatsCollector, EndpointTuple};
pub use service::{aggregate_by_service, load_service_groups, ServiceKey, ServiceStats};
pub use ttl::{hops, initial_ttl, most_common_hops};
