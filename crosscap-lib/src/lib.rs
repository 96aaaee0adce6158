#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod roles;
pub mod similarity;
pub mod topology;

pub use config::{load_from_path, MatchConfig, SamplingConfig};
pub use connection::{build_connections, Connection, ConnectionBuilder, GroupMode};
pub use error::{CrosscapError, Result};
pub use ingest::Packet;
pub use matching::{
    AuxiliaryTables, BucketStrategy, CancelToken, ConnectionMatch, MatchEngine, MatchMode,
    MatchScore, MatchStats,
};
pub use roles::{refine_roles, Confidence, RoleDetector, ServerInfo, ServiceList};
pub use topology::{TopologyAnalyzer, TopologyInfo};
