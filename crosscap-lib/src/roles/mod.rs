//! Server/client role inference.

pub mod detector;
pub mod service_list;

pub use detector::{
    refine_roles, Confidence, DetectionMethod, RoleDetector, ServerInfo, DATABASE_PORTS,
    WELL_KNOWN_PORTS,
};
pub use service_list::ServiceList;
