//! Connection summaries and the packet-folding builder.

pub mod builder;
pub mod types;

pub use builder::{build_connections, syn_options_fingerprint, ConnectionBuilder, GroupMode};
pub use types::Connection;
