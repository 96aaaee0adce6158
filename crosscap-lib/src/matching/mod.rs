//! Cross-capture connection matching.

pub mod behavioral;
pub mod bucket;
pub mod engine;
pub mod matcher;
pub mod sampler;
pub mod score;
pub mod scorer;
pub mod serialize;
pub mod stats;
pub mod tls;
pub mod trailer;

pub use bucket::{choose_auto_strategy, BucketStrategy};
pub use engine::{AuxiliaryTables, MatchEngine};
pub use matcher::{align_directions, FingerprintMatcher, MatchMode};
pub use sampler::ConnectionSampler;
pub use score::MatchScore;
pub use scorer::FingerprintScorer;
pub use serialize::{load_matches, save_matches, MatchMetadata};
pub use stats::MatchStats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::Connection;

/// A matched pair of connections, one from each capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionMatch {
    pub conn_a: Connection,
    pub conn_b: Connection,
    pub score: MatchScore,
}

impl std::fmt::Display for ConnectionMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "match(score={:.2}, {}:{} <-> {}:{})",
            self.score.normalized,
            self.conn_a.client_ip,
            self.conn_a.client_port,
            self.conn_a.server_ip,
            self.conn_a.server_port,
        )
    }
}

/// Cooperative cancellation flag checked between buckets and at coarse
/// intervals inside pair scans. Cancelling yields partial results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
