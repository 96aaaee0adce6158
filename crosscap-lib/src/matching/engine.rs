//! Three-stage matching cascade.
//!
//! Stages run in fixed order (vendor trailer, TLS Client Hello,
//! fingerprint scoring) and each removes its matched flows from the
//! candidate pools before the next stage sees them.

use ahash::AHashSet;
use tracing::info;

use crate::config::MatchConfig;
use crate::connection::Connection;
use crate::ingest::{ClientHelloRecord, TrailerRecord};
use crate::matching::bucket::BucketStrategy;
use crate::matching::matcher::{align_directions, FingerprintMatcher, MatchMode};
use crate::matching::sampler::ConnectionSampler;
use crate::matching::{tls, trailer, CancelToken, ConnectionMatch};

/// Exact-match evidence tables accompanying the two captures. Either
/// pair may be empty, which skips the corresponding stage.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryTables {
    pub trailer_a: Vec<TrailerRecord>,
    pub trailer_b: Vec<TrailerRecord>,
    pub tls_a: Vec<ClientHelloRecord>,
    pub tls_b: Vec<ClientHelloRecord>,
}

#[derive(Debug)]
pub struct MatchEngine {
    strategy: BucketStrategy,
    threshold: f64,
    mode: MatchMode,
    sampler: Option<ConnectionSampler>,
}

impl MatchEngine {
    pub fn new(strategy: BucketStrategy, threshold: f64, mode: MatchMode) -> MatchEngine {
        MatchEngine {
            strategy,
            threshold,
            mode,
            sampler: None,
        }
    }

    pub fn from_config(config: &MatchConfig) -> MatchEngine {
        let sampler = config
            .sampling
            .enabled
            .then(|| ConnectionSampler::new(config.sampling.threshold, config.sampling.rate));
        MatchEngine {
            strategy: config.bucket_strategy,
            threshold: config.score_threshold,
            mode: config.match_mode,
            sampler,
        }
    }

    pub fn with_sampler(mut self, sampler: ConnectionSampler) -> MatchEngine {
        self.sampler = Some(sampler);
        self
    }

    /// Run the cascade over two connection pools.
    pub fn run(
        &self,
        side_a: Vec<Connection>,
        side_b: Vec<Connection>,
        aux: &AuxiliaryTables,
        cancel: &CancelToken,
    ) -> Vec<ConnectionMatch> {
        let (mut pool_a, mut pool_b) = match &self.sampler {
            Some(sampler) => (sampler.sample(side_a), sampler.sample(side_b)),
            None => (side_a, side_b),
        };

        let mut matches: Vec<ConnectionMatch> = Vec::new();

        // Stage 1: vendor trailer.
        if !aux.trailer_a.is_empty() && !aux.trailer_b.is_empty() {
            let pairs = trailer::match_by_trailer(&aux.trailer_a, &aux.trailer_b);
            let stage = trailer::to_connection_matches(&pairs, &pool_a, &pool_b);
            remove_matched(&mut pool_a, &mut pool_b, &stage);
            matches.extend(stage);
        }

        // Stage 2: TLS Client Hello.
        if !cancel.is_cancelled() && !aux.tls_a.is_empty() && !aux.tls_b.is_empty() {
            let pairs = tls::match_by_client_hello(&aux.tls_a, &aux.tls_b);
            let stage = tls::to_connection_matches(&pairs, &pool_a, &pool_b);
            remove_matched(&mut pool_a, &mut pool_b, &stage);
            matches.extend(stage);
        }

        // Stage 3: fingerprint scoring over whatever remains.
        if !cancel.is_cancelled() {
            let matcher = FingerprintMatcher::new(self.strategy, self.threshold, self.mode);
            matches.extend(matcher.match_connections(&pool_a, &pool_b, cancel));
        }

        let matches = align_directions(matches);
        info!(total = matches.len(), "cascade complete");
        matches
    }
}

/// Drop every flow that an earlier stage already matched.
fn remove_matched(
    pool_a: &mut Vec<Connection>,
    pool_b: &mut Vec<Connection>,
    stage: &[ConnectionMatch],
) {
    if stage.is_empty() {
        return;
    }
    let matched_a: AHashSet<u64> = stage.iter().map(|m| m.conn_a.flow_id).collect();
    let matched_b: AHashSet<u64> = stage.iter().map(|m| m.conn_b.flow_id).collect();
    pool_a.retain(|c| !matched_a.contains(&c.flow_id));
    pool_b.retain(|c| !matched_b.contains(&c.flow_id));
}
