//! Behavior-only matching over timing and size features.
//!
//! Scores pairs on time-range overlap, duration, mean inter-packet
//! time, and byte totals, without any IP-ID or handshake requirement.
//! Its precision is below the fingerprint scorer's; it exists as an
//! explicit alternative for captures with no usable IP-IDs, never as
//! the primary engine.

use ahash::AHashSet;
use tracing::info;

use crate::connection::Connection;
use crate::matching::bucket::{choose_auto_strategy, create_buckets, BucketStrategy};
use crate::matching::matcher::MatchMode;
use crate::matching::score::MatchScore;
use crate::matching::{CancelToken, ConnectionMatch};
use crate::similarity::ratio_similarity;

/// Default behavioral weights.
pub const DEFAULT_WEIGHT_OVERLAP: f64 = 0.35;
pub const DEFAULT_WEIGHT_DURATION: f64 = 0.25;
pub const DEFAULT_WEIGHT_IAT: f64 = 0.20;
pub const DEFAULT_WEIGHT_BYTES: f64 = 0.20;

#[derive(Debug, Clone)]
pub struct BehavioralWeights {
    pub overlap: f64,
    pub duration: f64,
    pub iat: f64,
    pub bytes: f64,
}

impl Default for BehavioralWeights {
    fn default() -> Self {
        BehavioralWeights {
            overlap: DEFAULT_WEIGHT_OVERLAP,
            duration: DEFAULT_WEIGHT_DURATION,
            iat: DEFAULT_WEIGHT_IAT,
            bytes: DEFAULT_WEIGHT_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct BehavioralMatcher {
    strategy: BucketStrategy,
    threshold: f64,
    mode: MatchMode,
    weights: BehavioralWeights,
}

impl BehavioralMatcher {
    pub fn new(
        strategy: BucketStrategy,
        threshold: f64,
        mode: MatchMode,
        weights: BehavioralWeights,
    ) -> BehavioralMatcher {
        BehavioralMatcher {
            strategy,
            threshold,
            mode,
            weights,
        }
    }

    pub fn match_connections(
        &self,
        side_a: &[Connection],
        side_b: &[Connection],
        cancel: &CancelToken,
    ) -> Vec<ConnectionMatch> {
        let strategy = match self.strategy {
            BucketStrategy::Auto => choose_auto_strategy(side_a, side_b),
            other => other,
        };

        let buckets_a = create_buckets(side_a, strategy);
        let buckets_b = create_buckets(side_b, strategy);

        let mut keys: Vec<_> = buckets_a
            .keys()
            .filter(|k| buckets_b.contains_key(*k))
            .cloned()
            .collect();
        keys.sort();

        let mut matches = Vec::new();
        let mut seen_pairs: AHashSet<(u64, u64)> = AHashSet::new();

        for key in keys {
            if cancel.is_cancelled() {
                break;
            }

            let mut scored: Vec<(f64, usize, usize)> = Vec::new();
            for &i in &buckets_a[&key] {
                for &j in &buckets_b[&key] {
                    let score = self.behavior_score(&side_a[i], &side_b[j]);
                    if score.normalized >= self.threshold {
                        scored.push((score.normalized, i, j));
                    }
                }
            }

            scored.sort_by(|x, y| {
                y.0.total_cmp(&x.0)
                    .then(side_a[x.1].flow_id.cmp(&side_a[y.1].flow_id))
                    .then(side_b[x.2].flow_id.cmp(&side_b[y.2].flow_id))
            });

            let mut used_a: AHashSet<usize> = AHashSet::new();
            let mut used_b: AHashSet<usize> = AHashSet::new();
            for (_, i, j) in scored {
                if self.mode == MatchMode::OneToOne
                    && (used_a.contains(&i) || used_b.contains(&j))
                {
                    continue;
                }
                used_a.insert(i);
                used_b.insert(j);
                let pair = (side_a[i].flow_id, side_b[j].flow_id);
                if seen_pairs.insert(pair) {
                    matches.push(ConnectionMatch {
                        conn_a: side_a[i].clone(),
                        conn_b: side_b[j].clone(),
                        score: self.behavior_score(&side_a[i], &side_b[j]),
                    });
                }
            }
        }

        info!(matches = matches.len(), "behavioral matching complete");
        matches
    }

    fn behavior_score(&self, a: &Connection, b: &Connection) -> MatchScore {
        let dur_a = a.duration();
        let dur_b = b.duration();
        let dur_sim = ratio_similarity(dur_a, dur_b);

        let inter_start = a.first_packet_time.max(b.first_packet_time);
        let inter_end = a.last_packet_time.min(b.last_packet_time);
        let union_start = a.first_packet_time.min(b.first_packet_time);
        let union_end = a.last_packet_time.max(b.last_packet_time);
        let inter = (inter_end - inter_start).max(0.0);
        let union = (union_end - union_start).max(0.0);
        let overlap = if union <= 0.0 { 1.0 } else { inter / union };

        let iat_a = mean_inter_packet_time(a);
        let iat_b = mean_inter_packet_time(b);
        let iat_sim = ratio_similarity(iat_a, iat_b);

        let bytes_sim = ratio_similarity(a.total_bytes as f64, b.total_bytes as f64);

        let w = &self.weights;
        let raw = w.overlap * overlap + w.duration * dur_sim + w.iat * iat_sim + w.bytes * bytes_sim;
        let avail = w.overlap + w.duration + w.iat + w.bytes;
        let normalized = if avail > 0.0 { raw / avail } else { 0.0 };

        MatchScore {
            normalized,
            raw,
            available_weight: avail,
            // Not a behavioral feature; set so threshold acceptance works.
            ipid_match: true,
            evidence: format!(
                "behav(overlap={overlap:.2} dur={dur_sim:.2} iat={iat_sim:.2} bytes={bytes_sim:.2})"
            ),
            force_accept: false,
            microflow_accept: false,
        }
    }
}

/// Mean inter-packet time; approximates request-response round trips
/// on interactive flows.
fn mean_inter_packet_time(c: &Connection) -> f64 {
    let duration = c.duration();
    if duration <= 0.0 {
        return 0.0;
    }
    duration / c.packet_count.saturating_sub(1).max(1) as f64
}
