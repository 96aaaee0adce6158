//! Fingerprint matching stage: bucketed pairwise scoring plus
//! selection.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::matching::bucket::{choose_auto_strategy, create_buckets, BucketStrategy};
use crate::matching::scorer::{
    has_min_ipid_overlap, port_predicate, FingerprintScorer, MIN_IPID_OVERLAP,
};
use crate::matching::{CancelToken, ConnectionMatch};

/// Pair comparisons between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Whether one connection may appear in multiple matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Greedy best-first pairing; each connection matches at most once.
    #[default]
    OneToOne,
    /// Keep every accepted pair; one long-lived flow may span several
    /// short flows on the other side.
    OneToMany,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-to-one" => Ok(MatchMode::OneToOne),
            "one-to-many" => Ok(MatchMode::OneToMany),
            other => Err(format!("unknown match mode: {other}")),
        }
    }
}

struct ScoredPair {
    force_accept: bool,
    normalized: f64,
    idx_a: usize,
    idx_b: usize,
    score: crate::matching::MatchScore,
}

/// Stage-3 matcher: fingerprint scoring over bucketed candidates.
#[derive(Debug)]
pub struct FingerprintMatcher {
    strategy: BucketStrategy,
    threshold: f64,
    mode: MatchMode,
    scorer: FingerprintScorer,
}

impl FingerprintMatcher {
    pub fn new(strategy: BucketStrategy, threshold: f64, mode: MatchMode) -> FingerprintMatcher {
        FingerprintMatcher {
            strategy,
            threshold,
            mode,
            scorer: FingerprintScorer::new(),
        }
    }

    /// Match two connection lists; deterministic for identical inputs.
    pub fn match_connections(
        &self,
        side_a: &[Connection],
        side_b: &[Connection],
        cancel: &CancelToken,
    ) -> Vec<ConnectionMatch> {
        let strategy = match self.strategy {
            BucketStrategy::Auto => {
                let chosen = choose_auto_strategy(side_a, side_b);
                debug!(?chosen, "auto-selected bucket strategy");
                chosen
            }
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
                info!("matching cancelled; returning partial results");
                break;
            }

            let bucket_a = &buckets_a[&key];
            let bucket_b = &buckets_b[&key];

            let bucket_matches = match self.mode {
                MatchMode::OneToOne => self.match_bucket_one_to_one(side_a, side_b, bucket_a, bucket_b, cancel),
                MatchMode::OneToMany => self.match_bucket_one_to_many(side_a, side_b, bucket_a, bucket_b, cancel),
            };

            // A pair can surface from more than one bucket; keep the first.
            for m in bucket_matches {
                let pair = (m.conn_a.flow_id, m.conn_b.flow_id);
                if seen_pairs.insert(pair) {
                    matches.push(m);
                }
            }
        }

        info!(matches = matches.len(), "fingerprint stage complete");
        matches
    }

    fn score_pair(
        &self,
        a: &Connection,
        b: &Connection,
    ) -> Option<(bool, crate::matching::MatchScore)> {
        // Fast predicates before the full feature walk.
        if !port_predicate(a, b) {
            return None;
        }

        if !has_min_ipid_overlap(&a.ipid_set, &b.ipid_set, MIN_IPID_OVERLAP) {
            // Short flows get one more chance through the microflow rule.
            let micro = self.scorer.score_microflow(a, b)?;
            if micro.is_accepted(self.threshold) {
                return Some((false, micro));
            }
            return None;
        }

        let score = self.scorer.score(a, b);
        if score.is_accepted(self.threshold) {
            let force = score.force_accept;
            return Some((force, score));
        }
        None
    }

    fn collect_scored(
        &self,
        side_a: &[Connection],
        side_b: &[Connection],
        bucket_a: &[usize],
        bucket_b: &[usize],
        cancel: &CancelToken,
    ) -> Vec<ScoredPair> {
        let mut scored = Vec::new();
        let mut comparisons = 0usize;

        'outer: for &i in bucket_a {
            for &j in bucket_b {
                comparisons += 1;
                if comparisons % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    break 'outer;
                }

                if let Some((force, score)) = self.score_pair(&side_a[i], &side_b[j]) {
                    scored.push(ScoredPair {
                        force_accept: force,
                        normalized: score.normalized,
                        idx_a: i,
                        idx_b: j,
                        score,
                    });
                }
            }
        }

        // Total order: strong matches first, then score, then flow ids.
        // Floats never decide a tie on their own.
        scored.sort_by(|x, y| {
            y.force_accept
                .cmp(&x.force_accept)
                .then(y.normalized.total_cmp(&x.normalized))
                .then(side_a[x.idx_a].flow_id.cmp(&side_a[y.idx_a].flow_id))
                .then(side_b[x.idx_b].flow_id.cmp(&side_b[y.idx_b].flow_id))
        });

        scored
    }

    fn match_bucket_one_to_one(
        &self,
        side_a: &[Connection],
        side_b: &[Connection],
        bucket_a: &[usize],
        bucket_b: &[usize],
        cancel: &CancelToken,
    ) -> Vec<ConnectionMatch> {
        let scored = self.collect_scored(side_a, side_b, bucket_a, bucket_b, cancel);

        let mut used_a: AHashSet<usize> = AHashSet::new();
        let mut used_b: AHashSet<usize> = AHashSet::new();
        let mut matches = Vec::new();

        for pair in scored {
            if used_a.contains(&pair.idx_a) || used_b.contains(&pair.idx_b) {
                continue;
            }
            used_a.insert(pair.idx_a);
            used_b.insert(pair.idx_b);
            matches.push(ConnectionMatch {
                conn_a: side_a[pair.idx_a].clone(),
                conn_b: side_b[pair.idx_b].clone(),
                score: pair.score,
            });
        }

        matches
    }

    fn match_bucket_one_to_many(
        &self,
        side_a: &[Connection],
        side_b: &[Connection],
        bucket_a: &[usize],
        bucket_b: &[usize],
        cancel: &CancelToken,
    ) -> Vec<ConnectionMatch> {
        self.collect_scored(side_a, side_b, bucket_a, bucket_b, cancel)
            .into_iter()
            .map(|pair| ConnectionMatch {
                conn_a: side_a[pair.idx_a].clone(),
                conn_b: side_b[pair.idx_b].clone(),
                score: pair.score,
            })
            .collect()
    }
}

/// Give every matched pair one canonical orientation.
///
/// When a common port sits on different sides of the two connections,
/// the side without a captured SYN is swapped; with both or neither
/// captured, side B yields.
pub fn align_directions(matches: Vec<ConnectionMatch>) -> Vec<ConnectionMatch> {
    matches
        .into_iter()
        .map(|m| {
            let common_disagrees = [
                m.conn_a.client_port,
                m.conn_a.server_port,
            ]
            .iter()
            .any(|&port| {
                let in_b = port == m.conn_b.client_port || port == m.conn_b.server_port;
                in_b && ((port == m.conn_a.server_port) != (port == m.conn_b.server_port))
            });

            if !common_disagrees {
                return m;
            }

            if m.conn_a.has_syn && !m.conn_b.has_syn {
                ConnectionMatch {
                    conn_b: m.conn_b.with_roles_swapped(),
                    ..m
                }
            } else if m.conn_b.has_syn && !m.conn_a.has_syn {
                ConnectionMatch {
                    conn_a: m.conn_a.with_roles_swapped(),
                    ..m
                }
            } else {
                ConnectionMatch {
                    conn_b: m.conn_b.with_roles_swapped(),
                    ..m
                }
            }
        })
        .collect()
}
