//! Summary statistics over a completed match run.

use ahash::AHashMap;

use crate::connection::Connection;
use crate::matching::ConnectionMatch;

/// Aggregate counters for report rendering. In one-to-many mode
/// `matched_pairs` can exceed either side's connection count.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStats {
    pub total_a: usize,
    pub total_b: usize,
    pub matched_pairs: usize,
    pub unique_matched_a: usize,
    pub unique_matched_b: usize,
    pub unmatched_a: usize,
    pub unmatched_b: usize,
    pub match_rate_a: f64,
    pub match_rate_b: f64,
    pub average_score: f64,
    /// Most matches any single connection participates in, per side
    pub max_matches_per_conn_a: usize,
    pub max_matches_per_conn_b: usize,
    /// Mean matches per matched connection, per side
    pub avg_matches_per_conn_a: f64,
    pub avg_matches_per_conn_b: f64,
}

impl MatchStats {
    pub fn collect(
        side_a: &[Connection],
        side_b: &[Connection],
        matches: &[ConnectionMatch],
    ) -> MatchStats {
        let mut counts_a: AHashMap<u64, usize> = AHashMap::new();
        let mut counts_b: AHashMap<u64, usize> = AHashMap::new();
        for m in matches {
            *counts_a.entry(m.conn_a.flow_id).or_insert(0) += 1;
            *counts_b.entry(m.conn_b.flow_id).or_insert(0) += 1;
        }

        let average_score = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.score.normalized).sum::<f64>() / matches.len() as f64
        };

        let rate = |matched: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                matched as f64 / total as f64
            }
        };

        MatchStats {
            total_a: side_a.len(),
            total_b: side_b.len(),
            matched_pairs: matches.len(),
            unique_matched_a: counts_a.len(),
            unique_matched_b: counts_b.len(),
            unmatched_a: side_a.len().saturating_sub(counts_a.len()),
            unmatched_b: side_b.len().saturating_sub(counts_b.len()),
            match_rate_a: rate(counts_a.len(), side_a.len()),
            match_rate_b: rate(counts_b.len(), side_b.len()),
            average_score,
            max_matches_per_conn_a: counts_a.values().copied().max().unwrap_or(0),
            max_matches_per_conn_b: counts_b.values().copied().max().unwrap_or(0),
            avg_matches_per_conn_a: average(&counts_a),
            avg_matches_per_conn_b: average(&counts_b),
        }
    }
}

fn average(counts: &AHashMap<u64, usize>) -> f64 {
    if counts.is_empty() {
        0.0
    } else {
        counts.values().sum::<usize>() as f64 / counts.len() as f64
    }
}
