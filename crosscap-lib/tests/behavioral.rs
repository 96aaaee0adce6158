mod common;

use common::conn_with_ipids;
use crosscap_lib::matching::behavioral::{BehavioralMatcher, BehavioralWeights};
use crosscap_lib::matching::{BucketStrategy, CancelToken, MatchMode};

fn matcher(threshold: f64) -> BehavioralMatcher {
    BehavioralMatcher::new(
        BucketStrategy::Auto,
        threshold,
        MatchMode::OneToOne,
        BehavioralWeights::default(),
    )
}

#[test]
fn identical_behavior_scores_one() {
    // Same timing and byte totals, disjoint IP-IDs: invisible to the
    // fingerprint scorer, perfect for the behavioral one.
    let a = conn_with_ipids(1, &[1, 2, 3]);
    let b = conn_with_ipids(2, &[900, 901, 902]);

    let matches = matcher(0.95).match_connections(&[a], &[b], &CancelToken::new());
    assert_eq!(matches.len(), 1);
    assert!(matches[0].score.normalized > 0.99);
    assert!(matches[0].score.evidence.starts_with("behav("));
}

#[test]
fn disjoint_time_ranges_score_low() {
    let a = conn_with_ipids(1, &[1, 2, 3]);
    let mut b = conn_with_ipids(2, &[1, 2, 3]);
    b.first_packet_time = 5000.0;
    b.last_packet_time = 5030.0;

    let matches = matcher(0.95).match_connections(&[a], &[b], &CancelToken::new());
    assert!(matches.is_empty());
}

#[test]
fn byte_total_similarity_is_ratio_based() {
    let a = conn_with_ipids(1, &[1, 2, 3]);
    let mut b = conn_with_ipids(2, &[1, 2, 3]);
    b.total_bytes = a.total_bytes * 10;

    // Overlap, duration and IAT still agree; only bytes drag the
    // score down by their weight.
    let matches = matcher(0.60).match_connections(&[a], &[b], &CancelToken::new());
    assert_eq!(matches.len(), 1);
    let score = matches[0].score.normalized;
    assert!(score < 0.95 && score > 0.7, "score: {score}");
}

#[test]
fn one_to_one_selection_applies() {
    let a = conn_with_ipids(1, &[1, 2, 3]);
    let b1 = conn_with_ipids(10, &[4, 5, 6]);
    let b2 = conn_with_ipids(11, &[7, 8, 9]);

    let matches = matcher(0.5).match_connections(&[a], &[b1, b2], &CancelToken::new());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].conn_b.flow_id, 10);
}
