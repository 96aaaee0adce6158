mod common;

use common::{conn_with_ipids, ip};
use crosscap_lib::connection::Connection;
use crosscap_lib::matching::{
    align_directions, choose_auto_strategy, BucketStrategy, CancelToken, ConnectionMatch,
    FingerprintMatcher, MatchMode, MatchScore, MatchStats,
};

fn matcher(mode: MatchMode) -> FingerprintMatcher {
    FingerprintMatcher::new(BucketStrategy::Auto, 0.60, mode)
}

#[test]
fn matches_identical_flows() {
    let side_a = vec![conn_with_ipids(1, &[100, 101, 102])];
    let side_b = vec![conn_with_ipids(9, &[100, 101, 102])];

    let matches = matcher(MatchMode::OneToOne).match_connections(&side_a, &side_b, &CancelToken::new());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].conn_a.flow_id, 1);
    assert_eq!(matches[0].conn_b.flow_id, 9);
    assert!(matches[0].score.normalized >= 0.8);
}

#[test]
fn one_to_one_uses_each_connection_once() {
    // Two identical candidates on side B; only one may win.
    let side_a = vec![conn_with_ipids(1, &[100, 101, 102])];
    let side_b = vec![
        conn_with_ipids(10, &[100, 101, 102]),
        conn_with_ipids(11, &[100, 101, 102]),
    ];

    let matches = matcher(MatchMode::OneToOne).match_connections(&side_a, &side_b, &CancelToken::new());
    assert_eq!(matches.len(), 1);
    // Equal scores tie-break on ascending flow id.
    assert_eq!(matches[0].conn_b.flow_id, 10);
}

#[test]
fn one_long_flow_spans_sixteen_windows() {
    // One 1000-second flow on side A; sixteen windows of the same
    // 5-tuple on side B, each sharing two of A's IP-IDs.
    let a_ids: Vec<u16> = (1000..1032).collect();
    let mut long_flow = conn_with_ipids(1, &a_ids);
    long_flow.first_packet_time = 0.0;
    long_flow.last_packet_time = 1000.0;
    long_flow.packet_count = 1000;

    let side_b: Vec<Connection> = (0..16)
        .map(|k| {
            let ids = [1000 + 2 * k as u16, 1001 + 2 * k as u16];
            let mut window = conn_with_ipids(100 + k as u64, &ids);
            window.client_port = long_flow.client_port;
            window.first_packet_time = 62.5 * k as f64;
            window.last_packet_time = 62.5 * (k + 1) as f64;
            window.packet_count = 60;
            window
        })
        .collect();

    let side_a = vec![long_flow];

    let many = matcher(MatchMode::OneToMany).match_connections(&side_a, &side_b, &CancelToken::new());
    assert_eq!(many.len(), 16);
    assert!(many.iter().all(|m| m.conn_a.flow_id == 1));

    let one = matcher(MatchMode::OneToOne).match_connections(&side_a, &side_b, &CancelToken::new());
    assert_eq!(one.len(), 1);
}

#[test]
fn auto_strategy_detects_snat() {
    // Same servers, disjoint clients: SNAT, so bucket by port.
    let mut a = conn_with_ipids(1, &[1, 2]);
    a.client_ip = ip("10.0.0.1");
    let mut b = conn_with_ipids(2, &[1, 2]);
    b.client_ip = ip("172.16.0.99");

    assert_eq!(choose_auto_strategy(&[a], &[b]), BucketStrategy::Port);
}

#[test]
fn auto_strategy_prefers_server_for_identical_server_sets() {
    let a = conn_with_ipids(1, &[1, 2]);
    let b = conn_with_ipids(2, &[1, 2]);
    // Same clients and servers on both sides.
    assert_eq!(choose_auto_strategy(&[a], &[b]), BucketStrategy::Server);
}

#[test]
fn port_bucketing_still_matches_translated_addresses() {
    let mut a = conn_with_ipids(1, &[100, 101, 102]);
    a.client_ip = ip("10.0.0.1");
    a.server_ip = ip("192.168.1.1");

    let mut b = conn_with_ipids(2, &[100, 101, 102]);
    b.client_ip = ip("172.16.0.1");
    b.server_ip = ip("10.10.10.1");

    let matches = FingerprintMatcher::new(BucketStrategy::Port, 0.60, MatchMode::OneToOne)
        .match_connections(&[a], &[b], &CancelToken::new());
    assert_eq!(matches.len(), 1);
}

#[test]
fn no_common_port_produces_no_match() {
    let a = conn_with_ipids(1, &[100, 101, 102]);
    let mut b = conn_with_ipids(2, &[100, 101, 102]);
    b.client_port = 9000;
    b.server_port = 8080;

    let matches = FingerprintMatcher::new(BucketStrategy::None, 0.0, MatchMode::OneToOne)
        .match_connections(&[a], &[b], &CancelToken::new());
    assert!(matches.is_empty());
}

#[test]
fn matching_is_deterministic() {
    let mut side_a = Vec::new();
    let mut side_b = Vec::new();
    for k in 0..20u64 {
        let ids: Vec<u16> = (100 * k as u16..100 * k as u16 + 5).map(|v| v + 1).collect();
        side_a.push(conn_with_ipids(k, &ids));
        side_b.push(conn_with_ipids(1000 + k, &ids));
    }

    let m = matcher(MatchMode::OneToOne);
    let cancel = CancelToken::new();
    let first = m.match_connections(&side_a, &side_b, &cancel);
    let second = m.match_connections(&side_a, &side_b, &cancel);

    assert_eq!(first.len(), second.len());
    for (x, y) in first.iter().zip(second.iter()) {
        assert_eq!(x.conn_a.flow_id, y.conn_a.flow_id);
        assert_eq!(x.conn_b.flow_id, y.conn_b.flow_id);
        assert_eq!(x.score, y.score);
    }
}

#[test]
fn cancellation_returns_partial_results() {
    let side_a = vec![conn_with_ipids(1, &[100, 101, 102])];
    let side_b = vec![conn_with_ipids(2, &[100, 101, 102])];

    let cancel = CancelToken::new();
    cancel.cancel();
    let matches = matcher(MatchMode::OneToOne).match_connections(&side_a, &side_b, &cancel);
    assert!(matches.is_empty());
}

#[test]
fn alignment_swaps_the_side_without_a_syn() {
    let mut a = conn_with_ipids(1, &[100, 101, 102]);
    a.has_syn = true;

    // Same flow, but the other capture labeled roles backwards and
    // never saw the SYN.
    let mut b = conn_with_ipids(2, &[100, 101, 102]).with_roles_swapped();
    b.has_syn = false;

    let matches = vec![ConnectionMatch {
        conn_a: a.clone(),
        conn_b: b,
        score: MatchScore::exact("test".into()),
    }];

    let aligned = align_directions(matches);
    assert_eq!(aligned[0].conn_a.server_port, aligned[0].conn_b.server_port);
    assert_eq!(aligned[0].conn_b.server_port, a.server_port);
}

#[test]
fn alignment_keeps_already_consistent_pairs() {
    let a = conn_with_ipids(1, &[100, 101, 102]);
    let b = conn_with_ipids(2, &[100, 101, 102]);
    let before = b.clone();

    let aligned = align_directions(vec![ConnectionMatch {
        conn_a: a,
        conn_b: b,
        score: MatchScore::exact("test".into()),
    }]);
    assert_eq!(aligned[0].conn_b, before);
}

#[test]
fn stats_count_matched_and_unmatched() {
    let side_a = vec![
        conn_with_ipids(1, &[100, 101, 102]),
        conn_with_ipids(2, &[900, 901, 902]),
    ];
    let side_b = vec![conn_with_ipids(3, &[100, 101, 102])];

    let matches = matcher(MatchMode::OneToOne).match_connections(&side_a, &side_b, &CancelToken::new());
    let stats = MatchStats::collect(&side_a, &side_b, &matches);

    assert_eq!(stats.matched_pairs, 1);
    assert_eq!(stats.unique_matched_a, 1);
    assert_eq!(stats.unmatched_a, 1);
    assert_eq!(stats.unmatched_b, 0);
    assert!((stats.match_rate_b - 1.0).abs() < 1e-9);
}
