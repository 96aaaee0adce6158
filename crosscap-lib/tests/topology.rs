mod common;

use common::{conn_with_ipids, ip};
use crosscap_lib::matching::{ConnectionMatch, MatchScore};
use crosscap_lib::roles::RoleDetector;
use crosscap_lib::topology::{
    capture_sequence, hops, initial_ttl, most_common_hops, CapturePoint, CapturePosition,
    EndpointStatsCollector, TopologyAnalyzer,
};

fn matched_pair(flow_a: u64, flow_b: u64) -> ConnectionMatch {
    ConnectionMatch {
        conn_a: conn_with_ipids(flow_a, &[100, 101, 102]),
        conn_b: conn_with_ipids(flow_b, &[100, 101, 102]),
        score: MatchScore::exact("test".into()),
    }
}

#[test]
fn initial_ttl_is_smallest_standard_value_at_or_above() {
    assert_eq!(initial_ttl(0), None);
    assert_eq!(initial_ttl(1), Some(64));
    assert_eq!(initial_ttl(64), Some(64));
    assert_eq!(initial_ttl(65), Some(128));
    assert_eq!(initial_ttl(128), Some(128));
    assert_eq!(initial_ttl(129), Some(255));
    assert_eq!(initial_ttl(255), Some(255));
}

#[test]
fn hops_is_initial_minus_observed() {
    for ttl in 1..=255u8 {
        let initial = initial_ttl(ttl).unwrap();
        assert_eq!(hops(ttl), Some(initial - ttl));
    }
    assert_eq!(hops(0), None);
    assert_eq!(hops(60), Some(4));
    assert_eq!(hops(120), Some(8));
    assert_eq!(hops(240), Some(15));
}

#[test]
fn most_common_hops_ignores_missing_ttls() {
    assert_eq!(most_common_hops(&[60, 60, 61, 64]), Some(4));
    assert_eq!(most_common_hops(&[0, 0]), None);
    assert_eq!(most_common_hops(&[]), None);
}

#[test]
fn endpoint_stats_aggregate_by_service_tuple() {
    let mut collector = EndpointStatsCollector::new(RoleDetector::new());
    // Three matches between the same endpoints; client ports differ
    // per flow but are excluded from the tuple.
    for k in 0..3 {
        collector.add_match(matched_pair(k, 100 + k));
    }
    collector.finalize();

    let stats = collector.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].count, 3);
    assert_eq!(stats[0].tuple_a.server_port, 443);
    assert_eq!(stats[0].client_ttl_a, 64);
    assert_eq!(stats[0].server_ttl_a, 57);
    assert_eq!(stats[0].client_hops_a, Some(0));
    assert_eq!(stats[0].server_hops_a, Some(7));
}

#[test]
fn low_confidence_pairs_also_emit_the_reversed_reading() {
    let mut collector = EndpointStatsCollector::new(RoleDetector::new());

    // No SYN, no helpful ports: detection falls to the smaller-port
    // fallback at VeryLow confidence.
    let mut m = matched_pair(1, 2);
    for conn in [&mut m.conn_a, &mut m.conn_b] {
        conn.has_syn = false;
        conn.client_port = 45000;
        conn.server_port = 47000;
    }
    collector.add_match(m);
    collector.finalize();

    let stats = collector.stats();
    assert_eq!(stats.len(), 2);
    let ports: Vec<u16> = stats.iter().map(|s| s.tuple_a.server_port).collect();
    // The fallback picks 45000 as server; the hedge also records 47000.
    assert!(ports.contains(&45000) && ports.contains(&47000));
}

#[test]
fn high_confidence_pairs_are_not_hedged() {
    let mut collector = EndpointStatsCollector::new(RoleDetector::new());
    collector.add_match(matched_pair(1, 2));
    collector.finalize();
    assert_eq!(collector.stats().len(), 1);
}

#[test]
fn capture_sequence_prefers_fewer_client_hops() {
    assert_eq!(
        capture_sequence(Some(0), Some(4), Some(2), Some(2)),
        Some((CapturePoint::A, CapturePoint::B))
    );
    assert_eq!(
        capture_sequence(Some(2), Some(2), Some(0), Some(4)),
        Some((CapturePoint::B, CapturePoint::A))
    );
}

#[test]
fn capture_sequence_breaks_client_ties_with_server_hops() {
    assert_eq!(
        capture_sequence(Some(1), Some(5), Some(1), Some(2)),
        Some((CapturePoint::A, CapturePoint::B))
    );
}

#[test]
fn capture_sequence_detects_terminating_device() {
    // Opposite zero hops with disagreeing deltas mark a middle device
    // that terminates and re-initiates connections; the point with
    // zero server hops renders on the client side.
    assert_eq!(
        capture_sequence(Some(0), Some(3), Some(5), Some(0)),
        Some((CapturePoint::B, CapturePoint::A))
    );
    assert_eq!(
        capture_sequence(Some(5), Some(0), Some(0), Some(3)),
        Some((CapturePoint::A, CapturePoint::B))
    );
}

#[test]
fn capture_sequence_unknown_when_equal_or_missing() {
    assert_eq!(capture_sequence(Some(1), Some(1), Some(1), Some(1)), None);
    assert_eq!(capture_sequence(None, Some(1), Some(1), Some(1)), None);
    assert_eq!(capture_sequence(Some(1), None, Some(1), Some(1)), None);
}

#[test]
fn analyzer_reports_per_service_topology() {
    let mut matches = Vec::new();
    for k in 0..2 {
        let mut m = matched_pair(k, 10 + k);
        // Capture A is one hop from the client; capture B is four.
        m.conn_a.client_ttl = 63;
        m.conn_a.server_ttl = 59;
        m.conn_b.client_ttl = 60;
        m.conn_b.server_ttl = 62;
        m.conn_b.client_ip = ip("172.16.0.9");
        matches.push(m);
    }

    let info = TopologyAnalyzer::new(matches, "a.pcap", "b.pcap").analyze();
    assert_eq!(info.file_a, "a.pcap");
    assert_eq!(info.services.len(), 1);

    let service = &info.services[0];
    assert_eq!(service.key.server_port, 443);
    assert_eq!(service.connection_count, 2);
    assert_eq!(service.client_hops_a, Some(1));
    assert_eq!(service.server_hops_a, Some(5));
    assert_eq!(service.client_hops_b, Some(4));
    assert_eq!(service.server_hops_b, Some(2));
    assert_eq!(service.position, CapturePosition::ACloserToClient);
    assert_eq!(service.sequence, Some((CapturePoint::A, CapturePoint::B)));
}

#[test]
fn analyzer_handles_no_matches() {
    let info = TopologyAnalyzer::new(Vec::new(), "a.pcap", "b.pcap").analyze();
    assert!(info.services.is_empty());
}

#[test]
fn analyzer_is_unknown_without_ttl_data() {
    let mut m = matched_pair(1, 2);
    m.conn_a.client_ttl = 0;
    m.conn_a.server_ttl = 0;
    m.conn_b.client_ttl = 0;
    m.conn_b.server_ttl = 0;

    let info = TopologyAnalyzer::new(vec![m], "a.pcap", "b.pcap").analyze();
    assert_eq!(info.services[0].position, CapturePosition::Unknown);
    assert_eq!(info.services[0].sequence, None);
}

#[test]
fn service_group_mapping_loads_ports() {
    use crosscap_lib::topology::{load_service_groups, ServiceKey};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("groups.json");
    std::fs::write(&path, r#"{"443": 1, "8080": 2}"#).unwrap();

    let mapping = load_service_groups(&path).unwrap();
    assert_eq!(mapping.len(), 2);
    assert_eq!(
        mapping.get(&ServiceKey {
            server_port: 443,
            protocol: 6
        }),
        Some(&1)
    );
}

#[test]
fn service_group_mapping_rejects_bad_ports() {
    use crosscap_lib::topology::load_service_groups;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("groups.json");
    std::fs::write(&path, r#"{"not-a-port": 1}"#).unwrap();

    assert!(load_service_groups(&path).is_err());
}
