mod common;

use common::conn_with_ipids;
use crosscap_lib::matching::serialize::{
    load_matches, matches_from_json, matches_to_json, save_matches,
};
use crosscap_lib::matching::{ConnectionMatch, MatchScore};

fn sample_matches() -> Vec<ConnectionMatch> {
    let mut score = MatchScore::exact("synopt isnC ipid".into());
    score.normalized = 0.87;
    score.force_accept = false;

    vec![
        ConnectionMatch {
            conn_a: conn_with_ipids(1, &[100, 101, 102]),
            conn_b: conn_with_ipids(2, &[100, 101, 102]),
            score,
        },
        ConnectionMatch {
            conn_a: conn_with_ipids(3, &[7, 8]),
            conn_b: conn_with_ipids(4, &[7, 8]),
            score: MatchScore::exact("trailer(client=10.0.0.1:40000)".into()),
        },
    ]
}

#[test]
fn round_trip_preserves_matches() {
    let matches = sample_matches();
    let json = matches_to_json(&matches, "a.pcap", "b.pcap", serde_json::Map::new()).unwrap();
    let (loaded, metadata) = matches_from_json(&json).unwrap();

    assert_eq!(metadata.version, "1.0");
    assert_eq!(metadata.file1, "a.pcap");
    assert_eq!(metadata.file2, "b.pcap");
    assert_eq!(loaded, matches);
}

#[test]
fn round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches.json");

    let matches = sample_matches();
    save_matches(&matches, &path, "a.pcap", "b.pcap", serde_json::Map::new()).unwrap();

    let (loaded, _) = load_matches(&path).unwrap();
    assert_eq!(loaded, matches);
}

#[test]
fn serialization_is_byte_stable() {
    let matches = sample_matches();
    let first = matches_to_json(&matches, "a.pcap", "b.pcap", serde_json::Map::new()).unwrap();
    let second = matches_to_json(&matches, "a.pcap", "b.pcap", serde_json::Map::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn ipid_sets_serialize_sorted() {
    let matches = vec![ConnectionMatch {
        conn_a: conn_with_ipids(1, &[900, 5, 300]),
        conn_b: conn_with_ipids(2, &[900, 5, 300]),
        score: MatchScore::exact("ipid".into()),
    }];
    let json = matches_to_json(&matches, "a", "b", serde_json::Map::new()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    let set: Vec<u64> = doc["matches"][0]["conn_a"]["ipid_set"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap())
        .collect();
    assert_eq!(set, vec![5, 300, 900], "sets must serialize in sorted order");
}

#[test]
fn unknown_version_is_accepted() {
    let matches = sample_matches();
    let json = matches_to_json(&matches, "a.pcap", "b.pcap", serde_json::Map::new()).unwrap();
    let json = json.replacen("\"version\": \"1.0\"", "\"version\": \"9.9\"", 1);

    let (loaded, metadata) = matches_from_json(&json).unwrap();
    assert_eq!(metadata.version, "9.9");
    assert_eq!(loaded.len(), 2);
}

#[test]
fn metadata_extra_fields_round_trip() {
    let mut metadata = serde_json::Map::new();
    metadata.insert("bucket_strategy".into(), "port".into());

    let json = matches_to_json(&sample_matches(), "a", "b", metadata).unwrap();
    let (_, loaded) = matches_from_json(&json).unwrap();
    assert_eq!(loaded.extra.get("bucket_strategy"), Some(&"port".into()));
}

#[test]
fn malformed_document_is_a_match_file_error() {
    let err = matches_from_json("{\"version\": ").unwrap_err();
    assert!(matches!(err, crosscap_lib::CrosscapError::MatchFile(_)));

    let err = load_matches("/nonexistent/matches.json").unwrap_err();
    assert!(matches!(err, crosscap_lib::CrosscapError::MatchFile(_)));
}
