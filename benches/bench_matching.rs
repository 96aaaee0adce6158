//! End-to-end matching benchmark over synthetic connection pools.
//!
//! ```bash
//! cargo bench --bench bench_matching
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

use crosscap_lib::connection::Connection;
use crosscap_lib::matching::{BucketStrategy, CancelToken, FingerprintMatcher, MatchMode};

const POOL_SIZE: u64 = 200;

fn connection(flow_id: u64, client_last_octet: u8) -> Connection {
    let base = (flow_id as u16).wrapping_mul(17).wrapping_add(100).max(1);
    Connection {
        flow_id,
        protocol: 6,
        client_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, client_last_octet)),
        client_port: 40000 + (flow_id % 20000) as u16,
        server_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        server_port: 443,
        has_syn: true,
        syn_timestamp: 1_700_000_000.0 + flow_id as f64,
        syn_options: "mss=1460;ws=7;sack=1;ts=1".to_string(),
        client_isn: flow_id as u32 * 7919,
        server_isn: flow_id as u32 * 104729,
        tsval: format!("{}", 900_000 + flow_id),
        tsecr: "0".to_string(),
        client_payload_md5: format!("{flow_id:032x}"),
        server_payload_md5: format!("{:032x}", flow_id + 1),
        length_signature: "C:517 S:1460 C:93".to_string(),
        is_header_only: false,
        ipid_first: base,
        ipid_set: (base..base + 6).collect(),
        client_ipid_set: (base..base + 3).collect(),
        server_ipid_set: (base + 3..base + 6).collect(),
        first_packet_time: 1_700_000_000.0 + flow_id as f64,
        last_packet_time: 1_700_000_010.0 + flow_id as f64,
        packet_count: 12,
        client_ttl: 64,
        server_ttl: 57,
        total_bytes: 9_000,
    }
}

fn pools() -> (Vec<Connection>, Vec<Connection>) {
    let side_a: Vec<Connection> = (0..POOL_SIZE).map(|id| connection(id, 1)).collect();
    // Same flows observed behind a SNAT device: client address rewritten.
    let side_b: Vec<Connection> = (0..POOL_SIZE).map(|id| connection(id, 2)).collect();
    (side_a, side_b)
}

fn bench_one_to_one(c: &mut Criterion) {
    let (side_a, side_b) = pools();
    let matcher = FingerprintMatcher::new(BucketStrategy::Auto, 0.60, MatchMode::OneToOne);
    let cancel = CancelToken::new();

    c.bench_function("match_200x200_one_to_one", |bench| {
        bench.iter(|| matcher.match_connections(black_box(&side_a), black_box(&side_b), &cancel))
    });
}

fn bench_one_to_many(c: &mut Criterion) {
    let (side_a, side_b) = pools();
    let matcher = FingerprintMatcher::new(BucketStrategy::Auto, 0.60, MatchMode::OneToMany);
    let cancel = CancelToken::new();

    c.bench_function("match_200x200_one_to_many", |bench| {
        bench.iter(|| matcher.match_connections(black_box(&side_a), black_box(&side_b), &cancel))
    });
}

criterion_group!(benches, bench_one_to_one, bench_one_to_many);
criterion_main!(benches);
