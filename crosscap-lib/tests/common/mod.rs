//! Shared test fixtures.

#![allow(dead_code)]

use std::net::IpAddr;

use crosscap_lib::connection::Connection;
use crosscap_lib::ingest::Packet;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap_or_else(|_| panic!("invalid test IP: {s}"))
}

/// Linux-style SYN options blob: MSS 1460, SACK permitted, timestamps,
/// NOP, window scale 7.
pub const SYN_OPTIONS_HEX: &str = "020405b40402080a000000010000000001030307";

/// A connection with a full handshake and a few IP-IDs; tests override
/// fields as needed.
pub fn base_conn(flow_id: u64) -> Connection {
    Connection {
        flow_id,
        protocol: 6,
        client_ip: ip("10.0.0.1"),
        client_port: 40000 + flow_id as u16,
        server_ip: ip("192.168.1.10"),
        server_port: 443,
        has_syn: true,
        syn_timestamp: 100.0,
        syn_options: "mss=1460;ws=7;sack=1;ts=1".to_string(),
        client_isn: 111_111,
        server_isn: 222_222,
        tsval: "900000".to_string(),
        tsecr: "0".to_string(),
        client_payload_md5: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
        server_payload_md5: "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string(),
        length_signature: "C:517 S:1460 C:93".to_string(),
        is_header_only: false,
        ipid_first: 1000,
        ipid_set: [1000u16, 1001, 1002, 1003].into_iter().collect(),
        client_ipid_set: [1000u16, 1001].into_iter().collect(),
        server_ipid_set: [1002u16, 1003].into_iter().collect(),
        first_packet_time: 100.0,
        last_packet_time: 130.0,
        packet_count: 12,
        client_ttl: 64,
        server_ttl: 57,
        total_bytes: 9000,
    }
}

/// Same as [`base_conn`] with an explicit IP-ID set (split evenly per
/// direction).
pub fn conn_with_ipids(flow_id: u64, ids: &[u16]) -> Connection {
    let mut conn = base_conn(flow_id);
    conn.ipid_set = ids.iter().copied().collect();
    let half = ids.len() / 2;
    conn.client_ipid_set = ids[..half].iter().copied().collect();
    conn.server_ipid_set = ids[half..].iter().copied().collect();
    conn.ipid_first = ids.first().copied().unwrap_or(0);
    conn
}

/// A minimal TCP packet; tests override fields as needed.
pub fn packet(frame: u64, flow: u64, src: &str, sport: u16, dst: &str, dport: u16) -> Packet {
    Packet {
        frame_number: frame,
        flow_id: flow,
        protocol: 6,
        src_ip: ip(src),
        dst_ip: ip(dst),
        src_port: sport,
        dst_port: dport,
        flags: 0x10,
        seq: 0,
        ack: 0,
        options: String::new(),
        payload_len: 0,
        ip_id: 0,
        timestamp: 0.0,
        tsval: String::new(),
        tsecr: String::new(),
        payload_hex: String::new(),
        ttl: 64,
        frame_len: 60,
    }
}
