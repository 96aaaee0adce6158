//! Folds decoded packets into [`Connection`] summaries.

use ahash::{AHashMap, AHashSet};
use md5::{Digest, Md5};
use std::net::IpAddr;
use tracing::debug;

use crate::connection::types::Connection;
use crate::ingest::Packet;
use crate::similarity::most_common;

/// Maximum payload bytes fed to the per-direction MD5 (512 hex chars).
const PAYLOAD_HASH_BYTES: usize = 256;

/// Packets scanned for the length signature.
const LENGTH_SIGNATURE_WINDOW: usize = 20;

/// How packets are grouped into connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupMode {
    /// One connection per decoder-assigned flow key.
    #[default]
    PerFlow,
    /// One connection per direction-independent 5-tuple; folds port
    /// reuse across time into a single summary.
    FiveTupleMerge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Flow(u64),
    Tuple(IpAddr, u16, IpAddr, u16),
}

/// Accumulates packets and builds one [`Connection`] per group.
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    mode: GroupMode,
    groups: AHashMap<GroupKey, Vec<Packet>>,
}

impl ConnectionBuilder {
    pub fn new(mode: GroupMode) -> Self {
        ConnectionBuilder {
            mode,
            groups: AHashMap::new(),
        }
    }

    pub fn push(&mut self, packet: Packet) {
        let key = match self.mode {
            GroupMode::PerFlow => GroupKey::Flow(packet.flow_id),
            GroupMode::FiveTupleMerge => {
                let a = (packet.src_ip, packet.src_port);
                let b = (packet.dst_ip, packet.dst_port);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                GroupKey::Tuple(lo.0, lo.1, hi.0, hi.1)
            }
        };
        self.groups.entry(key).or_default().push(packet);
    }

    pub fn extend<I: IntoIterator<Item = Packet>>(&mut self, packets: I) {
        for p in packets {
            self.push(p);
        }
    }

    /// Build all connections, ordered by flow id.
    pub fn build(self) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self
            .groups
            .into_values()
            .filter_map(build_connection)
            .collect();
        connections.sort_by_key(|c| c.flow_id);
        debug!(connections = connections.len(), "built connection summaries");
        connections
    }
}

/// Convenience: group and summarize a packet list in one step.
pub fn build_connections(packets: Vec<Packet>, mode: GroupMode) -> Vec<Connection> {
    let mut builder = ConnectionBuilder::new(mode);
    builder.extend(packets);
    builder.build()
}

fn build_connection(mut packets: Vec<Packet>) -> Option<Connection> {
    if packets.is_empty() {
        return None;
    }

    packets.sort_by_key(|p| p.frame_number);

    let syn = packets.iter().find(|p| p.is_syn());
    let syn_ack = packets.iter().find(|p| p.is_syn_ack());

    // The SYN source is the client; without a handshake the first
    // packet's source is the provisional client.
    let (client_ip, client_port, server_ip, server_port) = match syn {
        Some(s) => (s.src_ip, s.src_port, s.dst_ip, s.dst_port),
        None => {
            let first = &packets[0];
            (first.src_ip, first.src_port, first.dst_ip, first.dst_port)
        }
    };

    let has_syn = syn.is_some();
    let (syn_timestamp, syn_options, client_isn, ipid_first) = match syn {
        Some(s) => (
            s.timestamp,
            syn_options_fingerprint(&s.options),
            s.seq,
            s.ip_id,
        ),
        None => (packets[0].timestamp, String::new(), 0, packets[0].ip_id),
    };
    let server_isn = syn_ack.map(|p| p.seq).unwrap_or(0);

    let (tsval, tsecr) = match syn {
        Some(s) => (s.tsval.clone(), s.tsecr.clone()),
        None => (packets[0].tsval.clone(), packets[0].tsecr.clone()),
    };

    let is_header_only = packets.iter().all(|p| p.payload_len == 0);

    let (client_payload_md5, server_payload_md5) = payload_hashes(&packets, client_ip);
    let length_signature = length_signature(&packets, client_ip);

    let first_packet_time = packets
        .iter()
        .map(|p| p.timestamp)
        .fold(f64::INFINITY, f64::min);
    let last_packet_time = packets
        .iter()
        .map(|p| p.timestamp)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut ipid_set: AHashSet<u16> = AHashSet::new();
    let mut client_ipid_set: AHashSet<u16> = AHashSet::new();
    let mut server_ipid_set: AHashSet<u16> = AHashSet::new();
    for p in &packets {
        if p.ip_id == 0 {
            continue;
        }
        ipid_set.insert(p.ip_id);
        if p.src_ip == client_ip {
            client_ipid_set.insert(p.ip_id);
        } else if p.src_ip == server_ip {
            server_ipid_set.insert(p.ip_id);
        }
    }
    // Continuity fallback for flows where every id is zero.
    if ipid_set.is_empty() {
        ipid_set.insert(ipid_first);
    }

    let client_ttls: Vec<u8> = packets
        .iter()
        .filter(|p| p.src_ip == client_ip && p.ttl > 0)
        .map(|p| p.ttl)
        .collect();
    let server_ttls: Vec<u8> = packets
        .iter()
        .filter(|p| p.src_ip == server_ip && p.ttl > 0)
        .map(|p| p.ttl)
        .collect();

    let total_bytes = packets.iter().map(|p| u64::from(p.frame_len)).sum();

    // Merged groups keep the smallest flow id as their identity.
    let flow_id = packets.iter().map(|p| p.flow_id).min().unwrap_or(0);

    Some(Connection {
        flow_id,
        protocol: packets[0].protocol,
        client_ip,
        client_port,
        server_ip,
        server_port,
        has_syn,
        syn_timestamp,
        syn_options,
        client_isn,
        server_isn,
        tsval,
        tsecr,
        client_payload_md5,
        server_payload_md5,
        length_signature,
        is_header_only,
        ipid_first,
        ipid_set,
        client_ipid_set,
        server_ipid_set,
        first_packet_time,
        last_packet_time,
        packet_count: packets.len(),
        client_ttl: most_common(&client_ttls).unwrap_or(0),
        server_ttl: most_common(&server_ttls).unwrap_or(0),
        total_bytes,
    })
}

/// First-payload MD5 per direction: the first packet with nonzero
/// payload on each side contributes the hash of its leading bytes.
fn payload_hashes(packets: &[Packet], client_ip: IpAddr) -> (String, String) {
    let mut client_md5 = String::new();
    let mut server_md5 = String::new();

    for p in packets {
        if p.payload_len == 0 || p.payload_hex.is_empty() {
            continue;
        }
        let from_client = p.src_ip == client_ip;
        if from_client && client_md5.is_empty() {
            client_md5 = md5_of_hex(&p.payload_hex);
        } else if !from_client && server_md5.is_empty() {
            server_md5 = md5_of_hex(&p.payload_hex);
        }
        if !client_md5.is_empty() && !server_md5.is_empty() {
            break;
        }
    }

    (client_md5, server_md5)
}

/// MD5 over the first [`PAYLOAD_HASH_BYTES`] decoded from a hex blob.
/// Unparsable hex yields an empty digest string.
fn md5_of_hex(payload_hex: &str) -> String {
    let cleaned: String = payload_hex.chars().filter(|c| *c != ':').collect();
    let mut truncated = &cleaned[..cleaned.len().min(PAYLOAD_HASH_BYTES * 2)];
    if truncated.len() % 2 != 0 {
        truncated = &truncated[..truncated.len() - 1];
    }
    match hex::decode(truncated) {
        Ok(bytes) => {
            let digest = Md5::digest(&bytes);
            hex::encode(digest)
        }
        Err(_) => String::new(),
    }
}

/// Direction-tagged payload lengths over the first packets of a flow.
fn length_signature(packets: &[Packet], client_ip: IpAddr) -> String {
    let mut tokens = Vec::new();
    for p in packets.iter().take(LENGTH_SIGNATURE_WINDOW) {
        if p.payload_len == 0 {
            continue;
        }
        let direction = if p.src_ip == client_ip { 'C' } else { 'S' };
        tokens.push(format!("{direction}:{}", p.payload_len));
    }
    tokens.join(" ")
}

/// Condense a SYN's raw TCP options blob into the handshake fingerprint
/// `mss=X;ws=Y;sack=Z;ts=W`.
///
/// Walks the option TLVs: MSS (kind 2), window scale (kind 3), SACK
/// permitted (kind 4), timestamps (kind 8). Absent options render as 0.
/// A SYN with no or unparsable options still yields the all-zero
/// fingerprint so the handshake remains comparable.
pub fn syn_options_fingerprint(options_hex: &str) -> String {
    let cleaned: String = options_hex.chars().filter(|c| *c != ':').collect();
    let bytes = hex::decode(&cleaned).unwrap_or_default();

    let mut mss: u16 = 0;
    let mut ws: u8 = 0;
    let mut sack = false;
    let mut ts = false;

    let mut rest = bytes.as_slice();
    while let Some((&kind, tail)) = rest.split_first() {
        match kind {
            0 => break, // EOL
            1 => rest = tail,
            _ => {
                let Some((&len_byte, data)) = tail.split_first() else {
                    break;
                };
                let data_len = (len_byte as usize).saturating_sub(2);
                let Some(option_data) = data.get(..data_len) else {
                    break;
                };

                match kind {
                    2 if data_len == 2 => {
                        mss = u16::from_be_bytes([option_data[0], option_data[1]]);
                    }
                    3 if data_len == 1 => ws = option_data[0],
                    4 => sack = true,
                    8 => ts = true,
                    _ => {}
                }

                let Some(next) = data.get(data_len..) else {
                    break;
                };
                rest = next;
            }
        }
    }

    format!(
        "mss={mss};ws={ws};sack={};ts={}",
        u8::from(sack),
        u8::from(ts)
    )
}
