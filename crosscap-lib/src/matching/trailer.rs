//! Vendor-trailer exact matching (stage 1).
//!
//! Capture devices that append a per-frame trailer record the peer-side
//! client endpoint as the device observed it. On the side captured
//! behind the device the trailer names the front-side client; on the
//! front side the packet header itself does. Key equality proves the
//! two flows are the same connection.

use ahash::AHashMap;
use std::net::IpAddr;
use tracing::info;

use crate::connection::Connection;
use crate::ingest::TrailerRecord;
use crate::matching::score::MatchScore;
use crate::matching::ConnectionMatch;

/// A flow pair proven identical by trailer evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailerMatch {
    pub flow_a: u64,
    pub flow_b: u64,
    /// Front-side client endpoint recorded by the device
    pub client_ip: IpAddr,
    pub client_port: u16,
}

/// Match flows across the two sides of a trailer-annotating device.
///
/// `side_a` is captured behind the device (trailer carries the peer
/// client), `side_b` in front of it (the packet source is the client).
pub fn match_by_trailer(side_a: &[TrailerRecord], side_b: &[TrailerRecord]) -> Vec<TrailerMatch> {
    // First SYN per flow on side A, keyed by the trailer's peer client.
    let mut peer_by_flow: AHashMap<u64, (IpAddr, u16)> = AHashMap::new();
    for rec in side_a {
        if !rec.is_syn() || peer_by_flow.contains_key(&rec.flow_id) {
            continue;
        }
        if let (Some(&ip), Some(&port)) = (rec.peer_addrs.first(), rec.peer_ports.first()) {
            peer_by_flow.insert(rec.flow_id, (ip, port));
        }
    }

    // First SYN per flow on side B, keyed by the actual packet source.
    let mut flows_by_client: AHashMap<(IpAddr, u16), Vec<u64>> = AHashMap::new();
    let mut seen_b: ahash::AHashSet<u64> = ahash::AHashSet::new();
    for rec in side_b {
        if !rec.is_syn() || !seen_b.insert(rec.flow_id) {
            continue;
        }
        flows_by_client
            .entry((rec.src_ip, rec.src_port))
            .or_default()
            .push(rec.flow_id);
    }

    let mut pairs: Vec<TrailerMatch> = Vec::new();
    for (&flow_a, &(ip, port)) in &peer_by_flow {
        if let Some(flows) = flows_by_client.get(&(ip, port)) {
            for &flow_b in flows {
                pairs.push(TrailerMatch {
                    flow_a,
                    flow_b,
                    client_ip: ip,
                    client_port: port,
                });
            }
        }
    }

    pairs.sort_by_key(|p| (p.flow_a, p.flow_b));
    info!(pairs = pairs.len(), "trailer stage complete");
    pairs
}

/// Lift trailer pairs onto the connection pools, dropping pairs whose
/// flows were not summarized (e.g. filtered upstream).
pub fn to_connection_matches(
    pairs: &[TrailerMatch],
    side_a: &[Connection],
    side_b: &[Connection],
) -> Vec<ConnectionMatch> {
    let by_flow_a: AHashMap<u64, &Connection> = side_a.iter().map(|c| (c.flow_id, c)).collect();
    let by_flow_b: AHashMap<u64, &Connection> = side_b.iter().map(|c| (c.flow_id, c)).collect();

    pairs
        .iter()
        .filter_map(|p| {
            let conn_a = by_flow_a.get(&p.flow_a)?;
            let conn_b = by_flow_b.get(&p.flow_b)?;
            let evidence = format!("trailer(client={}:{})", p.client_ip, p.client_port);
            Some(ConnectionMatch {
                conn_a: (*conn_a).clone(),
                conn_b: (*conn_b).clone(),
                score: MatchScore::exact(evidence),
            })
        })
        .collect()
}
