//! TLS Client Hello exact matching (stage 2).
//!
//! The 32-byte Client Hello `random` survives every form of address
//! translation; together with the session id it identifies one TLS
//! connection across capture points.

use ahash::AHashMap;
use tracing::info;

use crate::connection::Connection;
use crate::ingest::ClientHelloRecord;
use crate::matching::score::MatchScore;
use crate::matching::ConnectionMatch;

/// A flow pair proven identical by Client Hello equality.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsMatch {
    pub flow_a: u64,
    pub flow_b: u64,
    pub random: String,
    pub session_id: String,
}

/// Match flows whose first Client Hello carries the same
/// `(random, session_id)` pair. The session id may be empty on both
/// sides but must agree.
pub fn match_by_client_hello(
    side_a: &[ClientHelloRecord],
    side_b: &[ClientHelloRecord],
) -> Vec<TlsMatch> {
    let hellos_a = first_hello_per_flow(side_a);
    let hellos_b = first_hello_per_flow(side_b);

    let mut flows_by_key: AHashMap<(&str, &str), Vec<u64>> = AHashMap::new();
    for (flow, hello) in &hellos_b {
        flows_by_key
            .entry((hello.random.as_str(), hello.session_id.as_str()))
            .or_default()
            .push(*flow);
    }

    let mut pairs: Vec<TlsMatch> = Vec::new();
    for (flow_a, hello) in &hellos_a {
        let key = (hello.random.as_str(), hello.session_id.as_str());
        if let Some(flows) = flows_by_key.get(&key) {
            for &flow_b in flows {
                pairs.push(TlsMatch {
                    flow_a: *flow_a,
                    flow_b,
                    random: hello.random.clone(),
                    session_id: hello.session_id.clone(),
                });
            }
        }
    }

    pairs.sort_by_key(|p| (p.flow_a, p.flow_b));
    info!(pairs = pairs.len(), "tls stage complete");
    pairs
}

/// Keep the first Client Hello per flow; retransmissions add nothing.
/// Records without a random are useless as identity and are skipped.
fn first_hello_per_flow(records: &[ClientHelloRecord]) -> AHashMap<u64, &ClientHelloRecord> {
    let mut hellos: AHashMap<u64, &ClientHelloRecord> = AHashMap::new();
    for rec in records {
        if rec.random.is_empty() {
            continue;
        }
        hellos.entry(rec.flow_id).or_insert(rec);
    }
    hellos
}

fn truncate(value: &str) -> &str {
    &value[..value.len().min(16)]
}

/// Lift TLS pairs onto the connection pools.
pub fn to_connection_matches(
    pairs: &[TlsMatch],
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
            let evidence = format!(
                "tls(random={}.., session_id={}..)",
                truncate(&p.random),
                truncate(&p.session_id),
            );
            Some(ConnectionMatch {
                conn_a: (*conn_a).clone(),
                conn_b: (*conn_b).clone(),
                score: MatchScore::exact(evidence),
            })
        })
        .collect()
}
