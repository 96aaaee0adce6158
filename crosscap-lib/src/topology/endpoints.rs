//! Endpoint-pair aggregation over matched connections.

use ahash::AHashMap;
use std::net::IpAddr;
use tracing::debug;

use crate::matching::ConnectionMatch;
use crate::roles::{Confidence, RoleDetector};
use crate::similarity::most_common;
use crate::topology::ttl;

/// Service-level endpoint identity; the client port is ephemeral and
/// intentionally excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointTuple {
    pub client_ip: IpAddr,
    pub server_ip: IpAddr,
    pub server_port: u16,
    pub protocol: u8,
}

impl std::fmt::Display for EndpointTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let proto = match self.protocol {
            6 => "TCP".to_string(),
            17 => "UDP".to_string(),
            other => format!("Proto{other}"),
        };
        write!(
            f,
            "client {} -> server {}:{} ({proto})",
            self.client_ip, self.server_ip, self.server_port
        )
    }
}

/// Aggregated statistics for one `(tuple_a, tuple_b)` pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointPairStats {
    pub tuple_a: EndpointTuple,
    pub tuple_b: EndpointTuple,
    /// Matched connections contributing to this pairing
    pub count: usize,
    /// Aggregate role confidence (per-match minimum, averaged)
    pub confidence: Confidence,
    /// Most common TTLs per side and direction; 0 when unobserved
    pub client_ttl_a: u8,
    pub server_ttl_a: u8,
    pub client_ttl_b: u8,
    pub server_ttl_b: u8,
    /// TTL-derived hop counts; `None` without TTL data
    pub client_hops_a: Option<u8>,
    pub server_hops_a: Option<u8>,
    pub client_hops_b: Option<u8>,
    pub server_hops_b: Option<u8>,
}

#[derive(Debug, Default)]
struct PairAccumulator {
    count: usize,
    confidences: Vec<Confidence>,
    client_ttls_a: Vec<u8>,
    server_ttls_a: Vec<u8>,
    client_ttls_b: Vec<u8>,
    server_ttls_b: Vec<u8>,
}

/// Aggregates matched pairs by service-level endpoint tuples.
///
/// Matches are buffered; `finalize` runs the detector's cardinality
/// phase over every connection before re-detecting roles, then
/// aggregates. Pairs whose combined confidence is below Medium are
/// also recorded with the reversed interpretation so an inverted role
/// guess cannot hide a real pairing.
#[derive(Debug)]
pub struct EndpointStatsCollector {
    detector: RoleDetector,
    matches: Vec<ConnectionMatch>,
    pairs: AHashMap<(EndpointTuple, EndpointTuple), PairAccumulator>,
    finalized: bool,
}

impl EndpointStatsCollector {
    pub fn new(detector: RoleDetector) -> EndpointStatsCollector {
        EndpointStatsCollector {
            detector,
            matches: Vec::new(),
            pairs: AHashMap::new(),
            finalized: false,
        }
    }

    pub fn add_match(&mut self, m: ConnectionMatch) {
        self.matches.push(m);
    }

    pub fn add_matches<I: IntoIterator<Item = ConnectionMatch>>(&mut self, matches: I) {
        self.matches.extend(matches);
    }

    /// Freeze cardinality statistics and aggregate all buffered
    /// matches.
    pub fn finalize(&mut self) {
        for m in &self.matches {
            self.detector.collect_connection(&m.conn_a);
            self.detector.collect_connection(&m.conn_b);
        }
        self.detector.finalize_cardinality();

        let matches = std::mem::take(&mut self.matches);
        for m in &matches {
            self.process_match(m);
        }
        self.matches = matches;
        self.finalized = true;
        debug!(pairs = self.pairs.len(), "endpoint aggregation finalized");
    }

    fn process_match(&mut self, m: &ConnectionMatch) {
        let info_a = self.detector.detect(&m.conn_a);
        let info_b = self.detector.detect(&m.conn_b);

        let tuple_a = EndpointTuple {
            client_ip: info_a.client_ip,
            server_ip: info_a.server_ip,
            server_port: info_a.server_port,
            protocol: m.conn_a.protocol,
        };
        let tuple_b = EndpointTuple {
            client_ip: info_b.client_ip,
            server_ip: info_b.server_ip,
            server_port: info_b.server_port,
            protocol: m.conn_b.protocol,
        };

        // Conservative pairing confidence: the weaker of the two.
        let confidence = info_a.confidence.min(info_b.confidence);

        let acc = self.pairs.entry((tuple_a, tuple_b)).or_default();
        acc.count += 1;
        acc.confidences.push(confidence);
        if m.conn_a.client_ttl > 0 {
            acc.client_ttls_a.push(m.conn_a.client_ttl);
        }
        if m.conn_a.server_ttl > 0 {
            acc.server_ttls_a.push(m.conn_a.server_ttl);
        }
        if m.conn_b.client_ttl > 0 {
            acc.client_ttls_b.push(m.conn_b.client_ttl);
        }
        if m.conn_b.server_ttl > 0 {
            acc.server_ttls_b.push(m.conn_b.server_ttl);
        }

        // Ambiguous roles: record the mirror image as well so the real
        // pairing survives a wrong guess.
        if confidence < Confidence::Medium {
            let reversed_a = EndpointTuple {
                client_ip: info_a.server_ip,
                server_ip: info_a.client_ip,
                server_port: info_a.client_port,
                protocol: m.conn_a.protocol,
            };
            let reversed_b = EndpointTuple {
                client_ip: info_b.server_ip,
                server_ip: info_b.client_ip,
                server_port: info_b.client_port,
                protocol: m.conn_b.protocol,
            };

            let acc = self.pairs.entry((reversed_a, reversed_b)).or_default();
            acc.count += 1;
            acc.confidences.push(confidence);
            if m.conn_a.server_ttl > 0 {
                acc.client_ttls_a.push(m.conn_a.server_ttl);
            }
            if m.conn_a.client_ttl > 0 {
                acc.server_ttls_a.push(m.conn_a.client_ttl);
            }
            if m.conn_b.server_ttl > 0 {
                acc.client_ttls_b.push(m.conn_b.server_ttl);
            }
            if m.conn_b.client_ttl > 0 {
                acc.server_ttls_b.push(m.conn_b.client_ttl);
            }
        }
    }

    /// Aggregated pairs, most frequent first; full tuple ordering
    /// breaks count ties so output is deterministic.
    pub fn stats(&self) -> Vec<EndpointPairStats> {
        let mut results: Vec<EndpointPairStats> = self
            .pairs
            .iter()
            .map(|((tuple_a, tuple_b), acc)| {
                let client_ttl_a = most_common(&acc.client_ttls_a).unwrap_or(0);
                let server_ttl_a = most_common(&acc.server_ttls_a).unwrap_or(0);
                let client_ttl_b = most_common(&acc.client_ttls_b).unwrap_or(0);
                let server_ttl_b = most_common(&acc.server_ttls_b).unwrap_or(0);

                EndpointPairStats {
                    tuple_a: *tuple_a,
                    tuple_b: *tuple_b,
                    count: acc.count,
                    confidence: average_confidence(&acc.confidences),
                    client_ttl_a,
                    server_ttl_a,
                    client_ttl_b,
                    server_ttl_b,
                    client_hops_a: ttl::hops(client_ttl_a),
                    server_hops_a: ttl::hops(server_ttl_a),
                    client_hops_b: ttl::hops(client_ttl_b),
                    server_hops_b: ttl::hops(server_ttl_b),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.tuple_a.cmp(&b.tuple_a))
                .then(a.tuple_b.cmp(&b.tuple_b))
        });
        results
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

fn average_confidence(confidences: &[Confidence]) -> Confidence {
    if confidences.is_empty() {
        return Confidence::Unknown;
    }

    let score = |c: Confidence| match c {
        Confidence::High => 4.0,
        Confidence::Medium => 3.0,
        Confidence::Low => 2.0,
        Confidence::VeryLow => 1.0,
        Confidence::Unknown => 0.0,
    };

    let avg = confidences.iter().map(|c| score(*c)).sum::<f64>() / confidences.len() as f64;
    if avg >= 3.5 {
        Confidence::High
    } else if avg >= 2.5 {
        Confidence::Medium
    } else if avg >= 1.5 {
        Confidence::Low
    } else if avg >= 0.5 {
        Confidence::VeryLow
    } else {
        Confidence::Unknown
    }
}
