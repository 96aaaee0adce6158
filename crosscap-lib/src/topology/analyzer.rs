//! Capture-point ordering from TTL-derived hop counts.

use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::matching::ConnectionMatch;
use crate::roles::{RoleDetector, ServiceList};
use crate::similarity::median;
use crate::topology::endpoints::EndpointStatsCollector;
use crate::topology::service::{aggregate_by_service, ServiceKey};

/// One of the two capture points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePoint {
    A,
    B,
}

/// Ordering of the capture points along the client-to-server path:
/// `(closer to client, closer to server)`.
pub type CaptureSequence = (CapturePoint, CapturePoint);

/// Coarse relative placement of the two capture points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePosition {
    ACloserToClient,
    BCloserToClient,
    SamePosition,
    Unknown,
}

/// Per-service topology result, ready for an external renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTopology {
    pub key: ServiceKey,
    pub client_ips_a: BTreeSet<IpAddr>,
    pub client_ips_b: BTreeSet<IpAddr>,
    pub server_ips_a: BTreeSet<IpAddr>,
    pub server_ips_b: BTreeSet<IpAddr>,
    pub server_ports_b: BTreeSet<u16>,
    pub client_hops_a: Option<u8>,
    pub server_hops_a: Option<u8>,
    pub client_hops_b: Option<u8>,
    pub server_hops_b: Option<u8>,
    pub sequence: Option<CaptureSequence>,
    pub position: CapturePosition,
    pub connection_count: usize,
}

/// Aggregated topology over all matched services.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyInfo {
    pub file_a: String,
    pub file_b: String,
    pub services: Vec<ServiceTopology>,
}

/// Derives per-service capture ordering from matched pairs.
#[derive(Debug)]
pub struct TopologyAnalyzer {
    matches: Vec<ConnectionMatch>,
    file_a: String,
    file_b: String,
    service_list: Option<ServiceList>,
}

impl TopologyAnalyzer {
    pub fn new(matches: Vec<ConnectionMatch>, file_a: &str, file_b: &str) -> TopologyAnalyzer {
        TopologyAnalyzer {
            matches,
            file_a: file_a.to_string(),
            file_b: file_b.to_string(),
            service_list: None,
        }
    }

    pub fn with_service_list(mut self, service_list: ServiceList) -> TopologyAnalyzer {
        self.service_list = Some(service_list);
        self
    }

    pub fn analyze(self) -> TopologyInfo {
        let detector = match self.service_list {
            Some(list) => RoleDetector::with_service_list(list),
            None => RoleDetector::new(),
        };

        let mut collector = EndpointStatsCollector::new(detector);
        collector.add_matches(self.matches);
        collector.finalize();
        let pairs = collector.stats();

        let services = aggregate_by_service(&pairs)
            .into_iter()
            .map(|stats| {
                let client_hops_a = median_hops(stats.endpoint_pairs.iter().map(|p| p.client_hops_a));
                let server_hops_a = median_hops(stats.endpoint_pairs.iter().map(|p| p.server_hops_a));
                let client_hops_b = median_hops(stats.endpoint_pairs.iter().map(|p| p.client_hops_b));
                let server_hops_b = median_hops(stats.endpoint_pairs.iter().map(|p| p.server_hops_b));

                let sequence =
                    capture_sequence(client_hops_a, server_hops_a, client_hops_b, server_hops_b);
                let position =
                    position_from(sequence, client_hops_a, server_hops_a, client_hops_b, server_hops_b);

                ServiceTopology {
                    key: stats.key,
                    client_ips_a: stats.unique_client_ips_a,
                    client_ips_b: stats.unique_client_ips_b,
                    server_ips_a: stats.unique_server_ips_a,
                    server_ips_b: stats.unique_server_ips_b,
                    server_ports_b: stats.server_ports_b,
                    client_hops_a,
                    server_hops_a,
                    client_hops_b,
                    server_hops_b,
                    sequence,
                    position,
                    connection_count: stats.total_connections,
                }
            })
            .collect();

        TopologyInfo {
            file_a: self.file_a,
            file_b: self.file_b,
            services,
        }
    }
}

fn median_hops<I: Iterator<Item = Option<u8>>>(values: I) -> Option<u8> {
    let present: Vec<u8> = values.flatten().collect();
    median(&present)
}

/// Capture ordering from hop counts, or `None` when it cannot be
/// derived.
///
/// Fewer client hops puts a point closer to the client; equal client
/// hops fall back to server hops (more server hops = further from the
/// server). The asymmetric zero pattern, one point adjacent to the
/// client and the other adjacent to the server with unequal deltas,
/// marks a terminating middle device: the point with zero server hops
/// renders on the client side.
pub fn capture_sequence(
    client_hops_a: Option<u8>,
    server_hops_a: Option<u8>,
    client_hops_b: Option<u8>,
    server_hops_b: Option<u8>,
) -> Option<CaptureSequence> {
    let (ca, sa, cb, sb) = (client_hops_a?, server_hops_a?, client_hops_b?, server_hops_b?);

    let client_delta = i16::from(ca) - i16::from(cb);
    let server_delta = i16::from(sa) - i16::from(sb);
    if client_delta != server_delta {
        if ca == 0 && sb == 0 {
            return Some((CapturePoint::B, CapturePoint::A));
        }
        if cb == 0 && sa == 0 {
            return Some((CapturePoint::A, CapturePoint::B));
        }
    }

    if ca == cb && sa == sb {
        return None;
    }

    if ca < cb {
        return Some((CapturePoint::A, CapturePoint::B));
    }
    if cb < ca {
        return Some((CapturePoint::B, CapturePoint::A));
    }

    if sa > sb {
        return Some((CapturePoint::A, CapturePoint::B));
    }
    if sb > sa {
        return Some((CapturePoint::B, CapturePoint::A));
    }

    None
}

fn position_from(
    sequence: Option<CaptureSequence>,
    client_hops_a: Option<u8>,
    server_hops_a: Option<u8>,
    client_hops_b: Option<u8>,
    server_hops_b: Option<u8>,
) -> CapturePosition {
    match sequence {
        Some((CapturePoint::A, CapturePoint::B)) => CapturePosition::ACloserToClient,
        Some((CapturePoint::B, CapturePoint::A)) => CapturePosition::BCloserToClient,
        Some(_) => CapturePosition::Unknown,
        None => {
            let all_known = client_hops_a.is_some()
                && server_hops_a.is_some()
                && client_hops_b.is_some()
                && server_hops_b.is_some();
            if all_known && client_hops_a == client_hops_b && server_hops_a == server_hops_b {
                CapturePosition::SamePosition
            } else {
                CapturePosition::Unknown
            }
        }
    }
}
