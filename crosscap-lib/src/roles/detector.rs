//! Multi-layer server/client role detection.
//!
//! Layer priority, highest first: SYN direction, operator service list,
//! well-known ports, database ports, system ports, cardinality
//! analysis, smaller-port fallback. Each layer labels its verdict with
//! a confidence so downstream aggregation can hedge ambiguous flows.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::debug;

use crate::connection::Connection;
use crate::roles::service_list::ServiceList;

/// Well-known service ports (IANA registered plus common alternates).
pub const WELL_KNOWN_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 80, 110, 143, 443, 465, 587, 993, 995, 3389, 5900, 8080, 8443,
];

/// Common database service ports.
pub const DATABASE_PORTS: &[u16] = &[
    1433, 1521, 3306, 5432, 6379, 7000, 7001, 8529, 9042, 27017, 50000,
];

/// Distinct remote IPs an endpoint must serve before cardinality
/// analysis marks it as a likely server.
const CARDINALITY_MIN_REMOTES: usize = 3;

/// How sure a detection layer is about its verdict.
///
/// Ordered ascending so `confidence < Confidence::Medium` selects the
/// verdicts that deserve a hedged (dual-orientation) interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Unknown,
    VeryLow,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::VeryLow => "VERY_LOW",
            Confidence::Unknown => "UNKNOWN",
        }
    }
}

/// Which layer produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    SynDirection,
    ServiceList,
    WellKnownPort,
    DatabasePort,
    SystemPort,
    Cardinality,
    PortFallback,
}

/// Immutable role verdict for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub server_ip: IpAddr,
    pub server_port: u16,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub confidence: Confidence,
    pub method: DetectionMethod,
}

impl ServerInfo {
    fn keep(conn: &Connection, confidence: Confidence, method: DetectionMethod) -> ServerInfo {
        ServerInfo {
            server_ip: conn.server_ip,
            server_port: conn.server_port,
            client_ip: conn.client_ip,
            client_port: conn.client_port,
            confidence,
            method,
        }
    }

    fn swapped(conn: &Connection, confidence: Confidence, method: DetectionMethod) -> ServerInfo {
        ServerInfo {
            server_ip: conn.client_ip,
            server_port: conn.client_port,
            client_ip: conn.server_ip,
            client_port: conn.server_port,
            confidence,
            method,
        }
    }

    /// Whether the verdict disagrees with the connection's current
    /// labels.
    pub fn differs_from(&self, conn: &Connection) -> bool {
        self.server_ip != conn.server_ip || self.server_port != conn.server_port
    }
}

/// Two-phase role detector.
///
/// `collect_connection` accumulates endpoint statistics across the
/// whole batch, `finalize_cardinality` freezes them, and `detect`
/// returns a verdict per connection. Detection works without the batch
/// phase; the cardinality layer simply stays silent until finalized.
#[derive(Debug, Default)]
pub struct RoleDetector {
    service_list: Option<ServiceList>,
    remotes: AHashMap<(IpAddr, u16), AHashSet<IpAddr>>,
    likely_servers: AHashSet<(IpAddr, u16)>,
    finalized: bool,
}

impl RoleDetector {
    pub fn new() -> RoleDetector {
        RoleDetector::default()
    }

    pub fn with_service_list(service_list: ServiceList) -> RoleDetector {
        RoleDetector {
            service_list: (!service_list.is_empty()).then_some(service_list),
            ..RoleDetector::default()
        }
    }

    /// Record both endpoints of a connection for cardinality analysis.
    pub fn collect_connection(&mut self, conn: &Connection) {
        self.remotes
            .entry((conn.server_ip, conn.server_port))
            .or_default()
            .insert(conn.client_ip);
        self.remotes
            .entry((conn.client_ip, conn.client_port))
            .or_default()
            .insert(conn.server_ip);
    }

    /// Freeze the batch statistics. Endpoints talking to at least
    /// [`CARDINALITY_MIN_REMOTES`] distinct remotes become likely
    /// servers.
    pub fn finalize_cardinality(&mut self) {
        self.likely_servers = self
            .remotes
            .iter()
            .filter(|(_, remotes)| remotes.len() >= CARDINALITY_MIN_REMOTES)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        self.finalized = true;
        debug!(
            likely_servers = self.likely_servers.len(),
            "cardinality analysis finalized"
        );
    }

    pub fn detect(&self, conn: &Connection) -> ServerInfo {
        // Layer 1: a captured SYN fixes the direction outright.
        if conn.has_syn {
            return ServerInfo::keep(conn, Confidence::High, DetectionMethod::SynDirection);
        }

        // Layer 2: operator-provided service list.
        if let Some(list) = &self.service_list {
            let client_listed = list.contains(conn.client_ip, conn.client_port);
            let server_listed = list.contains(conn.server_ip, conn.server_port);
            if client_listed != server_listed {
                return if server_listed {
                    ServerInfo::keep(conn, Confidence::High, DetectionMethod::ServiceList)
                } else {
                    ServerInfo::swapped(conn, Confidence::High, DetectionMethod::ServiceList)
                };
            }
        }

        // Layers 3 and 4: port heuristics.
        if let Some(info) = self.detect_by_port(conn) {
            return info;
        }

        // Layer 5: batch cardinality.
        if self.finalized {
            let client_likely = self
                .likely_servers
                .contains(&(conn.client_ip, conn.client_port));
            let server_likely = self
                .likely_servers
                .contains(&(conn.server_ip, conn.server_port));
            if client_likely != server_likely {
                return if server_likely {
                    ServerInfo::keep(conn, Confidence::Medium, DetectionMethod::Cardinality)
                } else {
                    ServerInfo::swapped(conn, Confidence::Medium, DetectionMethod::Cardinality)
                };
            }
        }

        // Layer 6: smaller port wins.
        if conn.server_port <= conn.client_port {
            ServerInfo::keep(conn, Confidence::VeryLow, DetectionMethod::PortFallback)
        } else {
            ServerInfo::swapped(conn, Confidence::VeryLow, DetectionMethod::PortFallback)
        }
    }

    fn detect_by_port(&self, conn: &Connection) -> Option<ServerInfo> {
        let client = conn.client_port;
        let server = conn.server_port;

        let client_known = WELL_KNOWN_PORTS.contains(&client);
        let server_known = WELL_KNOWN_PORTS.contains(&server);
        if client_known != server_known {
            return Some(if server_known {
                ServerInfo::keep(conn, Confidence::High, DetectionMethod::WellKnownPort)
            } else {
                ServerInfo::swapped(conn, Confidence::High, DetectionMethod::WellKnownPort)
            });
        }

        let client_db = DATABASE_PORTS.contains(&client);
        let server_db = DATABASE_PORTS.contains(&server);
        if client_db != server_db {
            return Some(if server_db {
                ServerInfo::keep(conn, Confidence::Medium, DetectionMethod::DatabasePort)
            } else {
                ServerInfo::swapped(conn, Confidence::Medium, DetectionMethod::DatabasePort)
            });
        }

        let client_system = client < 1024;
        let server_system = server < 1024;
        if client_system != server_system {
            return Some(if server_system {
                ServerInfo::keep(conn, Confidence::Medium, DetectionMethod::SystemPort)
            } else {
                ServerInfo::swapped(conn, Confidence::Medium, DetectionMethod::SystemPort)
            });
        }

        None
    }
}

/// Re-label a batch of connections with the detector's verdicts,
/// swapping roles (ISNs, payload hashes, per-direction IP-ID sets,
/// TTLs) where detection disagrees with the builder's labels.
pub fn refine_roles(connections: Vec<Connection>, detector: &RoleDetector) -> Vec<Connection> {
    connections
        .into_iter()
        .map(|conn| {
            let info = detector.detect(&conn);
            if info.differs_from(&conn) {
                debug!(
                    flow = conn.flow_id,
                    method = ?info.method,
                    confidence = info.confidence.as_str(),
                    "swapping provisional roles"
                );
                conn.with_roles_swapped()
            } else {
                conn
            }
        })
        .collect()
}
