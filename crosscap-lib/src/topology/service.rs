//! Service-level aggregation and the service-group mapping.

use ahash::AHashMap;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

use crate::error::{CrosscapError, Result};
use crate::topology::endpoints::EndpointPairStats;

/// Protocol number assumed by the group mapping when unspecified.
const DEFAULT_PROTOCOL: u8 = 6;

/// A service as seen at capture point A: server port plus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub server_port: u16,
    pub protocol: u8,
}

/// Endpoint pairs folded by service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStats {
    pub key: ServiceKey,
    pub endpoint_pairs: Vec<EndpointPairStats>,
    pub unique_client_ips_a: BTreeSet<IpAddr>,
    pub unique_client_ips_b: BTreeSet<IpAddr>,
    pub unique_server_ips_a: BTreeSet<IpAddr>,
    pub unique_server_ips_b: BTreeSet<IpAddr>,
    pub server_ports_b: BTreeSet<u16>,
    pub total_connections: usize,
}

/// Group endpoint pairs by the side-A service, ordered by port.
pub fn aggregate_by_service(pairs: &[EndpointPairStats]) -> Vec<ServiceStats> {
    let mut services: BTreeMap<ServiceKey, ServiceStats> = BTreeMap::new();

    for pair in pairs {
        let key = ServiceKey {
            server_port: pair.tuple_a.server_port,
            protocol: pair.tuple_a.protocol,
        };
        let entry = services.entry(key).or_insert_with(|| ServiceStats {
            key,
            endpoint_pairs: Vec::new(),
            unique_client_ips_a: BTreeSet::new(),
            unique_client_ips_b: BTreeSet::new(),
            unique_server_ips_a: BTreeSet::new(),
            unique_server_ips_b: BTreeSet::new(),
            server_ports_b: BTreeSet::new(),
            total_connections: 0,
        });

        entry.unique_client_ips_a.insert(pair.tuple_a.client_ip);
        entry.unique_client_ips_b.insert(pair.tuple_b.client_ip);
        entry.unique_server_ips_a.insert(pair.tuple_a.server_ip);
        entry.unique_server_ips_b.insert(pair.tuple_b.server_ip);
        entry.server_ports_b.insert(pair.tuple_b.server_port);
        entry.total_connections += pair.count;
        entry.endpoint_pairs.push(pair.clone());
    }

    services.into_values().collect()
}

/// Load a `{"<port>": <group_id>}` JSON mapping; protocol defaults to
/// TCP.
pub fn load_service_groups<P: AsRef<Path>>(path: P) -> Result<AHashMap<ServiceKey, u32>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| CrosscapError::ServiceGroups(format!("cannot read {}: {e}", path.display())))?;

    let raw: BTreeMap<String, u32> = serde_json::from_str(&text)
        .map_err(|e| CrosscapError::ServiceGroups(format!("invalid mapping: {e}")))?;

    let mut mapping = AHashMap::new();
    for (port_str, group_id) in raw {
        let port: u16 = port_str.parse().map_err(|_| {
            CrosscapError::ServiceGroups(format!("invalid port in mapping: {port_str}"))
        })?;
        mapping.insert(
            ServiceKey {
                server_port: port,
                protocol: DEFAULT_PROTOCOL,
            },
            group_id,
        );
    }

    info!(services = mapping.len(), "loaded service group mapping");
    Ok(mapping)
}
