//! Candidate bucketing.
//!
//! A quadratic A×B comparison is usually too expensive; connections are
//! first keyed into buckets and only pairs sharing a key are scored.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::connection::Connection;

/// How connections are keyed before pairwise scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketStrategy {
    /// NAT-aware heuristic picks one of the concrete strategies.
    #[default]
    Auto,
    /// Key by the normalized IP pair; highest precision when addresses
    /// survive between capture points.
    Server,
    /// Key by server port; robust to SNAT/DNAT address rewriting.
    Port,
    /// Single bucket, full quadratic comparison.
    None,
}

impl std::str::FromStr for BucketStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(BucketStrategy::Auto),
            "server" => Ok(BucketStrategy::Server),
            "port" => Ok(BucketStrategy::Port),
            "none" => Ok(BucketStrategy::None),
            other => Err(format!("unknown bucket strategy: {other}")),
        }
    }
}

/// Concrete bucket key. `Ord` gives the engine a deterministic bucket
/// visit order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    ServerPair(IpAddr, IpAddr),
    Port(u16),
    All,
}

/// Resolve `Auto` against the observed endpoint overlap between the
/// two sides.
///
/// No common clients but common servers reads as SNAT; the mirror image
/// as DNAT; both favor port keying because it survives address
/// rewriting. Identical server sets favor server keying.
pub fn choose_auto_strategy(a: &[Connection], b: &[Connection]) -> BucketStrategy {
    let clients1: ahash::AHashSet<IpAddr> = a.iter().map(|c| c.client_ip).collect();
    let clients2: ahash::AHashSet<IpAddr> = b.iter().map(|c| c.client_ip).collect();
    let servers1: ahash::AHashSet<IpAddr> = a.iter().map(|c| c.server_ip).collect();
    let servers2: ahash::AHashSet<IpAddr> = b.iter().map(|c| c.server_ip).collect();
    let ports1: ahash::AHashSet<u16> = a.iter().map(|c| c.server_port).collect();
    let ports2: ahash::AHashSet<u16> = b.iter().map(|c| c.server_port).collect();

    let common_clients = clients1.intersection(&clients2).count();
    let common_servers = servers1.intersection(&servers2).count();
    let common_ports = ports1.intersection(&ports2).count();

    let snat_likely = common_clients == 0 && common_servers > 0;
    let dnat_likely = common_servers == 0 && common_clients > 0;
    let nat_ambiguous = common_clients == 0 && common_servers == 0 && common_ports > 0;

    if snat_likely || dnat_likely || nat_ambiguous {
        return BucketStrategy::Port;
    }

    if common_servers > 0 && common_servers == servers1.len() && common_servers == servers2.len() {
        return BucketStrategy::Server;
    }

    if common_servers == 0 && common_ports > 0 {
        return BucketStrategy::Port;
    }

    if common_servers > 0 {
        return BucketStrategy::Server;
    }

    BucketStrategy::Port
}

/// Key connections into buckets; values are indices into the input
/// slice. `strategy` must already be concrete (not `Auto`).
pub fn create_buckets(
    connections: &[Connection],
    strategy: BucketStrategy,
) -> AHashMap<BucketKey, Vec<usize>> {
    let mut buckets: AHashMap<BucketKey, Vec<usize>> = AHashMap::new();

    for (idx, conn) in connections.iter().enumerate() {
        let key = match strategy {
            BucketStrategy::Server => {
                let (ip1, _, ip2, _) = conn.normalized_five_tuple();
                BucketKey::ServerPair(ip1, ip2)
            }
            BucketStrategy::Port => BucketKey::Port(conn.server_port),
            BucketStrategy::None | BucketStrategy::Auto => BucketKey::All,
        };
        buckets.entry(key).or_default().push(idx);
    }

    buckets
}
