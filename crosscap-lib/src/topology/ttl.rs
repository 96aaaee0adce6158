//! TTL-derived hop estimation.
//!
//! Operating systems start TTLs at 64, 128 or 255; the gap between the
//! smallest such value at or above the observed TTL and the observation
//! itself is the hop count between the sender and the capture point.

use crate::similarity::most_common;

/// Smallest standard initial TTL at or above the observed value.
/// `None` when the TTL was not observed (0).
pub fn initial_ttl(ttl: u8) -> Option<u8> {
    match ttl {
        0 => None,
        1..=64 => Some(64),
        65..=128 => Some(128),
        _ => Some(255),
    }
}

/// Hops between sender and capture point, or `None` without TTL data.
pub fn hops(ttl: u8) -> Option<u8> {
    initial_ttl(ttl).map(|initial| initial - ttl)
}

/// Most common hop count across a sample of TTLs.
pub fn most_common_hops(ttls: &[u8]) -> Option<u8> {
    let hop_counts: Vec<u8> = ttls.iter().filter_map(|&t| hops(t)).collect();
    most_common(&hop_counts)
}
