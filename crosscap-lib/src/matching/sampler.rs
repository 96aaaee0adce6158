//! Time-stratified downsampling for oversized connection lists.
//!
//! Off by default; the engine only consults the sampler when sampling
//! was explicitly enabled. Header-only flows and flows on well-known
//! service ports are never dropped.

use tracing::info;

use crate::connection::Connection;

/// Server ports whose flows are always preserved.
pub const SPECIAL_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 80, 110, 143, 443, 3306, 5432, 6379, 27017,
];

/// Strata used for time-based stratified sampling.
const MAX_STRATA: usize = 10;

#[derive(Debug, Clone)]
pub struct ConnectionSampler {
    threshold: usize,
    rate: f64,
}

impl ConnectionSampler {
    pub fn new(threshold: usize, rate: f64) -> ConnectionSampler {
        ConnectionSampler { threshold, rate }
    }

    pub fn should_sample(&self, connections: &[Connection]) -> bool {
        connections.len() > self.threshold
    }

    /// Downsample while preserving protected flows. Regular flows are
    /// sorted by SYN time, cut into strata, and picked at an even step
    /// within each stratum.
    pub fn sample(&self, connections: Vec<Connection>) -> Vec<Connection> {
        if !self.should_sample(&connections) {
            return connections;
        }

        let original = connections.len();
        let mut protected = Vec::new();
        let mut regular = Vec::new();
        for conn in connections {
            if is_protected(&conn) {
                protected.push(conn);
            } else {
                regular.push(conn);
            }
        }

        regular.sort_by(|a, b| {
            a.syn_timestamp
                .total_cmp(&b.syn_timestamp)
                .then(a.flow_id.cmp(&b.flow_id))
        });

        let sampled = self.stratified_sample(regular);
        let kept = protected.len() + sampled.len();
        info!(original, kept, protected = protected.len(), "sampled connection list");

        protected.extend(sampled);
        protected
    }

    fn stratified_sample(&self, connections: Vec<Connection>) -> Vec<Connection> {
        if connections.is_empty() {
            return connections;
        }

        let target = ((connections.len() as f64 * self.rate) as usize).max(1);
        let strata = MAX_STRATA.min(connections.len());
        let stratum_size = connections.len() / strata;

        let mut sampled = Vec::new();
        for i in 0..strata {
            let start = i * stratum_size;
            let end = if i == strata - 1 {
                connections.len()
            } else {
                start + stratum_size
            };
            let stratum = &connections[start..end];

            let stratum_target = (stratum.len() * target / connections.len()).max(1);
            let step = (stratum.len() / stratum_target).max(1);

            for conn in stratum.iter().step_by(step) {
                if sampled.len() < target {
                    sampled.push(conn.clone());
                }
            }
        }

        sampled
    }
}

fn is_protected(conn: &Connection) -> bool {
    conn.is_header_only || SPECIAL_PORTS.contains(&conn.server_port)
}
