//! Match document persistence.
//!
//! Matches serialize to a versioned JSON document. IP-ID sets are
//! written as sorted arrays so reruns over identical inputs produce
//! byte-identical files; loading turns them back into sets.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::{CrosscapError, Result};
use crate::matching::score::MatchScore;
use crate::matching::ConnectionMatch;

/// Document version this library writes.
pub const MATCH_FILE_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct MatchDocument {
    version: String,
    file1: String,
    file2: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    matches: Vec<MatchRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatchRecord {
    conn_a: ConnectionRecord,
    conn_b: ConnectionRecord,
    score: MatchScore,
}

/// Wire form of a [`Connection`]; sets become sorted arrays.
#[derive(Debug, Serialize, Deserialize)]
struct ConnectionRecord {
    flow_id: u64,
    protocol: u8,
    client_ip: IpAddr,
    client_port: u16,
    server_ip: IpAddr,
    server_port: u16,
    has_syn: bool,
    syn_timestamp: f64,
    syn_options: String,
    client_isn: u32,
    server_isn: u32,
    tsval: String,
    tsecr: String,
    client_payload_md5: String,
    server_payload_md5: String,
    length_signature: String,
    is_header_only: bool,
    ipid_first: u16,
    ipid_set: Vec<u16>,
    client_ipid_set: Vec<u16>,
    server_ipid_set: Vec<u16>,
    first_packet_time: f64,
    last_packet_time: f64,
    packet_count: usize,
    client_ttl: u8,
    server_ttl: u8,
    total_bytes: u64,
}

fn sorted(set: &AHashSet<u16>) -> Vec<u16> {
    let mut v: Vec<u16> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

impl From<&Connection> for ConnectionRecord {
    fn from(c: &Connection) -> ConnectionRecord {
        ConnectionRecord {
            flow_id: c.flow_id,
            protocol: c.protocol,
            client_ip: c.client_ip,
            client_port: c.client_port,
            server_ip: c.server_ip,
            server_port: c.server_port,
            has_syn: c.has_syn,
            syn_timestamp: c.syn_timestamp,
            syn_options: c.syn_options.clone(),
            client_isn: c.client_isn,
            server_isn: c.server_isn,
            tsval: c.tsval.clone(),
            tsecr: c.tsecr.clone(),
            client_payload_md5: c.client_payload_md5.clone(),
            server_payload_md5: c.server_payload_md5.clone(),
            length_signature: c.length_signature.clone(),
            is_header_only: c.is_header_only,
            ipid_first: c.ipid_first,
            ipid_set: sorted(&c.ipid_set),
            client_ipid_set: sorted(&c.client_ipid_set),
            server_ipid_set: sorted(&c.server_ipid_set),
            first_packet_time: c.first_packet_time,
            last_packet_time: c.last_packet_time,
            packet_count: c.packet_count,
            client_ttl: c.client_ttl,
            server_ttl: c.server_ttl,
            total_bytes: c.total_bytes,
        }
    }
}

impl From<ConnectionRecord> for Connection {
    fn from(r: ConnectionRecord) -> Connection {
        Connection {
            flow_id: r.flow_id,
            protocol: r.protocol,
            client_ip: r.client_ip,
            client_port: r.client_port,
            server_ip: r.server_ip,
            server_port: r.server_port,
            has_syn: r.has_syn,
            syn_timestamp: r.syn_timestamp,
            syn_options: r.syn_options,
            client_isn: r.client_isn,
            server_isn: r.server_isn,
            tsval: r.tsval,
            tsecr: r.tsecr,
            client_payload_md5: r.client_payload_md5,
            server_payload_md5: r.server_payload_md5,
            length_signature: r.length_signature,
            is_header_only: r.is_header_only,
            ipid_first: r.ipid_first,
            ipid_set: r.ipid_set.into_iter().collect(),
            client_ipid_set: r.client_ipid_set.into_iter().collect(),
            server_ipid_set: r.server_ipid_set.into_iter().collect(),
            first_packet_time: r.first_packet_time,
            last_packet_time: r.last_packet_time,
            packet_count: r.packet_count,
            client_ttl: r.client_ttl,
            server_ttl: r.server_ttl,
            total_bytes: r.total_bytes,
        }
    }
}

/// Metadata carried alongside a loaded match list.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchMetadata {
    pub version: String,
    pub file1: String,
    pub file2: String,
    pub extra: Map<String, Value>,
}

/// Serialize matches to a JSON string.
pub fn matches_to_json(
    matches: &[ConnectionMatch],
    file1: &str,
    file2: &str,
    metadata: Map<String, Value>,
) -> Result<String> {
    let document = MatchDocument {
        version: MATCH_FILE_VERSION.to_string(),
        file1: file1.to_string(),
        file2: file2.to_string(),
        metadata,
        matches: matches
            .iter()
            .map(|m| MatchRecord {
                conn_a: ConnectionRecord::from(&m.conn_a),
                conn_b: ConnectionRecord::from(&m.conn_b),
                score: m.score.clone(),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&document)
        .map_err(|e| CrosscapError::MatchFile(format!("serialization failed: {e}")))
}

/// Write matches to `path`.
pub fn save_matches<P: AsRef<Path>>(
    matches: &[ConnectionMatch],
    path: P,
    file1: &str,
    file2: &str,
    metadata: Map<String, Value>,
) -> Result<()> {
    let json = matches_to_json(matches, file1, file2, metadata)?;
    std::fs::write(path.as_ref(), json)?;
    info!(
        matches = matches.len(),
        path = %path.as_ref().display(),
        "saved match document"
    );
    Ok(())
}

/// Parse a match document from a JSON string. Unknown versions load
/// with a warning.
pub fn matches_from_json(json: &str) -> Result<(Vec<ConnectionMatch>, MatchMetadata)> {
    let document: MatchDocument = serde_json::from_str(json)
        .map_err(|e| CrosscapError::MatchFile(format!("invalid match document: {e}")))?;

    if document.version != MATCH_FILE_VERSION {
        warn!(version = %document.version, "unknown match file version");
    }

    let metadata = MatchMetadata {
        version: document.version,
        file1: document.file1,
        file2: document.file2,
        extra: document.metadata,
    };

    let matches = document
        .matches
        .into_iter()
        .map(|r| ConnectionMatch {
            conn_a: r.conn_a.into(),
            conn_b: r.conn_b.into(),
            score: r.score,
        })
        .collect();

    Ok((matches, metadata))
}

/// Load matches from `path`.
pub fn load_matches<P: AsRef<Path>>(path: P) -> Result<(Vec<ConnectionMatch>, MatchMetadata)> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| CrosscapError::MatchFile(format!("cannot read {}: {e}", path.display())))?;
    let loaded = matches_from_json(&json)?;
    info!(matches = loaded.0.len(), path = %path.display(), "loaded match document");
    Ok(loaded)
}
