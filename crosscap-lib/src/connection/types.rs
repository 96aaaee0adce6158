use ahash::AHashSet;
use std::net::IpAddr;

/// Summary of one flow between two endpoints.
///
/// Built once by [`ConnectionBuilder`](crate::connection::ConnectionBuilder)
/// and never mutated; a role change downstream produces a new value via
/// [`with_roles_swapped`](Connection::with_roles_swapped).
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Decoder-assigned flow identifier
    pub flow_id: u64,
    /// L4 protocol number (6=TCP, 17=UDP)
    pub protocol: u8,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub server_ip: IpAddr,
    pub server_port: u16,
    /// Whether a SYN was observed for this flow
    pub has_syn: bool,
    /// Timestamp of the SYN (first packet's timestamp when no SYN)
    pub syn_timestamp: f64,
    /// TCP options fingerprint from the SYN: `mss=X;ws=Y;sack=Z;ts=W`.
    /// Empty when no SYN was captured.
    pub syn_options: String,
    /// Client initial sequence number (0 when no SYN)
    pub client_isn: u32,
    /// Server initial sequence number from the SYN-ACK (0 when unseen)
    pub server_isn: u32,
    /// TCP timestamp TSval from the SYN
    pub tsval: String,
    /// TCP timestamp TSecr from the SYN
    pub tsecr: String,
    /// MD5 of the first client payload (first 256 bytes); empty when absent
    pub client_payload_md5: String,
    /// MD5 of the first server payload (first 256 bytes); empty when absent
    pub server_payload_md5: String,
    /// Direction-tagged lengths of the first payload packets,
    /// e.g. `C:100 S:200 C:50`
    pub length_signature: String,
    /// True iff no packet in the flow carried payload
    pub is_header_only: bool,
    /// IP-ID of the first packet (may be 0)
    pub ipid_first: u16,
    /// Nonzero IP-IDs across both directions. Falls back to
    /// `{ipid_first}` when no nonzero id was seen.
    pub ipid_set: AHashSet<u16>,
    /// Nonzero IP-IDs of client-sourced packets
    pub client_ipid_set: AHashSet<u16>,
    /// Nonzero IP-IDs of server-sourced packets
    pub server_ipid_set: AHashSet<u16>,
    /// Earliest packet timestamp
    pub first_packet_time: f64,
    /// Latest packet timestamp
    pub last_packet_time: f64,
    pub packet_count: usize,
    /// Most common TTL on client-sourced packets (0 when unobserved)
    pub client_ttl: u8,
    /// Most common TTL on server-sourced packets (0 when unobserved)
    pub server_ttl: u8,
    /// Sum of frame lengths over the whole flow
    pub total_bytes: u64,
}

impl Connection {
    /// Direction-independent identity: the two endpoints in
    /// lexicographic order.
    pub fn normalized_five_tuple(&self) -> (IpAddr, u16, IpAddr, u16) {
        let a = (self.client_ip, self.client_port);
        let b = (self.server_ip, self.server_port);
        if a <= b {
            (a.0, a.1, b.0, b.1)
        } else {
            (b.0, b.1, a.0, a.1)
        }
    }

    /// Coarse NAT-tolerant identity: `(smaller port, larger port)`.
    pub fn normalized_port_pair(&self) -> (u16, u16) {
        let (a, b) = (self.client_port, self.server_port);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Flow duration in seconds; never negative.
    pub fn duration(&self) -> f64 {
        (self.last_packet_time - self.first_packet_time).max(0.0)
    }

    /// Whether the `[first, last]` time ranges of the two flows
    /// intersect.
    pub fn time_overlaps(&self, other: &Connection) -> bool {
        !(self.last_packet_time < other.first_packet_time
            || other.last_packet_time < self.first_packet_time)
    }

    /// New value with client and server exchanged.
    ///
    /// ISNs, payload hashes, per-direction IP-ID sets and TTLs swap
    /// together; the global IP-ID set, length signature and timing are
    /// direction-independent and stay as-is.
    pub fn with_roles_swapped(&self) -> Connection {
        Connection {
            flow_id: self.flow_id,
            protocol: self.protocol,
            client_ip: self.server_ip,
            client_port: self.server_port,
            server_ip: self.client_ip,
            server_port: self.client_port,
            has_syn: self.has_syn,
            syn_timestamp: self.syn_timestamp,
            syn_options: self.syn_options.clone(),
            client_isn: self.server_isn,
            server_isn: self.client_isn,
            tsval: self.tsval.clone(),
            tsecr: self.tsecr.clone(),
            client_payload_md5: self.server_payload_md5.clone(),
            server_payload_md5: self.client_payload_md5.clone(),
            length_signature: self.length_signature.clone(),
            is_header_only: self.is_header_only,
            ipid_first: self.ipid_first,
            ipid_set: self.ipid_set.clone(),
            client_ipid_set: self.server_ipid_set.clone(),
            server_ipid_set: self.client_ipid_set.clone(),
            first_packet_time: self.first_packet_time,
            last_packet_time: self.last_packet_time,
            packet_count: self.packet_count,
            client_ttl: self.server_ttl,
            server_ttl: self.client_ttl,
            total_bytes: self.total_bytes,
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "flow {}: {}:{} <-> {}:{} ({} packets, ipids={})",
            self.flow_id,
            self.client_ip,
            self.client_port,
            self.server_ip,
            self.server_port,
            self.packet_count,
            self.ipid_set.len(),
        )
    }
}
