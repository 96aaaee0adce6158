//! Fingerprint-weighted pair scoring.
//!
//! The IP-ID overlap is the necessary condition; eight weighted
//! features produce the normalized score; two fast paths (strong IP-ID
//! and microflow) bypass the threshold in opposite directions.

use ahash::AHashSet;

use crate::connection::Connection;
use crate::matching::score::MatchScore;
use crate::similarity::jaccard_similarity;

/// Feature weights; they sum to 1.00.
pub const WEIGHT_SYN: f64 = 0.25;
pub const WEIGHT_ISN_CLIENT: f64 = 0.12;
pub const WEIGHT_ISN_SERVER: f64 = 0.06;
pub const WEIGHT_TIMESTAMP: f64 = 0.10;
pub const WEIGHT_PAYLOAD_CLIENT: f64 = 0.15;
pub const WEIGHT_PAYLOAD_SERVER: f64 = 0.08;
pub const WEIGHT_LENGTH_SIG: f64 = 0.08;
pub const WEIGHT_IPID: f64 = 0.16;

/// Minimum Jaccard similarity for the length-signature feature.
pub const LENGTH_SIG_THRESHOLD: f64 = 0.6;

/// IP-ID necessary condition: absolute overlap and coverage of the
/// smaller set. Both must hold.
pub const MIN_IPID_OVERLAP: usize = 2;
pub const MIN_IPID_OVERLAP_RATIO: f64 = 0.5;

/// Strong IP-ID sufficient condition. The Jaccard floor penalizes
/// subset-only overlaps against a much larger set.
pub const STRONG_IPID_MIN_OVERLAP: usize = 10;
pub const STRONG_IPID_MIN_RATIO: f64 = 0.8;
pub const STRONG_IPID_MIN_JACCARD: f64 = 0.25;
/// Numeric-range density floor for the strong path; only evaluated
/// when the `ipid-density-gate` feature is enabled.
#[cfg(feature = "ipid-density-gate")]
pub const STRONG_IPID_MIN_DENSITY: f64 = 0.25;

/// Microflow trigger and acceptance.
pub const MICROFLOW_MAX_PACKETS: usize = 3;
pub const MICROFLOW_MAX_DURATION: f64 = 2.0;
pub const MICROFLOW_THRESHOLD: f64 = 0.80;

/// Microflow feature weights; they sum to 1.0.
pub const MICRO_WEIGHT_SYN: f64 = 0.30;
pub const MICRO_WEIGHT_ISN: f64 = 0.30;
pub const MICRO_WEIGHT_TS: f64 = 0.20;
pub const MICRO_WEIGHT_TTL: f64 = 0.10;
pub const MICRO_WEIGHT_LEN: f64 = 0.10;

/// TTL values within this delta count as close in the microflow scorer.
pub const TTL_CLOSE_DELTA: u8 = 16;

/// Sets below this size intersect faster by linear scan than by hashed
/// probing of a rebuilt set.
const SMALL_SET_LINEAR: usize = 10;

/// Count overlapping ids, iterating the smaller set and probing the
/// larger; `stop_at` allows an early exit once enough overlap is seen.
fn overlap_count(a: &AHashSet<u16>, b: &AHashSet<u16>, stop_at: Option<usize>) -> usize {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut count = 0;
    for id in smaller {
        if *id != 0 && larger.contains(id) {
            count += 1;
            if let Some(stop) = stop_at {
                if count >= stop {
                    return count;
                }
            }
        }
    }
    count
}

/// Cheap prefilter: true once `min` nonzero ids overlap.
pub fn has_min_ipid_overlap(a: &AHashSet<u16>, b: &AHashSet<u16>, min: usize) -> bool {
    if a.len().min(b.len()) < SMALL_SET_LINEAR {
        return overlap_count(a, b, Some(min)) >= min;
    }
    let mut count = 0;
    for id in a.intersection(b) {
        if *id != 0 {
            count += 1;
            if count >= min {
                return true;
            }
        }
    }
    false
}

/// Scores candidate pairs on protocol-invariant fingerprints.
#[derive(Debug, Default)]
pub struct FingerprintScorer;

struct IpidStats {
    overlap: usize,
    min_set: usize,
    jaccard: f64,
    #[cfg(feature = "ipid-density-gate")]
    density: f64,
}

impl FingerprintScorer {
    pub fn new() -> FingerprintScorer {
        FingerprintScorer
    }

    /// Full weighted scoring of one pair.
    pub fn score(&self, a: &Connection, b: &Connection) -> MatchScore {
        if !port_predicate(a, b) {
            return MatchScore::rejected("no-port");
        }

        let stats = ipid_stats(a, b);
        let ipid_match = stats.overlap >= MIN_IPID_OVERLAP
            && stats.min_set > 0
            && stats.overlap as f64 / stats.min_set as f64 >= MIN_IPID_OVERLAP_RATIO;
        if !ipid_match {
            return MatchScore::rejected("no-ipid");
        }

        let ratio = stats.overlap as f64 / stats.min_set as f64;
        let force_accept = stats.overlap >= STRONG_IPID_MIN_OVERLAP
            && ratio >= STRONG_IPID_MIN_RATIO
            && stats.jaccard >= STRONG_IPID_MIN_JACCARD;
        #[cfg(feature = "ipid-density-gate")]
        let force_accept = force_accept && stats.density >= STRONG_IPID_MIN_DENSITY;

        let use_payload = !(a.is_header_only || b.is_header_only);

        let mut raw = 0.0;
        let mut avail = 0.0;
        let mut evidence: Vec<String> = Vec::new();

        let handshake = a.has_syn && b.has_syn;

        if handshake {
            avail += WEIGHT_SYN;
            if a.syn_options == b.syn_options {
                raw += WEIGHT_SYN;
                evidence.push("synopt".into());
            }

            avail += WEIGHT_ISN_CLIENT;
            if a.client_isn == b.client_isn {
                raw += WEIGHT_ISN_CLIENT;
                evidence.push("isnC".into());
            }

            avail += WEIGHT_ISN_SERVER;
            if a.server_isn == b.server_isn {
                raw += WEIGHT_ISN_SERVER;
                evidence.push("isnS".into());
            }
        }

        if has_tcp_timestamp(a) || has_tcp_timestamp(b) {
            avail += WEIGHT_TIMESTAMP;
            if tcp_timestamp_matches(a, b) {
                raw += WEIGHT_TIMESTAMP;
                evidence.push("ts".into());
            }
        }

        if use_payload {
            if !a.client_payload_md5.is_empty() && !b.client_payload_md5.is_empty() {
                avail += WEIGHT_PAYLOAD_CLIENT;
                if a.client_payload_md5 == b.client_payload_md5 {
                    raw += WEIGHT_PAYLOAD_CLIENT;
                    evidence.push("dataC".into());
                }
            }
            if !a.server_payload_md5.is_empty() && !b.server_payload_md5.is_empty() {
                avail += WEIGHT_PAYLOAD_SERVER;
                if a.server_payload_md5 == b.server_payload_md5 {
                    raw += WEIGHT_PAYLOAD_SERVER;
                    evidence.push("dataS".into());
                }
            }
        }

        if !a.length_signature.is_empty() && !b.length_signature.is_empty() {
            avail += WEIGHT_LENGTH_SIG;
            let similarity = jaccard_similarity(&a.length_signature, &b.length_signature);
            if similarity >= LENGTH_SIG_THRESHOLD {
                raw += WEIGHT_LENGTH_SIG;
                evidence.push(format!("shape({similarity:.2})"));
            }
        }

        raw += WEIGHT_IPID;
        avail += WEIGHT_IPID;
        evidence.push(if force_accept { "ipid*" } else { "ipid" }.into());

        let normalized = if avail > 0.0 { raw / avail } else { 0.0 };

        MatchScore {
            normalized,
            raw,
            available_weight: avail,
            ipid_match,
            evidence: evidence.join(" "),
            force_accept,
            microflow_accept: false,
        }
    }

    /// Auto-accept path for flows too short to clear the IP-ID minimum.
    ///
    /// Requires the port predicate, overlapping time ranges, the
    /// microflow trigger, at least one common IP-ID, and a strong
    /// handshake signature. Returns `None` when any requirement fails.
    pub fn score_microflow(&self, a: &Connection, b: &Connection) -> Option<MatchScore> {
        if !port_predicate(a, b) {
            return None;
        }
        if !a.time_overlaps(b) {
            return None;
        }
        if !is_microflow(a, b) {
            return None;
        }
        if overlap_count(&a.ipid_set, &b.ipid_set, Some(1)) < 1 {
            return None;
        }

        let mut raw = 0.0;
        let mut avail = 0.0;
        let mut evidence: Vec<String> = vec!["micro".into()];

        let handshake = a.has_syn && b.has_syn;
        if handshake {
            avail += MICRO_WEIGHT_SYN;
            if a.syn_options == b.syn_options {
                raw += MICRO_WEIGHT_SYN;
                evidence.push("synopt".into());
            }

            avail += MICRO_WEIGHT_ISN;
            if a.client_isn == b.client_isn {
                raw += MICRO_WEIGHT_ISN;
                evidence.push("isnC".into());
            }
        }

        if has_tcp_timestamp(a) && has_tcp_timestamp(b) {
            avail += MICRO_WEIGHT_TS;
            if tcp_timestamp_matches(a, b) {
                raw += MICRO_WEIGHT_TS;
                evidence.push("ts".into());
            }
        }

        if let Some(close) = ttl_close(a, b) {
            avail += MICRO_WEIGHT_TTL;
            if close {
                raw += MICRO_WEIGHT_TTL;
                evidence.push("ttl".into());
            }
        }

        if !a.length_signature.is_empty() && !b.length_signature.is_empty() {
            avail += MICRO_WEIGHT_LEN;
            let similarity = jaccard_similarity(&a.length_signature, &b.length_signature);
            if similarity >= LENGTH_SIG_THRESHOLD {
                raw += MICRO_WEIGHT_LEN;
                evidence.push(format!("shape({similarity:.2})"));
            }
        }

        if avail <= 0.0 {
            return None;
        }

        let normalized = raw / avail;
        if normalized < MICROFLOW_THRESHOLD {
            return None;
        }

        evidence.push("ipid(1)".into());
        Some(MatchScore {
            normalized,
            raw,
            available_weight: avail,
            ipid_match: false,
            evidence: evidence.join(" "),
            force_accept: false,
            microflow_accept: true,
        })
    }
}

/// NAT-tolerant port predicate: the two port multisets share at least
/// one element.
pub fn port_predicate(a: &Connection, b: &Connection) -> bool {
    a.client_port == b.client_port
        || a.client_port == b.server_port
        || a.server_port == b.client_port
        || a.server_port == b.server_port
}

fn is_microflow(a: &Connection, b: &Connection) -> bool {
    a.packet_count.min(b.packet_count) <= MICROFLOW_MAX_PACKETS
        || a.duration().min(b.duration()) <= MICROFLOW_MAX_DURATION
}

fn has_tcp_timestamp(c: &Connection) -> bool {
    !c.tsval.is_empty() || !c.tsecr.is_empty()
}

/// TSval equality, or TSecr equality with the TSecr=0 case excluded:
/// every SYN carries TSecr=0, so a zero match carries no identity.
fn tcp_timestamp_matches(a: &Connection, b: &Connection) -> bool {
    let tsval_match = !a.tsval.is_empty() && !b.tsval.is_empty() && a.tsval == b.tsval;
    let tsecr_match =
        !a.tsecr.is_empty() && !b.tsecr.is_empty() && a.tsecr != "0" && a.tsecr == b.tsecr;
    tsval_match || tsecr_match
}

/// `Some(close)` when TTLs are comparable on at least one direction,
/// `None` otherwise.
fn ttl_close(a: &Connection, b: &Connection) -> Option<bool> {
    let mut comparable = false;
    if a.client_ttl > 0 && b.client_ttl > 0 {
        comparable = true;
        if a.client_ttl.abs_diff(b.client_ttl) <= TTL_CLOSE_DELTA {
            return Some(true);
        }
    }
    if a.server_ttl > 0 && b.server_ttl > 0 {
        comparable = true;
        if a.server_ttl.abs_diff(b.server_ttl) <= TTL_CLOSE_DELTA {
            return Some(true);
        }
    }
    comparable.then_some(false)
}

fn ipid_stats(a: &Connection, b: &Connection) -> IpidStats {
    // The builder's continuity fallback may leave a zero id behind.
    let s1: AHashSet<u16> = a.ipid_set.iter().copied().filter(|id| *id != 0).collect();
    let s2: AHashSet<u16> = b.ipid_set.iter().copied().filter(|id| *id != 0).collect();

    if s1.is_empty() || s2.is_empty() {
        return IpidStats {
            overlap: 0,
            min_set: 0,
            jaccard: 0.0,
            #[cfg(feature = "ipid-density-gate")]
            density: 0.0,
        };
    }

    let overlap = overlap_count(&s1, &s2, None);
    let union = s1.len() + s2.len() - overlap;
    let jaccard = if union > 0 {
        overlap as f64 / union as f64
    } else {
        0.0
    };

    #[cfg(feature = "ipid-density-gate")]
    let density = {
        let lo = (*s1.iter().min().unwrap_or(&0)).max(*s2.iter().min().unwrap_or(&0));
        let hi = (*s1.iter().max().unwrap_or(&0)).min(*s2.iter().max().unwrap_or(&0));
        if hi >= lo {
            let range = u32::from(hi) - u32::from(lo) + 1;
            overlap as f64 / f64::from(range)
        } else {
            0.0
        }
    };

    IpidStats {
        overlap,
        min_set: s1.len().min(s2.len()),
        jaccard,
        #[cfg(feature = "ipid-density-gate")]
        density,
    }
}
