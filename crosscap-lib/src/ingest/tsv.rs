//! Tab-separated readers for the decoder's three output tables.
//!
//! Field coercion is tolerant: empty cells become zero, the IP-ID is
//! parsed as hex, and rows that are short or malformed are skipped with
//! a per-file summary instead of failing the run. Only an unreadable
//! input stream is a run-level error.

use std::io::BufRead;
use std::net::IpAddr;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::Result;
use crate::ingest::packet::{ClientHelloRecord, Packet, TrailerRecord};

/// Column count of the packet table.
pub const PACKET_FIELDS: usize = 19;
/// Column count of the vendor-trailer table.
pub const TRAILER_FIELDS: usize = 11;
/// Column count of the TLS Client Hello table.
pub const TLS_FIELDS: usize = 8;

/// Read the main packet table in file order.
pub fn read_packets<R: BufRead>(reader: R) -> Result<Vec<Packet>> {
    read_table(reader, PACKET_FIELDS, "packet", parse_packet_row)
}

/// Read the vendor-trailer table in file order.
pub fn read_trailer_records<R: BufRead>(reader: R) -> Result<Vec<TrailerRecord>> {
    read_table(reader, TRAILER_FIELDS, "trailer", parse_trailer_row)
}

/// Read the TLS Client Hello table in file order.
pub fn read_client_hello_records<R: BufRead>(reader: R) -> Result<Vec<ClientHelloRecord>> {
    read_table(reader, TLS_FIELDS, "tls", parse_client_hello_row)
}

fn read_table<R, T, F>(reader: R, min_fields: usize, table: &str, parse: F) -> Result<Vec<T>>
where
    R: BufRead,
    F: Fn(&[&str]) -> Option<T>,
{
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').map(strip_quotes).collect();
        if fields.len() < min_fields {
            skipped += 1;
            debug!(table, columns = fields.len(), "skipping short row");
            continue;
        }

        match parse(&fields) {
            Some(row) => rows.push(row),
            None => {
                skipped += 1;
                debug!(table, "skipping malformed row");
            }
        }
    }

    if skipped > 0 {
        warn!(table, skipped, kept = rows.len(), "dropped unparsable rows");
    }

    Ok(rows)
}

/// Strip one layer of double quotes, as produced by `quote=d` output.
fn strip_quotes(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

fn parse_u64(field: &str) -> u64 {
    if field.is_empty() {
        0
    } else {
        field.parse().unwrap_or(0)
    }
}

fn parse_u32(field: &str) -> u32 {
    if field.is_empty() {
        0
    } else {
        field.parse().unwrap_or(0)
    }
}

fn parse_u16(field: &str) -> u16 {
    if field.is_empty() {
        0
    } else {
        field.parse().unwrap_or(0)
    }
}

fn parse_u8(field: &str) -> u8 {
    if field.is_empty() {
        0
    } else {
        field.parse().unwrap_or(0)
    }
}

fn parse_f64(field: &str) -> f64 {
    if field.is_empty() {
        0.0
    } else {
        field.parse().unwrap_or(0.0)
    }
}

/// Parse a hex cell such as `0x0002` or bare `54a8`.
fn parse_hex_u16(field: &str) -> u16 {
    let trimmed = field.trim_start_matches("0x");
    if trimmed.is_empty() {
        0
    } else {
        u16::from_str_radix(trimmed, 16).unwrap_or(0)
    }
}

fn parse_ip(field: &str) -> Option<IpAddr> {
    IpAddr::from_str(field).ok()
}

/// Packet table columns: frame, epoch, flow id, proto, src, dst, sport,
/// dport, flags (hex), seq, ack, options (hex), payload len, ip id
/// (hex), tsval, tsecr, payload (hex), ttl, frame len.
fn parse_packet_row(fields: &[&str]) -> Option<Packet> {
    Some(Packet {
        frame_number: parse_u64(fields[0]),
        timestamp: parse_f64(fields[1]),
        flow_id: parse_u64(fields[2]),
        protocol: if fields[3].is_empty() {
            6
        } else {
            parse_u8(fields[3])
        },
        src_ip: parse_ip(fields[4])?,
        dst_ip: parse_ip(fields[5])?,
        src_port: parse_u16(fields[6]),
        dst_port: parse_u16(fields[7]),
        flags: parse_hex_u16(fields[8]),
        seq: parse_u32(fields[9]),
        ack: parse_u32(fields[10]),
        options: fields[11].to_string(),
        payload_len: parse_u32(fields[12]),
        ip_id: parse_hex_u16(fields[13]),
        tsval: fields[14].to_string(),
        tsecr: fields[15].to_string(),
        payload_hex: fields[16].to_string(),
        ttl: parse_u8(fields[17]),
        frame_len: parse_u32(fields[18]),
    })
}

/// Trailer table columns: frame, flow id, src, dst, sport, dport,
/// flags, peer addrs (comma list), peer ports (comma list), peer local
/// addr, peer local port.
fn parse_trailer_row(fields: &[&str]) -> Option<TrailerRecord> {
    let peer_addrs = fields[7]
        .split(',')
        .filter_map(|a| parse_ip(a.trim()))
        .collect();
    let peer_ports = fields[8]
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect();

    Some(TrailerRecord {
        frame_number: parse_u64(fields[0]),
        flow_id: parse_u64(fields[1]),
        src_ip: parse_ip(fields[2])?,
        dst_ip: parse_ip(fields[3])?,
        src_port: parse_u16(fields[4]),
        dst_port: parse_u16(fields[5]),
        flags: parse_hex_u16(fields[6]),
        peer_addrs,
        peer_ports,
        peer_local_addr: parse_ip(fields[9]),
        peer_local_port: parse_u16(fields[10]),
    })
}

/// TLS table columns: frame, flow id, src, dst, sport, dport, random
/// (hex), session id (hex).
fn parse_client_hello_row(fields: &[&str]) -> Option<ClientHelloRecord> {
    Some(ClientHelloRecord {
        frame_number: parse_u64(fields[0]),
        flow_id: parse_u64(fields[1]),
        src_ip: parse_ip(fields[2])?,
        dst_ip: parse_ip(fields[3])?,
        src_port: parse_u16(fields[4]),
        dst_port: parse_u16(fields[5]),
        random: fields[6].to_string(),
        session_id: fields[7].to_string(),
    })
}
