//! Packet ingestion adapter.
//!
//! Consumes the external decoder's tab-separated output and produces
//! typed per-packet records for the connection builder and the exact
//! matching stages. The decoder process itself (pcap reading, protocol
//! dissection) is an external collaborator.

pub mod packet;
pub mod tsv;

pub use packet::{ClientHelloRecord, Packet, TrailerRecord, FLAG_ACK, FLAG_SYN};
pub use tsv::{read_client_hello_records, read_packets, read_trailer_records};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{CrosscapError, Result};

/// Open and read a packet table from a file path.
pub fn read_packets_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Packet>> {
    let file = open(path.as_ref())?;
    read_packets(BufReader::new(file))
}

/// Open and read a vendor-trailer table from a file path.
pub fn read_trailer_records_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<TrailerRecord>> {
    let file = open(path.as_ref())?;
    read_trailer_records(BufReader::new(file))
}

/// Open and read a TLS Client Hello table from a file path.
pub fn read_client_hello_records_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ClientHelloRecord>> {
    let file = open(path.as_ref())?;
    read_client_hello_records(BufReader::new(file))
}

fn open(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| CrosscapError::Decode(format!("cannot open {}: {e}", path.display())))
}
