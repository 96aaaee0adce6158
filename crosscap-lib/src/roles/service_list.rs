//! Operator-provided list of known service endpoints.
//!
//! Each non-blank, non-comment line is either a bare IP or an
//! `IP:PORT` pair. A listed endpoint is authoritative evidence that the
//! endpoint is a server.

use ahash::AHashSet;
use std::io::BufRead;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::error::{CrosscapError, Result};

#[derive(Debug, Clone, Default)]
pub struct ServiceList {
    ips: AHashSet<IpAddr>,
    endpoints: AHashSet<(IpAddr, u16)>,
}

impl ServiceList {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ServiceList> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            CrosscapError::ServiceList(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<ServiceList> {
        let mut list = ServiceList::default();

        for line in reader.lines() {
            let line = line?;
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }

            if let Ok(ip) = IpAddr::from_str(entry) {
                list.ips.insert(ip);
                continue;
            }
            if let Some((ip_part, port_part)) = entry.rsplit_once(':') {
                if let (Ok(ip), Ok(port)) = (IpAddr::from_str(ip_part), port_part.parse::<u16>()) {
                    list.endpoints.insert((ip, port));
                    continue;
                }
            }
            warn!(entry, "ignoring unparsable service list line");
        }

        Ok(list)
    }

    /// Whether the given endpoint is listed, either as a bare IP or an
    /// exact IP:PORT entry.
    pub fn contains(&self, ip: IpAddr, port: u16) -> bool {
        self.ips.contains(&ip) || self.endpoints.contains(&(ip, port))
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ips.len() + self.endpoints.len()
    }
}
