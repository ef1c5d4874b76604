use std::{
    fs,
    io::{self, BufRead, Write},
    net::IpAddr,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Transport protocol of a packet, kept as the raw IP protocol number
/// for anything that is not TCP or UDP. Serialized as that number so
/// stored records match the capture tool's `ip.proto` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum Protocol {
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for Protocol {
    fn from(number: u8) -> Self {
        match number {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(other) => other,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Other(number) => write!(f, "proto {number}"),
        }
    }
}

/// One observed frame, projected to the fields the pipeline needs.
/// Ports are absent for transports that have none (ICMP and friends);
/// `length` is the IP total length reported by the capture tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub timestamp: f64,
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    pub protocol: Protocol,
    pub length: u64,
}

/// Append records to a JSONL file, one record per line.
pub fn write_jsonl<W: Write>(writer: &mut W, records: &[PacketRecord]) -> Result<(), CaptureError> {
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

/// Read a JSONL record file back, in stored order. Lines that do not
/// parse are skipped; the second element is how many were skipped.
pub fn read_jsonl(path: &Path) -> Result<(Vec<PacketRecord>, usize), CaptureError> {
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CaptureError::MissingTrace(path.to_path_buf()),
        _ => CaptureError::Io(e),
    })?;
    let mut records = Vec::new();
    let mut skipped = 0;
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }
    Ok((records, skipped))
}

/// Write records as a CSV table.
pub fn write_csv(path: &Path, records: &[PacketRecord]) -> Result<(), CaptureError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    }
    writer
        .flush()
        .map_err(CaptureError::Io)?;
    Ok(())
}
