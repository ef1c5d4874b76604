use std::{collections::HashMap, io, path::Path, process::Command};

use serde::Serialize;

use crate::{error::CaptureError, record::PacketRecord};

/// Trace-level statistics, as reported by `capinfos` or computed from
/// an extracted record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub packets: u64,
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub data_rate_bits_per_sec: f64,
    pub mean_packet_size: f64,
}

impl CaptureSummary {
    /// Summarize an already-extracted record sequence. Used where the
    /// external tool is not around (and in tests).
    pub fn from_records(records: &[PacketRecord]) -> Self {
        let packets = records.len() as u64;
        let data_bytes: u64 = records.iter().map(|r| r.length).sum();
        let duration_secs = match (
            records.iter().map(|r| r.timestamp).fold(f64::INFINITY, f64::min),
            records.iter().map(|r| r.timestamp).fold(f64::NEG_INFINITY, f64::max),
        ) {
            (first, last) if first.is_finite() && last.is_finite() => last - first,
            _ => 0.0,
        };
        let data_rate_bits_per_sec = if duration_secs > 0.0 {
            data_bytes as f64 * 8.0 / duration_secs
        } else {
            0.0
        };
        let mean_packet_size = if packets > 0 {
            data_bytes as f64 / packets as f64
        } else {
            0.0
        };
        Self {
            packets,
            data_bytes,
            duration_secs,
            data_rate_bits_per_sec,
            mean_packet_size,
        }
    }
}

const TOOL: &str = "capinfos";

/// Run `capinfos` in machine-readable table mode over one trace and
/// parse the header/value rows into a summary.
pub fn capinfos(path: &Path) -> Result<CaptureSummary, CaptureError> {
    if !path.is_file() {
        return Err(CaptureError::MissingTrace(path.to_path_buf()));
    }

    let output = Command::new(TOOL)
        .args(["-T", "-m", "-Q", "-M"])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CaptureError::ToolUnavailable("capinfos"),
            _ => CaptureError::Io(e),
        })?;
    if !output.status.success() {
        return Err(CaptureError::ToolFailed {
            tool: "capinfos",
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_capinfos_table(&String::from_utf8_lossy(&output.stdout))
}

/// The `-T -m -Q` output is a two-row CSV: quoted column names, then
/// one value row per file.
fn parse_capinfos_table(table: &str) -> Result<CaptureSummary, CaptureError> {
    let bad = |message: String| CaptureError::BadOutput {
        tool: "capinfos",
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(table.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| bad(e.to_string()))?
        .clone();
    let row = match reader.records().next() {
        Some(row) => row.map_err(|e| bad(e.to_string()))?,
        None => return Err(bad("no value row".to_string())),
    };

    let columns: HashMap<&str, &str> = headers.iter().zip(row.iter()).collect();
    let field = |name: &str| -> Result<f64, CaptureError> {
        let value = columns
            .get(name)
            .ok_or_else(|| bad(format!("missing column `{name}`")))?;
        // values can carry a unit suffix; the number comes first
        value
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| bad(format!("unparseable `{name}` value: {value}")))
    };

    Ok(CaptureSummary {
        packets: field("Number of packets")? as u64,
        data_bytes: field("Data size (bytes)")? as u64,
        duration_secs: field("Capture duration (seconds)")?,
        data_rate_bits_per_sec: field("Data bit rate (bits/sec)")?,
        mean_packet_size: field("Average packet size (bytes)")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Protocol;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn parses_a_capinfos_table() {
        let table = concat!(
            "\"File name\",\"Number of packets\",\"Data size (bytes)\",",
            "\"Capture duration (seconds)\",\"Data bit rate (bits/sec)\",",
            "\"Average packet size (bytes)\"\n",
            "\"data/trace.pcap\",1000,64000,12.5,40960.00,64.00\n",
        );
        let summary = parse_capinfos_table(table).unwrap();
        assert_eq!(summary.packets, 1000);
        assert_eq!(summary.data_bytes, 64000);
        assert_eq!(summary.duration_secs, 12.5);
        assert_eq!(summary.data_rate_bits_per_sec, 40960.0);
        assert_eq!(summary.mean_packet_size, 64.0);
    }

    #[test]
    fn unit_suffixes_are_tolerated() {
        let table = concat!(
            "\"Number of packets\",\"Data size (bytes)\",",
            "\"Capture duration (seconds)\",\"Data bit rate (bits/sec)\",",
            "\"Average packet size (bytes)\"\n",
            "10,640,\"2.0 seconds\",2560.00,64.00\n",
        );
        let summary = parse_capinfos_table(table).unwrap();
        assert_eq!(summary.duration_secs, 2.0);
    }

    #[test]
    fn missing_column_is_bad_output() {
        let table = "\"File name\"\n\"x.pcap\"\n";
        assert!(matches!(
            parse_capinfos_table(table),
            Err(CaptureError::BadOutput { .. })
        ));
    }

    #[test]
    fn summary_from_records() {
        let host = |n: u8| IpAddr::V4(Ipv4Addr::new(10, 0, 0, n));
        let records: Vec<_> = (0..4)
            .map(|i| PacketRecord {
                timestamp: i as f64,
                source: host(1),
                destination: host(2),
                source_port: None,
                destination_port: None,
                protocol: Protocol::Tcp,
                length: 100,
            })
            .collect();
        let summary = CaptureSummary::from_records(&records);
        assert_eq!(summary.packets, 4);
        assert_eq!(summary.data_bytes, 400);
        assert_eq!(summary.duration_secs, 3.0);
        assert_eq!(summary.mean_packet_size, 100.0);
        // 400 bytes over 3 seconds
        assert!((summary.data_rate_bits_per_sec - 400.0 * 8.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_records_summarize_to_zeroes() {
        let summary = CaptureSummary::from_records(&[]);
        assert_eq!(summary.packets, 0);
        assert_eq!(summary.duration_secs, 0.0);
    }
}
