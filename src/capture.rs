use std::{
    fs,
    io::{self, BufReader},
    net::IpAddr,
    path::Path,
    process::Command,
};

use etherparse::{InternetSlice, SlicedPacket, TransportSlice};
use pcap_file::PcapReader;

use crate::{
    error::CaptureError,
    record::{PacketRecord, Protocol},
};

/// The fields requested from the capture tool, one column per field in
/// the order they appear on every output line.
const TSHARK_FIELDS: [&str; 9] = [
    "frame.time_epoch",
    "ip.src",
    "ip.dst",
    "ip.proto",
    "ip.len",
    "tcp.srcport",
    "tcp.dstport",
    "udp.srcport",
    "udp.dstport",
];

/// Result of reading one trace: the records in capture order, plus the
/// number of lines/frames that were skipped because they did not parse.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<PacketRecord>,
    pub skipped: usize,
}

/// Anything that can turn a trace file into packet records. The two
/// shipped implementations shell out to `tshark` or read the pcap
/// natively; tests substitute their own.
pub trait CaptureReader {
    fn read(&self, path: &Path) -> Result<Extraction, CaptureError>;
}

/// Field-extraction through the external `tshark` binary. Malformed
/// output lines are skipped and counted, never fatal; a missing tool or
/// a failed run is surfaced immediately.
#[derive(Debug, Default)]
pub struct TsharkReader;

impl TsharkReader {
    const TOOL: &'static str = "tshark";

    fn command(path: &Path) -> Command {
        let mut command = Command::new(Self::TOOL);
        command.arg("-r").arg(path).args(["-T", "fields"]);
        for field in TSHARK_FIELDS {
            command.args(["-e", field]);
        }
        command.args(["-E", "separator=/t", "-E", "occurrence=f"]);
        command
    }
}

impl CaptureReader for TsharkReader {
    fn read(&self, path: &Path) -> Result<Extraction, CaptureError> {
        if !path.is_file() {
            return Err(CaptureError::MissingTrace(path.to_path_buf()));
        }

        let output = Self::command(path).output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CaptureError::ToolUnavailable(Self::TOOL),
            _ => CaptureError::Io(e),
        })?;
        if !output.status.success() {
            return Err(CaptureError::ToolFailed {
                tool: Self::TOOL,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut extraction = Extraction::default();
        for line in stdout.lines() {
            match parse_field_line(line) {
                Some(record) => extraction.records.push(record),
                None => extraction.skipped += 1,
            }
        }
        Ok(extraction)
    }
}

/// One tab-separated `tshark -T fields` line. Non-IP frames come out as
/// runs of empty columns and land in the skip count like any other
/// unusable line.
fn parse_field_line(line: &str) -> Option<PacketRecord> {
    let mut columns = line.split('\t');

    let timestamp: f64 = columns.next()?.parse().ok()?;
    let source: IpAddr = columns.next()?.parse().ok()?;
    let destination: IpAddr = columns.next()?.parse().ok()?;
    let protocol: u8 = columns.next()?.parse().ok()?;
    let length: u64 = columns.next()?.parse().ok()?;
    let tcp_src = optional_port(columns.next()?)?;
    let tcp_dst = optional_port(columns.next()?)?;
    let udp_src = optional_port(columns.next()?)?;
    let udp_dst = optional_port(columns.next()?)?;

    Some(PacketRecord {
        timestamp,
        source,
        destination,
        source_port: tcp_src.or(udp_src),
        destination_port: tcp_dst.or(udp_dst),
        protocol: Protocol::from(protocol),
        length,
    })
}

// Empty column means "no such field on this packet", which is valid.
fn optional_port(column: &str) -> Option<Option<u16>> {
    if column.is_empty() {
        return Some(None);
    }
    column.parse().ok().map(Some)
}

/// Native reader over the pcap file itself. Frames that are not
/// Ethernet/IP are skipped and counted.
#[derive(Debug, Default)]
pub struct PcapFileReader;

impl CaptureReader for PcapFileReader {
    fn read(&self, path: &Path) -> Result<Extraction, CaptureError> {
        let file = fs::File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CaptureError::MissingTrace(path.to_path_buf()),
            _ => CaptureError::Io(e),
        })?;
        let reader = PcapReader::new(BufReader::new(file))?;

        let mut extraction = Extraction::default();
        for packet in reader {
            let packet = packet?;
            let timestamp =
                packet.header.ts_sec as f64 + packet.header.ts_nsec as f64 / 1_000_000_000.0;
            match slice_record(&packet.data, timestamp) {
                Some(record) => extraction.records.push(record),
                None => extraction.skipped += 1,
            }
        }
        Ok(extraction)
    }
}

fn slice_record(data: &[u8], timestamp: f64) -> Option<PacketRecord> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;

    let (protocol, source, destination, length) = match sliced.ip {
        Some(InternetSlice::Ipv4(header, _extensions)) => (
            header.protocol(),
            IpAddr::from(header.source()),
            IpAddr::from(header.destination()),
            header.total_len() as u64,
        ),
        Some(InternetSlice::Ipv6(header, _extensions)) => (
            header.next_header(),
            IpAddr::from(header.source()),
            IpAddr::from(header.destination()),
            // IPv6 has no total-length field; count the fixed header too
            // so lengths are comparable with the IPv4 rows.
            header.payload_length() as u64 + 40,
        ),
        None => return None,
    };

    let (source_port, destination_port) = match sliced.transport {
        Some(TransportSlice::Tcp(header)) => {
            (Some(header.source_port()), Some(header.destination_port()))
        }
        Some(TransportSlice::Udp(header)) => {
            (Some(header.source_port()), Some(header.destination_port()))
        }
        _ => (None, None),
    };

    Some(PacketRecord {
        timestamp,
        source,
        destination,
        source_port,
        destination_port,
        protocol: Protocol::from(protocol),
        length,
    })
}
