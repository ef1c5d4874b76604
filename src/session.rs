use std::net::IpAddr;

use ahash::RandomState;
use indexmap::IndexMap;
use rayon::prelude::*;

use crate::record::{PacketRecord, Protocol};

pub type SessionMap = IndexMap<SessionKey, Session, RandomState>;

/// Canonical grouping key: the unordered host pair plus the transport
/// protocol. Graphs are host granularity, so ports never enter the key
/// and port-less traffic groups like everything else. Construction
/// sorts the endpoints, so A->B and B->A packets share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    a: IpAddr,
    b: IpAddr,
    protocol: Protocol,
}

impl SessionKey {
    pub fn new(x: IpAddr, y: IpAddr, protocol: Protocol) -> Self {
        if x <= y {
            Self { a: x, b: y, protocol }
        } else {
            Self { a: y, b: x, protocol }
        }
    }

    /// The host pair in canonical order (`hosts().0 <= hosts().1`).
    pub fn hosts(&self) -> (IpAddr, IpAddr) {
        (self.a, self.b)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Traffic a host sent to itself. Kept in the session map, never
    /// turned into a graph edge.
    pub fn is_self_pair(&self) -> bool {
        self.a == self.b
    }
}

/// Aggregate of every packet exchanged between one host pair over one
/// protocol. All fields accumulate commutatively (sums, counts, min/max
/// timestamps), so the result is independent of record order and of how
/// the input was chunked. The forward direction is the canonical
/// orientation of the key (`hosts().0` -> `hosts().1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub bytes: u64,
    pub packets: u64,
    pub first_seen: f64,
    pub last_seen: f64,
    pub bytes_forward: u64,
    pub bytes_reverse: u64,
    pub packets_forward: u64,
    pub packets_reverse: u64,
}

impl Session {
    fn from_record(key: &SessionKey, record: &PacketRecord) -> Self {
        let forward = record.source == key.a;
        Self {
            bytes: record.length,
            packets: 1,
            first_seen: record.timestamp,
            last_seen: record.timestamp,
            bytes_forward: if forward { record.length } else { 0 },
            bytes_reverse: if forward { 0 } else { record.length },
            packets_forward: forward as u64,
            packets_reverse: !forward as u64,
        }
    }

    fn absorb(&mut self, key: &SessionKey, record: &PacketRecord) {
        self.bytes += record.length;
        self.packets += 1;
        // min/max, not first/last-seen, to stay order-independent
        self.first_seen = self.first_seen.min(record.timestamp);
        self.last_seen = self.last_seen.max(record.timestamp);
        if record.source == key.a {
            self.bytes_forward += record.length;
            self.packets_forward += 1;
        } else {
            self.bytes_reverse += record.length;
            self.packets_reverse += 1;
        }
    }

    fn merge_with(&mut self, other: &Session) {
        self.bytes += other.bytes;
        self.packets += other.packets;
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.bytes_forward += other.bytes_forward;
        self.bytes_reverse += other.bytes_reverse;
        self.packets_forward += other.packets_forward;
        self.packets_reverse += other.packets_reverse;
    }

    pub fn duration(&self) -> f64 {
        self.last_seen - self.first_seen
    }
}

/// Fold records into a session map. Records arrive in capture order but
/// no ordering is assumed; duplicates are counted, never deduplicated.
pub fn aggregate(records: &[PacketRecord]) -> SessionMap {
    let mut sessions = SessionMap::with_hasher(RandomState::new());
    for record in records {
        let key = SessionKey::new(record.source, record.destination, record.protocol);
        match sessions.get_mut(&key) {
            Some(session) => session.absorb(&key, record),
            None => {
                sessions.insert(key, Session::from_record(&key, record));
            }
        }
    }
    sessions
}

/// Combine two partial session maps with the same algebra `aggregate`
/// uses, so chunked runs agree with a single sequential pass.
pub fn merge(mut into: SessionMap, from: SessionMap) -> SessionMap {
    for (key, session) in from {
        match into.get_mut(&key) {
            Some(existing) => existing.merge_with(&session),
            None => {
                into.insert(key, session);
            }
        }
    }
    into
}

/// Chunked aggregation across the rayon pool. A performance experiment,
/// not a requirement: the result equals `aggregate` for every chunk
/// size and worker count.
pub fn aggregate_parallel(records: &[PacketRecord], chunk_size: usize) -> SessionMap {
    records
        .par_chunks(chunk_size.max(1))
        .map(aggregate)
        .reduce(|| SessionMap::with_hasher(RandomState::new()), merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn host(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn record(
        src: u8,
        dst: u8,
        protocol: Protocol,
        length: u64,
        timestamp: f64,
    ) -> PacketRecord {
        PacketRecord {
            timestamp,
            source: host(src),
            destination: host(dst),
            source_port: None,
            destination_port: None,
            protocol,
            length,
        }
    }

    #[test]
    fn opposite_directions_share_a_session() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 100, 0.0),
            record(2, 1, Protocol::Tcp, 50, 1.0),
        ];
        let sessions = aggregate(&records);
        assert_eq!(sessions.len(), 1);

        let session = &sessions[&SessionKey::new(host(1), host(2), Protocol::Tcp)];
        assert_eq!(session.bytes, 150);
        assert_eq!(session.packets, 2);
        assert_eq!(session.bytes_forward, 100);
        assert_eq!(session.bytes_reverse, 50);
        assert_eq!(session.first_seen, 0.0);
        assert_eq!(session.last_seen, 1.0);
    }

    #[test]
    fn protocol_splits_sessions() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 100, 0.0),
            record(1, 2, Protocol::Udp, 100, 0.0),
            record(1, 2, Protocol::Other(1), 84, 0.0),
        ];
        assert_eq!(aggregate(&records).len(), 3);
    }

    #[test]
    fn byte_total_is_conserved() {
        let records: Vec<_> = (0..100)
            .map(|i| record(i % 5, (i + 1) % 5, Protocol::Tcp, 10 + i as u64, i as f64))
            .collect();
        let total: u64 = records.iter().map(|r| r.length).sum();
        let sessions = aggregate(&records);
        assert_eq!(sessions.values().map(|s| s.bytes).sum::<u64>(), total);
        assert_eq!(sessions.values().map(|s| s.packets).sum::<u64>(), 100);
    }

    #[test]
    fn duplicates_all_count() {
        let records = vec![record(1, 2, Protocol::Udp, 60, 3.0); 4];
        let sessions = aggregate(&records);
        let session = &sessions[&SessionKey::new(host(1), host(2), Protocol::Udp)];
        assert_eq!(session.packets, 4);
        assert_eq!(session.bytes, 240);
    }

    #[test]
    fn timestamps_reduce_by_min_max() {
        // out of order on purpose
        let records = vec![
            record(1, 2, Protocol::Tcp, 10, 5.0),
            record(1, 2, Protocol::Tcp, 10, 1.0),
            record(2, 1, Protocol::Tcp, 10, 9.0),
            record(1, 2, Protocol::Tcp, 10, 3.0),
        ];
        let sessions = aggregate(&records);
        let session = &sessions[&SessionKey::new(host(1), host(2), Protocol::Tcp)];
        assert_eq!(session.first_seen, 1.0);
        assert_eq!(session.last_seen, 9.0);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 100, 0.0),
            record(2, 1, Protocol::Tcp, 50, 1.0),
            record(3, 4, Protocol::Udp, 200, 0.5),
            record(1, 3, Protocol::Tcp, 75, 2.0),
            record(4, 3, Protocol::Udp, 25, 3.0),
        ];
        let expected = aggregate(&records);

        // every rotation of the input
        let mut rotated = records;
        for _ in 0..rotated.len() {
            rotated.rotate_left(1);
            assert_eq!(aggregate(&rotated), expected);
        }
        let mut reversed: Vec<_> = rotated.clone();
        reversed.reverse();
        assert_eq!(aggregate(&reversed), expected);
    }

    #[test]
    fn parallel_equals_sequential_for_any_chunking() {
        let records: Vec<_> = (0..157)
            .map(|i| {
                let protocol = if i % 3 == 0 { Protocol::Udp } else { Protocol::Tcp };
                record((i % 7) as u8, ((i * 3 + 1) % 7) as u8, protocol, (i + 1) as u64, i as f64 / 10.0)
            })
            .collect();
        let expected = aggregate(&records);
        for chunk_size in [1, 2, 7, 64, 1000] {
            assert_eq!(aggregate_parallel(&records, chunk_size), expected);
        }
    }

    #[test]
    fn empty_input_yields_empty_map() {
        assert!(aggregate(&[]).is_empty());
        assert!(aggregate_parallel(&[], 8).is_empty());
    }

    #[test]
    fn self_pair_traffic_stays_in_the_map() {
        let records = vec![record(1, 1, Protocol::Udp, 40, 0.0)];
        let sessions = aggregate(&records);
        assert_eq!(sessions.len(), 1);
        let key = SessionKey::new(host(1), host(1), Protocol::Udp);
        assert!(key.is_self_pair());
        assert_eq!(sessions[&key].packets, 1);
    }
}
