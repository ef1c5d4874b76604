use crate::{
    record::Protocol,
    session::{Session, SessionKey, SessionMap},
};

/// Fixed-length numeric projection of one session, with the transport
/// protocol kept as ground truth for the supervised experiments.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub packets: f64,
    pub bytes: f64,
    pub duration: f64,
    pub mean_interarrival: f64,
    pub mean_packet_size: f64,
    pub label: Protocol,
}

impl FeatureVector {
    pub const DIM: usize = 5;

    pub fn from_session(key: &SessionKey, session: &Session) -> Self {
        let packets = session.packets as f64;
        let duration = session.duration();
        // mean of consecutive gaps telescopes to span/(n-1), so this
        // stays order-independent like the min/max timestamps it comes
        // from
        let mean_interarrival = if session.packets > 1 {
            duration / (packets - 1.0)
        } else {
            0.0
        };
        Self {
            packets,
            bytes: session.bytes as f64,
            duration,
            mean_interarrival,
            mean_packet_size: session.bytes as f64 / packets,
            label: key.protocol(),
        }
    }

    pub fn values(&self) -> [f64; Self::DIM] {
        [
            self.packets,
            self.bytes,
            self.duration,
            self.mean_interarrival,
            self.mean_packet_size,
        ]
    }
}

/// Feature vectors for every TCP and UDP session. Other protocols have
/// no ground-truth side in the TCP-vs-UDP experiments and are left out.
pub fn from_sessions(sessions: &SessionMap) -> Vec<FeatureVector> {
    sessions
        .iter()
        .filter(|(key, _)| matches!(key.protocol(), Protocol::Tcp | Protocol::Udp))
        .map(|(key, session)| FeatureVector::from_session(key, session))
        .collect()
}
