//! Offline analysis of an archived packet-capture trace.
//!
//! The pipeline is a chain of pure steps, each consuming the previous
//! step's output: extract per-packet records from the trace (through
//! `tshark` or a native pcap reader), fold them into bidirectional
//! host-pair sessions, build one undirected topology graph per
//! transport protocol, and compute degree/component statistics with
//! plots. A separate experiment layer derives per-session feature
//! vectors and runs clustering/classification over them.

pub mod acquire;
pub mod capture;
pub mod classify;
pub mod error;
pub mod features;
pub mod plot;
pub mod record;
pub mod session;
pub mod summary;
pub mod topology;

pub use error::{AcquireError, CaptureError};
pub use record::{PacketRecord, Protocol};
pub use session::{aggregate, aggregate_parallel, merge, Session, SessionKey, SessionMap};
pub use topology::TopologyGraph;
