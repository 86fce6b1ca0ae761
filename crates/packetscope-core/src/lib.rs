//! PacketScope core library: live capture and offline capture analysis.
//!
//! The crate implements a line-delimited JSON agent that a controlling process
//! drives over a duplex byte stream. Frames flow from packet sources (live
//! datalink or pcap/pcapng files) through the normalizer into one of two
//! engines, which report back through the message channel:
//!
//! - `capture`: at most one live session, a bounded drop-oldest queue and a
//!   forwarding loop that emits `packet_data` events in FIFO order.
//! - `analysis`: at most one offline job that accumulates traffic statistics,
//!   reports progress and honours cooperative cancellation.
//!
//! Parsing is byte-oriented and side-effect free; all I/O is isolated in
//! `source` and `channel`. Engines never return errors to the command loop,
//! they report through events only.
//!
//! Invariants:
//! - Only one capture session and one analysis job are active at a time.
//! - Report rankings are deterministic: count descending, first-seen on ties.
//! - Every emitted message is a single JSON line carrying a `type` field.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use packetscope_core::analyze_pcap_file;
//!
//! let report = analyze_pcap_file(Path::new("capture.pcapng"))?;
//! println!("frames: {}", report.packet_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

mod analysis;
mod capture;
mod channel;
mod dispatch;
mod normalize;
mod protocol;
mod server;
mod source;

pub use analysis::engine::{AnalysisEngine, JobState};
pub use analysis::{
    AnalysisError, AnalysisHooks, NoHooks, Outcome, analyze_pcap_file, analyze_source,
};
pub use capture::queue::BoundedQueue;
pub use capture::{CaptureConfig, CaptureEngine, SessionState};
pub use channel::{
    ChannelError, Inbound, Outbox, outbox, run_writer, spawn_line_reader, write_event,
};
pub use dispatch::Dispatcher;
pub use normalize::{PacketRecord, Protocol, normalize};
pub use protocol::{AnalysisStatus, Command, CommandError, Event, InterfaceInfo};
pub use server::{ServeConfig, serve};
pub use source::{
    CaptureBackend, DatalinkBackend, LiveSource, OpenedCapture, PacketEvent, PacketSource,
    PcapFileSource, SourceError,
};

/// Number of entries kept in each ranked section of a report.
pub const TOP_N: usize = 10;

/// Current wall-clock time as UNIX seconds with sub-second precision.
pub fn unix_now() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// Aggregated statistics for one analysed capture file.
///
/// # Examples
/// ```
/// use packetscope_core::StatisticsReport;
///
/// let report = StatisticsReport::empty(0);
/// assert_eq!(report.packet_sizes.avg, 0.0);
/// assert!(report.top_ips.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Total frames read from the capture, network-layer or not.
    pub packet_count: u64,
    /// Top addresses, each counted once as source and once as destination.
    pub top_ips: RankedCounts,
    /// Frames per protocol tag for frames with a network-layer header.
    pub protocols: RankedCounts,
    /// Top `"<proto> <port>"` labels, both directions.
    pub top_ports: RankedCounts,
    /// Top `"src → dst"` address pairs.
    pub top_connections: RankedCounts,
    /// Frame size bounds over network-layer frames.
    pub packet_sizes: PacketSizes,
    /// RFC3339 timestamp of the earliest frame (if known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the latest frame (if known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

impl StatisticsReport {
    /// Report with no network-layer observations.
    pub fn empty(packet_count: u64) -> Self {
        Self {
            packet_count,
            top_ips: RankedCounts::default(),
            protocols: RankedCounts::default(),
            top_ports: RankedCounts::default(),
            top_connections: RankedCounts::default(),
            packet_sizes: PacketSizes::default(),
            time_start: None,
            time_end: None,
        }
    }
}

/// Minimum, maximum and mean frame size in bytes. All zero when unobserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketSizes {
    pub min: u64,
    pub max: u64,
    pub avg: f64,
}

/// Label/count pairs in rank order, serialised as a JSON object whose key
/// order is the rank order.
///
/// # Examples
/// ```
/// use packetscope_core::RankedCounts;
///
/// let ranked = RankedCounts::from(vec![("TCP".to_string(), 3), ("UDP".to_string(), 1)]);
/// assert_eq!(ranked.get("TCP"), Some(3));
/// assert_eq!(serde_json::to_string(&ranked).unwrap(), r#"{"TCP":3,"UDP":1}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedCounts(Vec<(String, u64)>);

impl RankedCounts {
    pub fn get(&self, label: &str) -> Option<u64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, count)| *count)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

impl From<Vec<(String, u64)>> for RankedCounts {
    fn from(value: Vec<(String, u64)>) -> Self {
        Self(value)
    }
}

impl Serialize for RankedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, count) in &self.0 {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RankedCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RankedVisitor;

        impl<'de> Visitor<'de> for RankedVisitor {
            type Value = RankedCounts;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of label to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, count)) = access.next_entry::<String, u64>()? {
                    entries.push((label, count));
                }
                Ok(RankedCounts(entries))
            }
        }

        deserializer.deserialize_map(RankedVisitor)
    }
}
