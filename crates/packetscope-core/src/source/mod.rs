mod live;
mod pcap;

pub use live::DatalinkBackend;
pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use thiserror::Error;

use crate::protocol::InterfaceInfo;

/// One raw frame with its capture timestamp and link-layer type.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub ts: Option<f64>,
    pub linktype: Linktype,
    pub data: Vec<u8>,
}

/// Finite frame source; `Ok(None)` marks the end of the input.
pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

/// Unbounded frame source; `Ok(None)` means the read timed out with no frame.
pub trait LiveSource: Send {
    fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

/// A live source bound to a resolved interface name.
pub struct OpenedCapture {
    pub interface: String,
    pub source: Box<dyn LiveSource>,
}

/// Platform access for live capture: opening sources and listing interfaces.
pub trait CaptureBackend: Send + Sync {
    /// Open a source on `interface`, or on a backend default when `None`.
    fn open(&self, interface: Option<&str>) -> Result<OpenedCapture, SourceError>;

    fn interfaces(&self) -> Result<Vec<InterfaceInfo>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("failed to open capture channel: {0}")]
    Channel(String),
}

impl From<pcap::error::PcapSourceError> for SourceError {
    fn from(value: pcap::error::PcapSourceError) -> Self {
        match value {
            pcap::error::PcapSourceError::Io(err) => SourceError::Io(err),
            err @ pcap::error::PcapSourceError::UnknownFormat { .. } => {
                SourceError::Pcap(err.to_string())
            }
            pcap::error::PcapSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
        }
    }
}
