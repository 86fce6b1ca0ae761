//! Live frame source over a layer-2 datalink channel.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::Duration;

use log::{debug, warn};
use pcap_parser::Linktype;
use pnet_datalink::{Channel, Config, DataLinkReceiver, NetworkInterface};

use super::{CaptureBackend, LiveSource, OpenedCapture, PacketEvent, SourceError};
use crate::protocol::InterfaceInfo;
use crate::unix_now;

/// Address reported for interfaces without a bound address.
pub(crate) const UNKNOWN_ADDRESS: &str = "Unknown";

/// `CaptureBackend` backed by the platform datalink layer.
#[derive(Debug, Clone)]
pub struct DatalinkBackend {
    read_timeout: Duration,
    promiscuous: bool,
}

impl DatalinkBackend {
    /// `read_timeout` bounds how long a capture loop blocks before it
    /// re-checks its stop flag.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            promiscuous: true,
        }
    }
}

impl Default for DatalinkBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl CaptureBackend for DatalinkBackend {
    fn open(&self, interface: Option<&str>) -> Result<OpenedCapture, SourceError> {
        let iface = resolve_interface(pnet_datalink::interfaces(), interface)?;
        let config = Config {
            read_timeout: Some(self.read_timeout),
            promiscuous: self.promiscuous,
            ..Config::default()
        };

        let rx = match pnet_datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(SourceError::Channel(format!(
                    "unsupported channel type on {}",
                    iface.name
                )));
            }
            Err(e) => return Err(SourceError::Channel(format!("{}: {}", iface.name, e))),
        };
        debug!("datalink channel open on {}", iface.name);

        Ok(OpenedCapture {
            interface: iface.name,
            source: Box::new(DatalinkSource { rx }),
        })
    }

    fn interfaces(&self) -> Result<Vec<InterfaceInfo>, SourceError> {
        Ok(pnet_datalink::interfaces()
            .iter()
            .map(|iface| {
                let ips: Vec<IpAddr> = iface.ips.iter().map(|net| net.ip()).collect();
                InterfaceInfo {
                    name: iface.name.clone(),
                    address: interface_address(&ips),
                }
            })
            .collect())
    }
}

struct DatalinkSource {
    rx: Box<dyn DataLinkReceiver>,
}

impl LiveSource for DatalinkSource {
    fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(PacketEvent {
                ts: Some(unix_now()),
                linktype: Linktype::ETHERNET,
                data: frame.to_vec(),
            })),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

/// Pick the named interface, or the first up, non-loopback interface that
/// has an address.
fn resolve_interface(
    interfaces: Vec<NetworkInterface>,
    name: Option<&str>,
) -> Result<NetworkInterface, SourceError> {
    match name {
        Some(name) => interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| {
                warn!("interface '{}' not found", name);
                SourceError::InterfaceNotFound(name.to_string())
            }),
        None => interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or_else(|| SourceError::InterfaceNotFound("no suitable default interface".into())),
    }
}

/// Prefer the first IPv4 address; fall back to any address, then `Unknown`.
pub(crate) fn interface_address(ips: &[IpAddr]) -> String {
    ips.iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| ips.first())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}
