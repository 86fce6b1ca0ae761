//! Frame normalization: protocol classification and address/port extraction.
//!
//! `normalize` is pure. The same frame always yields the same record, which
//! is what lets the live stream and the offline report agree on tags.

use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;
use serde::{Deserialize, Serialize};

use crate::source::PacketEvent;
use crate::unix_now;

/// Protocol tag of a normalized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ICMP")]
    Icmp,
    Other,
    Unknown,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "Other",
            Protocol::Unknown => "Unknown",
        }
    }
}

/// One observed frame. Addresses are absent without a network-layer header;
/// ports are present only for TCP and UDP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub timestamp: f64,
    pub protocol: Protocol,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub size: u64,
}

impl PacketRecord {
    pub fn has_network_layer(&self) -> bool {
        self.src_ip.is_some() && self.dst_ip.is_some()
    }
}

/// Map a raw frame to a `PacketRecord`.
///
/// Frames without a timestamp are stamped with the current wall clock.
///
/// # Examples
/// ```
/// use packetscope_core::{PacketEvent, Protocol, normalize};
/// use pcap_parser::Linktype;
///
/// let frame = PacketEvent { ts: Some(1.0), linktype: Linktype::ETHERNET, data: vec![0; 4] };
/// let record = normalize(&frame);
/// assert_eq!(record.protocol, Protocol::Unknown);
/// assert!(record.src_ip.is_none());
/// ```
pub fn normalize(frame: &PacketEvent) -> PacketRecord {
    let mut record = PacketRecord {
        timestamp: frame.ts.unwrap_or_else(unix_now),
        protocol: Protocol::Unknown,
        src_ip: None,
        dst_ip: None,
        src_port: None,
        dst_port: None,
        size: frame.data.len() as u64,
    };

    let Some(sliced) = slice_frame(frame.linktype, &frame.data) else {
        return record;
    };
    let Some(net) = sliced.net else {
        return record;
    };

    let (src_ip, dst_ip) = match net {
        NetSlice::Ipv4(ref ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ref ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
    };
    record.src_ip = Some(src_ip);
    record.dst_ip = Some(dst_ip);

    record.protocol = match sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            record.src_port = Some(tcp.source_port());
            record.dst_port = Some(tcp.destination_port());
            Protocol::Tcp
        }
        Some(TransportSlice::Udp(udp)) => {
            record.src_port = Some(udp.source_port());
            record.dst_port = Some(udp.destination_port());
            Protocol::Udp
        }
        Some(TransportSlice::Icmpv4(_)) | Some(TransportSlice::Icmpv6(_)) => Protocol::Icmp,
        _ => Protocol::Other,
    };
    record
}

fn slice_frame(linktype: Linktype, data: &[u8]) -> Option<SlicedPacket<'_>> {
    match linktype {
        Linktype::ETHERNET => SlicedPacket::from_ethernet(data).ok(),
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => SlicedPacket::from_ip(data).ok(),
        Linktype::LINUX_SLL => SlicedPacket::from_linux_sll(data).ok(),
        _ => None,
    }
}
