#![allow(dead_code)]

use std::fs;
use std::path::Path;

use etherparse::PacketBuilder;
use tempfile::NamedTempFile;

pub const LINKTYPE_ETHERNET: u16 = 1;
pub const LINKTYPE_RAW: u16 = 101;

/// A frame and its capture time in microseconds since the epoch.
pub struct Frame {
    pub ts_us: u64,
    pub data: Vec<u8>,
}

pub fn tcp(ts_us: u64, src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Frame {
    let builder = PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1000, 4096);
    let mut data = Vec::new();
    builder.write(&mut data, b"GET / HTTP/1.1\r\n").unwrap();
    Frame { ts_us, data }
}

pub fn udp(ts_us: u64, src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Frame {
    let builder = PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 3], [0x02, 0, 0, 0, 0, 4])
        .ipv4(src, dst, 64)
        .udp(sport, dport);
    let mut data = Vec::new();
    builder.write(&mut data, &[0xab; 12]).unwrap();
    Frame { ts_us, data }
}

pub fn arp(ts_us: u64) -> Frame {
    let mut data = vec![0xff; 6];
    data.extend_from_slice(&[0x02, 0, 0, 0, 0, 9]);
    data.extend_from_slice(&[0x08, 0x06]);
    data.extend_from_slice(&[0u8; 28]);
    Frame { ts_us, data }
}

/// Three HTTP frames from .1 to .2 and one DNS frame from .3 to .4.
pub fn web_and_dns() -> Vec<Frame> {
    let base = 1_700_000_000_000_000;
    vec![
        tcp(base, [10, 0, 0, 1], [10, 0, 0, 2], 50000, 80),
        tcp(base + 1_000, [10, 0, 0, 1], [10, 0, 0, 2], 50000, 80),
        tcp(base + 2_000, [10, 0, 0, 1], [10, 0, 0, 2], 50000, 80),
        udp(base + 3_000, [10, 0, 0, 3], [10, 0, 0, 4], 40000, 53),
    ]
}

/// `count` UDP frames spread over a few hosts.
pub fn bulk(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|n| {
            let host = (n % 7) as u8 + 1;
            udp(
                1_700_000_000_000_000 + n as u64,
                [192, 168, 1, host],
                [192, 168, 1, 200],
                30000 + (n % 3) as u16,
                9999,
            )
        })
        .collect()
}

pub fn write_pcapng(path: &Path, linktype: u16, frames: &[Frame]) {
    let mut out = Vec::new();
    push_block(&mut out, 0x0A0D_0D0A, &section_header());
    push_block(&mut out, 0x0000_0001, &interface_description(linktype));
    for frame in frames {
        push_block(&mut out, 0x0000_0006, &enhanced_packet(frame));
    }
    fs::write(path, out).unwrap();
}

pub fn write_legacy_pcap(path: &Path, linktype: u16, frames: &[Frame]) {
    let records: Vec<(u32, u32, &[u8])> = frames
        .iter()
        .map(|frame| {
            let secs = (frame.ts_us / 1_000_000) as u32;
            let micros = (frame.ts_us % 1_000_000) as u32;
            (secs, micros, frame.data.as_slice())
        })
        .collect();
    write_legacy_records(path, 0xa1b2_c3d4, linktype, &records);
}

/// Nanosecond-resolution legacy pcap; records are `(seconds, nanoseconds, data)`.
pub fn write_legacy_pcap_nanos(path: &Path, linktype: u16, records: &[(u32, u32, &[u8])]) {
    write_legacy_records(path, 0xa1b2_3c4d, linktype, records);
}

fn write_legacy_records(path: &Path, magic: u32, linktype: u16, records: &[(u32, u32, &[u8])]) {
    let mut out = Vec::new();
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&u32::from(linktype).to_le_bytes());
    for (secs, frac, data) in records {
        let len = data.len() as u32;
        out.extend_from_slice(&secs.to_le_bytes());
        out.extend_from_slice(&frac.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(data);
    }
    fs::write(path, out).unwrap();
}

pub fn pcapng_file(frames: &[Frame]) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".pcapng").tempfile().unwrap();
    write_pcapng(file.path(), LINKTYPE_ETHERNET, frames);
    file
}

pub fn legacy_pcap_file(frames: &[Frame]) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".pcap").tempfile().unwrap();
    write_legacy_pcap(file.path(), LINKTYPE_ETHERNET, frames);
    file
}

fn push_block(out: &mut Vec<u8>, block_type: u32, body: &[u8]) {
    let total_len = (12 + body.len()) as u32;
    out.extend_from_slice(&block_type.to_le_bytes());
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&total_len.to_le_bytes());
}

fn section_header() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0x1A2B_3C4Du32.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&(-1i64).to_le_bytes());
    body
}

fn interface_description(linktype: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&linktype.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&65535u32.to_le_bytes());
    body
}

fn enhanced_packet(frame: &Frame) -> Vec<u8> {
    let len = frame.data.len() as u32;
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&((frame.ts_us >> 32) as u32).to_le_bytes());
    body.extend_from_slice(&(frame.ts_us as u32).to_le_bytes());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&frame.data);
    body.resize(body.len().next_multiple_of(4), 0);
    body
}
