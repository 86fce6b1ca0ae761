use std::io::{Read, Seek, SeekFrom};

use pcap_parser::Linktype;

use super::error::PcapSourceError;
use super::layout;

/// Read the four magic bytes and rewind to the start of the stream.
///
/// # Errors
/// Returns `PcapSourceError::Io` when the stream is shorter than four bytes or
/// cannot be rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

pub fn is_legacy_magic(magic: &[u8; 4]) -> bool {
    layout::LEGACY_MAGICS.contains(magic)
}

/// Link type declared for a pcapng interface id, Ethernet when undeclared.
pub fn linktype_for_interface(linktypes: &[Linktype], if_id: u32) -> Linktype {
    linktypes
        .get(if_id as usize)
        .copied()
        .unwrap_or(Linktype::ETHERNET)
}

/// Combine the pcapng 64-bit microsecond timestamp halves into seconds.
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32) -> f64 {
    let ts = ((ts_high as u64) << 32) | (ts_low as u64);
    split_micros_to_seconds(ts / 1_000_000, ts % 1_000_000)
}

/// Legacy record timestamp in seconds. `nanosecond` follows the file magic:
/// the fractional field holds nanoseconds instead of microseconds.
pub fn legacy_ts_to_seconds(ts_sec: u32, ts_frac: u32, nanosecond: bool) -> f64 {
    if nanosecond {
        f64::from(ts_sec) + f64::from(ts_frac) / 1_000_000_000.0
    } else {
        split_micros_to_seconds(u64::from(ts_sec), u64::from(ts_frac))
    }
}

// Whole seconds stay exact, so both container formats agree bit for bit.
fn split_micros_to_seconds(secs: u64, micros: u64) -> f64 {
    secs as f64 + micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::{
        is_legacy_magic, is_pcapng_magic, legacy_ts_to_seconds, linktype_for_interface,
        pcapng_ts_to_seconds, read_magic_and_rewind,
    };
    use crate::source::pcap::error::PcapSourceError;
    use pcap_parser::Linktype;
    use std::io::{Cursor, Read};

    #[test]
    fn legacy_magic_is_not_pcapng() {
        assert!(!is_pcapng_magic(&[0xd4, 0xc3, 0xb2, 0xa1]));
        assert!(is_pcapng_magic(&super::layout::PCAPNG_MAGIC));
        assert!(is_legacy_magic(&[0xa1, 0xb2, 0x3c, 0x4d]));
        assert!(!is_legacy_magic(&super::layout::PCAPNG_MAGIC));
        assert!(!is_legacy_magic(b"GET "));
    }

    #[test]
    fn read_magic_rewinds() {
        let mut cursor = Cursor::new([0xd4, 0xc3, 0xb2, 0xa1, 0x02]);
        let magic = read_magic_and_rewind(&mut cursor).unwrap();
        assert_eq!(magic, [0xd4, 0xc3, 0xb2, 0xa1]);
        let mut first = [0u8; 1];
        cursor.read_exact(&mut first).unwrap();
        assert_eq!(first[0], 0xd4);
    }

    #[test]
    fn read_magic_too_short() {
        let mut cursor = Cursor::new([0x0a, 0x0d]);
        let err = read_magic_and_rewind(&mut cursor).unwrap_err();
        assert!(matches!(err, PcapSourceError::Io(_)));
    }

    #[test]
    fn undeclared_interface_falls_back_to_ethernet() {
        let linktypes = [Linktype::RAW];
        assert_eq!(linktype_for_interface(&linktypes, 0), Linktype::RAW);
        assert_eq!(linktype_for_interface(&linktypes, 3), Linktype::ETHERNET);
    }

    #[test]
    fn timestamps_convert_to_seconds() {
        assert!((pcapng_ts_to_seconds(0, 2_250_000) - 2.25).abs() < 1e-9);
        assert!((legacy_ts_to_seconds(10, 500_000, false) - 10.5).abs() < 1e-9);
    }

    #[test]
    fn both_formats_agree_on_the_same_instant() {
        let micros: u64 = 1_700_000_000_003_000;
        let ng = pcapng_ts_to_seconds((micros >> 32) as u32, micros as u32);
        assert_eq!(ng, legacy_ts_to_seconds(1_700_000_000, 3_000, false));
        assert_eq!(pcapng_ts_to_seconds(0, 0), 0.0);
    }

    #[test]
    fn nanosecond_fraction_is_scaled() {
        assert_eq!(legacy_ts_to_seconds(1_700_000_000, 500_000_000, true), 1_700_000_000.5);
        assert_eq!(legacy_ts_to_seconds(7, 0, true), 7.0);
    }
}
