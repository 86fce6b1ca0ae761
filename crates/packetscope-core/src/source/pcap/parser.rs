use std::fs::File;
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader};

use crate::source::{PacketEvent, PacketSource, SourceError};

use super::error::PcapSourceError;
use super::layout;
use super::reader::{
    is_legacy_magic, is_pcapng_magic, legacy_ts_to_seconds, linktype_for_interface,
    pcapng_ts_to_seconds, read_magic_and_rewind,
};

/// Frame source over a legacy pcap or pcapng file, chosen by magic bytes.
pub struct PcapFileSource {
    inner: PcapReader,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Option<Linktype>,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<File>,
        linktypes: Vec<Linktype>,
    },
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let inner = PcapReader::from_file(file)?;
        Ok(Self { inner })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        self.inner.next_event().map_err(SourceError::from)
    }
}

impl PcapReader {
    fn from_file(mut file: File) -> Result<Self, PcapSourceError> {
        let magic = read_magic_and_rewind(&mut file)?;
        if is_pcapng_magic(&magic) {
            let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
                .map_err(|e| parse_error("pcapng reader init", e))?;
            return Ok(Self::Ng {
                reader,
                linktypes: Vec::new(),
            });
        }
        if !is_legacy_magic(&magic) {
            return Err(PcapSourceError::UnknownFormat { magic });
        }
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
            .map_err(|e| parse_error("pcap reader init", e))?;
        Ok(Self::Legacy {
            reader,
            linktype: None,
            nanosecond: false,
        })
    }

    fn next_event(&mut self) -> Result<Option<PacketEvent>, PcapSourceError> {
        match self {
            Self::Legacy {
                reader,
                linktype,
                nanosecond,
            } => {
                next_frame(reader, "pcap", |block| match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *linktype = Some(header.network);
                        *nanosecond = header.is_nanosecond_precision();
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => Some(PacketEvent {
                        ts: Some(legacy_ts_to_seconds(
                            packet.ts_sec,
                            packet.ts_usec,
                            *nanosecond,
                        )),
                        linktype: linktype.unwrap_or(Linktype::ETHERNET),
                        data: packet.data.to_vec(),
                    }),
                    _ => None,
                })
            }
            Self::Ng { reader, linktypes } => next_frame(reader, "pcapng", |block| match block {
                PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                    linktypes.push(intf.linktype);
                    None
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => Some(PacketEvent {
                    ts: Some(pcapng_ts_to_seconds(packet.ts_high, packet.ts_low)),
                    linktype: linktype_for_interface(linktypes, packet.if_id),
                    data: unpadded(packet.data, packet.caplen).to_vec(),
                }),
                PcapBlockOwned::NG(Block::SimplePacket(packet)) => Some(PacketEvent {
                    ts: None,
                    linktype: linktype_for_interface(linktypes, 0),
                    data: unpadded(packet.data, packet.origlen).to_vec(),
                }),
                _ => None,
            }),
        }
    }
}

/// Pull blocks until `on_block` yields a frame, refilling the buffer as needed.
fn next_frame<R, F>(
    reader: &mut R,
    format: &'static str,
    mut on_block: F,
) -> Result<Option<PacketEvent>, PcapSourceError>
where
    R: PcapReaderIterator,
    F: FnMut(PcapBlockOwned<'_>) -> Option<PacketEvent>,
{
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let event = on_block(block);
                reader.consume(offset);
                if event.is_some() {
                    return Ok(event);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| parse_error(format, e))?;
            }
            Err(e) => return Err(parse_error(format, e)),
        }
    }
}

/// pcapng packet bodies are padded to 32 bits; keep only the captured bytes.
fn unpadded(data: &[u8], len: u32) -> &[u8] {
    data.get(..len as usize).unwrap_or(data)
}

fn parse_error(context: &'static str, err: impl std::fmt::Display) -> PcapSourceError {
    PcapSourceError::Pcap {
        context,
        message: err.to_string(),
    }
}
