//! Capture files on disk.
//!
//! [`PcapFileSource`] sniffs the magic bytes, then walks either a legacy pcap
//! or a pcapng container and hands back raw frames with their link type and
//! timestamp. Decoding the frames is the normalizer's job.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
