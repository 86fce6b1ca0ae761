/// First four bytes of a pcapng Section Header Block.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Legacy pcap magics: microsecond and nanosecond variants, in both byte orders.
pub const LEGACY_MAGICS: [[u8; 4]; 4] = [
    [0xd4, 0xc3, 0xb2, 0xa1],
    [0xa1, 0xb2, 0xc3, 0xd4],
    [0x4d, 0x3c, 0xb2, 0xa1],
    [0xa1, 0xb2, 0x3c, 0x4d],
];

pub const PCAP_READER_BUFFER_SIZE: usize = 64 * 1024;
