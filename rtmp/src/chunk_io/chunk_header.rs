use crate::time::RtmpTimestamp;

/// The two bit chunk type.  Each later format carries fewer fields and borrows the rest from
/// the previous chunk on the same chunk stream.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ChunkHeaderFormat {
    Full,                            // Format 0, 11 bytes
    TimeDeltaWithoutMessageStreamId, // Format 1, 7 bytes
    TimeDeltaOnly,                   // Format 2, 3 bytes
    Empty,                           // Format 3, 0 bytes
}

impl ChunkHeaderFormat {
    pub fn from_first_byte(byte: u8) -> ChunkHeaderFormat {
        match byte >> 6 {
            0 => ChunkHeaderFormat::Full,
            1 => ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId,
            2 => ChunkHeaderFormat::TimeDeltaOnly,
            _ => ChunkHeaderFormat::Empty,
        }
    }

    pub fn mask(self) -> u8 {
        match self {
            ChunkHeaderFormat::Full => 0b0000_0000,
            ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId => 0b0100_0000,
            ChunkHeaderFormat::TimeDeltaOnly => 0b1000_0000,
            ChunkHeaderFormat::Empty => 0b1100_0000,
        }
    }

    pub fn message_header_size(self) -> usize {
        match self {
            ChunkHeaderFormat::Full => 11,
            ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId => 7,
            ChunkHeaderFormat::TimeDeltaOnly => 3,
            ChunkHeaderFormat::Empty => 0,
        }
    }
}

/// The last header seen (or sent) on a chunk stream
#[derive(Debug, Clone)]
pub struct ChunkHeader {
    pub chunk_stream_id: u32,
    pub timestamp: RtmpTimestamp,

    /// The value carried by the timestamp field: absolute for format 0, a delta otherwise.  A
    /// format 3 chunk starting a new message re-applies this value.
    pub timestamp_field: u32,

    /// True when `timestamp_field` did not fit in 24 bits and went into the extended field
    pub extended_timestamp: bool,
    pub message_length: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,
}

impl ChunkHeader {
    pub fn new(chunk_stream_id: u32) -> ChunkHeader {
        ChunkHeader {
            chunk_stream_id,
            timestamp: RtmpTimestamp::new(0),
            timestamp_field: 0,
            extended_timestamp: false,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
        }
    }
}
