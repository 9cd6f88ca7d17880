//! Splitting outbound messages into RTMP chunks and reassembling inbound chunks into messages.

mod chunk_header;
mod deserializer;
mod errors;
mod serializer;

pub use self::deserializer::ChunkDeserializer;
pub use self::errors::{ChunkDeserializationError, ChunkSerializationError};
pub use self::serializer::{ChunkSerializer, Packet};

/// Chunk stream ids used for outbound messages, one per kind of traffic
pub mod channels {
    pub const PROTOCOL: u32 = 2;
    pub const COMMAND: u32 = 3;
    pub const AUDIO: u32 = 4;
    pub const VIDEO: u32 = 5;
    pub const DATA: u32 = 6;
}

pub(crate) const INITIAL_MAX_CHUNK_SIZE: usize = 128;
pub(crate) const MAX_INITIAL_TIMESTAMP: u32 = 0x00FF_FFFF;
pub(crate) const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;
