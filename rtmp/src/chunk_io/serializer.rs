use super::chunk_header::{ChunkHeader, ChunkHeaderFormat};
use super::{channels, ChunkSerializationError, INITIAL_MAX_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_INITIAL_TIMESTAMP};
use crate::messages::{type_ids, MessagePayload, RtmpMessage};
use crate::time::RtmpTimestamp;
use std::collections::HashMap;

const MAX_MESSAGE_LENGTH: usize = 0x00FF_FFFF;

/// Bytes ready to be written to the peer
#[derive(Debug, PartialEq)]
pub struct Packet {
    pub bytes: Vec<u8>,
}

/// Splits messages into chunks, compressing each chunk header against the previous header sent
/// on the same chunk stream.
///
/// Every message sent on a connection must go through the same serializer, since the peer
/// decodes each compressed header relative to the last one it received.
pub struct ChunkSerializer {
    previous_headers: HashMap<u32, ChunkHeader>,
    max_chunk_size: u32,
}

impl ChunkSerializer {
    pub fn new() -> ChunkSerializer {
        ChunkSerializer {
            previous_headers: HashMap::new(),
            max_chunk_size: INITIAL_MAX_CHUNK_SIZE as u32,
        }
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Changes the size of outbound chunks.  The returned packet holds the `SetChunkSize`
    /// message announcing the change and must reach the peer before anything serialized
    /// afterwards.
    pub fn set_max_chunk_size(
        &mut self,
        new_size: u32,
        time: RtmpTimestamp,
    ) -> Result<Packet, ChunkSerializationError> {
        if new_size == 0 || new_size > MAX_CHUNK_SIZE {
            return Err(ChunkSerializationError::InvalidMaxChunkSize {
                attempted_chunk_size: new_size,
            });
        }

        let message = RtmpMessage::SetChunkSize { size: new_size };
        let payload = message.into_message_payload(time, 0)?;
        let packet = self.serialize(&payload, true)?;

        self.max_chunk_size = new_size;
        Ok(packet)
    }

    /// Serializes the message into one or more chunks.  `force_uncompressed` always writes a
    /// full format 0 header for the first chunk.
    pub fn serialize(
        &mut self,
        message: &MessagePayload,
        force_uncompressed: bool,
    ) -> Result<Packet, ChunkSerializationError> {
        if message.data.len() > MAX_MESSAGE_LENGTH {
            return Err(ChunkSerializationError::MessageTooLong {
                size: message.data.len(),
            });
        }

        let csid = get_csid_for_message_type(message.type_id);
        let mut header = ChunkHeader {
            chunk_stream_id: csid,
            timestamp: message.timestamp,
            timestamp_field: message.timestamp.value,
            extended_timestamp: false,
            message_length: message.data.len() as u32,
            message_type_id: message.type_id,
            message_stream_id: message.message_stream_id,
        };

        let format = match self.previous_headers.get(&csid) {
            None => ChunkHeaderFormat::Full,
            Some(_) if force_uncompressed => ChunkHeaderFormat::Full,

            // Deltas are unsigned, so a timestamp moving backwards needs a full header
            Some(previous) if header.timestamp < previous.timestamp => ChunkHeaderFormat::Full,
            Some(previous) => {
                header.timestamp_field = (header.timestamp - previous.timestamp).value;
                get_header_format(&header, previous)
            }
        };

        if format == ChunkHeaderFormat::Full {
            header.timestamp_field = header.timestamp.value;
        }

        header.extended_timestamp = header.timestamp_field >= MAX_INITIAL_TIMESTAMP;

        let max_chunk_size = self.max_chunk_size as usize;
        let chunk_count = std::cmp::max(1, (message.data.len() + max_chunk_size - 1) / max_chunk_size);
        let mut bytes = Vec::with_capacity(message.data.len() + 18 + (chunk_count - 1) * 8);

        for index in 0..chunk_count {
            let start = index * max_chunk_size;
            let end = std::cmp::min(start + max_chunk_size, message.data.len());
            let chunk_format = if index == 0 {
                format
            } else {
                ChunkHeaderFormat::Empty
            };

            write_basic_header(&mut bytes, chunk_format, csid);
            if index == 0 {
                write_message_header(&mut bytes, chunk_format, &header);
            }

            if header.extended_timestamp {
                write_u32_be(&mut bytes, header.timestamp_field);
            }

            bytes.extend_from_slice(&message.data[start..end]);
        }

        self.previous_headers.insert(csid, header);
        Ok(Packet { bytes })
    }
}

impl Default for ChunkSerializer {
    fn default() -> Self {
        ChunkSerializer::new()
    }
}

fn get_csid_for_message_type(type_id: u8) -> u32 {
    match type_id {
        type_ids::SET_CHUNK_SIZE
        | type_ids::ABORT
        | type_ids::ACKNOWLEDGEMENT
        | type_ids::USER_CONTROL
        | type_ids::WINDOW_ACKNOWLEDGEMENT
        | type_ids::SET_PEER_BANDWIDTH => channels::PROTOCOL,
        type_ids::AMF0_COMMAND | type_ids::AMF3_COMMAND => channels::COMMAND,
        type_ids::AUDIO => channels::AUDIO,
        type_ids::VIDEO => channels::VIDEO,
        _ => channels::DATA,
    }
}

fn get_header_format(current: &ChunkHeader, previous: &ChunkHeader) -> ChunkHeaderFormat {
    if current.message_stream_id != previous.message_stream_id {
        return ChunkHeaderFormat::Full;
    }

    if current.message_type_id != previous.message_type_id
        || current.message_length != previous.message_length
    {
        return ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId;
    }

    if current.timestamp_field != previous.timestamp_field {
        return ChunkHeaderFormat::TimeDeltaOnly;
    }

    ChunkHeaderFormat::Empty
}

fn write_basic_header(bytes: &mut Vec<u8>, format: ChunkHeaderFormat, csid: u32) {
    let mask = format.mask();
    if csid < 64 {
        bytes.push(mask | csid as u8);
    } else if csid < 320 {
        bytes.push(mask);
        bytes.push((csid - 64) as u8);
    } else {
        let value = csid - 64;
        bytes.push(mask | 1);
        bytes.push(value as u8);
        bytes.push((value >> 8) as u8);
    }
}

fn write_message_header(bytes: &mut Vec<u8>, format: ChunkHeaderFormat, header: &ChunkHeader) {
    if format == ChunkHeaderFormat::Empty {
        return;
    }

    let field = std::cmp::min(header.timestamp_field, MAX_INITIAL_TIMESTAMP);
    write_u24_be(bytes, field);

    if format == ChunkHeaderFormat::TimeDeltaOnly {
        return;
    }

    write_u24_be(bytes, header.message_length);
    bytes.push(header.message_type_id);

    if format == ChunkHeaderFormat::Full {
        bytes.extend_from_slice(&header.message_stream_id.to_le_bytes());
    }
}

fn write_u24_be(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes()[1..]);
}

fn write_u32_be(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}
