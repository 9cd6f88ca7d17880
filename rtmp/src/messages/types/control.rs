//! Protocol control messages.  Each body is a single big endian u32, optionally followed by a
//! limit type byte for set peer bandwidth.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::{PeerBandwidthLimitType, RtmpMessage};

const MAX_CHUNK_SIZE: u32 = 0x8000_0000 - 1;

pub fn serialize_u32(value: u32) -> Result<Bytes, MessageSerializationError> {
    let mut bytes = Vec::with_capacity(4);
    bytes.write_u32::<BigEndian>(value)?;
    Ok(Bytes::from(bytes))
}

pub fn serialize_set_chunk_size(size: u32) -> Result<Bytes, MessageSerializationError> {
    if size > MAX_CHUNK_SIZE {
        return Err(MessageSerializationError::InvalidChunkSize(size));
    }

    serialize_u32(size)
}

pub fn serialize_peer_bandwidth(
    size: u32,
    limit_type: PeerBandwidthLimitType,
) -> Result<Bytes, MessageSerializationError> {
    let limit = match limit_type {
        PeerBandwidthLimitType::Hard => 0,
        PeerBandwidthLimitType::Soft => 1,
        PeerBandwidthLimitType::Dynamic => 2,
    };

    let mut bytes = Vec::with_capacity(5);
    bytes.write_u32::<BigEndian>(size)?;
    bytes.write_u8(limit)?;
    Ok(Bytes::from(bytes))
}

pub fn deserialize_set_chunk_size(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    // The first bit is reserved and must be zero
    let size = read_u32(&data)?;
    if size > MAX_CHUNK_SIZE {
        return Err(MessageDeserializationError::InvalidMessageFormat);
    }

    Ok(RtmpMessage::SetChunkSize { size })
}

pub fn deserialize_abort(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    Ok(RtmpMessage::Abort {
        stream_id: read_u32(&data)?,
    })
}

pub fn deserialize_acknowledgement(
    data: Bytes,
) -> Result<RtmpMessage, MessageDeserializationError> {
    Ok(RtmpMessage::Acknowledgement {
        sequence_number: read_u32(&data)?,
    })
}

pub fn deserialize_window_ack(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    Ok(RtmpMessage::WindowAcknowledgement {
        size: read_u32(&data)?,
    })
}

pub fn deserialize_peer_bandwidth(
    data: Bytes,
) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let size = cursor.read_u32::<BigEndian>()?;
    let limit_type = match cursor.read_u8()? {
        0 => PeerBandwidthLimitType::Hard,
        1 => PeerBandwidthLimitType::Soft,
        2 => PeerBandwidthLimitType::Dynamic,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
}

fn read_u32(data: &Bytes) -> Result<u32, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    Ok(cursor.read_u32::<BigEndian>()?)
}
