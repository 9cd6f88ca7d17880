use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::{RtmpMessage, UserControlEventType};
use crate::time::RtmpTimestamp;

pub fn serialize(
    event_type: UserControlEventType,
    stream_id: Option<u32>,
    buffer_length: Option<u32>,
    timestamp: Option<RtmpTimestamp>,
) -> Result<Bytes, MessageSerializationError> {
    let mut bytes = Vec::with_capacity(10);
    bytes.write_u16::<BigEndian>(event_id(event_type))?;

    match event_type {
        UserControlEventType::PingRequest | UserControlEventType::PingResponse => {
            bytes.write_u32::<BigEndian>(timestamp.map(|x| x.value).unwrap_or(0))?;
        }

        UserControlEventType::SetBufferLength => {
            bytes.write_u32::<BigEndian>(stream_id.unwrap_or(0))?;
            bytes.write_u32::<BigEndian>(buffer_length.unwrap_or(0))?;
        }

        _ => bytes.write_u32::<BigEndian>(stream_id.unwrap_or(0))?,
    }

    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let event_type = match cursor.read_u16::<BigEndian>()? {
        0 => UserControlEventType::StreamBegin,
        1 => UserControlEventType::StreamEof,
        2 => UserControlEventType::StreamDry,
        3 => UserControlEventType::SetBufferLength,
        4 => UserControlEventType::StreamIsRecorded,
        6 => UserControlEventType::PingRequest,
        7 => UserControlEventType::PingResponse,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let mut stream_id = None;
    let mut buffer_length = None;
    let mut timestamp = None;

    match event_type {
        UserControlEventType::PingRequest | UserControlEventType::PingResponse => {
            timestamp = Some(RtmpTimestamp::new(cursor.read_u32::<BigEndian>()?));
        }

        UserControlEventType::SetBufferLength => {
            stream_id = Some(cursor.read_u32::<BigEndian>()?);
            buffer_length = Some(cursor.read_u32::<BigEndian>()?);
        }

        _ => stream_id = Some(cursor.read_u32::<BigEndian>()?),
    }

    Ok(RtmpMessage::UserControl {
        event_type,
        stream_id,
        buffer_length,
        timestamp,
    })
}

fn event_id(event_type: UserControlEventType) -> u16 {
    match event_type {
        UserControlEventType::StreamBegin => 0,
        UserControlEventType::StreamEof => 1,
        UserControlEventType::StreamDry => 2,
        UserControlEventType::SetBufferLength => 3,
        UserControlEventType::StreamIsRecorded => 4,
        UserControlEventType::PingRequest => 6,
        UserControlEventType::PingResponse => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::{deserialize, serialize};
    use crate::messages::{RtmpMessage, UserControlEventType};
    use crate::time::RtmpTimestamp;
    use byteorder::{BigEndian, WriteBytesExt};
    use bytes::Bytes;

    #[test]
    fn can_serialize_stream_begin() {
        let bytes = serialize(UserControlEventType::StreamBegin, Some(555), None, None).unwrap();

        let mut expected = Vec::new();
        expected.write_u16::<BigEndian>(0).unwrap();
        expected.write_u32::<BigEndian>(555).unwrap();
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn can_serialize_set_buffer_length() {
        let bytes =
            serialize(UserControlEventType::SetBufferLength, Some(1), Some(3000), None).unwrap();

        let mut expected = Vec::new();
        expected.write_u16::<BigEndian>(3).unwrap();
        expected.write_u32::<BigEndian>(1).unwrap();
        expected.write_u32::<BigEndian>(3000).unwrap();
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn can_deserialize_ping_request() {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(6).unwrap();
        data.write_u32::<BigEndian>(1234).unwrap();

        let result = deserialize(Bytes::from(data)).unwrap();
        assert_eq!(
            result,
            RtmpMessage::UserControl {
                event_type: UserControlEventType::PingRequest,
                stream_id: None,
                buffer_length: None,
                timestamp: Some(RtmpTimestamp::new(1234)),
            }
        );
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(31).unwrap();
        data.write_u32::<BigEndian>(0).unwrap();

        assert!(deserialize(Bytes::from(data)).is_err());
    }
}
