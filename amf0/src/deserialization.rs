//! Reads AMF0 encoded values out of a byte stream

use crate::errors::Amf0DeserializationError;
use crate::markers;
use crate::Amf0Value;
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Read;

/// Reads every AMF0 value out of the byte stream until it is exhausted
pub fn deserialize<R: Read>(bytes: &mut R) -> Result<Vec<Amf0Value>, Amf0DeserializationError> {
    let mut results = vec![];
    while let Some(value) = read_next_value(bytes)? {
        results.push(value);
    }

    Ok(results)
}

fn read_next_value<R: Read>(bytes: &mut R) -> Result<Option<Amf0Value>, Amf0DeserializationError> {
    let mut buffer: [u8; 1] = [0];
    let bytes_read = bytes.read(&mut buffer)?;
    if bytes_read == 0 || buffer[0] == markers::OBJECT_END_MARKER {
        return Ok(None);
    }

    let value = match buffer[0] {
        markers::NUMBER_MARKER => Amf0Value::Number(bytes.read_f64::<BigEndian>()?),
        markers::BOOLEAN_MARKER => Amf0Value::Boolean(bytes.read_u8()? != 0),
        markers::STRING_MARKER => {
            let length = bytes.read_u16::<BigEndian>()? as usize;
            Amf0Value::Utf8String(read_utf8(bytes, length)?)
        }

        markers::LONG_STRING_MARKER => {
            let length = bytes.read_u32::<BigEndian>()? as usize;
            Amf0Value::LongUtf8String(read_utf8(bytes, length)?)
        }

        markers::OBJECT_MARKER => parse_object(bytes)?,
        markers::ECMA_ARRAY_MARKER => {
            // The associative count is unreliable in the wild; ecma arrays are terminated
            // with the object end sequence just like objects, so read them as one.
            let _associative_count = bytes.read_u32::<BigEndian>()?;
            parse_object(bytes)?
        }

        markers::STRICT_ARRAY_MARKER => parse_strict_array(bytes)?,
        markers::DATE_MARKER => {
            let unix_time_ms = bytes.read_f64::<BigEndian>()?;
            let time_zone = bytes.read_i16::<BigEndian>()?;
            Amf0Value::Date {
                unix_time_ms,
                time_zone,
            }
        }

        markers::NULL_MARKER => Amf0Value::Null,
        markers::UNDEFINED_MARKER => Amf0Value::Undefined,
        marker => return Err(Amf0DeserializationError::UnknownMarker { marker }),
    };

    Ok(Some(value))
}

fn read_utf8<R: Read>(bytes: &mut R, length: usize) -> Result<String, Amf0DeserializationError> {
    let mut buffer = vec![0_u8; length];
    bytes.read_exact(&mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn parse_object<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let mut properties = HashMap::new();
    loop {
        let label_length = bytes.read_u16::<BigEndian>()?;
        if label_length == 0 {
            // consume the end marker so the stream position moves past the object
            if bytes.read_u8()? != markers::OBJECT_END_MARKER {
                return Err(Amf0DeserializationError::UnexpectedEmptyObjectPropertyName);
            }

            break;
        }

        let label = read_utf8(bytes, label_length as usize)?;
        match read_next_value(bytes)? {
            Some(value) => properties.insert(label, value),
            None => return Err(Amf0DeserializationError::UnexpectedEof),
        };
    }

    Ok(Amf0Value::Object(properties))
}

fn parse_strict_array<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let count = bytes.read_u32::<BigEndian>()?;
    let mut values = Vec::new();
    for _ in 0..count {
        match read_next_value(bytes)? {
            Some(value) => values.push(value),
            None => return Err(Amf0DeserializationError::UnexpectedEof),
        }
    }

    Ok(Amf0Value::StrictArray(values))
}
