//! Writes AMF0 encoded values

use crate::errors::Amf0SerializationError;
use crate::markers;
use crate::Amf0Value;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;

/// Serializes values into an amf0 encoded vector of bytes
pub fn serialize(values: &[Amf0Value]) -> Result<Vec<u8>, Amf0SerializationError> {
    let mut bytes = vec![];
    for value in values {
        serialize_value(value, &mut bytes)?;
    }

    Ok(bytes)
}

fn serialize_value(value: &Amf0Value, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    match value {
        Amf0Value::Number(val) => {
            bytes.push(markers::NUMBER_MARKER);
            bytes.write_f64::<BigEndian>(*val)?;
        }

        Amf0Value::Boolean(val) => {
            bytes.push(markers::BOOLEAN_MARKER);
            bytes.push(*val as u8);
        }

        Amf0Value::Utf8String(val) => serialize_string(val, bytes)?,
        Amf0Value::LongUtf8String(val) => {
            bytes.push(markers::LONG_STRING_MARKER);
            bytes.write_u32::<BigEndian>(val.len() as u32)?;
            bytes.extend(val.as_bytes());
        }

        Amf0Value::Object(val) => serialize_object(val, bytes)?,
        Amf0Value::StrictArray(val) => {
            bytes.push(markers::STRICT_ARRAY_MARKER);
            bytes.write_u32::<BigEndian>(val.len() as u32)?;
            for item in val {
                serialize_value(item, bytes)?;
            }
        }

        Amf0Value::Date {
            unix_time_ms,
            time_zone,
        } => {
            bytes.push(markers::DATE_MARKER);
            bytes.write_f64::<BigEndian>(*unix_time_ms)?;
            bytes.write_i16::<BigEndian>(*time_zone)?;
        }

        Amf0Value::Null => bytes.push(markers::NULL_MARKER),
        Amf0Value::Undefined => bytes.push(markers::UNDEFINED_MARKER),
    }

    Ok(())
}

fn serialize_string(value: &str, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    if value.len() > (u16::MAX as usize) {
        return Err(Amf0SerializationError::NormalStringTooLong);
    }

    bytes.push(markers::STRING_MARKER);
    bytes.write_u16::<BigEndian>(value.len() as u16)?;
    bytes.extend(value.as_bytes());
    Ok(())
}

fn serialize_object(
    properties: &HashMap<String, Amf0Value>,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::OBJECT_MARKER);

    for (name, value) in properties {
        if name.len() > (u16::MAX as usize) {
            return Err(Amf0SerializationError::PropertyNameTooLong(name.len()));
        }

        bytes.write_u16::<BigEndian>(name.len() as u16)?;
        bytes.extend(name.as_bytes());
        serialize_value(value, bytes)?;
    }

    bytes.write_u16::<BigEndian>(markers::UTF_8_EMPTY_MARKER)?;
    bytes.push(markers::OBJECT_END_MARKER);
    Ok(())
}
