use bytes::Bytes;
use delay_relay_amf0::Amf0Value;
use std::io::Cursor;
use tracing::{debug, trace};

use crate::messages::commands::find_command_schema;
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::RtmpMessage;

pub fn serialize(
    command_name: String,
    transaction_id: f64,
    command_object: Amf0Value,
    mut additional_arguments: Vec<Amf0Value>,
) -> Result<Bytes, MessageSerializationError> {
    if let Some(schema) = find_command_schema(&command_name) {
        if additional_arguments.len() > schema.fields.len() {
            debug!(
                command = %command_name,
                extra = additional_arguments.len() - schema.fields.len(),
                "Dropping command arguments not covered by its field list"
            );

            additional_arguments.truncate(schema.fields.len());
        }
    }

    let mut values = Vec::with_capacity(additional_arguments.len() + 3);
    values.push(Amf0Value::Utf8String(command_name));
    values.push(Amf0Value::Number(transaction_id));
    values.push(command_object);
    values.append(&mut additional_arguments);

    let bytes = delay_relay_amf0::serialize(&values)?;
    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let mut values = delay_relay_amf0::deserialize(&mut cursor)?.into_iter();

    let command_name = match values.next() {
        Some(Amf0Value::Utf8String(value)) => value,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    // Some peers leave off the transaction id and command object on notifications
    let transaction_id = match values.next() {
        Some(Amf0Value::Number(value)) => value,
        None => 0.0,
        Some(_) => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let command_object = values.next().unwrap_or(Amf0Value::Null);
    let mut additional_arguments: Vec<Amf0Value> = values.collect();

    match find_command_schema(&command_name) {
        Some(schema) => additional_arguments.truncate(schema.fields.len()),
        None => trace!(command = %command_name, "Command has no known field list, keeping raw values"),
    }

    Ok(RtmpMessage::Amf0Command {
        command_name,
        transaction_id,
        command_object,
        additional_arguments,
    })
}
