use bytes::Bytes;
use delay_relay_amf0::Amf0Value;
use std::io::Cursor;

use crate::messages::RtmpMessage;
use crate::messages::{MessageDeserializationError, MessageSerializationError};

pub fn serialize(values: Vec<Amf0Value>) -> Result<Bytes, MessageSerializationError> {
    let bytes = delay_relay_amf0::serialize(&values)?;
    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let values = delay_relay_amf0::deserialize(&mut cursor)?;

    Ok(RtmpMessage::Amf0Data { values })
}

#[cfg(test)]
mod tests {
    use super::{deserialize, serialize};
    use crate::messages::RtmpMessage;
    use delay_relay_amf0::Amf0Value;

    #[test]
    fn metadata_values_survive_serialization() {
        let values = vec![
            Amf0Value::Utf8String("@setDataFrame".to_string()),
            Amf0Value::Utf8String("onMetaData".to_string()),
            Amf0Value::Number(30.0),
        ];

        let bytes = serialize(values.clone()).unwrap();
        let result = deserialize(bytes).unwrap();

        assert_eq!(result, RtmpMessage::Amf0Data { values });
    }
}
