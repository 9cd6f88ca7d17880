use super::types;
use super::type_ids;
use super::{MessageDeserializationError, MessageSerializationError, RtmpMessage};
use crate::time::RtmpTimestamp;
use bytes::Bytes;

/// A fully reassembled message as carried by the chunk stream
#[derive(PartialEq, Debug, Clone)]
pub struct MessagePayload {
    pub timestamp: RtmpTimestamp,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub data: Bytes,
}

impl MessagePayload {
    pub fn new() -> MessagePayload {
        MessagePayload {
            timestamp: RtmpTimestamp::new(0),
            message_stream_id: 0,
            type_id: 0,
            data: Bytes::new(),
        }
    }

    pub fn to_rtmp_message(&self) -> Result<RtmpMessage, MessageDeserializationError> {
        let data = self.data.clone();
        match self.type_id {
            type_ids::SET_CHUNK_SIZE => types::control::deserialize_set_chunk_size(data),
            type_ids::ABORT => types::control::deserialize_abort(data),
            type_ids::ACKNOWLEDGEMENT => types::control::deserialize_acknowledgement(data),
            type_ids::USER_CONTROL => types::user_control::deserialize(data),
            type_ids::WINDOW_ACKNOWLEDGEMENT => types::control::deserialize_window_ack(data),
            type_ids::SET_PEER_BANDWIDTH => types::control::deserialize_peer_bandwidth(data),
            type_ids::AUDIO => Ok(RtmpMessage::AudioData { data }),
            type_ids::VIDEO => Ok(RtmpMessage::VideoData { data }),
            type_ids::AMF0_DATA => types::amf0_data::deserialize(data),
            type_ids::AMF0_COMMAND => types::amf0_command::deserialize(data),
            type_id => Ok(RtmpMessage::Unknown { type_id, data }),
        }
    }

    pub fn from_rtmp_message(
        message: RtmpMessage,
        timestamp: RtmpTimestamp,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        let type_id = message.get_message_type_id();
        let data = match message {
            RtmpMessage::Unknown { data, .. } => data,
            RtmpMessage::Abort { stream_id } => types::control::serialize_u32(stream_id)?,
            RtmpMessage::Acknowledgement { sequence_number } => {
                types::control::serialize_u32(sequence_number)?
            }

            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            } => types::amf0_command::serialize(
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            )?,

            RtmpMessage::Amf0Data { values } => types::amf0_data::serialize(values)?,
            RtmpMessage::AudioData { data } => data,
            RtmpMessage::SetChunkSize { size } => types::control::serialize_set_chunk_size(size)?,
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                types::control::serialize_peer_bandwidth(size, limit_type)?
            }

            RtmpMessage::UserControl {
                event_type,
                stream_id,
                buffer_length,
                timestamp,
            } => types::user_control::serialize(event_type, stream_id, buffer_length, timestamp)?,

            RtmpMessage::VideoData { data } => data,
            RtmpMessage::WindowAcknowledgement { size } => types::control::serialize_u32(size)?,
        };

        Ok(MessagePayload {
            timestamp,
            type_id,
            message_stream_id,
            data,
        })
    }
}

impl Default for MessagePayload {
    fn default() -> Self {
        MessagePayload::new()
    }
}
