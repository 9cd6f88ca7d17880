/*!
The RTMP message types along with the functionality to turn them into and out of the raw
payloads carried by the chunk stream.

`MessagePayload`s carry the auxiliary data about a message: which message stream it belongs to,
its timestamp and its type id.
*/

mod commands;
mod errors;
mod message_payload;
mod types;

pub use self::commands::{find_command_schema, CommandSchema};
pub use self::errors::{MessageDeserializationError, MessageSerializationError};
pub use self::message_payload::MessagePayload;
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use delay_relay_amf0::Amf0Value;

/// Numeric message type ids as they appear in chunk headers
pub mod type_ids {
    pub const SET_CHUNK_SIZE: u8 = 1;
    pub const ABORT: u8 = 2;
    pub const ACKNOWLEDGEMENT: u8 = 3;
    pub const USER_CONTROL: u8 = 4;
    pub const WINDOW_ACKNOWLEDGEMENT: u8 = 5;
    pub const SET_PEER_BANDWIDTH: u8 = 6;
    pub const AUDIO: u8 = 8;
    pub const VIDEO: u8 = 9;
    pub const AMF3_DATA: u8 = 15;
    pub const AMF3_COMMAND: u8 = 17;
    pub const AMF0_DATA: u8 = 18;
    pub const AMF0_COMMAND: u8 = 20;
}

/// The type of bandwidth limiting that is being requested
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PeerBandwidthLimitType {
    /// Peer should limit its output bandwidth to the indicated window size
    Hard,

    /// The peer should limit its output bandwidth to the window indicated or the limit
    /// already in effect, whichever is smaller.
    Soft,

    /// If we previously had a hard limit, this limit should be treated as hard.  Otherwise ignore.
    Dynamic,
}

/// Events and notifications that are raised with the peer
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UserControlEventType {
    /// Notifies the client that a stream has become functional
    StreamBegin,
    StreamEof,
    StreamDry,

    /// Notifies the server of the buffer size (in milliseconds) that the client is using
    SetBufferLength,
    StreamIsRecorded,

    /// Server sends this to test whether the client is reachable
    PingRequest,
    PingResponse,
}

/// All types of RTMP messages the relay understands
#[derive(PartialEq, Debug, Clone)]
pub enum RtmpMessage {
    /// A message whose type id we do not know about.  The bytes are kept as is so the message
    /// can be relayed untouched.
    Unknown { type_id: u8, data: Bytes },

    /// Tells the peer to discard a partially received message on the chunk stream
    Abort { stream_id: u32 },

    /// Confirms how many bytes have been received so far
    Acknowledgement { sequence_number: u32 },

    Amf0Command {
        command_name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_arguments: Vec<Amf0Value>,
    },

    Amf0Data { values: Vec<Amf0Value> },
    AudioData { data: Bytes },

    /// Changes the maximum size of chunks the sender will be producing
    SetChunkSize { size: u32 },

    SetPeerBandwidth {
        size: u32,
        limit_type: PeerBandwidthLimitType,
    },

    UserControl {
        event_type: UserControlEventType,
        stream_id: Option<u32>,
        buffer_length: Option<u32>,
        timestamp: Option<RtmpTimestamp>,
    },

    VideoData { data: Bytes },

    /// How many bytes may be received before an `Acknowledgement` is due
    WindowAcknowledgement { size: u32 },
}

impl RtmpMessage {
    pub fn into_message_payload(
        self,
        timestamp: RtmpTimestamp,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        MessagePayload::from_rtmp_message(self, timestamp, message_stream_id)
    }

    pub fn get_message_type_id(&self) -> u8 {
        match self {
            RtmpMessage::Unknown { type_id, .. } => *type_id,
            RtmpMessage::Abort { .. } => type_ids::ABORT,
            RtmpMessage::Acknowledgement { .. } => type_ids::ACKNOWLEDGEMENT,
            RtmpMessage::Amf0Command { .. } => type_ids::AMF0_COMMAND,
            RtmpMessage::Amf0Data { .. } => type_ids::AMF0_DATA,
            RtmpMessage::AudioData { .. } => type_ids::AUDIO,
            RtmpMessage::SetChunkSize { .. } => type_ids::SET_CHUNK_SIZE,
            RtmpMessage::SetPeerBandwidth { .. } => type_ids::SET_PEER_BANDWIDTH,
            RtmpMessage::UserControl { .. } => type_ids::USER_CONTROL,
            RtmpMessage::VideoData { .. } => type_ids::VIDEO,
            RtmpMessage::WindowAcknowledgement { .. } => type_ids::WINDOW_ACKNOWLEDGEMENT,
        }
    }
}
