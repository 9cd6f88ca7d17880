//! Session state machines for both ends of an RTMP connection.
//!
//! A session turns the bytes received after the handshake into events the application reacts
//! to, and produces the packets that must be written back to the peer.  All packets a session
//! returns must be sent in the order they were returned, since chunk header compression makes
//! each one depend on the previous.

mod client;
mod control;
mod server;

pub use self::client::{
    ClientSession, ClientSessionConfig, ClientSessionError, ClientSessionEvent,
    ClientSessionResult, ClientState, ReconnectBackoff, RejectionReason, TransactionKind,
};
pub use self::server::{
    ServerSession, ServerSessionConfig, ServerSessionError, ServerSessionEvent,
    ServerSessionResult, MAX_ACTIVE_STREAMS,
};

use crate::messages::find_command_schema;
use delay_relay_amf0::Amf0Value;
use std::collections::HashMap;
use std::time::Instant;
use crate::time::RtmpTimestamp;

/// Metadata a publisher advertises through `@setDataFrame`/`onMetaData`
#[derive(PartialEq, Debug, Clone, Default)]
pub struct StreamMetadata {
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub video_codec: Option<String>,
    pub video_frame_rate: Option<f32>,
    pub video_bitrate_kbps: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub encoder: Option<String>,
}

impl StreamMetadata {
    fn from_properties(properties: HashMap<String, Amf0Value>) -> StreamMetadata {
        let mut metadata = StreamMetadata::default();
        for (key, value) in properties {
            match key.as_str() {
                "width" => metadata.video_width = value.get_number().map(|x| x as u32),
                "height" => metadata.video_height = value.get_number().map(|x| x as u32),
                "videodatarate" => metadata.video_bitrate_kbps = value.get_number().map(|x| x as u32),
                "framerate" => metadata.video_frame_rate = value.get_number().map(|x| x as f32),
                "audiodatarate" => metadata.audio_bitrate_kbps = value.get_number().map(|x| x as u32),
                "audiosamplerate" => metadata.audio_sample_rate = value.get_number().map(|x| x as u32),
                "audiochannels" => metadata.audio_channels = value.get_number().map(|x| x as u32),
                "encoder" => metadata.encoder = value.get_string(),

                // Codec ids are numbers for FLV codecs and strings for enhanced fourCCs
                "videocodecid" => metadata.video_codec = codec_id(value),
                "audiocodecid" => metadata.audio_codec = codec_id(value),
                _ => (),
            }
        }

        metadata
    }
}

fn codec_id(value: Amf0Value) -> Option<String> {
    match value {
        Amf0Value::Number(x) => Some(x.to_string()),
        Amf0Value::Utf8String(x) => Some(x),
        _ => None,
    }
}

/// Reads a named argument of a command through the command schema table
fn command_argument<'a>(command: &str, arguments: &'a [Amf0Value], field: &str) -> Option<&'a Amf0Value> {
    find_command_schema(command)?.argument(arguments, field)
}

fn create_status_object(level: &str, code: &str, description: &str) -> HashMap<String, Amf0Value> {
    let mut properties = HashMap::new();
    properties.insert("level".to_string(), Amf0Value::Utf8String(level.to_string()));
    properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
    properties.insert("description".to_string(), Amf0Value::Utf8String(description.to_string()));
    properties
}

/// Milliseconds since the session started, wrapped into an RTMP timestamp
fn epoch_since(start_time: Instant) -> RtmpTimestamp {
    RtmpTimestamp::new(start_time.elapsed().as_millis() as u32)
}
