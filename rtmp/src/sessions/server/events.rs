use crate::sessions::StreamMetadata;
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use delay_relay_amf0::Amf0Value;

/// Events a server session raises for the application to act on
#[derive(Debug, PartialEq, Clone)]
pub enum ServerSessionEvent {
    /// The client changed the size of the chunks it sends
    ClientChunkSizeChanged { new_chunk_size: u32 },

    /// The client connected to an application.  Connections are always accepted.
    ClientConnected {
        app_name: String,
        tc_url: Option<String>,
    },

    /// The client started publishing.  `stream_query` holds whatever followed a `?` in the
    /// published name, which is where stream keys usually live.
    PublishStreamRequested {
        app_name: String,
        stream_name: String,
        stream_query: Option<String>,
        publish_type: String,
        stream_id: u32,
    },

    PublishStreamFinished {
        app_name: String,
        stream_name: String,
    },

    PlayStreamRequested {
        app_name: String,
        stream_name: String,
        stream_query: Option<String>,
        stream_id: u32,
    },

    PlayStreamFinished {
        app_name: String,
        stream_name: String,
    },

    StreamMetadataChanged {
        app_name: String,
        stream_name: String,
        metadata: StreamMetadata,
    },

    AudioDataReceived {
        app_name: String,
        stream_name: String,
        data: Bytes,
        timestamp: RtmpTimestamp,
    },

    VideoDataReceived {
        app_name: String,
        stream_name: String,
        data: Bytes,
        timestamp: RtmpTimestamp,
    },

    /// An AMF0 data message on a publishing stream, with its payload left encoded
    StreamDataReceived {
        app_name: String,
        stream_name: String,
        data: Bytes,
        timestamp: RtmpTimestamp,
    },

    /// A command the session does not handle itself, left for the application to pass on
    UnhandleableAmf0Command {
        command_name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_values: Vec<Amf0Value>,
    },

    AcknowledgementReceived { bytes_received: u32 },

    PingResponseReceived { timestamp: RtmpTimestamp },
}
