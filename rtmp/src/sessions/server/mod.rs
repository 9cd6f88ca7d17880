mod active_stream;
mod config;
mod errors;
mod events;
mod result;


use self::active_stream::{ActiveStream, StreamState};
use super::control::ControlState;
use super::{command_argument, create_status_object, epoch_since, StreamMetadata};
use crate::chunk_io::{ChunkDeserializer, ChunkSerializer, Packet};
use crate::messages::{MessagePayload, PeerBandwidthLimitType, RtmpMessage, UserControlEventType};
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use delay_relay_amf0::Amf0Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

pub use self::config::ServerSessionConfig;
pub use self::errors::ServerSessionError;
pub use self::events::ServerSessionEvent;
pub use self::result::ServerSessionResult;

/// Streams a single client may have created and not yet deleted
pub const MAX_ACTIVE_STREAMS: usize = 64;

#[derive(PartialEq, Debug, Clone, Copy)]
enum SessionState {
    Started,
    Connected,
}

/// The accepting side of a single RTMP connection.
///
/// Connections, publishes and plays are accepted as soon as they are requested; the matching
/// events tell the application what happened.  Every byte received after the handshake must
/// be passed to `handle_input()`, and every packet returned must be written to the client in
/// order.
pub struct ServerSession {
    start_time: Instant,
    serializer: ChunkSerializer,
    deserializer: ChunkDeserializer,
    control: ControlState,
    connected_app_name: Option<String>,
    current_state: SessionState,
    fms_version: String,
    object_encoding: f64,
    active_streams: HashMap<u32, ActiveStream>,
    next_stream_id: u32,
}

impl ServerSession {
    /// Creates a new server session along with the packets that announce our chunk size,
    /// acknowledgement window and bandwidth to the client.
    pub fn new(
        config: ServerSessionConfig,
    ) -> Result<(ServerSession, Vec<ServerSessionResult>), ServerSessionError> {
        let mut session = ServerSession {
            start_time: Instant::now(),
            serializer: ChunkSerializer::new(),
            deserializer: ChunkDeserializer::new(),
            control: ControlState::new(),
            connected_app_name: None,
            current_state: SessionState::Started,
            fms_version: config.fms_version,
            object_encoding: 0.0,
            active_streams: HashMap::new(),
            next_stream_id: 1,
        };

        let mut results = Vec::with_capacity(5);

        let chunk_size_packet = session
            .serializer
            .set_max_chunk_size(config.chunk_size, RtmpTimestamp::new(0))?;
        results.push(ServerSessionResult::OutboundResponse(chunk_size_packet));

        let messages = vec![
            RtmpMessage::WindowAcknowledgement {
                size: config.window_ack_size,
            },
            RtmpMessage::UserControl {
                event_type: UserControlEventType::StreamBegin,
                stream_id: Some(0),
                buffer_length: None,
                timestamp: None,
            },
            RtmpMessage::SetPeerBandwidth {
                size: config.peer_bandwidth,
                limit_type: PeerBandwidthLimitType::Dynamic,
            },
            RtmpMessage::Amf0Command {
                command_name: "onBWDone".to_string(),
                transaction_id: 0.0,
                command_object: Amf0Value::Null,
                additional_arguments: vec![Amf0Value::Number(8192_f64)],
            },
        ];

        for message in messages {
            let packet = session.serialize(message, 0, true)?;
            results.push(ServerSessionResult::OutboundResponse(packet));
        }

        Ok((session, results))
    }

    /// Takes in bytes encoding RTMP chunks and returns the responses and events they caused
    pub fn handle_input(
        &mut self,
        bytes: &[u8],
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        let mut results = Vec::new();

        if let Some(sequence_number) = self.control.record_bytes_received(bytes.len()) {
            let packet = self.serialize(RtmpMessage::Acknowledgement { sequence_number }, 0, false)?;
            results.push(ServerSessionResult::OutboundResponse(packet));
        }

        let mut bytes_to_process = bytes;
        while let Some(payload) = self.deserializer.get_next_message(bytes_to_process)? {
            bytes_to_process = &[];

            let message = match payload.to_rtmp_message() {
                Ok(message) => message,
                Err(error) => {
                    warn!(type_id = payload.type_id, %error, "Dropping message that could not be decoded");
                    continue;
                }
            };

            let mut message_results = self.handle_message(message, &payload)?;
            results.append(&mut message_results);
        }

        Ok(results)
    }

    /// Packages media to be sent to a client playing on `stream_id`
    pub fn send_media(
        &mut self,
        stream_id: u32,
        type_id: u8,
        data: Bytes,
        timestamp: RtmpTimestamp,
    ) -> Result<Packet, ServerSessionError> {
        let payload = MessagePayload {
            timestamp,
            type_id,
            message_stream_id: stream_id,
            data,
        };

        Ok(self.serializer.serialize(&payload, false)?)
    }

    /// Sends a ping request, the client answers with `PingResponseReceived`
    pub fn send_ping_request(&mut self) -> Result<(Packet, RtmpTimestamp), ServerSessionError> {
        let timestamp = epoch_since(self.start_time);
        let message = RtmpMessage::UserControl {
            event_type: UserControlEventType::PingRequest,
            stream_id: None,
            buffer_length: None,
            timestamp: Some(timestamp),
        };

        let packet = self.serialize(message, 0, false)?;
        Ok((packet, timestamp))
    }

    /// The application the client connected to, once connected
    pub fn connected_app_name(&self) -> Option<&str> {
        self.connected_app_name.as_deref()
    }

    /// The acknowledgement window and bandwidth limit the client asked for, if it did
    pub fn peer_limits(&self) -> (Option<u32>, Option<(u32, PeerBandwidthLimitType)>) {
        (self.control.peer_window_ack_size(), self.control.peer_bandwidth())
    }

    fn handle_message(
        &mut self,
        message: RtmpMessage,
        payload: &MessagePayload,
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        let stream_id = payload.message_stream_id;
        let results = match message {
            RtmpMessage::Abort { .. } => Vec::new(),

            RtmpMessage::Acknowledgement { sequence_number } => {
                vec![ServerSessionResult::RaisedEvent(
                    ServerSessionEvent::AcknowledgementReceived {
                        bytes_received: sequence_number,
                    },
                )]
            }

            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            } => self.handle_amf0_command(
                stream_id,
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            )?,

            RtmpMessage::Amf0Data { values } => {
                self.handle_amf0_data(values, payload.data.clone(), stream_id, payload.timestamp)
            }

            RtmpMessage::AudioData { data } => self.handle_media(data, stream_id, payload.timestamp, false),
            RtmpMessage::VideoData { data } => self.handle_media(data, stream_id, payload.timestamp, true),

            RtmpMessage::SetChunkSize { size } => {
                self.deserializer.set_max_chunk_size(size as usize)?;
                vec![ServerSessionResult::RaisedEvent(
                    ServerSessionEvent::ClientChunkSizeChanged {
                        new_chunk_size: size,
                    },
                )]
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                self.control.set_peer_bandwidth(size, limit_type);
                let packet = self.serialize(RtmpMessage::WindowAcknowledgement { size }, 0, false)?;
                vec![ServerSessionResult::OutboundResponse(packet)]
            }

            RtmpMessage::UserControl {
                event_type,
                timestamp,
                ..
            } => self.handle_user_control(event_type, timestamp)?,

            RtmpMessage::WindowAcknowledgement { size } => {
                self.control.set_peer_window_ack_size(size);
                Vec::new()
            }

            RtmpMessage::Unknown { .. } => {
                vec![ServerSessionResult::UnhandleableMessageReceived(payload.clone())]
            }
        };

        Ok(results)
    }

    fn handle_user_control(
        &mut self,
        event_type: UserControlEventType,
        timestamp: Option<RtmpTimestamp>,
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        match event_type {
            UserControlEventType::PingRequest => {
                let response = RtmpMessage::UserControl {
                    event_type: UserControlEventType::PingResponse,
                    stream_id: None,
                    buffer_length: None,
                    timestamp,
                };

                let packet = self.serialize(response, 0, false)?;
                Ok(vec![ServerSessionResult::OutboundResponse(packet)])
            }

            UserControlEventType::PingResponse => Ok(vec![ServerSessionResult::RaisedEvent(
                ServerSessionEvent::PingResponseReceived {
                    timestamp: timestamp.unwrap_or_default(),
                },
            )]),

            _ => Ok(Vec::new()),
        }
    }

    fn handle_amf0_command(
        &mut self,
        stream_id: u32,
        name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_args: Vec<Amf0Value>,
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        debug!(command = %name, transaction_id, stream_id, "Received command");

        let results = match name.as_str() {
            "connect" => self.handle_command_connect(transaction_id, command_object)?,
            "createStream" => self.handle_command_create_stream(transaction_id)?,
            "publish" => self.handle_command_publish(stream_id, transaction_id, &additional_args)?,
            "play" => self.handle_command_play(stream_id, transaction_id, &additional_args)?,
            "deleteStream" => self.handle_command_delete_stream(&name, &additional_args),

            // closeStream carries no stream id argument, the message stream identifies it
            "closeStream" => self.close_stream(stream_id, false),

            _ => vec![ServerSessionResult::RaisedEvent(
                ServerSessionEvent::UnhandleableAmf0Command {
                    command_name: name,
                    transaction_id,
                    command_object,
                    additional_values: additional_args,
                },
            )],
        };

        Ok(results)
    }

    fn handle_command_connect(
        &mut self,
        transaction_id: f64,
        command_object: Amf0Value,
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        let mut properties = command_object.get_object_properties().unwrap_or_default();

        let app_name = match properties.remove("app").and_then(|x| x.get_string()) {
            Some(mut app) => {
                if app.ends_with('/') {
                    app.pop();
                }

                app
            }

            None => {
                warn!("Rejecting connect request without an app name");
                let packet = self.create_error_packet(
                    "NetConnection.Connect.Rejected",
                    "No app name was provided",
                    transaction_id,
                    0,
                )?;

                return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
            }
        };

        let tc_url = properties.remove("tcUrl").and_then(|x| x.get_string());
        self.object_encoding = properties
            .remove("objectEncoding")
            .and_then(|x| x.get_number())
            .unwrap_or(0.0);

        self.connected_app_name = Some(app_name.clone());
        self.current_state = SessionState::Connected;
        info!(app = %app_name, tc_url = ?tc_url, "Client connected");

        let mut command_object_properties = HashMap::new();
        command_object_properties.insert(
            "fmsVer".to_string(),
            Amf0Value::Utf8String(self.fms_version.clone()),
        );
        command_object_properties.insert("capabilities".to_string(), Amf0Value::Number(31.0));

        let mut info = create_status_object(
            "status",
            "NetConnection.Connect.Success",
            "Connection succeeded.",
        );
        info.insert(
            "objectEncoding".to_string(),
            Amf0Value::Number(self.object_encoding),
        );

        let message = RtmpMessage::Amf0Command {
            command_name: "_result".to_string(),
            transaction_id,
            command_object: Amf0Value::Object(command_object_properties),
            additional_arguments: vec![Amf0Value::Object(info)],
        };

        let packet = self.serialize(message, 0, false)?;
        let event = ServerSessionEvent::ClientConnected { app_name, tc_url };

        Ok(vec![
            ServerSessionResult::RaisedEvent(event),
            ServerSessionResult::OutboundResponse(packet),
        ])
    }

    fn handle_command_create_stream(
        &mut self,
        transaction_id: f64,
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        if self.active_streams.len() >= MAX_ACTIVE_STREAMS {
            warn!(active = self.active_streams.len(), "Refusing createStream, too many active streams");
            let packet = self.create_error_packet(
                "NetConnection.Call.Failed",
                "Too many active streams.",
                transaction_id,
                0,
            )?;

            return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
        }

        let new_stream_id = self.allocate_stream_id();
        self.active_streams.insert(
            new_stream_id,
            ActiveStream {
                current_state: StreamState::Created,
            },
        );

        let message = RtmpMessage::Amf0Command {
            command_name: "_result".to_string(),
            transaction_id,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Number(new_stream_id as f64)],
        };

        let packet = self.serialize(message, 0, false)?;
        Ok(vec![ServerSessionResult::OutboundResponse(packet)])
    }

    fn allocate_stream_id(&mut self) -> u32 {
        loop {
            let id = self.next_stream_id;

            // Stream 0 carries connection level messages, so ids wrap back to 1
            self.next_stream_id = self.next_stream_id.checked_add(1).unwrap_or(1);
            if !self.active_streams.contains_key(&id) {
                return id;
            }
        }
    }

    fn handle_command_publish(
        &mut self,
        stream_id: u32,
        transaction_id: f64,
        arguments: &[Amf0Value],
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        const CODE: &str = "NetStream.Publish.Start";

        let app_name = match self.validate_stream_command(stream_id) {
            Ok(app_name) => app_name,
            Err(description) => {
                let packet = self.create_error_packet(CODE, description, transaction_id, stream_id)?;
                return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
            }
        };

        let (stream_name, stream_query) =
            match command_argument("publish", arguments, "streamName").and_then(|x| x.as_str()) {
                Some(name) => split_stream_name(name),
                None => {
                    let packet = self.create_error_packet(
                        CODE,
                        "Invalid publish arguments",
                        transaction_id,
                        stream_id,
                    )?;

                    return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
                }
            };

        let publish_type = command_argument("publish", arguments, "type")
            .and_then(|x| x.as_str())
            .unwrap_or("live")
            .to_string();

        self.set_stream_state(
            stream_id,
            StreamState::Publishing {
                stream_name: stream_name.clone(),
            },
        );

        info!(app = %app_name, stream = %stream_name, stream_id, "Client started publishing");

        let description = format!("/{}/{} is now published.", app_name, stream_name);
        let event = ServerSessionEvent::PublishStreamRequested {
            app_name,
            stream_name,
            stream_query,
            publish_type,
            stream_id,
        };

        let begin_packet = self.create_stream_begin_packet(stream_id)?;
        let start_packet = self.create_status_packet(CODE, &description, stream_id)?;

        Ok(vec![
            ServerSessionResult::RaisedEvent(event),
            ServerSessionResult::OutboundResponse(begin_packet),
            ServerSessionResult::OutboundResponse(start_packet),
        ])
    }

    fn handle_command_play(
        &mut self,
        stream_id: u32,
        transaction_id: f64,
        arguments: &[Amf0Value],
    ) -> Result<Vec<ServerSessionResult>, ServerSessionError> {
        const CODE: &str = "NetStream.Play.Start";

        let app_name = match self.validate_stream_command(stream_id) {
            Ok(app_name) => app_name,
            Err(description) => {
                let packet = self.create_error_packet(CODE, description, transaction_id, stream_id)?;
                return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
            }
        };

        let (stream_name, stream_query) =
            match command_argument("play", arguments, "streamName").and_then(|x| x.as_str()) {
                Some(name) => split_stream_name(name),
                None => {
                    let packet = self.create_error_packet(
                        CODE,
                        "Invalid play arguments",
                        transaction_id,
                        stream_id,
                    )?;

                    return Ok(vec![ServerSessionResult::OutboundResponse(packet)]);
                }
            };

        self.set_stream_state(
            stream_id,
            StreamState::Playing {
                stream_name: stream_name.clone(),
            },
        );

        info!(app = %app_name, stream = %stream_name, stream_id, "Client started playing");

        let event = ServerSessionEvent::PlayStreamRequested {
            app_name,
            stream_name,
            stream_query,
            stream_id,
        };

        let begin_packet = self.create_stream_begin_packet(stream_id)?;
        let reset_packet = self.create_status_packet(
            "NetStream.Play.Reset",
            "Playing and resetting stream.",
            stream_id,
        )?;
        let start_packet = self.create_status_packet(CODE, "Started playing stream.", stream_id)?;

        let sample_access = RtmpMessage::Amf0Data {
            values: vec![
                Amf0Value::Utf8String("|RtmpSampleAccess".to_string()),
                Amf0Value::Boolean(false),
                Amf0Value::Boolean(false),
            ],
        };
        let sample_access_packet = self.serialize(sample_access, stream_id, false)?;

        Ok(vec![
            ServerSessionResult::RaisedEvent(event),
            ServerSessionResult::OutboundResponse(begin_packet),
            ServerSessionResult::OutboundResponse(reset_packet),
            ServerSessionResult::OutboundResponse(start_packet),
            ServerSessionResult::OutboundResponse(sample_access_packet),
        ])
    }

    fn handle_command_delete_stream(
        &mut self,
        command: &str,
        arguments: &[Amf0Value],
    ) -> Vec<ServerSessionResult> {
        match command_argument(command, arguments, "streamId").and_then(|x| x.as_number()) {
            Some(stream_id) => self.close_stream(stream_id as u32, true),
            None => Vec::new(),
        }
    }

    fn close_stream(&mut self, stream_id: u32, remove: bool) -> Vec<ServerSessionResult> {
        let app_name = match self.connected_app_name {
            Some(ref name) => name.clone(),
            None => return Vec::new(),
        };

        let previous_state = if remove {
            self.active_streams.remove(&stream_id).map(|x| x.current_state)
        } else {
            self.active_streams.get_mut(&stream_id).map(|stream| {
                std::mem::replace(&mut stream.current_state, StreamState::Created)
            })
        };

        let event = match previous_state {
            Some(StreamState::Publishing { stream_name }) => {
                info!(app = %app_name, stream = %stream_name, "Client finished publishing");
                ServerSessionEvent::PublishStreamFinished {
                    app_name,
                    stream_name,
                }
            }

            Some(StreamState::Playing { stream_name }) => {
                info!(app = %app_name, stream = %stream_name, "Client finished playing");
                ServerSessionEvent::PlayStreamFinished {
                    app_name,
                    stream_name,
                }
            }

            _ => return Vec::new(),
        };

        vec![ServerSessionResult::RaisedEvent(event)]
    }

    fn handle_amf0_data(
        &mut self,
        mut values: Vec<Amf0Value>,
        raw: Bytes,
        stream_id: u32,
        timestamp: RtmpTimestamp,
    ) -> Vec<ServerSessionResult> {
        let (app_name, stream_name) = match self.publishing_stream(stream_id) {
            Some(x) => x,
            None => {
                trace!(stream_id, "Ignoring data message outside of a publishing stream");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(2);

        // OBS and ffmpeg send `@setDataFrame`, `onMetaData`, {properties}
        if values.first().and_then(|x| x.as_str()) == Some("@setDataFrame") {
            values.remove(0);
        }

        if values.len() >= 2 && values[0].as_str() == Some("onMetaData") {
            if let Some(properties) = values.swap_remove(1).get_object_properties() {
                results.push(ServerSessionResult::RaisedEvent(
                    ServerSessionEvent::StreamMetadataChanged {
                        app_name: app_name.clone(),
                        stream_name: stream_name.clone(),
                        metadata: StreamMetadata::from_properties(properties),
                    },
                ));
            }
        }

        results.push(ServerSessionResult::RaisedEvent(
            ServerSessionEvent::StreamDataReceived {
                app_name,
                stream_name,
                data: raw,
                timestamp,
            },
        ));

        results
    }

    fn handle_media(
        &self,
        data: Bytes,
        stream_id: u32,
        timestamp: RtmpTimestamp,
        is_video: bool,
    ) -> Vec<ServerSessionResult> {
        let (app_name, stream_name) = match self.publishing_stream(stream_id) {
            Some(x) => x,
            None => {
                trace!(stream_id, "Ignoring media outside of a publishing stream");
                return Vec::new();
            }
        };

        let event = if is_video {
            ServerSessionEvent::VideoDataReceived {
                app_name,
                stream_name,
                data,
                timestamp,
            }
        } else {
            ServerSessionEvent::AudioDataReceived {
                app_name,
                stream_name,
                data,
                timestamp,
            }
        };

        vec![ServerSessionResult::RaisedEvent(event)]
    }

    fn publishing_stream(&self, stream_id: u32) -> Option<(String, String)> {
        if self.current_state != SessionState::Connected {
            return None;
        }

        let app_name = self.connected_app_name.clone()?;
        match self.active_streams.get(&stream_id)?.current_state {
            StreamState::Publishing { ref stream_name } => Some((app_name, stream_name.clone())),
            _ => None,
        }
    }

    /// Returns the connected app name, or a description of why the stream command can't run
    fn validate_stream_command(&self, stream_id: u32) -> Result<String, &'static str> {
        let app_name = match (self.current_state, &self.connected_app_name) {
            (SessionState::Connected, Some(name)) => name.clone(),
            _ => return Err("Can't use a stream before connecting"),
        };

        if !self.active_streams.contains_key(&stream_id) {
            return Err("The stream id was not created");
        }

        Ok(app_name)
    }

    fn set_stream_state(&mut self, stream_id: u32, state: StreamState) {
        if let Some(stream) = self.active_streams.get_mut(&stream_id) {
            stream.current_state = state;
        }
    }

    fn create_stream_begin_packet(&mut self, stream_id: u32) -> Result<Packet, ServerSessionError> {
        let message = RtmpMessage::UserControl {
            event_type: UserControlEventType::StreamBegin,
            stream_id: Some(stream_id),
            buffer_length: None,
            timestamp: None,
        };

        self.serialize(message, 0, false)
    }

    fn create_status_packet(
        &mut self,
        code: &str,
        description: &str,
        stream_id: u32,
    ) -> Result<Packet, ServerSessionError> {
        let message = RtmpMessage::Amf0Command {
            command_name: "onStatus".to_string(),
            transaction_id: 0.0,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Object(create_status_object(
                "status",
                code,
                description,
            ))],
        };

        self.serialize(message, stream_id, false)
    }

    fn create_error_packet(
        &mut self,
        code: &str,
        description: &str,
        transaction_id: f64,
        stream_id: u32,
    ) -> Result<Packet, ServerSessionError> {
        let message = RtmpMessage::Amf0Command {
            command_name: "_error".to_string(),
            transaction_id,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Object(create_status_object(
                "error",
                code,
                description,
            ))],
        };

        self.serialize(message, stream_id, false)
    }

    fn serialize(
        &mut self,
        message: RtmpMessage,
        stream_id: u32,
        force_uncompressed: bool,
    ) -> Result<Packet, ServerSessionError> {
        let payload = message.into_message_payload(epoch_since(self.start_time), stream_id)?;
        Ok(self.serializer.serialize(&payload, force_uncompressed)?)
    }
}

/// Splits `name?query` published names, dropping an empty query
fn split_stream_name(name: &str) -> (String, Option<String>) {
    match name.split_once('?') {
        Some((name, query)) if !query.is_empty() => (name.to_string(), Some(query.to_string())),
        Some((name, _)) => (name.to_string(), None),
        None => (name.to_string(), None),
    }
}
