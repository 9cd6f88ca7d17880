mod backoff;
mod config;
mod errors;
mod events;
mod result;
mod state;
mod transactions;

#[cfg(test)]
mod tests;

use self::transactions::TransactionTable;
use super::control::ControlState;
use super::{command_argument, epoch_since};
use crate::chunk_io::{ChunkDeserializer, ChunkSerializer, Packet};
use crate::messages::{MessagePayload, PeerBandwidthLimitType, RtmpMessage, UserControlEventType};
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use delay_relay_amf0::Amf0Value;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

pub use self::backoff::ReconnectBackoff;
pub use self::config::ClientSessionConfig;
pub use self::errors::ClientSessionError;
pub use self::events::{ClientSessionEvent, RejectionReason};
pub use self::result::ClientSessionResult;
pub use self::state::ClientState;
pub use self::transactions::TransactionKind;

/// The connecting side of an RTMP connection, used to publish a stream to a server.
///
/// Requests made before `handshake_completed()` is called are held and sent once it is.
/// After a publish is requested the session walks through connect, createStream and publish on
/// its own as each step is answered.  Media handed to `publish_media()` is held until the server
/// signals the stream is ready, then sent in order.
pub struct ClientSession {
    start_time: Instant,
    config: ClientSessionConfig,
    serializer: ChunkSerializer,
    deserializer: ChunkDeserializer,
    control: ControlState,
    transactions: TransactionTable,
    current_state: ClientState,
    handshake_completed: bool,
    queued_commands: Vec<(RtmpMessage, u32)>,
    publish_name: Option<String>,
    media_ready: bool,
    queued_media: VecDeque<MessagePayload>,
}

impl ClientSession {
    pub fn new(config: ClientSessionConfig) -> ClientSession {
        ClientSession {
            start_time: Instant::now(),
            serializer: ChunkSerializer::new(),
            deserializer: ChunkDeserializer::new(),
            control: ControlState::new(),
            transactions: TransactionTable::new(config.transaction_timeout),
            current_state: ClientState::Idle,
            handshake_completed: false,
            queued_commands: Vec::new(),
            publish_name: None,
            media_ready: false,
            queued_media: VecDeque::new(),
            config,
        }
    }

    /// Announces our acknowledgement window, bandwidth and chunk size, then sends anything
    /// requested while the handshake was in progress.
    pub fn handshake_completed(&mut self) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        if self.handshake_completed {
            return Err(ClientSessionError::HandshakeAlreadyCompleted);
        }

        self.handshake_completed = true;
        let mut results = Vec::with_capacity(3 + self.queued_commands.len());

        let window_ack = RtmpMessage::WindowAcknowledgement {
            size: self.config.window_ack_size,
        };
        results.push(ClientSessionResult::OutboundResponse(self.serialize(window_ack, 0, true)?));

        let bandwidth = RtmpMessage::SetPeerBandwidth {
            size: self.config.peer_bandwidth,
            limit_type: PeerBandwidthLimitType::Dynamic,
        };
        results.push(ClientSessionResult::OutboundResponse(self.serialize(bandwidth, 0, true)?));

        let chunk_size_packet = self
            .serializer
            .set_max_chunk_size(self.config.chunk_size, epoch_since(self.start_time))?;
        results.push(ClientSessionResult::OutboundResponse(chunk_size_packet));

        let queued = std::mem::take(&mut self.queued_commands);
        for (message, stream_id) in queued {
            results.push(ClientSessionResult::OutboundResponse(self.serialize(message, stream_id, false)?));
        }

        Ok(results)
    }

    /// Sends a `connect` for `app_name` on the server at `host:port`
    pub fn request_connection(
        &mut self,
        host: &str,
        port: u16,
        app_name: &str,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        if self.current_state != ClientState::Idle {
            return Err(ClientSessionError::ConnectionAlreadyRequested);
        }

        let tc_url = format!("rtmp://{}:{}/{}", host, port, app_name);
        let mut properties = HashMap::new();
        properties.insert("app".to_string(), Amf0Value::Utf8String(app_name.to_string()));
        properties.insert("type".to_string(), Amf0Value::Utf8String("nonprivate".to_string()));
        properties.insert(
            "flashVer".to_string(),
            Amf0Value::Utf8String(self.config.flash_version.clone()),
        );
        properties.insert("swfUrl".to_string(), Amf0Value::Utf8String(tc_url.clone()));
        properties.insert("tcUrl".to_string(), Amf0Value::Utf8String(tc_url));

        let transaction_id = self.transactions.begin(TransactionKind::Connect, Instant::now());
        self.current_state = ClientState::ConnectRequested;
        info!(app = %app_name, host = %host, port, "Requesting connection");

        let message = RtmpMessage::Amf0Command {
            command_name: "connect".to_string(),
            transaction_id: transaction_id as f64,
            command_object: Amf0Value::Object(properties),
            additional_arguments: Vec::new(),
        };

        self.send_command(message, 0)
    }

    /// Asks to publish `stream_name`, with the stream key appended as `name?key` when given.
    /// If the connection has not been accepted yet the createStream and publish requests
    /// follow once it is.
    pub fn request_publishing(
        &mut self,
        stream_name: &str,
        stream_key: Option<&str>,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        if self.publish_name.is_some() {
            return Err(ClientSessionError::PublishAlreadyRequested);
        }

        self.publish_name = Some(match stream_key {
            Some(key) if !key.is_empty() => format!("{}?{}", stream_name, key),
            _ => stream_name.to_string(),
        });

        if self.current_state == ClientState::Connected {
            return self.request_stream();
        }

        Ok(Vec::new())
    }

    /// Sends an audio, video or data message on the publishing stream.  Until the server
    /// signals the stream has begun the message is queued instead.
    pub fn publish_media(
        &mut self,
        type_id: u8,
        data: Bytes,
        timestamp: RtmpTimestamp,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let mut payload = MessagePayload {
            timestamp,
            type_id,
            message_stream_id: 0,
            data,
        };

        match self.media_stream_id() {
            Some(stream_id) => {
                payload.message_stream_id = stream_id;
                let packet = self.serializer.serialize(&payload, false)?;
                Ok(vec![ClientSessionResult::OutboundResponse(packet)])
            }

            None => {
                if self.queued_media.len() >= self.config.max_queued_media {
                    trace!("Media queue full, dropping oldest message");
                    self.queued_media.pop_front();
                }

                self.queued_media.push_back(payload);
                Ok(Vec::new())
            }
        }
    }

    /// Relays a command the session has no handling for.  It is sent as a notification on the
    /// connection's control stream, so no response is tracked.
    pub fn send_passthrough_command(
        &mut self,
        command_name: String,
        command_object: Amf0Value,
        additional_values: Vec<Amf0Value>,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        debug!(command = %command_name, "Passing command through");
        let message = RtmpMessage::Amf0Command {
            command_name,
            transaction_id: 0.0,
            command_object,
            additional_arguments: additional_values,
        };

        self.send_command(message, 0)
    }

    /// Deletes the publishing stream, leaving the connection open
    pub fn stop_publishing(&mut self) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let stream_id = match self.current_state {
            ClientState::PublishRequested { stream_id } | ClientState::Publishing { stream_id } => stream_id,
            _ => return Ok(Vec::new()),
        };

        self.current_state = ClientState::Connected;
        self.publish_name = None;
        self.media_ready = false;
        self.queued_media.clear();

        let message = RtmpMessage::Amf0Command {
            command_name: "deleteStream".to_string(),
            transaction_id: self.transactions.next_id() as f64,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Number(stream_id as f64)],
        };

        self.send_command(message, 0)
    }

    /// Rejects every tracked request whose deadline is at or before `now`.  Responses that
    /// arrive for them afterwards are discarded.
    pub fn expire_transactions(&mut self, now: Instant) -> Vec<ClientSessionResult> {
        let mut results = Vec::new();
        for (transaction_id, kind) in self.transactions.expire(now) {
            warn!(transaction_id, kind = ?kind, "Request timed out");
            self.roll_back(kind);
            results.push(ClientSessionResult::RaisedEvent(
                ClientSessionEvent::TransactionRejected {
                    transaction_id,
                    kind,
                    reason: RejectionReason::TimedOut,
                },
            ));
        }

        results
    }

    /// Takes in bytes encoding RTMP chunks and returns the responses and events they caused
    pub fn handle_input(
        &mut self,
        bytes: &[u8],
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let mut results = Vec::new();

        if let Some(sequence_number) = self.control.record_bytes_received(bytes.len()) {
            let packet = self.serialize(RtmpMessage::Acknowledgement { sequence_number }, 0, false)?;
            results.push(ClientSessionResult::OutboundResponse(packet));
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

    pub fn send_ping_request(&mut self) -> Result<(Packet, RtmpTimestamp), ClientSessionError> {
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

    pub fn state(&self) -> ClientState {
        self.current_state
    }

    pub fn pending_transaction_count(&self) -> usize {
        self.transactions.pending_count()
    }

    pub fn queued_media_count(&self) -> usize {
        self.queued_media.len()
    }

    fn handle_message(
        &mut self,
        message: RtmpMessage,
        payload: &MessagePayload,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let results = match message {
            RtmpMessage::Abort { .. } => Vec::new(),

            RtmpMessage::Acknowledgement { sequence_number } => {
                vec![ClientSessionResult::RaisedEvent(
                    ClientSessionEvent::AcknowledgementReceived {
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
                payload.message_stream_id,
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            )?,

            RtmpMessage::SetChunkSize { size } => {
                self.deserializer.set_max_chunk_size(size as usize)?;
                Vec::new()
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                self.control.set_peer_bandwidth(size, limit_type);
                let packet = self.serialize(RtmpMessage::WindowAcknowledgement { size }, 0, false)?;
                vec![ClientSessionResult::OutboundResponse(packet)]
            }

            RtmpMessage::UserControl {
                event_type,
                stream_id,
                timestamp,
                ..
            } => self.handle_user_control(event_type, stream_id, timestamp)?,

            RtmpMessage::WindowAcknowledgement { size } => {
                self.control.set_peer_window_ack_size(size);
                Vec::new()
            }

            RtmpMessage::AudioData { .. } | RtmpMessage::VideoData { .. } | RtmpMessage::Amf0Data { .. } => {
                trace!(type_id = payload.type_id, "Ignoring media sent by the server");
                Vec::new()
            }

            RtmpMessage::Unknown { .. } => {
                vec![ClientSessionResult::UnhandleableMessageReceived(payload.clone())]
            }
        };

        Ok(results)
    }

    fn handle_user_control(
        &mut self,
        event_type: UserControlEventType,
        stream_id: Option<u32>,
        timestamp: Option<RtmpTimestamp>,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        match event_type {
            UserControlEventType::StreamBegin => {
                let begun_stream = match self.current_state {
                    ClientState::PublishRequested { stream_id } | ClientState::Publishing { stream_id } => {
                        Some(stream_id)
                    }
                    _ => None,
                };

                if begun_stream.is_some() && begun_stream == stream_id {
                    return self.mark_media_ready();
                }

                Ok(Vec::new())
            }

            UserControlEventType::PingRequest => {
                let response = RtmpMessage::UserControl {
                    event_type: UserControlEventType::PingResponse,
                    stream_id: None,
                    buffer_length: None,
                    timestamp,
                };

                let packet = self.serialize(response, 0, false)?;
                Ok(vec![ClientSessionResult::OutboundResponse(packet)])
            }

            UserControlEventType::PingResponse => Ok(vec![ClientSessionResult::RaisedEvent(
                ClientSessionEvent::PingResponseReceived {
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
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        debug!(command = %name, transaction_id, stream_id, "Received command");

        match name.as_str() {
            "_result" => self.handle_result(transaction_id, &additional_args),
            "_error" => Ok(self.handle_error(transaction_id, &additional_args)),
            "onStatus" => self.handle_on_status(&additional_args),
            "onBWDone" => Ok(Vec::new()),

            _ => Ok(vec![ClientSessionResult::RaisedEvent(
                ClientSessionEvent::UnhandleableAmf0Command {
                    command_name: name,
                    transaction_id,
                    command_object,
                    additional_values: additional_args,
                },
            )]),
        }
    }

    fn handle_result(
        &mut self,
        transaction_id: f64,
        arguments: &[Amf0Value],
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let kind = match self.transactions.complete(transaction_id) {
            Some(kind) => kind,
            None => {
                warn!(transaction_id, "Discarding _result with no pending request");
                return Ok(Vec::new());
            }
        };

        match kind {
            TransactionKind::Connect => {
                info!("Connection accepted");
                self.current_state = ClientState::Connected;

                let mut results = vec![ClientSessionResult::RaisedEvent(
                    ClientSessionEvent::ConnectionRequestAccepted,
                )];

                if self.publish_name.is_some() {
                    results.append(&mut self.request_stream()?);
                }

                Ok(results)
            }

            TransactionKind::CreateStream => {
                // The new stream id is the first value after the command object
                let stream_id = match command_argument("_result", arguments, "info").and_then(|x| x.as_number()) {
                    Some(id) => id as u32,
                    None => {
                        warn!(transaction_id, "createStream result carried no stream id");
                        self.roll_back(kind);
                        return Ok(vec![ClientSessionResult::RaisedEvent(
                            ClientSessionEvent::TransactionRejected {
                                transaction_id: transaction_id as u32,
                                kind,
                                reason: RejectionReason::ErrorResponse {
                                    code: None,
                                    description: Some("No stream id was returned".to_string()),
                                },
                            },
                        )]);
                    }
                };

                let mut results = vec![ClientSessionResult::RaisedEvent(
                    ClientSessionEvent::StreamCreated { stream_id },
                )];

                results.append(&mut self.request_publish(stream_id)?);
                Ok(results)
            }
        }
    }

    fn handle_error(&mut self, transaction_id: f64, arguments: &[Amf0Value]) -> Vec<ClientSessionResult> {
        let kind = match self.transactions.complete(transaction_id) {
            Some(kind) => kind,
            None => {
                warn!(transaction_id, "Discarding _error with no pending request");
                return Vec::new();
            }
        };

        let (code, description) = read_status(command_argument("_error", arguments, "info"));
        warn!(transaction_id, kind = ?kind, code = ?code, description = ?description, "Request rejected");
        self.roll_back(kind);

        vec![ClientSessionResult::RaisedEvent(
            ClientSessionEvent::TransactionRejected {
                transaction_id: transaction_id as u32,
                kind,
                reason: RejectionReason::ErrorResponse { code, description },
            },
        )]
    }

    fn handle_on_status(
        &mut self,
        arguments: &[Amf0Value],
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let info = command_argument("onStatus", arguments, "info");
        let level = info
            .and_then(|x| x.clone().get_object_properties())
            .and_then(|mut x| x.remove("level"))
            .and_then(|x| x.get_string());
        let (code, description) = read_status(info);

        let stream_id = match self.current_state {
            ClientState::PublishRequested { stream_id } => stream_id,
            _ => {
                debug!(code = ?code, "Status received outside of a publish request");
                return Ok(Vec::new());
            }
        };

        match (code, level.as_deref()) {
            (Some(code), _) if code == "NetStream.Publish.Start" => {
                info!(stream_id, "Publishing started");
                self.current_state = ClientState::Publishing { stream_id };

                let mut results = vec![ClientSessionResult::RaisedEvent(
                    ClientSessionEvent::PublishRequestAccepted { stream_id },
                )];

                results.append(&mut self.mark_media_ready()?);
                Ok(results)
            }

            (Some(code), Some("error")) => {
                warn!(code = %code, description = ?description, "Publish rejected");
                Ok(vec![ClientSessionResult::RaisedEvent(
                    ClientSessionEvent::PublishRequestRejected { code, description },
                )])
            }

            (code, _) => {
                debug!(code = ?code, "Ignoring status");
                Ok(Vec::new())
            }
        }
    }

    fn request_stream(&mut self) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let transaction_id = self.transactions.begin(TransactionKind::CreateStream, Instant::now());
        self.current_state = ClientState::CreateStreamRequested;

        let message = RtmpMessage::Amf0Command {
            command_name: "createStream".to_string(),
            transaction_id: transaction_id as f64,
            command_object: Amf0Value::Null,
            additional_arguments: Vec::new(),
        };

        self.send_command(message, 0)
    }

    fn request_publish(&mut self, stream_id: u32) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        let name = match self.publish_name {
            Some(ref name) => name.clone(),
            None => return Ok(Vec::new()),
        };

        self.current_state = ClientState::PublishRequested { stream_id };

        // Publish is answered through onStatus rather than _result, so nothing is tracked
        let message = RtmpMessage::Amf0Command {
            command_name: "publish".to_string(),
            transaction_id: self.transactions.next_id() as f64,
            command_object: Amf0Value::Null,
            additional_arguments: vec![
                Amf0Value::Utf8String(name),
                Amf0Value::Utf8String("live".to_string()),
            ],
        };

        self.send_command(message, stream_id)
    }

    fn mark_media_ready(&mut self) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        if self.media_ready {
            return Ok(Vec::new());
        }

        self.media_ready = true;
        let stream_id = match self.media_stream_id() {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        debug!(stream_id, queued = self.queued_media.len(), "Flushing queued media");
        let mut results = Vec::with_capacity(self.queued_media.len());
        while let Some(mut payload) = self.queued_media.pop_front() {
            payload.message_stream_id = stream_id;
            let packet = self.serializer.serialize(&payload, false)?;
            results.push(ClientSessionResult::OutboundResponse(packet));
        }

        Ok(results)
    }

    fn media_stream_id(&self) -> Option<u32> {
        if !self.media_ready {
            return None;
        }

        match self.current_state {
            ClientState::PublishRequested { stream_id } | ClientState::Publishing { stream_id } => Some(stream_id),
            _ => None,
        }
    }

    /// Returns the state to where it was before a failed request was sent
    fn roll_back(&mut self, kind: TransactionKind) {
        match (kind, self.current_state) {
            (TransactionKind::Connect, ClientState::ConnectRequested) => {
                self.current_state = ClientState::Idle
            }

            (TransactionKind::CreateStream, ClientState::CreateStreamRequested) => {
                self.current_state = ClientState::Connected
            }

            _ => (),
        }
    }

    fn send_command(
        &mut self,
        message: RtmpMessage,
        stream_id: u32,
    ) -> Result<Vec<ClientSessionResult>, ClientSessionError> {
        if !self.handshake_completed {
            self.queued_commands.push((message, stream_id));
            return Ok(Vec::new());
        }

        let packet = self.serialize(message, stream_id, false)?;
        Ok(vec![ClientSessionResult::OutboundResponse(packet)])
    }

    fn serialize(
        &mut self,
        message: RtmpMessage,
        stream_id: u32,
        force_uncompressed: bool,
    ) -> Result<Packet, ClientSessionError> {
        let payload = message.into_message_payload(epoch_since(self.start_time), stream_id)?;
        Ok(self.serializer.serialize(&payload, force_uncompressed)?)
    }
}

/// Pulls `code` and `description` out of a status info object
fn read_status(info: Option<&Amf0Value>) -> (Option<String>, Option<String>) {
    let mut properties = match info.and_then(|x| x.clone().get_object_properties()) {
        Some(properties) => properties,
        None => return (None, None),
    };

    let code = properties.remove("code").and_then(|x| x.get_string());
    let description = properties.remove("description").and_then(|x| x.get_string());
    (code, description)
}
