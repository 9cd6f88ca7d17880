//! One relayed publisher connection.
//!
//! The inbound leg, the delay buffer and the flush timer all live in a single task so the buffer
//! is only ever touched from one place.  Media received from the publisher is classified and
//! pushed into the buffer; every flush tick releases whatever is ready to the outbound leg,
//! which runs in its own task.  While the buffer is paused the publisher's socket is not read,
//! letting TCP push back on it.

use crate::config::RelayConfig;
use crate::delay_buffer::{BufferOccupancy, DelayBuffer};
use crate::errors::RelayError;
use crate::media::{MediaKind, MediaMessage};
use crate::outbound::{self, RelayEvent};
use crate::transport::{perform_handshake, spawn_writer, READ_BUFFER_SIZE};
use delay_relay_rtmp::chunk_io::Packet;
use delay_relay_rtmp::handshake::PeerType;
use delay_relay_rtmp::sessions::{
    ServerSession, ServerSessionConfig, ServerSessionEvent, ServerSessionResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How the connection's main loop came to an end
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Cancelled,
    PublisherClosed,
    UpstreamFinished,
}

/// Relays one accepted socket until it closes or `token` is cancelled.  `occupancy` is kept
/// up to date with the connection's buffer for status reporting.
pub async fn run(
    connection_id: u64,
    mut stream: TcpStream,
    config: Arc<RelayConfig>,
    occupancy: Arc<Mutex<BufferOccupancy>>,
    token: CancellationToken,
) -> Result<(), RelayError> {
    stream.set_nodelay(true)?;
    if config.passthrough() {
        return run_passthrough(connection_id, stream, &config, &token).await;
    }

    let remaining = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        result = perform_handshake(&mut stream, PeerType::Server) => result?,
    };

    debug!(connection_id, "Inbound handshake completed");

    let (reader, write_half) = tokio::io::split(stream);
    let (writer, writer_task) = spawn_writer(connection_id, "inbound", write_half);
    let (events, events_receiver) = mpsc::unbounded_channel();
    let upstream_token = token.child_token();
    let mut upstream = tokio::spawn(outbound::run(
        connection_id,
        config.clone(),
        events_receiver,
        upstream_token.clone(),
    ));

    let (mode, _) = config.mode();
    let mut connection = RelayConnection {
        id: connection_id,
        started_at: Instant::now(),
        buffer: DelayBuffer::new(config.buffer_limits(), mode.settled()),
        config,
        occupancy,
        writer,
        events,
    };

    let result = connection.run(reader, remaining, &mut upstream, &token).await;

    // Tear both legs down together, whichever side ended first
    upstream_token.cancel();
    let RelayConnection { occupancy, writer, events, .. } = connection;
    drop(events);
    drop(writer);

    if !matches!(result, Ok(Exit::UpstreamFinished)) {
        match upstream.await {
            Ok(Err(error)) => warn!(connection_id, %error, "Outbound leg failed"),
            Err(error) => warn!(connection_id, %error, "Outbound leg panicked"),
            Ok(Ok(())) => (),
        }
    }

    if time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await.is_err() {
        debug!(connection_id, "Inbound writer did not drain in time");
    }

    *occupancy.lock() = BufferOccupancy::default();
    match &result {
        Ok(exit) => info!(connection_id, reason = ?exit, "Connection closed"),
        Err(error) => warn!(connection_id, %error, "Connection closed with error"),
    }

    result.map(|_| ())
}

/// Pipes raw bytes between the publisher and the remote without looking at them
async fn run_passthrough(
    connection_id: u64,
    mut inbound: TcpStream,
    config: &RelayConfig,
    token: &CancellationToken,
) -> Result<(), RelayError> {
    let (host, port) = config.remote();
    info!(connection_id, host = %host, port, "Passing connection through");

    let mut upstream = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        result = TcpStream::connect((host.as_str(), port)) => result?,
    };

    upstream.set_nodelay(true)?;
    tokio::select! {
        _ = token.cancelled() => debug!(connection_id, "Passthrough cancelled"),
        result = tokio::io::copy_bidirectional(&mut inbound, &mut upstream) => {
            let (sent, received) = result?;
            info!(connection_id, sent, received, "Passthrough finished");
        }
    }

    Ok(())
}

struct RelayConnection {
    id: u64,
    started_at: Instant,
    config: Arc<RelayConfig>,
    buffer: DelayBuffer,
    occupancy: Arc<Mutex<BufferOccupancy>>,
    writer: mpsc::UnboundedSender<Packet>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayConnection {
    async fn run(
        &mut self,
        mut reader: ReadHalf<TcpStream>,
        received_bytes: Vec<u8>,
        upstream: &mut JoinHandle<Result<(), RelayError>>,
        token: &CancellationToken,
    ) -> Result<Exit, RelayError> {
        let (mut session, results) = ServerSession::new(ServerSessionConfig::new())?;
        self.handle_results(results)?;

        let results = session.handle_input(&received_bytes)?;
        self.handle_results(results)?;

        let mut latency = self.config.latency();
        let mut flush = flush_interval(latency);
        let mut buffer = [0_u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(Exit::Cancelled),

                _ = flush.tick() => {
                    self.flush()?;

                    let configured = self.config.latency();
                    if configured != latency {
                        debug!(connection_id = self.id, latency_ms = configured.as_millis() as u64, "Flush interval changed");
                        latency = configured;
                        flush = flush_interval(latency);
                    }
                }

                read = reader.read(&mut buffer), if !self.buffer.is_paused() => {
                    let bytes_read = read?;
                    if bytes_read == 0 {
                        return Ok(Exit::PublisherClosed);
                    }

                    let results = session.handle_input(&buffer[..bytes_read])?;
                    self.handle_results(results)?;
                }

                result = &mut *upstream => {
                    match result {
                        Ok(Err(error)) => warn!(connection_id = self.id, %error, "Outbound leg failed"),
                        Err(error) => warn!(connection_id = self.id, %error, "Outbound leg panicked"),
                        Ok(Ok(())) => (),
                    }

                    return Ok(Exit::UpstreamFinished);
                }
            }
        }
    }

    /// Applies any configuration changes, then sends everything the buffer releases upstream
    fn flush(&mut self) -> Result<(), RelayError> {
        self.buffer.set_limits(self.config.buffer_limits());
        let (mode, epoch) = self.config.mode();
        if self.buffer.apply_mode(mode, epoch) {
            info!(connection_id = self.id, mode = %mode, "Buffer mode changed");
            self.config.mode_applied(epoch);
        }

        for chunk in self.buffer.pop_ready(self.now_ms()) {
            self.events
                .send(RelayEvent::Media(chunk.message))
                .map_err(|_| RelayError::UpstreamClosed)?;
        }

        *self.occupancy.lock() = self.buffer.occupancy();
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn handle_results(&mut self, results: Vec<ServerSessionResult>) -> Result<(), RelayError> {
        for result in results {
            match result {
                ServerSessionResult::OutboundResponse(packet) => {
                    self.writer.send(packet).map_err(|_| RelayError::WriterClosed)?;
                }

                ServerSessionResult::RaisedEvent(event) => self.handle_event(event)?,

                ServerSessionResult::UnhandleableMessageReceived(payload) => {
                    trace!(
                        connection_id = self.id,
                        type_id = payload.type_id,
                        "Ignoring unhandleable inbound message"
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: ServerSessionEvent) -> Result<(), RelayError> {
        match event {
            ServerSessionEvent::ClientConnected { app_name, tc_url } => {
                info!(connection_id = self.id, app = %app_name, tc_url = ?tc_url, "Publisher connected");
            }

            ServerSessionEvent::PublishStreamRequested {
                app_name,
                stream_name,
                stream_query,
                publish_type,
                ..
            } => {
                info!(
                    connection_id = self.id,
                    app = %app_name,
                    stream = %stream_name,
                    publish_type = %publish_type,
                    "Publish started"
                );

                self.send_event(RelayEvent::Publish {
                    app_name,
                    stream_name,
                    stream_key: stream_query,
                })?;
            }

            ServerSessionEvent::PublishStreamFinished { stream_name, .. } => {
                info!(connection_id = self.id, stream = %stream_name, "Publish finished");
            }

            ServerSessionEvent::PlayStreamRequested { stream_name, .. } => {
                warn!(connection_id = self.id, stream = %stream_name, "Playback is not served by the relay");
            }

            ServerSessionEvent::PlayStreamFinished { .. } => (),

            ServerSessionEvent::StreamMetadataChanged { metadata, .. } => {
                debug!(connection_id = self.id, metadata = ?metadata, "Stream metadata changed");
            }

            ServerSessionEvent::AudioDataReceived { data, timestamp, .. } => {
                self.push(MediaMessage::new(MediaKind::Audio, timestamp, data));
            }

            ServerSessionEvent::VideoDataReceived { data, timestamp, .. } => {
                self.push(MediaMessage::new(MediaKind::Video, timestamp, data));
            }

            ServerSessionEvent::StreamDataReceived { data, timestamp, .. } => {
                self.push(MediaMessage::new(MediaKind::Data, timestamp, data));
            }

            ServerSessionEvent::UnhandleableAmf0Command {
                command_name,
                command_object,
                additional_values,
                ..
            } => {
                self.send_event(RelayEvent::Passthrough {
                    command_name,
                    command_object,
                    additional_values,
                })?;
            }

            ServerSessionEvent::ClientChunkSizeChanged { new_chunk_size } => {
                debug!(connection_id = self.id, new_chunk_size, "Publisher chunk size changed");
            }

            ServerSessionEvent::AcknowledgementReceived { .. }
            | ServerSessionEvent::PingResponseReceived { .. } => (),
        }

        Ok(())
    }

    fn push(&mut self, message: MediaMessage) {
        let now_ms = self.now_ms();
        self.buffer.push(message, now_ms);
    }

    fn send_event(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.events.send(event).map_err(|_| RelayError::UpstreamClosed)
    }
}

fn flush_interval(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
