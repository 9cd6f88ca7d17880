//! The outbound leg: publishes released media to the configured remote server.
//!
//! The leg runs in its own task and is fed `RelayEvent`s by the inbound connection.  It does
//! not connect until the publisher has told us which app and stream to publish.  When the
//! remote cannot be reached, closes the socket or rejects a request, a new connection is
//! attempted after a doubling backoff.  The inbound side is never affected by this.
//!
//! Stream headers (codec configuration and metadata) are remembered so every new upstream
//! session starts with them, otherwise the frames that follow a reconnect would be undecodable.

use crate::config::RelayConfig;
use crate::errors::RelayError;
use crate::media::{MediaFlag, MediaMessage};
use crate::transport::{perform_handshake, spawn_writer, READ_BUFFER_SIZE};
use delay_relay_amf0::Amf0Value;
use delay_relay_rtmp::chunk_io::Packet;
use delay_relay_rtmp::handshake::PeerType;
use delay_relay_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult, ReconnectBackoff,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const TRANSACTION_SWEEP_INTERVAL: Duration = Duration::from_millis(250);
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long connecting and handshaking with the remote may take before the attempt counts as
/// failed
pub const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the inbound connection asks the outbound leg to do
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The publisher started publishing; the same app and stream are published upstream
    Publish {
        app_name: String,
        stream_name: String,
        stream_key: Option<String>,
    },

    /// Media released by the delay buffer
    Media(MediaMessage),

    /// A command the inbound session did not handle, forwarded as is
    Passthrough {
        command_name: String,
        command_object: Amf0Value,
        additional_values: Vec<Amf0Value>,
    },
}

#[derive(Clone, Debug)]
struct PublishTarget {
    app_name: String,
    stream_name: String,
    stream_key: Option<String>,
}

/// The most recent stream headers seen, replayed at the start of every upstream session
#[derive(Default)]
struct HeaderCache {
    metadata: Option<MediaMessage>,
    video: Option<MediaMessage>,
    audio: Option<MediaMessage>,
}

impl HeaderCache {
    fn remember(&mut self, message: &MediaMessage) {
        match message.flag() {
            MediaFlag::Metadata => self.metadata = Some(message.clone()),
            MediaFlag::VideoHeader => self.video = Some(message.clone()),
            MediaFlag::AudioHeader => self.audio = Some(message.clone()),
            _ => (),
        }
    }

    fn messages(&self) -> impl Iterator<Item = &MediaMessage> {
        self.metadata.iter().chain(self.video.iter()).chain(self.audio.iter())
    }
}

struct Outbound {
    connection_id: u64,
    config: Arc<RelayConfig>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    token: CancellationToken,
    target: Option<PublishTarget>,
    headers: HeaderCache,
    backoff: ReconnectBackoff,
    dropped_while_down: u64,
}

/// Runs the outbound leg until `token` is cancelled or the event sender is dropped
pub async fn run(
    connection_id: u64,
    config: Arc<RelayConfig>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    token: CancellationToken,
) -> Result<(), RelayError> {
    let mut outbound = Outbound {
        connection_id,
        config,
        events,
        token,
        target: None,
        headers: HeaderCache::default(),
        backoff: ReconnectBackoff::new(),
        dropped_while_down: 0,
    };

    outbound.run().await
}

impl Outbound {
    async fn run(&mut self) -> Result<(), RelayError> {
        // Nothing to publish until the publisher says what it publishes
        while self.target.is_none() {
            tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                event = self.events.recv() => match event {
                    Some(event) => self.absorb_while_disconnected(event),
                    None => return Ok(()),
                },
            }
        }

        loop {
            // A session only ends without error when the relay connection is going away
            match self.run_session().await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        connection_id = self.connection_id,
                        %error,
                        retry_in_ms = delay.as_millis() as u64,
                        "Upstream connection lost"
                    );

                    if !self.wait_for_retry(delay).await {
                        return Ok(());
                    }

                    let dropped = self.take_dropped_count();
                    if dropped > 0 {
                        warn!(
                            connection_id = self.connection_id,
                            dropped,
                            "Media dropped while upstream was down"
                        );
                    }
                }
            }
        }
    }

    /// Sleeps through the backoff delay while keeping the event channel drained.  Returns false
    /// if the leg should end instead of retrying.
    async fn wait_for_retry(&mut self, delay: Duration) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = &mut sleep => return true,
                event = self.events.recv() => match event {
                    Some(event) => self.absorb_while_disconnected(event),
                    None => return false,
                },
            }
        }
    }

    fn absorb_while_disconnected(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Publish {
                app_name,
                stream_name,
                stream_key,
            } => self.set_target(app_name, stream_name, stream_key),

            RelayEvent::Media(message) => {
                self.headers.remember(&message);
                if !message.flag().is_stream_header() {
                    self.dropped_while_down += 1;
                    trace!(connection_id = self.connection_id, "Dropping media while upstream is down");
                }
            }

            RelayEvent::Passthrough { command_name, .. } => {
                debug!(
                    connection_id = self.connection_id,
                    command = %command_name,
                    "Dropping command while upstream is down"
                );
            }
        }
    }

    fn take_dropped_count(&mut self) -> u64 {
        std::mem::take(&mut self.dropped_while_down)
    }

    fn set_target(&mut self, app_name: String, stream_name: String, stream_key: Option<String>) {
        if self.target.is_some() {
            warn!(
                connection_id = self.connection_id,
                stream = %stream_name,
                "Ignoring second publish on the same connection"
            );

            return;
        }

        self.target = Some(PublishTarget {
            app_name,
            stream_name,
            stream_key,
        });
    }

    async fn run_session(&mut self) -> Result<(), RelayError> {
        let target = match &self.target {
            Some(target) => target.clone(),
            None => return Ok(()),
        };

        let (host, port) = self.config.remote();
        info!(
            connection_id = self.connection_id,
            host = %host,
            port,
            app = %target.app_name,
            stream = %target.stream_name,
            "Connecting upstream"
        );

        let (stream, remaining) = tokio::select! {
            _ = self.token.cancelled() => return Ok(()),
            result = connect_upstream(&host, port, UPSTREAM_CONNECT_TIMEOUT) => result?,
        };

        let (mut reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer(self.connection_id, "outbound", write_half);

        let mut session = ClientSession::new(ClientSessionConfig::new());
        let mut results = session.handshake_completed()?;
        results.extend(session.request_connection(&host, port, &target.app_name)?);
        results.extend(session.request_publishing(&target.stream_name, target.stream_key.as_deref())?);
        for header in self.headers.messages() {
            results.extend(session.publish_media(
                header.kind.type_id(),
                header.data.clone(),
                header.timestamp,
            )?);
        }

        results.extend(session.handle_input(&remaining)?);

        let outcome = self.drive_session(&mut session, &mut reader, &writer, results).await;

        drop(writer);
        match &outcome {
            Ok(_) => {
                if time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await.is_err() {
                    debug!(connection_id = self.connection_id, "Upstream writer did not drain in time");
                }
            }

            Err(_) => writer_task.abort(),
        }

        outcome
    }

    async fn drive_session(
        &mut self,
        session: &mut ClientSession,
        reader: &mut ReadHalf<TcpStream>,
        writer: &mpsc::UnboundedSender<Packet>,
        initial_results: Vec<ClientSessionResult>,
    ) -> Result<(), RelayError> {
        self.handle_results(writer, initial_results)?;

        let mut buffer = [0_u8; READ_BUFFER_SIZE];
        let mut sweep = time::interval(TRANSACTION_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            let results = tokio::select! {
                _ = self.token.cancelled() => {
                    let results = session.stop_publishing()?;
                    self.handle_results(writer, results)?;
                    info!(connection_id = self.connection_id, "Upstream publishing stopped");
                    return Ok(());
                }

                read = reader.read(&mut buffer) => {
                    let bytes_read = read?;
                    if bytes_read == 0 {
                        return Err(RelayError::UpstreamClosed);
                    }

                    session.handle_input(&buffer[..bytes_read])?
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(session, event)?,
                    None => {
                        let results = session.stop_publishing()?;
                        self.handle_results(writer, results)?;
                        return Ok(());
                    }
                },

                _ = sweep.tick() => session.expire_transactions(Instant::now()),
            };

            self.handle_results(writer, results)?;
        }
    }

    fn handle_event(
        &mut self,
        session: &mut ClientSession,
        event: RelayEvent,
    ) -> Result<Vec<ClientSessionResult>, RelayError> {
        let results = match event {
            RelayEvent::Publish {
                app_name,
                stream_name,
                stream_key,
            } => {
                self.set_target(app_name, stream_name, stream_key);
                Vec::new()
            }

            RelayEvent::Media(message) => {
                self.headers.remember(&message);
                session.publish_media(message.kind.type_id(), message.data, message.timestamp)?
            }

            RelayEvent::Passthrough {
                command_name,
                command_object,
                additional_values,
            } => session.send_passthrough_command(command_name, command_object, additional_values)?,
        };

        Ok(results)
    }

    fn handle_results(
        &mut self,
        writer: &mpsc::UnboundedSender<Packet>,
        results: Vec<ClientSessionResult>,
    ) -> Result<(), RelayError> {
        for result in results {
            match result {
                ClientSessionResult::OutboundResponse(packet) => {
                    writer.send(packet).map_err(|_| RelayError::WriterClosed)?;
                }

                ClientSessionResult::RaisedEvent(event) => self.handle_session_event(event)?,

                ClientSessionResult::UnhandleableMessageReceived(payload) => {
                    trace!(
                        connection_id = self.connection_id,
                        type_id = payload.type_id,
                        "Ignoring unhandleable upstream message"
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_session_event(&mut self, event: ClientSessionEvent) -> Result<(), RelayError> {
        match event {
            ClientSessionEvent::ConnectionRequestAccepted => {
                info!(connection_id = self.connection_id, "Upstream accepted the connection");
                self.backoff.reset();
            }

            ClientSessionEvent::StreamCreated { stream_id } => {
                debug!(connection_id = self.connection_id, stream_id, "Upstream stream created");
            }

            ClientSessionEvent::PublishRequestAccepted { stream_id } => {
                info!(connection_id = self.connection_id, stream_id, "Publishing upstream");
            }

            ClientSessionEvent::PublishRequestRejected { code, description } => {
                error!(
                    connection_id = self.connection_id,
                    code = %code,
                    description = ?description,
                    "Upstream rejected the publish"
                );

                return Err(RelayError::UpstreamRejected(code));
            }

            ClientSessionEvent::TransactionRejected {
                transaction_id,
                kind,
                reason,
            } => {
                warn!(
                    connection_id = self.connection_id,
                    transaction_id,
                    kind = ?kind,
                    reason = ?reason,
                    "Upstream request rejected"
                );

                return Err(RelayError::UpstreamRejected(format!("{:?} request failed", kind)));
            }

            ClientSessionEvent::UnhandleableAmf0Command { command_name, .. } => {
                debug!(
                    connection_id = self.connection_id,
                    command = %command_name,
                    "Ignoring upstream command"
                );
            }

            ClientSessionEvent::AcknowledgementReceived { bytes_received } => {
                trace!(connection_id = self.connection_id, bytes_received, "Upstream acknowledgement");
            }

            ClientSessionEvent::PingResponseReceived { timestamp } => {
                trace!(connection_id = self.connection_id, timestamp = timestamp.value, "Upstream ping response");
            }
        }

        Ok(())
    }
}

/// Opens a socket to the remote and completes the client handshake within `limit`
async fn connect_upstream(host: &str, port: u16, limit: Duration) -> Result<(TcpStream, Vec<u8>), RelayError> {
    let connect = async {
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let remaining = perform_handshake(&mut stream, PeerType::Client).await?;
        Ok::<_, RelayError>((stream, remaining))
    };

    match time::timeout(limit, connect).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::UpstreamTimedOut(limit)),
    }
}
