//! Socket plumbing shared by the inbound and outbound legs.

use crate::errors::RelayError;
use delay_relay_rtmp::chunk_io::Packet;
use delay_relay_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use futures::future::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// Runs the handshake to completion and returns the bytes received past its end, which are
/// the start of the chunk stream.
pub(crate) async fn perform_handshake<S>(
    stream: &mut S,
    peer_type: PeerType,
) -> Result<Vec<u8>, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = Handshake::new(peer_type);
    let p0_and_p1 = handshake.generate_outbound_p0_and_p1()?;
    stream.write_all(&p0_and_p1).await?;

    let mut buffer = [0_u8; READ_BUFFER_SIZE];
    loop {
        let bytes_read = stream.read(&mut buffer).await?;
        if bytes_read == 0 {
            return Err(RelayError::HandshakeInterrupted);
        }

        match handshake.process_bytes(&buffer[..bytes_read])? {
            HandshakeProcessResult::InProgress { response_bytes } => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }
            }

            HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            } => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }

                return Ok(remaining_bytes);
            }
        }
    }
}

/// Spawns the task that owns the write half of a socket.  Packets are written in the order they
/// are sent; the task ends once every sender is dropped or a write fails.
pub(crate) fn spawn_writer<S>(
    connection_id: u64,
    leg: &'static str,
    stream: WriteHalf<S>,
) -> (mpsc::UnboundedSender<Packet>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = tokio::spawn(write_packets(connection_id, leg, stream, receiver));
    (sender, handle)
}

async fn write_packets<S>(
    connection_id: u64,
    leg: &'static str,
    mut stream: WriteHalf<S>,
    mut packets: mpsc::UnboundedReceiver<Packet>,
) where
    S: AsyncRead + AsyncWrite,
{
    let mut pending = Vec::new();
    while let Some(packet) = packets.recv().await {
        // Coalesce whatever else is already queued into a single write
        pending.extend_from_slice(&packet.bytes);
        while let Some(Some(packet)) = packets.recv().now_or_never() {
            pending.extend_from_slice(&packet.bytes);
        }

        trace!(connection_id, leg, bytes = pending.len(), "Writing packets");
        if let Err(error) = stream.write_all(&pending).await {
            warn!(connection_id, leg, %error, "Socket write failed");
            return;
        }

        pending.clear();
    }

    let _ = stream.shutdown().await;
    debug!(connection_id, leg, "Writer finished");
}
