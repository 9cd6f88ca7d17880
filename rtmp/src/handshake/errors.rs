use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The first byte of the handshake was not the RTMP version 3
    #[error("First byte of the handshake did not start with a 3, found {0}")]
    BadVersionId(u8),

    /// The peer echoed back a different random block than the one we sent
    #[error("Peer did not send the correct random data back")]
    IncorrectRandomData,

    #[error("Outbound packets 0 and 1 have already been generated")]
    OutboundPacketsAlreadyGenerated,

    #[error("Handshake is already complete")]
    HandshakeAlreadyCompleted,

    #[error("Unable to initialize the hmac digest with the handshake key")]
    InvalidDigestKey,

    #[error("{0}")]
    Io(#[from] io::Error),
}
