use delay_relay_rtmp::handshake::HandshakeError;
use delay_relay_rtmp::sessions::{ClientSessionError, ServerSessionError};
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for configuration key '{key}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Inbound session failed: {0}")]
    ServerSession(#[from] ServerSessionError),

    #[error("Outbound session failed: {0}")]
    ClientSession(#[from] ClientSessionError),

    #[error("The peer closed the connection during the handshake")]
    HandshakeInterrupted,

    #[error("The upstream server rejected the publish: {0}")]
    UpstreamRejected(String),

    #[error("The upstream server did not complete the connection within {0:?}")]
    UpstreamTimedOut(Duration),

    #[error("The upstream connection closed")]
    UpstreamClosed,

    #[error("The socket writer has stopped")]
    WriterClosed,

    #[error("The relay server is already started")]
    AlreadyStarted,
}
