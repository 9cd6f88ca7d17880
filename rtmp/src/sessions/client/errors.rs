use crate::chunk_io::{ChunkDeserializationError, ChunkSerializationError};
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientSessionError {
    #[error("An error occurred deserializing incoming data: {0}")]
    ChunkDeserializationError(#[from] ChunkDeserializationError),

    #[error("An error occurred serializing outbound messages: {0}")]
    ChunkSerializationError(#[from] ChunkSerializationError),

    #[error("An error occurred turning an RTMP message into a message payload: {0}")]
    MessageSerializationError(#[from] MessageSerializationError),

    #[error("An error occurred turning a message payload into an RTMP message: {0}")]
    MessageDeserializationError(#[from] MessageDeserializationError),

    /// Only one connection may be requested per session
    #[error("A connection was already requested on this session")]
    ConnectionAlreadyRequested,

    /// Only one publish may be requested per session
    #[error("Publishing was already requested on this session")]
    PublishAlreadyRequested,

    #[error("The handshake has already been completed")]
    HandshakeAlreadyCompleted,
}
