use crate::chunk_io::{ChunkDeserializationError, ChunkSerializationError};
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use thiserror::Error;

/// Errors a server session can raise.  Every one of them is fatal for the connection.
#[derive(Debug, Error)]
pub enum ServerSessionError {
    #[error("An error occurred deserializing incoming data: {0}")]
    ChunkDeserializationError(#[from] ChunkDeserializationError),

    #[error("An error occurred serializing outbound messages: {0}")]
    ChunkSerializationError(#[from] ChunkSerializationError),

    #[error("An error occurred turning an RTMP message into a message payload: {0}")]
    MessageSerializationError(#[from] MessageSerializationError),

    #[error("An error occurred turning a message payload into an RTMP message: {0}")]
    MessageDeserializationError(#[from] MessageDeserializationError),
}
