use crate::messages::MessageSerializationError;
use thiserror::Error;

/// Errors raised while reassembling chunks.  All of them leave the chunk stream in an unknown
/// state, so the connection cannot continue.
#[derive(Debug, Error)]
pub enum ChunkDeserializationError {
    /// Formats 1 to 3 borrow fields from the previous chunk on the same chunk stream, which
    /// requires that a chunk was already received there
    #[error("Received chunk with non-zero chunk type on csid {csid} prior to receiving a type 0 chunk")]
    NoPreviousChunkOnStream { csid: u32 },

    #[error("Requested an invalid max chunk size of {chunk_size}.  The largest chunk size possible is 2147483647")]
    InvalidMaxChunkSize { chunk_size: usize },

    /// The bytes collected for a message on a chunk stream disagree with its declared length
    #[error("Message on csid {csid} declared {declared} bytes but {received} were received")]
    MessageLengthMismatch {
        csid: u32,
        declared: u32,
        received: usize,
    },
}

#[derive(Debug, Error)]
pub enum ChunkSerializationError {
    /// A message cannot be more than 16777215 bytes, even when split across chunks
    #[error("The current message has a length of {size} bytes, which is over the allowed size of 16777215 bytes")]
    MessageTooLong { size: usize },

    #[error("An invalid chunk size of {attempted_chunk_size} was specified.  Chunk size must be greater than 0 and less than 2147483648")]
    InvalidMaxChunkSize { attempted_chunk_size: u32 },

    #[error("Failed to create SetChunkSize message: {0}")]
    SetChunkSizeMessageCreationFailure(#[from] MessageSerializationError),
}
