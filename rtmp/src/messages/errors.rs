use delay_relay_amf0::{Amf0DeserializationError, Amf0SerializationError};
use std::io;
use thiserror::Error;

/// Errors that can occur while turning a raw payload into an `RtmpMessage`
#[derive(Debug, Error)]
pub enum MessageDeserializationError {
    /// The bytes or amf0 values contained in the message were not laid out as expected
    #[error("The message was not encoded in an expected format")]
    InvalidMessageFormat,

    #[error("The message did not contain valid Amf0 encoded values: {0}")]
    Amf0DeserializationError(#[from] Amf0DeserializationError),

    #[error("An IO error occurred while reading the input: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur while turning an `RtmpMessage` into a raw payload
#[derive(Debug, Error)]
pub enum MessageSerializationError {
    #[error("Chunk size {0} is larger than the largest allowed value of 2147483647")]
    InvalidChunkSize(u32),

    #[error("Values could not be serialized into Amf0: {0}")]
    Amf0SerializationError(#[from] Amf0SerializationError),

    #[error("An IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}
