use super::transactions::TransactionKind;
use crate::time::RtmpTimestamp;
use delay_relay_amf0::Amf0Value;

/// Why the server did not accept a transaction
#[derive(PartialEq, Debug, Clone)]
pub enum RejectionReason {
    /// No response arrived before the deadline
    TimedOut,

    /// The server answered with `_error`
    ErrorResponse {
        code: Option<String>,
        description: Option<String>,
    },
}

/// Events a client session raises for the application to act on
#[derive(PartialEq, Debug, Clone)]
pub enum ClientSessionEvent {
    ConnectionRequestAccepted,

    /// The server allocated the message stream we will publish on
    StreamCreated { stream_id: u32 },

    /// The server confirmed the publish, queued media has been flushed
    PublishRequestAccepted { stream_id: u32 },

    /// The server answered the publish with an error status
    PublishRequestRejected {
        code: String,
        description: Option<String>,
    },

    /// A tracked request was rejected or expired.  Only that request is affected.
    TransactionRejected {
        transaction_id: u32,
        kind: TransactionKind,
        reason: RejectionReason,
    },

    UnhandleableAmf0Command {
        command_name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_values: Vec<Amf0Value>,
    },

    AcknowledgementReceived { bytes_received: u32 },

    PingResponseReceived { timestamp: RtmpTimestamp },
}
