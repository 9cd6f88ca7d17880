use super::events::ClientSessionEvent;
use crate::chunk_io::Packet;
use crate::messages::MessagePayload;

/// A single result of a client session processing input or a request
#[derive(PartialEq, Debug)]
pub enum ClientSessionResult {
    /// A packet that must be sent to the server, in the order it was returned
    OutboundResponse(Packet),

    RaisedEvent(ClientSessionEvent),

    UnhandleableMessageReceived(MessagePayload),
}
