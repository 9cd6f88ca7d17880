use super::events::ServerSessionEvent;
use crate::chunk_io::Packet;
use crate::messages::MessagePayload;

/// A single result of a server session processing input
#[derive(PartialEq, Debug)]
pub enum ServerSessionResult {
    /// A packet that must be sent to the client, in the order it was returned
    OutboundResponse(Packet),

    RaisedEvent(ServerSessionEvent),

    /// A message the session has no handling for, such as AMF3 commands
    UnhandleableMessageReceived(MessagePayload),
}
