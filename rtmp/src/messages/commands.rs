//! The positional layout of AMF0 command messages.
//!
//! Every command starts with its name, a transaction id and a command object.  What follows
//! depends on the command, so each known command name maps to the ordered list of the
//! remaining fields.  Commands missing from the table are still decoded (their trailing values
//! are kept as is) so they can be passed through untouched.

use delay_relay_amf0::Amf0Value;

/// The fields that follow the command object for one command name
#[derive(Debug, PartialEq, Eq)]
pub struct CommandSchema {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

static COMMAND_SCHEMAS: &[CommandSchema] = &[
    CommandSchema { name: "_result", fields: &["info"] },
    CommandSchema { name: "_error", fields: &["info", "streamId"] },
    CommandSchema { name: "onStatus", fields: &["info"] },
    CommandSchema { name: "onBWDone", fields: &[] },
    CommandSchema { name: "releaseStream", fields: &["streamName"] },
    CommandSchema { name: "getStreamLength", fields: &["streamId"] },
    CommandSchema { name: "getMovLen", fields: &["streamId"] },
    CommandSchema { name: "FCPublish", fields: &["streamName"] },
    CommandSchema { name: "FCUnpublish", fields: &["streamName"] },
    CommandSchema { name: "FCSubscribe", fields: &["streamName"] },
    CommandSchema { name: "onFCPublish", fields: &["info"] },
    CommandSchema { name: "connect", fields: &["args"] },
    CommandSchema { name: "call", fields: &["args"] },
    CommandSchema { name: "createStream", fields: &[] },
    CommandSchema { name: "close", fields: &[] },
    CommandSchema { name: "play", fields: &["streamName", "start", "duration", "reset"] },
    CommandSchema { name: "play2", fields: &["params"] },
    CommandSchema { name: "deleteStream", fields: &["streamId"] },
    CommandSchema { name: "closeStream", fields: &[] },
    CommandSchema { name: "receiveAudio", fields: &["bool"] },
    CommandSchema { name: "receiveVideo", fields: &["bool"] },
    CommandSchema { name: "publish", fields: &["streamName", "type"] },
    CommandSchema { name: "seek", fields: &["ms"] },
    CommandSchema { name: "pause", fields: &["pause", "ms"] },
];

/// Returns the layout for a command name, or `None` for commands that should be passed through
pub fn find_command_schema(name: &str) -> Option<&'static CommandSchema> {
    COMMAND_SCHEMAS.iter().find(|schema| schema.name == name)
}

impl CommandSchema {
    /// Reads a named field out of the values following the command object.  Optional trailing
    /// fields that the peer left off return `None`.
    pub fn argument<'a>(&self, arguments: &'a [Amf0Value], field: &str) -> Option<&'a Amf0Value> {
        let index = self.fields.iter().position(|x| *x == field)?;
        arguments.get(index)
    }
}
