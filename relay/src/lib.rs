//! An RTMP relay that sits between a publisher and an ingest server and can hold the stream
//! back by a configurable delay.
//!
//! Publishers connect to the relay as if it were the ingest server.  Their media goes through a
//! per connection `DelayBuffer` and is republished to the configured remote.  The buffer's mode
//! can be switched at runtime through `RelayConfig`:
//!
//! * `realtime` forwards media as it arrives while remembering the last delay's worth of it
//! * `delay` holds every message back until it is older than the delay
//! * `rewind` replays the remembered media, then continues delayed
//! * `forward` skips ahead to the latest keyframe, then continues in realtime

pub mod config;
pub mod delay_buffer;
pub mod errors;
pub mod media;
pub mod outbound;
pub mod server;

mod connection;
mod transport;

pub use self::config::{ConfigSnapshot, RelayConfig};
pub use self::delay_buffer::{BufferMode, BufferOccupancy, DelayBuffer};
pub use self::errors::{ConfigError, RelayError};
pub use self::server::{RelayServer, RelayStatus, ServerStatus};
