//! RTMP protocol plumbing for the delay relay: the handshake, chunk (de)multiplexing, message
//! codecs and the server and client session state machines.
//!
//! Nothing in this crate performs IO.  Callers feed received bytes in and write the returned
//! packets out, in order, on whatever transport they own.

#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod chunk_io;
pub mod handshake;
pub mod messages;
pub mod sessions;
pub mod time;
