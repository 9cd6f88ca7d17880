#[derive(PartialEq, Debug, Clone)]
pub enum StreamState {
    Created,
    Publishing { stream_name: String },
    Playing { stream_name: String },
}

/// A message stream allocated through `createStream`
#[derive(Debug)]
pub struct ActiveStream {
    pub current_state: StreamState,
}
