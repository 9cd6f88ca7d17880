/// Where a client session is in the connect, createStream, publish sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    ConnectRequested,
    Connected,
    CreateStreamRequested,
    PublishRequested { stream_id: u32 },
    Publishing { stream_id: u32 },
}
