use std::time::Duration;

/// Options that govern how a client session behaves
#[derive(Clone, Debug)]
pub struct ClientSessionConfig {
    pub flash_version: String,
    pub chunk_size: u32,
    pub window_ack_size: u32,
    pub peer_bandwidth: u32,

    /// How long a connect or createStream request may wait for its response
    pub transaction_timeout: Duration,

    /// Media held back while the publish is being set up.  The oldest messages are dropped
    /// past this count.
    pub max_queued_media: usize,
}

impl ClientSessionConfig {
    pub fn new() -> ClientSessionConfig {
        ClientSessionConfig {
            flash_version: "FMLE/3.0 (compatible; DelayRelay)".to_string(),
            chunk_size: 4096,
            window_ack_size: 5_000_000,
            peer_bandwidth: 5_000_000,
            transaction_timeout: Duration::from_secs(5),
            max_queued_media: 10_000,
        }
    }
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        ClientSessionConfig::new()
    }
}
