/// Options that govern how a server session behaves
#[derive(Clone, Debug)]
pub struct ServerSessionConfig {
    pub fms_version: String,
    pub chunk_size: u32,
    pub peer_bandwidth: u32,
    pub window_ack_size: u32,
}

impl ServerSessionConfig {
    pub fn new() -> ServerSessionConfig {
        ServerSessionConfig {
            fms_version: "FMS/3,0,1,123".to_string(),
            chunk_size: 4096,
            peer_bandwidth: 5_000_000,
            window_ack_size: 5_000_000,
        }
    }
}

impl Default for ServerSessionConfig {
    fn default() -> Self {
        ServerSessionConfig::new()
    }
}
