use crate::messages::PeerBandwidthLimitType;

/// Protocol control bookkeeping shared by both session roles
pub(crate) struct ControlState {
    peer_window_ack_size: Option<u32>,
    peer_bandwidth: Option<(u32, PeerBandwidthLimitType)>,
    bytes_received: u64,
    bytes_received_at_last_ack: u64,
}

impl ControlState {
    pub fn new() -> ControlState {
        ControlState {
            peer_window_ack_size: None,
            peer_bandwidth: None,
            bytes_received: 0,
            bytes_received_at_last_ack: 0,
        }
    }

    /// Counts inbound bytes.  Returns the sequence number to acknowledge once the peer's
    /// window has been crossed since the last acknowledgement.
    pub fn record_bytes_received(&mut self, count: usize) -> Option<u32> {
        self.bytes_received += count as u64;

        let window = self.peer_window_ack_size.filter(|size| *size > 0)? as u64;
        if self.bytes_received - self.bytes_received_at_last_ack < window {
            return None;
        }

        self.bytes_received_at_last_ack = self.bytes_received;
        Some(self.bytes_received as u32)
    }

    pub fn set_peer_window_ack_size(&mut self, size: u32) {
        self.peer_window_ack_size = Some(size);
    }

    pub fn set_peer_bandwidth(&mut self, size: u32, limit_type: PeerBandwidthLimitType) {
        self.peer_bandwidth = Some((size, limit_type));
    }

    pub fn peer_window_ack_size(&self) -> Option<u32> {
        self.peer_window_ack_size
    }

    pub fn peer_bandwidth(&self) -> Option<(u32, PeerBandwidthLimitType)> {
        self.peer_bandwidth
    }
}
