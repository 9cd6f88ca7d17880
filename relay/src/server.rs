//! The listener that accepts publishers and tracks the connections relaying them.

use crate::config::RelayConfig;
use crate::connection;
use crate::delay_buffer::{BufferMode, BufferOccupancy};
use crate::errors::RelayError;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long connections get to close on their own once a stop is requested
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Pending,
    Running,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Pending => "pending",
            ServerStatus::Running => "running",
        };

        f.write_str(name)
    }
}

/// What the relay is doing right now, suitable for reporting over a control surface
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayStatus {
    pub status: ServerStatus,
    pub mode: BufferMode,
    pub connections: usize,
    pub buffer: BufferOccupancy,
}

struct TrackedConnection {
    token: CancellationToken,
    task: JoinHandle<()>,
    occupancy: Arc<Mutex<BufferOccupancy>>,
}

type ConnectionMap = Arc<Mutex<HashMap<u64, TrackedConnection>>>;

struct Running {
    token: CancellationToken,
    listener_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

pub struct RelayServer {
    config: Arc<RelayConfig>,
    status: Mutex<ServerStatus>,
    running: Mutex<Option<Running>>,
    connections: ConnectionMap,
    next_connection_id: Arc<AtomicU64>,
}

impl RelayServer {
    pub fn new(config: Arc<RelayConfig>) -> RelayServer {
        RelayServer {
            config,
            status: Mutex::new(ServerStatus::Stopped),
            running: Mutex::new(None),
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Binds the configured local port and starts accepting publishers.  Returns the address
    /// actually bound, which differs from the configured one when port 0 is used.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        {
            let mut status = self.status.lock();
            if *status != ServerStatus::Stopped {
                return Err(RelayError::AlreadyStarted);
            }

            *status = ServerStatus::Pending;
        }

        let port = self.config.local_port();
        let bound = async {
            let listener = TcpListener::bind(("0.0.0.0", port)).await?;
            let local_addr = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local_addr))
        };

        let (listener, local_addr) = match bound.await {
            Ok(bound) => bound,
            Err(error) => {
                error!(port, %error, "Failed to bind listener");
                *self.status.lock() = ServerStatus::Stopped;
                return Err(error.into());
            }
        };

        let token = CancellationToken::new();
        let listener_task = tokio::spawn(accept_connections(
            listener,
            self.config.clone(),
            self.connections.clone(),
            self.next_connection_id.clone(),
            token.clone(),
        ));

        *self.running.lock() = Some(Running {
            token,
            listener_task,
            local_addr,
        });

        *self.status.lock() = ServerStatus::Running;
        info!(address = %local_addr, "Relay server started");
        Ok(local_addr)
    }

    /// Stops accepting, asks every connection to close and waits up to the grace period for
    /// them to do so.  Connections still open after that are aborted.
    pub async fn stop(&self) {
        let running = match self.running.lock().take() {
            Some(running) => running,
            None => return,
        };

        *self.status.lock() = ServerStatus::Pending;
        info!("Stopping relay server");

        running.token.cancel();
        let _ = running.listener_task.await;

        let tracked: Vec<TrackedConnection> = self
            .connections
            .lock()
            .drain()
            .map(|(_, connection)| connection)
            .collect();

        for connection in &tracked {
            connection.token.cancel();
        }

        let abort_handles: Vec<_> = tracked.iter().map(|x| x.task.abort_handle()).collect();
        let tasks = tracked.into_iter().map(|x| x.task);
        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, join_all(tasks)).await.is_err() {
            warn!(count = abort_handles.len(), "Connections did not close in time, aborting");
            for handle in abort_handles {
                handle.abort();
            }
        }

        *self.status.lock() = ServerStatus::Stopped;
        info!(address = %running.local_addr, "Relay server stopped");
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.lock()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|x| x.local_addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn snapshot(&self) -> RelayStatus {
        let mode = self.config.reported_mode();
        let connections = self.connections.lock();
        let mut buffer = BufferOccupancy::default();
        for connection in connections.values() {
            let occupancy = connection.occupancy.lock();
            buffer.chunks += occupancy.chunks;
            buffer.bytes += occupancy.bytes;
            buffer.window_chunks += occupancy.window_chunks;
            buffer.paused |= occupancy.paused;
        }

        RelayStatus {
            status: self.status(),
            mode,
            connections: connections.len(),
            buffer,
        }
    }
}

async fn accept_connections(
    listener: TcpListener,
    config: Arc<RelayConfig>,
    connections: ConnectionMap,
    next_connection_id: Arc<AtomicU64>,
    token: CancellationToken,
) {
    loop {
        let (stream, address) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
        };

        let connection_id = next_connection_id.fetch_add(1, Ordering::Relaxed);
        info!(connection_id, address = %address, "Connection received");

        let connection_token = token.child_token();
        let occupancy = Arc::new(Mutex::new(BufferOccupancy::default()));

        // Holding the lock across the spawn keeps the task from removing itself before it is
        // inserted
        let mut tracked = connections.lock();
        let task = tokio::spawn({
            let config = config.clone();
            let connections = connections.clone();
            let occupancy = occupancy.clone();
            let token = connection_token.clone();
            async move {
                if let Err(error) = connection::run(connection_id, stream, config, occupancy, token).await {
                    warn!(connection_id, %error, "Connection failed");
                }

                connections.lock().remove(&connection_id);
            }
        });

        tracked.insert(
            connection_id,
            TrackedConnection {
                token: connection_token,
                task,
                occupancy,
            },
        );
    }

    info!("Listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn local_config() -> Arc<RelayConfig> {
        let config = Arc::new(RelayConfig::new());
        config.set("local_port", "0").unwrap();
        config
    }

    #[tokio::test]
    async fn start_and_stop_move_through_statuses() {
        let server = RelayServer::new(local_config());
        assert_eq!(server.status(), ServerStatus::Stopped);

        let address = server.start().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Running);
        assert_eq!(server.local_addr(), Some(address));

        server.stop().await;
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let server = RelayServer::new(local_config());
        server.start().await.unwrap();

        match server.start().await {
            Err(RelayError::AlreadyStarted) => (),
            x => panic!("Expected already started error, instead received {:?}", x),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn server_can_restart_after_stop() {
        let server = RelayServer::new(local_config());
        server.start().await.unwrap();
        server.stop().await;

        server.start().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Running);
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_tracked_connections() {
        let server = RelayServer::new(local_config());
        let address = server.start().await.unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", address.port())).await.unwrap();
        for _ in 0..100 {
            if server.connection_count() == 1 {
                break;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(server.connection_count(), 1);

        server.stop().await;
        assert_eq!(server.connection_count(), 0);

        // The relay side of the socket is gone, so reads end
        let mut buffer = [0_u8; 4096];
        loop {
            match client.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }

    #[tokio::test]
    async fn snapshot_reports_status_and_mode() {
        let config = local_config();
        config.set("state", "delay").unwrap();
        let server = RelayServer::new(config);

        let status = server.snapshot();
        assert_eq!(status.status, ServerStatus::Stopped);
        assert_eq!(status.mode, BufferMode::Delay);
        assert_eq!(status.connections, 0);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["mode"], "delay");
        assert_eq!(json["buffer"]["chunks"], 0);
    }
}
