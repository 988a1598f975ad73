//! The socket registry: owns every live [`Socket`], accepts inbound
//! connections and dials outbound ones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tessera_config::SocketConfig;
use tessera_core::events::EventBus;
use tessera_core::generator::IncreaseGenerator;
use tessera_core::routine;
use tessera_engine::Subsystem;
use tessera_protocol::Message;
use tessera_telemetry::MetricsRecorder;

use crate::socket::Socket;
use crate::{SocketError, SocketIndex};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Upper bound on how long `stop` waits for sockets to finish closing.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared between the subsystem, the accept loop and each socket's close
/// callback.
struct Registry {
    events: Arc<EventBus>,
    metrics: Arc<MetricsRecorder>,
    queue_capacity: usize,
    indices: IncreaseGenerator<SocketIndex>,
    sockets: RwLock<HashMap<SocketIndex, Arc<Socket>>>,
}

impl Registry {
    /// Wraps `stream` in a socket with a fresh index, stores it and starts it.
    fn adopt(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<SocketIndex, SocketError> {
        let index = self.indices.next()?;
        let socket = Socket::new(
            index,
            stream,
            peer,
            self.queue_capacity,
            self.events.clone(),
            self.metrics.clone(),
        );
        self.sockets.write().insert(index, socket.clone());

        let registry: Weak<Registry> = Arc::downgrade(self);
        socket.start(move || {
            if let Some(registry) = registry.upgrade() {
                registry.sockets.write().remove(&index);
            }
        });
        Ok(index)
    }

    fn get(&self, index: SocketIndex) -> Result<Arc<Socket>, SocketError> {
        self.sockets
            .read()
            .get(&index)
            .cloned()
            .ok_or(SocketError::SocketNotFound(index))
    }

    fn all(&self) -> Vec<Arc<Socket>> {
        self.sockets.read().values().cloned().collect()
    }
}

/// Engine-managed owner of all sockets. Listens on `listen_port` when
/// configured; [`connect`](Self::connect) works either way.
pub struct SocketSubsystem {
    config: SocketConfig,
    registry: Arc<Registry>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl SocketSubsystem {
    pub const NAME: &'static str = "socket";

    pub fn new(
        config: SocketConfig,
        events: Arc<EventBus>,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, SocketError> {
        Ok(Self {
            registry: Arc::new(Registry {
                events,
                metrics,
                queue_capacity: config.send_queue_capacity,
                indices: IncreaseGenerator::new(0, 1)?,
                sockets: RwLock::new(HashMap::new()),
            }),
            config,
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    /// Binds `bind_address:port` and accepts connections until stopped.
    /// Returns the bound address; port 0 picks an ephemeral port.
    pub async fn listen(&self, port: u16) -> Result<SocketAddr, SocketError> {
        let address = format!("{}:{}", self.config.bind_address, port);
        let listener = TcpListener::bind((self.config.bind_address.as_str(), port))
            .await
            .map_err(|source| SocketError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| SocketError::Bind { address, source })?;

        let listener = Arc::new(listener);
        let registry = self.registry.clone();
        let task = routine::spawn_with_restart("socket-accept", move || {
            accept_loop(registry.clone(), listener.clone())
        });

        if let Some(previous) = self.accept_task.lock().replace(task) {
            previous.abort();
        }
        *self.local_addr.lock() = Some(local_addr);

        info!(address = %local_addr, "Socket server is listening");
        Ok(local_addr)
    }

    /// Dials `host:port` and registers the connection like an accepted one.
    pub async fn connect(&self, host: &str, port: u16) -> Result<SocketIndex, SocketError> {
        let address = format!("{}:{}", host, port);
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| SocketError::Connect {
                address: address.clone(),
                source,
            })?;
        let peer = stream
            .peer_addr()
            .map_err(|source| SocketError::Connect {
                address: address.clone(),
                source,
            })?;

        let index = self.registry.adopt(stream, peer)?;
        info!(socket = index, %peer, "Connected to server");
        Ok(index)
    }

    pub async fn send(
        &self,
        index: SocketIndex,
        message_id: i32,
        data: impl Into<Bytes>,
    ) -> Result<(), SocketError> {
        self.send_message(index, Message::new(message_id, data)).await
    }

    pub async fn send_message(&self, index: SocketIndex, message: Message) -> Result<(), SocketError> {
        let socket = self.registry.get(index).inspect_err(|_| {
            warn!(socket = index, message_id = message.message_id, "Socket not found");
        })?;
        socket.send_message(message).await
    }

    /// Starts closing one socket. It leaves the registry once its loops exit.
    pub fn close(&self, index: SocketIndex) -> Result<(), SocketError> {
        self.registry.get(index)?.close();
        Ok(())
    }

    pub fn socket(&self, index: SocketIndex) -> Option<Arc<Socket>> {
        self.registry.get(index).ok()
    }

    pub fn contains(&self, index: SocketIndex) -> bool {
        self.registry.sockets.read().contains_key(&index)
    }

    /// Live sockets, including ones still closing.
    pub fn len(&self) -> usize {
        self.registry.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listener address once [`listen`](Self::listen) has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

async fn accept_loop(registry: Arc<Registry>, listener: Arc<TcpListener>) -> Result<(), SocketError> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => match registry.adopt(stream, peer) {
                Ok(index) => info!(socket = index, %peer, "New connection"),
                Err(e) => error!(%peer, error = %e, "Dropping connection"),
            },
            Err(e) => {
                warn!(error = %e, "Error accepting connection");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Subsystem for SocketSubsystem {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&self) -> anyhow::Result<()> {
        info!(
            listen_port = ?self.config.listen_port,
            bind_address = %self.config.bind_address,
            send_queue_capacity = self.config.send_queue_capacity,
            "Socket subsystem configured"
        );
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        if let Some(port) = self.config.listen_port {
            self.listen(port).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        let sockets = self.registry.all();
        for socket in &sockets {
            socket.close();
        }

        let drained = async {
            for socket in &sockets {
                socket.closed().await;
            }
        };
        if tokio::time::timeout(STOP_TIMEOUT, drained).await.is_err() {
            warn!(
                remaining = self.registry.sockets.read().len(),
                timeout = ?STOP_TIMEOUT,
                "Sockets still closing at shutdown"
            );
        }
        info!(closed = sockets.len(), "Socket subsystem stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsystem() -> SocketSubsystem {
        let config = SocketConfig {
            bind_address: "127.0.0.1".into(),
            ..SocketConfig::default()
        };
        SocketSubsystem::new(
            config,
            Arc::new(EventBus::new()),
            Arc::new(MetricsRecorder::new().unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_index_is_reported() {
        let sockets = subsystem();
        assert!(matches!(
            sockets.send(99, 1, &b"x"[..]).await,
            Err(SocketError::SocketNotFound(99))
        ));
        assert!(matches!(sockets.close(99), Err(SocketError::SocketNotFound(99))));
        assert!(sockets.socket(99).is_none());
    }

    #[tokio::test]
    async fn indices_are_never_reused() {
        let sockets = subsystem();
        let addr = sockets.listen(0).await.unwrap();

        let first = sockets.connect("127.0.0.1", addr.port()).await.unwrap();
        sockets.close(first).unwrap();
        let second = sockets.connect("127.0.0.1", addr.port()).await.unwrap();

        assert!(second > first);
        assert!(!sockets.contains(second + 1000));
    }

    #[tokio::test]
    async fn bind_failure_surfaces() {
        let sockets = subsystem();
        let taken = sockets.listen(0).await.unwrap();

        let other = subsystem();
        assert!(matches!(
            other.listen(taken.port()).await,
            Err(SocketError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn connect_failure_surfaces() {
        // Grab a free port, then release it so nothing listens there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let sockets = subsystem();
        assert!(matches!(
            sockets.connect("127.0.0.1", port).await,
            Err(SocketError::Connect { .. })
        ));
        assert!(sockets.is_empty());
    }
}
