//! In-process loopback server.
//!
//! Serves the JSON-lines framing on a local TCP port, executing requests
//! against a [`MemoryStore`]. Each accepted connection gets its own task;
//! requests on a connection are answered in order.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use kvsoak_rpc::RpcError;
use kvsoak_transport::{Frame, FrameBody, FrameReader};

use crate::error::{BackendError, Result};
use crate::store::MemoryStore;
use crate::{Backend, ServerHandle};

/// Starts a fresh [`LoopbackServer`] with an empty store on every `start`.
#[derive(Debug, Clone)]
pub struct LoopbackBackend {
    host: String,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    /// Backend bound to `127.0.0.1`.
    pub fn new() -> Self {
        Self::with_host("127.0.0.1")
    }

    /// Backend bound to `host`, the address clients are given.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Backend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn start(&self, port: u16) -> Result<Box<dyn ServerHandle>> {
        let server = LoopbackServer::bind(&format!("{}:{}", self.host, port)).await?;
        Ok(Box::new(server))
    }
}

/// A running loopback server.
pub struct LoopbackServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

impl LoopbackServer {
    /// Bind `addr` (port 0 picks a free port) and start serving.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BackendError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let accept = tokio::spawn(accept_loop(listener, store, shutdown_rx));
        info!(addr = %local, "loopback server started");
        Ok(Self {
            addr: local,
            shutdown,
            accept,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ServerHandle for LoopbackServer {
    fn port(&self) -> u16 {
        self.addr.port()
    }

    async fn stop(mut self: Box<Self>) -> Result<()> {
        self.shutdown.send_replace(true);
        if let Err(e) = (&mut self.accept).await {
            warn!(addr = %self.addr, error = %e, "loopback accept task ended abnormally");
        }
        info!(addr = %self.addr, "loopback server stopped");
        Ok(())
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<Mutex<MemoryStore>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "loopback accepted connection");
                    connections.spawn(serve(stream, Arc::clone(&store)));
                }
                Err(e) => warn!(error = %e, "loopback accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);
    // Aborting the tasks drops their sockets, which clients see as a hang-up.
    connections.shutdown().await;
}

async fn serve(stream: TcpStream, store: Arc<Mutex<MemoryStore>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    loop {
        let frames = match reader.next_frame().await {
            Ok(Some(Frame {
                id,
                body: FrameBody::Request(request),
            })) => answer(id, store.lock().execute(request)),
            Ok(Some(frame)) => vec![Frame {
                id: frame.id,
                body: FrameBody::Failed(RpcError::protocol("expected a request frame")),
            }],
            Ok(None) => break,
            Err(e) => {
                // Without an id the client cannot be answered; drop the connection.
                warn!(error = %e, "loopback read failed");
                break;
            }
        };

        for frame in frames {
            let bytes = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => Frame {
                    id: frame.id,
                    body: FrameBody::Failed(e),
                }
                .encode()
                .unwrap_or_default(),
            };
            if let Err(e) = write.write_all(&bytes).await {
                debug!(error = %e, "loopback write failed");
                return;
            }
        }
    }
}

fn answer(id: u64, outcome: kvsoak_rpc::Result<kvsoak_rpc::Reply>) -> Vec<Frame> {
    match outcome {
        Ok(reply) => {
            let mut frames: Vec<Frame> = reply
                .records
                .into_iter()
                .map(|record| Frame {
                    id,
                    body: FrameBody::Record(record),
                })
                .collect();
            frames.push(Frame {
                id,
                body: FrameBody::Done(reply.response),
            });
            frames
        }
        Err(e) => vec![Frame {
            id,
            body: FrameBody::Failed(e),
        }],
    }
}
