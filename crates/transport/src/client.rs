//! Long-lived TCP client.
//!
//! One `RpcClient` keeps one logical identity for its whole life. A manager
//! task owns the socket: it resolves and connects, multiplexes requests over
//! the connection, and reconnects with jittered exponential backoff when the
//! backend goes away. Callers never see the socket; they see the connection
//! state and the [`ErrorKind`] their call failed with.
//!
//! | State | Call behavior |
//! |-------|---------------|
//! | `Connecting` | waits up to `connect_timeout`, then `NoBackends` |
//! | `Connected` | sent; `TransportUnavailable` if the connection drops |
//! | `Unavailable` | fails immediately with `NoBackends` |
//! | `Closed` | fails immediately with `ClientClosed` |

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use kvsoak_rpc::{ConnectionState, ErrorKind, Reply, Request, Result, RpcError, StoreClient};

use crate::frame::{Frame, FrameBody, FrameReader};

/// Connection settings for [`RpcClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend host name or address.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Bound on name resolution, on each connect attempt, and on how long a
    /// call waits for the first connection.
    pub connect_timeout: Duration,
    /// Bound on one request, from send to final frame.
    pub request_timeout: Duration,
    /// First reconnect delay.
    pub min_backoff: Duration,
    /// Reconnect delay ceiling.
    pub max_backoff: Duration,
}

impl ClientConfig {
    /// Defaults for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type PendingMap = HashMap<u64, mpsc::UnboundedSender<FrameBody>>;

/// The live half of a connection, shared with callers.
#[derive(Clone)]
struct Connection {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<Mutex<PendingMap>>,
}

struct Shared {
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    connection: Mutex<Option<Connection>>,
    shutdown: watch::Sender<bool>,
    next_id: AtomicU64,
}

impl Shared {
    // `Closed` is terminal.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// A long-lived, reconnecting store client.
///
/// Must be created inside a tokio runtime: construction spawns the manager
/// task. Dropping the client stops it.
pub struct RpcClient {
    shared: Arc<Shared>,
}

impl RpcClient {
    /// Create the client and start connecting in the background.
    pub fn connect(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);
        info!(address = %config.address(), "client created");
        let shared = Arc::new(Shared {
            config,
            state,
            connection: Mutex::new(None),
            shutdown,
            next_id: AtomicU64::new(1),
        });
        tokio::spawn(manage(Arc::clone(&shared), shutdown_rx));
        Self { shared }
    }

    /// Settings this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    async fn ready(&self) -> Result<Connection> {
        let mut state = self.shared.state.subscribe();
        let deadline = Instant::now() + self.shared.config.connect_timeout;
        loop {
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Connected => {
                    return self.shared.connection.lock().clone().ok_or_else(|| {
                        RpcError::no_backends(format!(
                            "connection to {} is being torn down",
                            self.shared.config.address()
                        ))
                    });
                }
                ConnectionState::Unavailable => {
                    return Err(RpcError::no_backends(format!(
                        "no backend available at {}",
                        self.shared.config.address()
                    )));
                }
                ConnectionState::Closed => {
                    return Err(RpcError::new(
                        ErrorKind::ClientClosed,
                        "client has been closed",
                    ));
                }
                ConnectionState::Connecting => {
                    match tokio::time::timeout_at(deadline, state.changed()).await {
                        Ok(Ok(())) => continue,
                        _ => {
                            return Err(RpcError::no_backends(format!(
                                "timed out waiting for a backend at {}",
                                self.shared.config.address()
                            )));
                        }
                    }
                }
            }
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

#[async_trait]
impl StoreClient for RpcClient {
    async fn call(&self, request: Request) -> Result<Reply> {
        let op = request.operation();
        let connection = self.ready().await?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = Frame {
            id,
            body: FrameBody::Request(request),
        }
        .encode()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.pending.lock().insert(id, tx);
        if connection.outbound.send(bytes).is_err() {
            connection.pending.lock().remove(&id);
            return Err(RpcError::transport(format!(
                "{} not sent: connection is gone",
                op
            )));
        }

        let timeout = self.shared.config.request_timeout;
        match tokio::time::timeout(timeout, collect(&mut rx)).await {
            Ok(result) => result,
            Err(_) => {
                connection.pending.lock().remove(&id);
                Err(RpcError::new(
                    ErrorKind::Timeout,
                    format!("{} timed out after {:?}", op, timeout),
                ))
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.shared.state.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    async fn close(&self) {
        info!(address = %self.shared.config.address(), "client closing");
        self.shared.set_state(ConnectionState::Closed);
        self.shared.shutdown.send_replace(true);
    }
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<FrameBody>) -> Result<Reply> {
    let mut records = Vec::new();
    while let Some(body) = rx.recv().await {
        match body {
            FrameBody::Record(row) => records.push(row),
            FrameBody::Done(response) => return Ok(Reply { records, response }),
            FrameBody::Failed(err) => return Err(err),
            FrameBody::Request(_) => {
                return Err(RpcError::protocol("backend answered with a request frame"));
            }
        }
    }
    Err(RpcError::transport(
        "connection lost before the reply completed",
    ))
}

async fn manage(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let address = shared.config.address();
    let mut backoff = shared.config.min_backoff;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let attempt = tokio::select! {
            attempt = open(&shared.config) => attempt,
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok(stream) => {
                backoff = shared.config.min_backoff;
                let peer = stream.peer_addr().ok();
                info!(address = %address, peer = ?peer, "connected");

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let pending = Arc::new(Mutex::new(PendingMap::new()));
                *shared.connection.lock() = Some(Connection {
                    outbound: outbound_tx,
                    pending: Arc::clone(&pending),
                });
                shared.set_state(ConnectionState::Connected);

                let failure = drive(stream, outbound_rx, &pending, &mut shutdown).await;
                shared.connection.lock().take();
                fail_pending(&pending, &failure);

                if *shutdown.borrow() {
                    break;
                }
                warn!(address = %address, error = %failure, "disconnected");
                shared.set_state(ConnectionState::Unavailable);
            }
            Err(err) => {
                debug!(address = %address, error = %err, "connect attempt failed");
                shared.set_state(ConnectionState::Unavailable);
            }
        }

        let delay = jittered(backoff);
        backoff = (backoff * 2).min(shared.config.max_backoff);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    if let Some(connection) = shared.connection.lock().take() {
        fail_pending(
            &connection.pending,
            &RpcError::new(ErrorKind::ClientClosed, "client has been closed"),
        );
    }
    shared.set_state(ConnectionState::Closed);
    debug!(address = %address, "connection manager stopped");
}

async fn open(config: &ClientConfig) -> Result<TcpStream> {
    let address = config.address();
    let addrs: Vec<SocketAddr> =
        match tokio::time::timeout(config.connect_timeout, tokio::net::lookup_host(&address)).await
        {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                return Err(RpcError::no_backends(format!(
                    "cannot resolve {}: {}",
                    address, e
                )));
            }
            Err(_) => {
                return Err(RpcError::no_backends(format!(
                    "resolving {} timed out",
                    address
                )));
            }
        };
    if addrs.is_empty() {
        return Err(RpcError::no_backends(format!(
            "{} resolved to no addresses",
            address
        )));
    }

    let mut last_error = String::new();
    for addr in addrs {
        match tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = format!("{}: {}", addr, e),
            Err(_) => last_error = format!("{}: connect timed out", addr),
        }
    }
    Err(RpcError::no_backends(format!(
        "no backend reachable at {} ({})",
        address, last_error
    )))
}

// Runs until the connection fails or shutdown is requested; returns the error
// every outstanding request should fail with.
async fn drive(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: &Mutex<PendingMap>,
    shutdown: &mut watch::Receiver<bool>,
) -> RpcError {
    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half);
    loop {
        tokio::select! {
            frame = frames.next_frame() => match frame {
                Ok(Some(frame)) => {
                    if let Err(err) = route(pending, frame) {
                        return err;
                    }
                }
                Ok(None) => return RpcError::transport("connection closed by backend"),
                Err(err) => return err,
            },
            bytes = outbound.recv() => match bytes {
                Some(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        return RpcError::transport(format!("write failed: {}", e));
                    }
                }
                None => return RpcError::new(ErrorKind::ClientClosed, "client dropped"),
            },
            _ = shutdown.changed() => {
                return RpcError::new(ErrorKind::ClientClosed, "client has been closed");
            }
        }
    }
}

fn route(pending: &Mutex<PendingMap>, frame: Frame) -> Result<()> {
    if matches!(frame.body, FrameBody::Request(_)) {
        return Err(RpcError::protocol("backend sent a request frame"));
    }
    let mut map = pending.lock();
    let target = if frame.body.is_terminal() {
        map.remove(&frame.id)
    } else {
        map.get(&frame.id).cloned()
    };
    match target {
        Some(tx) => {
            let _ = tx.send(frame.body);
        }
        // Late answer to a request that already timed out.
        None => debug!(id = frame.id, "dropping frame for unknown request"),
    }
    Ok(())
}

fn fail_pending(pending: &Mutex<PendingMap>, err: &RpcError) {
    let drained: Vec<_> = pending.lock().drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(FrameBody::Failed(err.clone()));
    }
}

fn jittered(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64 / 4).max(1);
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
