//! # kvsoak backend
//!
//! Server collaborators the soak harness stands up and tears down.
//!
//! - [`LoopbackBackend`] - in-process TCP server over a [`MemoryStore`]
//! - [`ProcessBackend`] - external server program in its own process group

use async_trait::async_trait;

mod error;
mod loopback;
mod process;
pub mod store;

pub use error::{BackendError, Result};
pub use loopback::{LoopbackBackend, LoopbackServer};
pub use process::{ProcessBackend, ProcessConfig, ServerProcess};
pub use store::MemoryStore;

/// Something that can launch a server on a given port.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start a server listening on `port` and wait until it is ready.
    async fn start(&self, port: u16) -> Result<Box<dyn ServerHandle>>;
}

/// A running server.
#[async_trait]
pub trait ServerHandle: Send {
    /// Port the server listens on.
    fn port(&self) -> u16;

    /// Tear the server down. Connected clients observe a disconnect.
    async fn stop(self: Box<Self>) -> Result<()>;
}
