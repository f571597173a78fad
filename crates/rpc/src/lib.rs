//! # kvsoak RPC contract
//!
//! The request/response instruction set of the key-value store, the closed
//! set of error kinds a call can fail with, and the [`StoreClient`] trait the
//! harness drives.
//!
//! - [`Request`]/[`Response`] - serializable instruction set
//! - [`ErrorKind`]/[`RpcError`] - classifiable failures
//! - [`Filter`] - structured search predicates
//! - [`StoreClient`] - long-lived client contract

mod client;
mod error;
mod filter;
mod request;
mod response;
mod types;

pub use client::{Reply, StoreClient};
pub use error::{ErrorKind, RpcError};
pub use filter::Filter;
pub use request::{Operation, Request};
pub use response::Response;
pub use types::*;

/// Result type for RPC calls
pub type Result<T> = std::result::Result<T, RpcError>;
