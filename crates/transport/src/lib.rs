//! # kvsoak transport
//!
//! Newline-delimited JSON framing for the store protocol and [`RpcClient`],
//! the long-lived reconnecting client the soak harness holds for its whole
//! run.

mod client;
pub mod frame;

pub use client::{ClientConfig, RpcClient};
pub use frame::{Frame, FrameBody, FrameReader, MAX_FRAME_BYTES};
