//! One-shot correctness suites
//!
//! Plain call/assert sequences against the loopback backend:
//! - bucket CRUD
//! - object CRUD and queries
//! - raw query passthrough

#[path = "../common/mod.rs"]
mod common;

mod buckets;
mod objects;
mod sql;
