//! Soak driver tests
//!
//! Bounded runs of the real runner, watchdog, introspection server and
//! scenario library against the loopback backend.

#[path = "../common/mod.rs"]
mod common;

mod introspection;
mod runner;
mod scenarios;
mod watchdog;
