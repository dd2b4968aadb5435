//! Client-server connection management
//!
//! Provides a Unix-socket or TCP connection to the tessera server with
//! frame-level framing, payload fragmentation, reply correlation, and
//! asynchronous event dispatch over the same stream.

mod client;

pub use client::Connection;

// Part of the public API for advanced use cases
#[allow(unused_imports)]
pub use client::default_server_addr;
