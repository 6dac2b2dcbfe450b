//! `tlsproxy-core` — the TLS-terminating reverse proxy's connection
//! engine.
//!
//! This crate is deliberately narrow: it owns the per-connection state
//! machine (accept → handshake → forward → half-close → teardown), the
//! fixed-size connection pool, and the plaintext buffer abstraction. CLI
//! parsing, daemonization, privilege dropping, and process wiring live in
//! the `tlsproxyd` binary crate.
//!
//! # Modules
//!
//! - [`buffer`] — fixed-capacity byte buffer with begin/end offsets
//! - [`state`] — the `ConnState` lifecycle tag
//! - [`pool`] — the fixed-size `Pool` of connection slots
//! - [`credentials`] — process-wide TLS server credentials
//! - [`backend`] — backend address parsing and connection (TCP/UNIX)
//! - [`engine`] — the acceptor loop and per-connection forwarding logic
//! - [`error`] — startup-fatal vs. per-connection error types

pub mod backend;
pub mod buffer;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod pool;
pub mod state;

pub use backend::{normalize_host_port, BackendAddr, BackendStream};
pub use buffer::Buffer;
pub use credentials::ServerCredentials;
pub use engine::Engine;
pub use error::{ConnError, StartupError};
pub use pool::{Pool, SlotGuard};
pub use state::ConnState;
