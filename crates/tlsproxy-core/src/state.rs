//! Connection state tags.

/// Lifecycle state of one connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No live sockets or TLS session; slot is available.
    Disconnected,
    /// TLS socket accepted, handshake in progress.
    Accept,
    /// Handshake complete, backend connected, forwarding traffic.
    Connected,
    /// Tearing down: draining buffered bytes, no further reads.
    Closing,
}
