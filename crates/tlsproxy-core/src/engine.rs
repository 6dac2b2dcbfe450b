//! The connection engine: acceptor loop plus per-slot handshake,
//! forwarding, and teardown.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use crate::backend::BackendAddr;
use crate::buffer::Buffer;
use crate::credentials::ServerCredentials;
use crate::error::ConnError;
use crate::pool::Pool;
use crate::state::ConnState;

/// Default client→server (request) buffer capacity: 2 KiB.
pub const DEFAULT_C2S_CAPACITY: usize = 2 * 1024;
/// Default server→client (response) buffer capacity: 8 KiB.
pub const DEFAULT_S2C_CAPACITY: usize = 8 * 1024;

const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Assembles credentials, backend address, and pool into a running
/// acceptor loop.
pub struct Engine {
    credentials: ServerCredentials,
    backend: BackendAddr,
    pool: Arc<Pool>,
    c2s_capacity: usize,
    s2c_capacity: usize,
}

impl Engine {
    pub fn new(credentials: ServerCredentials, backend: BackendAddr, pool: Arc<Pool>) -> Self {
        Self {
            credentials,
            backend,
            pool,
            c2s_capacity: DEFAULT_C2S_CAPACITY,
            s2c_capacity: DEFAULT_S2C_CAPACITY,
        }
    }

    /// Override the default buffer sizes (used by tests to exercise
    /// fullness/backpressure without transferring megabytes of data).
    pub fn with_buffer_sizes(mut self, c2s_capacity: usize, s2c_capacity: usize) -> Self {
        self.c2s_capacity = c2s_capacity;
        self.s2c_capacity = s2c_capacity;
        self
    }

    /// Run the acceptor loop against an already-bound listener until
    /// `shutdown` fires. Each accepted connection is handed to its own
    /// task running the handshake/forward/teardown sequence; the pool's
    /// semaphore is the only thing bounding concurrency.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let acceptor = TlsAcceptor::from(self.credentials.rustls_config());
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("shutdown signal received, closing listener");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => self.accept_one(stream, peer_addr, acceptor.clone(), &mut tasks),
                        Err(e) => error!(error = %e, "accept() failed"),
                    }
                }
                // Reap finished connection tasks so the set doesn't grow
                // without bound over a long-lived process.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Orderly shutdown (spec.md §4.5): close every slot still live.
        // There is no per-slot timeout model, so "close" here means abort
        // the task outright — dropping its `SlotGuard` and sockets exactly
        // the way a dead backend/peer drive it to `Disconnected` already.
        let remaining = tasks.len();
        if remaining > 0 {
            info!(remaining, "aborting live connections for shutdown");
        }
        tasks.shutdown().await;
        Ok(())
    }

    fn accept_one(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        acceptor: TlsAcceptor,
        tasks: &mut JoinSet<()>,
    ) {
        let Some(guard) = self.pool.try_allocate(peer_addr) else {
            error!(%peer_addr, error = %ConnError::PoolFull, "refusing new connection");
            drop(stream);
            return;
        };

        let backend = self.backend.clone();
        let c2s_capacity = self.c2s_capacity;
        let s2c_capacity = self.s2c_capacity;

        tasks.spawn(async move {
            let index = guard.index();
            match run_connection(stream, acceptor, backend, &guard, c2s_capacity, s2c_capacity).await {
                Ok(()) => info!(%peer_addr, slot = index, "connection closed"),
                Err(e) => error!(%peer_addr, slot = index, error = %e, "connection failed"),
            }
            // `guard` drops here regardless of path taken, returning the
            // slot to `Disconnected` (spec.md §4.4 step 4 / §7).
        });
    }
}

async fn run_connection(
    tcp_stream: tokio::net::TcpStream,
    acceptor: TlsAcceptor,
    backend_addr: BackendAddr,
    guard: &crate::pool::SlotGuard,
    c2s_capacity: usize,
    s2c_capacity: usize,
) -> Result<(), ConnError> {
    // §4.2 handshake progression: tokio_rustls's `accept` future
    // internally retries on WANT_READ/WANT_WRITE; a plain I/O error here
    // is the original's "any other error" branch.
    let mut tls_stream = acceptor.accept(tcp_stream).await.map_err(ConnError::Handshake)?;

    // §4.2 backend connect, issued once the handshake has succeeded.
    let mut backend_stream = backend_addr.connect().await.map_err(ConnError::BackendConnect)?;

    guard.set_state(ConnState::Connected);

    let mut c2s = Buffer::with_capacity(c2s_capacity);
    let mut s2c = Buffer::with_capacity(s2c_capacity);
    let mut closing = false;

    loop {
        if closing && c2s.is_empty() && s2c.is_empty() {
            break;
        }

        let mut progressed = false;

        // Step 1: TLS peer -> c2s_buf.
        if !closing && !c2s.is_full() {
            match poll_once(tls_stream.read(c2s.writable_tail())) {
                Poll::Ready(Ok(0)) => {
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Ready(Ok(n)) => {
                    c2s.advance_write(n);
                    progressed = true;
                }
                Poll::Ready(Err(_)) => {
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Pending => {}
            }
        }

        // Step 2: drain c2s_buf -> backend.
        if !c2s.is_empty() {
            match poll_once(backend_stream.write(c2s.readable())) {
                Poll::Ready(Ok(n)) => {
                    c2s.advance_read(n);
                    progressed = true;
                }
                Poll::Ready(Err(_)) => {
                    // Best-effort close: the remaining unsent bytes are
                    // discarded rather than retried forever against a
                    // dead socket (spec.md §4.4).
                    c2s.clear();
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Pending => {}
            }
        }

        // Step 3: backend -> s2c_buf.
        if !closing && !s2c.is_full() {
            match poll_once(backend_stream.read(s2c.writable_tail())) {
                Poll::Ready(Ok(0)) => {
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Ready(Ok(n)) => {
                    s2c.advance_write(n);
                    progressed = true;
                }
                Poll::Ready(Err(_)) => {
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Pending => {}
            }
        }

        // Step 4: drain s2c_buf -> TLS peer.
        if !s2c.is_empty() {
            match poll_once(tls_stream.write(s2c.readable())) {
                Poll::Ready(Ok(n)) => {
                    s2c.advance_read(n);
                    progressed = true;
                }
                Poll::Ready(Err(_)) => {
                    s2c.clear();
                    closing = true;
                    guard.set_state(ConnState::Closing);
                    progressed = true;
                }
                Poll::Pending => {}
            }
        }

        if !progressed {
            tokio::time::sleep(IDLE_SLEEP).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    Ok(())
}

/// Poll a future exactly once with a no-op waker, surfacing
/// `Poll::Pending` for "would block" the way the original treats
/// `EAGAIN`/`WANT_READ`/`WANT_WRITE` — no progress this tick, retry next.
fn poll_once<F: Future>(fut: F) -> Poll<F::Output> {
    let waker = std::task::Waker::noop();
    let mut cx = Context::from_waker(waker);
    let mut fut = pin!(fut);
    fut.as_mut().poll(&mut cx)
}
