//! `tlsproxyd` — the TLS-terminating reverse proxy daemon.
//!
//! Wires together [`tlsproxy_core`]'s credentials, pool, and engine
//! behind a CLI surface, and handles the process-level concerns the
//! core crate deliberately stays out of: daemonization, privilege
//! dropping, PID-file bookkeeping, and signal-triggered shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use tlsproxy_core::{BackendAddr, Engine, Pool, ServerCredentials};

mod daemon;

const DEFAULT_LISTEN: &str = "0.0.0.0:443";
const DEFAULT_CERT: &str = "/etc/symbion/cert.pem";
const DEFAULT_KEY: &str = "/etc/symbion/key.pem";
const DEFAULT_MAX_CONNECTIONS: usize = 32;
const PID_FILE: &str = "/var/run/ssl_proxy.pid";

/// TLS-terminating reverse proxy.
#[derive(Parser, Debug)]
#[command(name = "tlsproxyd", about = "TLS-terminating reverse proxy")]
struct Cli {
    /// Debug mode: stay in foreground, verbose stderr.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Max concurrent connections.
    #[arg(short = 'm', long = "max-connections", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Listen address, `[host:]port`.
    #[arg(short = 's', long = "listen", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Backend address, `[host:]port` or `unix:path`.
    #[arg(short = 'c', long = "backend")]
    backend: String,

    /// Certificate file (PEM).
    #[arg(short = 'C', long = "cert", default_value = DEFAULT_CERT)]
    cert: PathBuf,

    /// Private key file (PEM, RSA).
    #[arg(short = 'K', long = "key", default_value = DEFAULT_KEY)]
    key: PathBuf,

    /// Drop to this user (and its primary group) after binding.
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Chroot to this directory after binding.
    #[arg(short = 'r', long = "chroot")]
    chroot: Option<PathBuf>,
}

// Deliberately *not* `#[tokio::main]`: `fork()` after the Tokio runtime has
// spawned its worker threads only keeps the calling thread in the child,
// which is a well-known hazard for any work the runtime's other threads were
// midway through. The original forks before it has any threads at all
// (`main()` is plain C); this rewrite preserves that property by doing every
// privileged, filesystem-touching, and fork-calling step on a bare OS thread
// and only building the Tokio runtime — and therefore only starting the
// async engine — once daemonization and privilege dropping are done.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| {
                if cli.debug {
                    "debug".parse().unwrap()
                } else {
                    "info".parse().unwrap()
                }
            },
        ))
        .init();

    if let Err(e) = run(cli) {
        error!(error = %e, "fatal startup failure");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // A bare port (e.g. `-s 8443`) defaults its host to `0.0.0.0`, mirroring
    // the original's `-s` parsing; `TcpListener::bind` otherwise rejects a
    // bare port as an invalid socket address.
    let listen_addr = tlsproxy_core::normalize_host_port(&cli.listen, "0.0.0.0");
    let std_listener =
        std::net::TcpListener::bind(&listen_addr).map_err(|source| tlsproxy_core::StartupError::Bind {
            addr: listen_addr.clone(),
            source,
        })?;
    std_listener.set_nonblocking(true)?;
    info!(addr = %listen_addr, "listener bound");

    let credentials = ServerCredentials::load(&cli.cert, &cli.key)?;
    info!(cert = %cli.cert.display(), key = %cli.key.display(), "credentials loaded");

    // Privilege drop happens after bind + credential load, matching the
    // original's ordering: the privileged operations run first, then the
    // process sheds whatever privilege it no longer needs.
    if let Some(dir) = &cli.chroot {
        daemon::chroot(dir)?;
        info!(dir = %dir.display(), "chrooted");
    }
    if let Some(user) = &cli.user {
        daemon::drop_privileges(user)?;
        info!(%user, "privileges dropped");
    }

    // `daemonize` calls `fork()`; it must run before the Tokio runtime
    // below is constructed, while this process is still single-threaded.
    if !cli.debug {
        daemon::daemonize(PID_FILE)?;
    }

    let backend = BackendAddr::parse(&cli.backend);
    let pool = Pool::new(cli.max_connections);
    let engine = Arc::new(Engine::new(credentials, backend, pool));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve_until_shutdown(std_listener, engine))?;

    if !cli.debug && cli.chroot.is_none() {
        daemon::remove_pid_file(PID_FILE);
    }

    info!("shutdown complete");
    Ok(())
}

async fn serve_until_shutdown(std_listener: std::net::TcpListener, engine: Arc<Engine>) -> anyhow::Result<()> {
    let listener = TcpListener::from_std(std_listener)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let serve_engine = engine.clone();
    let serve_handle = tokio::spawn(async move { serve_engine.serve(listener, shutdown_rx).await });

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = serve_handle.await? {
        error!(error = %e, "acceptor loop exited with error");
    }

    Ok(())
}
