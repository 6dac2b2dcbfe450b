//! Backend address parsing and connection.
//!
//! A backend is reachable over TCP (`host:port`) or a UNIX-domain socket
//! (`unix:/path/to.sock`). Resolution is address-family agnostic: TCP
//! names are resolved through `tokio::net::lookup_host`, which returns
//! whichever of IPv4/IPv6 the name resolves to, rather than the
//! original's `gethostbyname`-only IPv4 path.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

/// Either endpoint kind a backend can be.
#[derive(Debug, Clone)]
pub enum BackendAddr {
    Tcp(String),
    Unix(PathBuf),
}

/// A connected, non-blocking backend stream.
pub enum BackendStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// Turn a CLI `[host:]port` value into a literal `host:port`, defaulting
/// the host when only a bare port was given. `TcpStream::connect`/
/// `TcpListener::bind` reject a bare port outright (it isn't a valid
/// socket address), so this has to happen before the value reaches them —
/// the original's `-s`/`-c` parsing does the same `strtok`-on-`:`
/// defaulting (`0.0.0.0` for `-s`, `localhost` for `-c`).
pub fn normalize_host_port(spec: &str, default_host: &str) -> String {
    match spec.split_once(':') {
        Some((host, port)) if !host.is_empty() => format!("{host}:{port}"),
        _ => format!("{default_host}:{spec}"),
    }
}

impl BackendAddr {
    /// Parse a `-c` flag value: `unix:<path>` or `[host:]port`.
    ///
    /// A bare port (no `host:` prefix) defaults to `localhost`, mirroring
    /// the original's `strtok`-based `-c` parsing.
    pub fn parse(spec: &str) -> Self {
        if let Some(path) = spec.strip_prefix("unix:") {
            BackendAddr::Unix(PathBuf::from(path))
        } else {
            BackendAddr::Tcp(normalize_host_port(spec, "localhost"))
        }
    }

    /// Connect to this backend.
    pub async fn connect(&self) -> std::io::Result<BackendStream> {
        match self {
            BackendAddr::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true).ok();
                Ok(BackendStream::Tcp(stream))
            }
            BackendAddr::Unix(path) => {
                let stream = UnixStream::connect(path as &Path).await?;
                Ok(BackendStream::Unix(stream))
            }
        }
    }
}

impl AsyncRead for BackendStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            BackendStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BackendStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            BackendStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            BackendStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            BackendStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_prefix() {
        match BackendAddr::parse("unix:/tmp/app.sock") {
            BackendAddr::Unix(p) => assert_eq!(p, PathBuf::from("/tmp/app.sock")),
            _ => panic!("expected unix"),
        }
    }

    #[test]
    fn parses_host_port() {
        match BackendAddr::parse("127.0.0.1:9000") {
            BackendAddr::Tcp(s) => assert_eq!(s, "127.0.0.1:9000"),
            _ => panic!("expected tcp"),
        }
    }

    #[test]
    fn parses_bare_port_defaulting_to_localhost() {
        match BackendAddr::parse("9000") {
            BackendAddr::Tcp(s) => assert_eq!(s, "localhost:9000"),
            _ => panic!("expected tcp"),
        }
    }

    #[test]
    fn normalize_host_port_keeps_explicit_host() {
        assert_eq!(normalize_host_port("example.com:443", "0.0.0.0"), "example.com:443");
    }

    #[test]
    fn normalize_host_port_defaults_bare_port() {
        assert_eq!(normalize_host_port("8443", "0.0.0.0"), "0.0.0.0:8443");
    }

    #[tokio::test]
    async fn connect_refused_surfaces_io_error() {
        let addr = BackendAddr::Tcp("127.0.0.1:1".to_string());
        let err = addr.connect().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn connect_tcp_succeeds_against_loopback_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let backend = BackendAddr::Tcp(addr.to_string());
        let stream = backend.connect().await.unwrap();
        assert!(matches!(stream, BackendStream::Tcp(_)));
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn connect_unix_succeeds_against_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let backend = BackendAddr::Unix(path);
        let stream = backend.connect().await.unwrap();
        assert!(matches!(stream, BackendStream::Unix(_)));
        accept.await.unwrap();
    }
}
