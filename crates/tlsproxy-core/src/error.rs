//! Error types for the connection engine.

use thiserror::Error;

/// Errors that prevent the proxy from starting at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read certificate file {path}: {source}")]
    CertRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read private key file {path}: {source}")]
    KeyRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid TLS server configuration: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type StartupResult<T> = Result<T, StartupError>;

/// Errors that tear down a single connection slot, never the process.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("backend connect failed: {0}")]
    BackendConnect(#[source] std::io::Error),

    #[error("connection pool is full")]
    PoolFull,
}

pub type ConnResult<T> = Result<T, ConnError>;
