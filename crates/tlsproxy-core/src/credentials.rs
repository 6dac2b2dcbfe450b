//! Process-wide TLS server credentials.
//!
//! Loaded once at startup from PEM files and held read-only for the
//! lifetime of the process. No client-certificate verification is
//! configured (the proxy performs server-side termination only), and
//! the resulting `rustls::ServerConfig` is restricted to TLS 1.2/1.3 by
//! rustls's own defaults — there is no equivalent of the original's
//! "any server method" context or its temporary export-RSA key callback.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::error::{StartupError, StartupResult};

/// Shared, read-only TLS server credentials for the whole process.
#[derive(Clone)]
pub struct ServerCredentials {
    config: Arc<ServerConfig>,
}

impl ServerCredentials {
    /// Load a certificate chain and RSA private key from PEM files and
    /// build a server-side TLS configuration from them.
    pub fn load(cert_path: &Path, key_path: &Path) -> StartupResult<Self> {
        let cert_chain = load_cert_chain(cert_path)?;
        let key = load_private_key(key_path)?;

        // `builder_with_provider` sidesteps the process-wide default
        // `CryptoProvider` that the bare `ServerConfig::builder()` path
        // requires to have been installed ahead of time.
        let config = ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Build credentials directly from an already-constructed
    /// `rustls::ServerConfig` (used by tests to plug in generated certs
    /// without touching the filesystem).
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The shared `rustls::ServerConfig`, ready to hand to a
    /// `tokio_rustls::TlsAcceptor`.
    pub fn rustls_config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

fn load_cert_chain(path: &Path) -> StartupResult<Vec<CertificateDer<'static>>> {
    let bytes = std::fs::read(path).map_err(|source| StartupError::CertRead {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::Cursor::new(bytes);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(Result::ok)
        .collect();

    if certs.is_empty() {
        return Err(StartupError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> StartupResult<PrivateKeyDer<'static>> {
    let bytes = std::fs::read(path).map_err(|source| StartupError::KeyRead {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::Cursor::new(bytes);
    rustls_pemfile::private_key(&mut reader)
        .ok()
        .flatten()
        .ok_or_else(|| StartupError::NoPrivateKey(path.display().to_string()))
}
