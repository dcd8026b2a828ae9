//! Outbound gateway transport.
//!
//! The delivery pipeline talks to the gateway through the [`GatewayConnector`]
//! seam so tests can substitute an in-memory stream. The production
//! implementation dials TCP and wraps it in client-certificate TLS.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::GatewayConfig;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Certificate loading or parsing error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Private key loading or parsing error.
    #[error("private key error: {0}")]
    PrivateKey(String),

    /// TLS configuration error.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The gateway host is not a valid TLS server name.
    #[error("invalid gateway host {host:?}: {reason}")]
    InvalidHost {
        /// The configured host.
        host: String,
        /// Why it was rejected.
        reason: String,
    },

    /// TCP connect failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// The remote `host:port`.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TLS handshake failed.
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        /// The remote `host:port`.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A bidirectional byte stream to the gateway.
pub trait GatewayStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> GatewayStream for T {}

/// Connection factory for the delivery pipeline.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Establish one fresh connection to the gateway.
    async fn connect(&self) -> Result<Box<dyn GatewayStream>, TransportError>;

    /// Human-readable remote endpoint, for logging.
    fn endpoint(&self) -> String;
}

/// TLS connector for the production gateway.
pub struct TlsGatewayConnector {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl TlsGatewayConnector {
    /// Build a connector from the gateway configuration.
    ///
    /// Loads the PEM client certificate chain and key, and the trust
    /// anchors (configured CA bundle, or the built-in web roots).
    pub fn from_config(config: &GatewayConfig) -> Result<Self, TransportError> {
        let certs = load_certificates(&config.cert_file)?;
        let key = load_private_key(&config.key_file)?;

        let mut roots = RootCertStore::empty();
        match &config.ca_file {
            Some(ca_file) => {
                for cert in load_certificates(ca_file)? {
                    roots.add(cert).map_err(|e| {
                        TransportError::Certificate(format!(
                            "failed to add CA certificate from {}: {e}",
                            ca_file.display()
                        ))
                    })?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }

        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| TransportError::TlsConfig(format!("client config error: {e}")))?;

        let server_name = ServerName::try_from(config.host.clone()).map_err(|e| {
            TransportError::InvalidHost {
                host: config.host.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            server_name,
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }
}

#[async_trait]
impl GatewayConnector for TlsGatewayConnector {
    async fn connect(&self) -> Result<Box<dyn GatewayStream>, TransportError> {
        let addr = self.endpoint();
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::Connect {
                addr: addr.clone(),
                source: e,
            })?;

        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| TransportError::Handshake { addr, source: e })?;

        Ok(Box::new(tls))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse all PEM certificates in a file.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let pem = std::fs::read(path).map_err(|e| {
        TransportError::Certificate(format!("failed to read {}: {e}", path.display()))
    })?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::Certificate(format!("failed to parse {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(TransportError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Parse the PEM private key in a file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let pem = std::fs::read(path).map_err(|e| {
        TransportError::PrivateKey(format!("failed to read {}: {e}", path.display()))
    })?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| {
        TransportError::PrivateKey(format!("failed to parse {}: {e}", path.display()))
    })
}
