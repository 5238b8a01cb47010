//! Byte-stream transport for the client: plain TCP, implicit TLS and the
//! STARTTLS upgrade.
//!
//! The transmission task only sees the [`Connector`] and [`Connection`]
//! traits, so tests can substitute a scripted transport.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{internal, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        ClientConfig, DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use crate::{
    config::ServerConfig,
    error::{ClientError, Result},
};

/// An open, exclusively owned connection to the server.
#[async_trait]
pub trait Connection: Send {
    /// Writes all of `data`.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Reads whatever is available into `buf`.
    ///
    /// A closed connection is an error, never a zero-length read.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Performs the TLS handshake over this connection. Resolves only once
    /// encryption is active.
    async fn upgrade(self: Box<Self>, domain: &str) -> Result<Box<dyn Connection>>;

    fn is_encrypted(&self) -> bool;

    /// Closes the write side, ignoring errors.
    async fn close(&mut self);
}

/// Opens connections for a configuration.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `config.host:config.port`, with TLS already active when
    /// `config.use_ssl` is set.
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Connection>>;
}

/// The real transport, built on tokio and rustls.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioConnector;

#[async_trait]
impl Connector for TokioConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Connection>> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        internal!(level = DEBUG, "Connected to {}", config.address());

        let connection: Box<dyn Connection> = Box::new(ClientConnection::Plain {
            stream,
            accept_invalid_certs: config.accept_invalid_certs,
        });

        if config.use_ssl {
            connection.upgrade(&config.host).await
        } else {
            Ok(connection)
        }
    }
}

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain {
        stream: TcpStream,
        accept_invalid_certs: bool,
    },
    Tls(Box<TlsStream<TcpStream>>),
}

#[async_trait]
impl Connection for ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain { stream, .. } => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain { stream, .. } => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade(self: Box<Self>, domain: &str) -> Result<Box<dyn Connection>> {
        let Self::Plain {
            stream,
            accept_invalid_certs,
        } = *self
        else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        if accept_invalid_certs {
            tracing::warn!(
                server = domain,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let connector = tls_connector(accept_invalid_certs);
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        internal!(level = DEBUG, "TLS established with {domain}");
        Ok(Box::new(Self::Tls(Box::new(tls_stream))))
    }

    fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    async fn close(&mut self) {
        let result = match self {
            Self::Plain { stream, .. } => stream.shutdown().await,
            Self::Tls(stream) => stream.shutdown().await,
        };
        if let Err(err) = result {
            internal!(level = DEBUG, "Error while closing connection: {err}");
        }
    }
}

fn tls_connector(accept_invalid_certs: bool) -> TlsConnector {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    // Log errors but don't fail if some certs couldn't be loaded
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }
    let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
    internal!("Loaded {added} native root certificates ({ignored} ignored)");

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    TlsConnector::from(Arc::new(config))
}

/// Accepts any certificate. Only installed when `accept_invalid_certs` is set.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
