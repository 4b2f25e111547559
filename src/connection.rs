// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Owns one TLS socket to the manager and performs complete
//! request/response exchanges over it.

use std::fs;
use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::error::Error;
use crate::xml::{DocumentAssembler, Element};

/// Receive buffer size of the response read loop.
pub const BLOCK_SIZE: usize = 1024;

/// How the TLS server certificate is handled.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Accept any certificate. The manager's default deployment uses a
    /// self-signed certificate, so this is the default; it provides
    /// encryption but no authentication of the peer.
    #[default]
    AcceptAny,
    /// Verify against CA certificates read from a PEM file.
    CaFile(PathBuf),
    /// Use a caller-supplied rustls configuration.
    Custom(Arc<ClientConfig>),
}

impl TlsMode {
    fn client_config(&self) -> Result<Arc<ClientConfig>, Error> {
        match self {
            TlsMode::AcceptAny => Ok(Arc::new(
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth(),
            )),
            TlsMode::CaFile(path) => {
                let mut root_store = RootCertStore::empty();
                let ca_file =
                    fs::File::open(path).map_err(|e| Error::Connection(e.to_string()))?;
                let mut reader = BufReader::new(ca_file);
                for cert in rustls_pemfile::certs(&mut reader) {
                    let cert = cert.map_err(|e| Error::Connection(e.to_string()))?;
                    root_store
                        .add(cert)
                        .map_err(|e| Error::Connection(e.to_string()))?;
                }
                Ok(Arc::new(
                    ClientConfig::builder()
                        .with_root_certificates(root_store)
                        .with_no_client_auth(),
                ))
            }
            TlsMode::Custom(config) => Ok(config.clone()),
        }
    }
}

/// Accepts every server certificate, for managers with self-signed
/// certificates.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

/// A TLS connection to the manager daemon.
pub type TlsConnection = Connection<StreamOwned<ClientConnection, TcpStream>>;

/// One stream to the manager, request-then-full-response, one exchange at
/// a time. Generic over the stream so tests can use an in-memory double.
///
/// The stream is closed when the connection is dropped.
#[derive(Debug)]
pub struct Connection<S: Read + Write> {
    stream: S,
}

impl TlsConnection {
    /// Opens a TCP connection to `host:port` and performs the TLS
    /// handshake lazily on first use.
    pub fn connect(host: &str, port: u16, tls: &TlsMode) -> Result<Self, Error> {
        let config = tls.client_config()?;
        let server = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Connection(format!("invalid server name {host:?}: {e}")))?;
        let tls_conn = ClientConnection::new(config, server)
            .map_err(|e| Error::Connection(e.to_string()))?;
        let socket =
            TcpStream::connect((host, port)).map_err(|e| Error::Connection(e.to_string()))?;
        tracing::debug!(host, port, "connected to manager");
        Ok(Connection::new(StreamOwned::new(tls_conn, socket)))
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wraps an already-established stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Shared access to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Serializes `request` and performs one full exchange.
    pub fn send_request(&mut self, request: &Element) -> Result<Element, Error> {
        let payload = request.to_bytes()?;
        self.send_raw(&payload)
    }

    /// Sends pre-encoded bytes and reads one response document.
    ///
    /// The read loop receives up to [`BLOCK_SIZE`] bytes at a time and
    /// feeds them to an incremental parser; it stops as soon as the
    /// parser holds a balanced top-level element. The wire protocol has
    /// no length prefix, so a connection that closes mid-document is a
    /// framing failure.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<Element, Error> {
        tracing::trace!(bytes = payload.len(), "writing request");
        self.stream.write_all(payload)?;
        self.stream.flush()?;

        let mut assembler = DocumentAssembler::new();
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = self.stream.read(&mut buf)?;
            tracing::trace!(bytes = n, "received chunk");
            if n == 0 {
                break;
            }
            assembler.push(&buf[..n]);
            if assembler.is_complete() {
                break;
            }
        }
        assembler.finish()
    }

    /// Closes the connection. Dropping it has the same effect.
    pub fn close(self) {
        tracing::debug!("closing connection");
        drop(self.stream);
    }
}
