//! HTTPS transport: one signed POST per request.
//!
//! The camera serves a self-signed certificate, so the TLS layer accepts any
//! certificate and requests are authenticated by their HMAC signature alone.

use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, header};
use hyper_util::rt::TokioIo;
use mirage_keys::SharedKey;
use mirage_proto::ble::https::{CONTENT_TYPE, CONTROL_PATH, MEDIA_PATH_PREFIX};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{Outgoing, Transport, TransportKind};
use crate::{TransportError, auth};

pub struct HttpsTransport {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl std::fmt::Debug for HttpsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl HttpsTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        let host = host.into();
        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| TransportError::InvalidHost(host.clone()))?;

        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptCameraCertificate))
            .with_no_client_auth();

        Ok(Self {
            host,
            port,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` as sent in the `Host` header
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The exact HTTP request `send` puts on the wire for `outgoing`
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        outgoing: Outgoing,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        let authorization = outgoing
            .authorization
            .ok_or(TransportError::MissingAuthorization)?;

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, self.authority())
            .header(header::AUTHORIZATION, authorization);
        if !outgoing.body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, CONTENT_TYPE);
        }
        Ok(builder.body(Full::new(Bytes::from(outgoing.body)))?)
    }

    async fn round_trip(&self, request: Request<Full<Bytes>>) -> Result<Vec<u8>, TransportError> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::Connect)?;
        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(TransportError::Tls)?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "camera connection closed with error");
            }
        });

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        tracing::debug!(%method, path = %path, status = status.as_u16(), bytes = body.len(), "camera replied");

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }

    fn media_request(
        &self,
        method: Method,
        key: &SharedKey,
        media_path: &str,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        let path = media_url_path(media_path);
        let signature = auth::sign(key, method.as_str(), &path, &[]);
        self.build_request(method, &path, Outgoing::signed(Vec::new(), auth::authorization(&signature)))
    }

    /// Download a file from the camera's media store
    pub async fn fetch_media(&self, media_path: &str, key: &SharedKey) -> Result<Vec<u8>, TransportError> {
        let request = self.media_request(Method::GET, key, media_path)?;
        self.round_trip(request).await
    }

    pub async fn delete_media(&self, media_path: &str, key: &SharedKey) -> Result<(), TransportError> {
        let request = self.media_request(Method::DELETE, key, media_path)?;
        self.round_trip(request).await.map(|_| ())
    }
}

/// `/media/<path>` for a path as listed by the camera
pub fn media_url_path(media_path: &str) -> String {
    format!("{MEDIA_PATH_PREFIX}{}", media_path.trim_start_matches('/'))
}

#[async_trait::async_trait]
impl Transport for HttpsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Https
    }

    async fn send(&self, outgoing: Outgoing) -> Result<Vec<u8>, TransportError> {
        let request = self.build_request(Method::POST, CONTROL_PATH, outgoing)?;
        self.round_trip(request).await
    }
}

/// Accepts whatever certificate the camera presents
#[derive(Debug)]
struct AcceptCameraCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptCameraCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
