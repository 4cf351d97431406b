//! Links to the camera
//!
//! Both transports move one serialized request out and one reply back. The
//! envelope (encryption on BLE, signing on HTTPS) is applied by the session
//! before the bytes reach the transport.

mod ble;
mod https;

pub use ble::{BleTransport, GattWriter};
pub use https::{HttpsTransport, media_url_path};

use crate::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ble,
    Https,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ble => "ble",
            Self::Https => "https",
        })
    }
}

/// An enveloped request ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub body: Vec<u8>,
    /// Full `Authorization` header value, HTTPS only
    pub authorization: Option<String>,
}

impl Outgoing {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body, authorization: None }
    }

    pub fn signed(body: Vec<u8>, authorization: String) -> Self {
        Self { body, authorization: Some(authorization) }
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send one request and resolve with its raw (unframed) reply.
    async fn send(&self, outgoing: Outgoing) -> Result<Vec<u8>, TransportError>;
}
