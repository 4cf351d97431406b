use std::time::Duration;

use mirage_keys::{CryptoError, KeyStoreError};
use mirage_proto::{FramingError, StatusCode};

use crate::pairing::PairingState;

/// Failures below the protocol layer: the link itself
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid camera host {0:?}")]
    InvalidHost(String),
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),
    #[error("HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("could not build HTTP request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("camera answered HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("HTTPS requests must carry an Authorization header")]
    MissingAuthorization,
    #[error("GATT write failed: {0}")]
    Write(String),
    #[error("notification stream closed")]
    NotificationsClosed,
    #[error("a request is already waiting for a reply")]
    Busy,
    #[error(transparent)]
    Framing(#[from] FramingError),
}

impl TransportError {
    /// After these the link cannot be trusted to correlate replies.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotificationsClosed | Self::Framing(_))
    }
}

/// Command parameters rejected before any I/O
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{command}: missing required parameter `{field}`")]
    Missing { command: &'static str, field: &'static str },
    #[error("{command}: `{field}` is out of range")]
    OutOfRange { command: &'static str, field: &'static str },
    #[error("{command}: nothing to configure")]
    Empty { command: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{command}: malformed frame: {source}")]
    Framing {
        command: &'static str,
        #[source]
        source: FramingError,
    },
    #[error("{command}: {source}")]
    Transport {
        command: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("{command}: no reply within {after:?}")]
    Timeout { command: &'static str, after: Duration },
    #[error("{command}: request expired before a reply arrived")]
    Expired { command: &'static str },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{command}: {reason}")]
    Protocol { command: &'static str, reason: String },
    #[error("{command}: camera replied {status:?}: {message}")]
    Status {
        command: &'static str,
        status: StatusCode,
        message: String,
    },
    #[error("pairing failed at {step}: {reason}")]
    HandshakeFailed {
        step: PairingState,
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error("no shared key; pair with the camera first")]
    NotPaired,
    #[error("session is unusable after an earlier failure; open a new transport")]
    SessionUnusable,
    #[error("config {path}: {reason}")]
    Config { path: String, reason: String },
}

impl Error {
    pub(crate) fn transport(command: &'static str, source: TransportError) -> Self {
        match source {
            TransportError::Framing(source) => Self::Framing { command, source },
            source => Self::Transport { command, source },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Expired { .. })
    }
}
