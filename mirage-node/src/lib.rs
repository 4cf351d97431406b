//! Mirage Node - the command/control protocol layer for Mirage cameras
//!
//! A [`Session`] carries camera API requests over a [`Transport`]: BLE for
//! pairing and first-time setup, HTTPS for everything after. The
//! [`PairingHandshake`] establishes the shared key both transports
//! authenticate with, and the [`catalog`] turns typed commands into requests.

pub mod auth;
pub mod catalog;
mod config;
mod error;
pub mod pairing;
mod request;
pub mod session;
pub mod transport;

pub use catalog::{Command, CommandOutput};
pub use config::{ClientConfig, mirage_home};
pub use error::{Error, TransportError, ValidationError};
pub use pairing::{PairingHandshake, PairingState};
pub use request::{EXPIRATION_HORIZON, RESERVED_REQUEST_IDS, RequestIds, now_millis, request_name};
pub use session::Session;
pub use transport::{BleTransport, GattWriter, HttpsTransport, Outgoing, Transport, TransportKind};

// Re-export the layers below so callers need a single dependency
pub use mirage_keys;
pub use mirage_proto;
