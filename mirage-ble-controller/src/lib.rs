//! Mirage BLE Controller
//!
//! Finds a Mirage camera over Bluetooth LE, connects to it and hands back a
//! [`mirage_node::BleTransport`] wired to its request and response
//! characteristics.
//!
//! # Example
//!
//! ```ignore
//! use mirage_ble_controller::{PollConfig, Purpose, open_ble_transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = open_ble_transport(Purpose::Pairing, PollConfig::default()).await?;
//!     // hand link.transport to a mirage_node::Session
//!     link.connection.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
mod poll;

pub use ble::{
    BleConnection, BleLink, CameraDevice, CharacteristicWriter, DiscoveryError, Purpose, connect,
    get_adapter, open_ble_transport, resolve_characteristic, scan, scan_for_service,
};
pub use poll::{PollConfig, poll_until};
