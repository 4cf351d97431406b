//! BLE discovery and connection for Mirage cameras
//!
//! A camera advertises the pairing service while its pairing mode is armed
//! and the control service otherwise. Both expose the same request (write)
//! and response (notify) characteristics.

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use mirage_node::{BleTransport, GattWriter, TransportError};
use mirage_proto::ble::{PAIRING_SERVICE_UUID, REQUEST_UUID, RESPONSE_UUID, SERVICE_UUID};
use std::time::Duration;
use uuid::Uuid;

use crate::{PollConfig, poll_until};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no camera advertising {0} found")]
    NotFound(Uuid),
    #[error("camera did not report a connection")]
    ConnectTimeout,
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error(transparent)]
    Uuid(#[from] uuid::Error),
    #[error(transparent)]
    Bluetooth(#[from] btleplug::Error),
}

/// Which service to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Pairing,
    Control,
}

impl Purpose {
    pub fn service(self) -> Result<Uuid, DiscoveryError> {
        Ok(Uuid::parse_str(match self {
            Self::Pairing => PAIRING_SERVICE_UUID,
            Self::Control => SERVICE_UUID,
        })?)
    }
}

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct CameraDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_camera: bool,
    pub pairing: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, DiscoveryError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(DiscoveryError::NoAdapter)
}

/// Scan for `duration` and report every device seen
pub async fn scan(duration: Duration) -> Result<Vec<CameraDevice>, DiscoveryError> {
    let adapter = get_adapter().await?;
    let control_service = Purpose::Control.service()?;
    let pairing_service = Purpose::Pairing.service()?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let pairing = props.services.contains(&pairing_service);
            devices.push(CameraDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                is_camera: pairing || props.services.contains(&control_service),
                pairing,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Poll the adapter until a peripheral advertising `service` shows up.
/// Scanning is stopped either way.
pub async fn scan_for_service(
    adapter: &Adapter,
    service: Uuid,
    poll: PollConfig,
) -> Result<Option<Peripheral>, DiscoveryError> {
    adapter.start_scan(ScanFilter { services: vec![service] }).await?;
    tracing::info!(%service, "scanning");

    let found = poll_until(poll, "camera advertisement", move || async move {
        let peripherals = adapter.peripherals().await.ok()?;
        for peripheral in peripherals {
            if let Ok(Some(props)) = peripheral.properties().await {
                if props.services.contains(&service) {
                    return Some(peripheral);
                }
            }
        }
        None
    })
    .await;

    if let Err(e) = adapter.stop_scan().await {
        tracing::warn!(error = %e, "could not stop scan");
    }
    if let Some(peripheral) = &found {
        tracing::info!(address = %peripheral.address(), "found camera");
    }
    Ok(found)
}

/// Connect and wait until the peripheral reports the connection.
pub async fn connect(peripheral: &Peripheral, poll: PollConfig) -> Result<(), DiscoveryError> {
    peripheral.connect().await?;
    poll_until(poll, "connection", move || async move {
        peripheral.is_connected().await.ok().filter(|connected| *connected)
    })
    .await
    .map(|_| ())
    .ok_or(DiscoveryError::ConnectTimeout)
}

/// Find a characteristic, preferring the one under `service` when the same
/// UUID appears in several services.
pub async fn resolve_characteristic(
    peripheral: &Peripheral,
    service: Uuid,
    characteristic: Uuid,
    poll: PollConfig,
) -> Result<Characteristic, DiscoveryError> {
    poll_until(poll, "characteristics", move || async move {
        if let Err(e) = peripheral.discover_services().await {
            tracing::debug!(error = %e, "service discovery failed");
            return None;
        }
        let all = peripheral.characteristics();
        all.iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .or_else(|| all.iter().find(|c| c.uuid == characteristic))
            .cloned()
    })
    .await
    .ok_or(DiscoveryError::CharacteristicNotFound(characteristic))
}

/// Writes to the camera's request characteristic
pub struct CharacteristicWriter {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

#[async_trait::async_trait]
impl GattWriter for CharacteristicWriter {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

/// The connected peripheral behind a transport
pub struct BleConnection {
    peripheral: Peripheral,
    poll: PollConfig,
}

impl BleConnection {
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Best effort; failures are only logged.
    pub async fn disconnect(&self) {
        if let Err(e) = self.peripheral.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
            return;
        }
        let peripheral = &self.peripheral;
        if !wait_disconnected(self.poll, || peripheral.is_connected()).await {
            tracing::warn!(address = %peripheral.address(), "camera still reports a connection");
        }
    }
}

/// Poll `connected` until it stops reporting a live link. An error counts as
/// disconnected.
async fn wait_disconnected<F, Fut>(poll: PollConfig, mut connected: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, btleplug::Error>>,
{
    poll_until(poll, "disconnection", move || {
        let reply = connected();
        async move { (!matches!(reply.await, Ok(true))).then_some(()) }
    })
    .await
    .is_some()
}

pub struct BleLink {
    pub transport: BleTransport<CharacteristicWriter>,
    pub connection: BleConnection,
}

/// Find a camera advertising the service for `purpose`, connect, and wire a
/// transport to its request/response characteristics.
pub async fn open_ble_transport(purpose: Purpose, poll: PollConfig) -> Result<BleLink, DiscoveryError> {
    let service = purpose.service()?;
    let request_uuid = Uuid::parse_str(REQUEST_UUID)?;
    let response_uuid = Uuid::parse_str(RESPONSE_UUID)?;

    let adapter = get_adapter().await?;
    let peripheral = scan_for_service(&adapter, service, poll)
        .await?
        .ok_or(DiscoveryError::NotFound(service))?;

    connect(&peripheral, poll).await?;
    let connection = BleConnection { peripheral: peripheral.clone(), poll };

    let opened = async {
        let request = resolve_characteristic(&peripheral, service, request_uuid, poll).await?;
        let response = resolve_characteristic(&peripheral, service, response_uuid, poll).await?;

        let notifications = peripheral
            .notifications()
            .await?
            .filter_map(move |n| futures::future::ready((n.uuid == response_uuid).then_some(n.value)));
        peripheral.subscribe(&response).await?;
        tracing::info!(%service, "subscribed to camera responses");

        let writer = CharacteristicWriter { peripheral: peripheral.clone(), characteristic: request };
        Ok::<_, DiscoveryError>(BleTransport::new(writer, notifications))
    };

    match opened.await {
        Ok(transport) => Ok(BleLink { transport, connection }),
        Err(e) => {
            connection.disconnect().await;
            Err(e)
        }
    }
}
