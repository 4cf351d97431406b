//! A camera that answers over a simulated GATT link

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures::channel::mpsc;
use mirage_node::mirage_keys::{CryptoProvider, KeyPair, P256Provider, SharedKey};
use mirage_node::mirage_proto::api::{KeyExchangeResponse, ListMediaResponse};
use mirage_node::mirage_proto::{
    CameraApiRequest, CameraApiResponse, MediaItem, RequestType, StatusCode, frame,
};
use mirage_node::{BleTransport, GattWriter, Session, TransportError};

pub struct Camera {
    crypto: P256Provider,
    identity: KeyPair,
    initiate_status: StatusCode,
    finalize_status: StatusCode,
    state: Mutex<CameraState>,
}

#[derive(Default)]
struct CameraState {
    client: Option<(Vec<u8>, Vec<u8>)>,
    shared: Option<SharedKey>,
    payloads: Vec<Vec<u8>>,
    handled: Vec<RequestType>,
}

impl Camera {
    pub fn new() -> Self {
        Self::with_statuses(StatusCode::Ok, StatusCode::Ok)
    }

    pub fn with_statuses(initiate_status: StatusCode, finalize_status: StatusCode) -> Self {
        let crypto = P256Provider::new();
        let identity = crypto.generate_key_pair().unwrap();
        Self {
            crypto,
            identity,
            initiate_status,
            finalize_status,
            state: Mutex::new(CameraState::default()),
        }
    }

    /// Unframed payloads as they arrived, in order
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().payloads.clone()
    }

    pub fn handled(&self) -> Vec<RequestType> {
        self.state.lock().unwrap().handled.clone()
    }

    pub fn shared_key(&self) -> Option<SharedKey> {
        self.state.lock().unwrap().shared.clone()
    }

    pub fn public_key(&self) -> &[u8] {
        &self.identity.public
    }

    pub fn media() -> Vec<MediaItem> {
        vec![
            MediaItem {
                filename: "VID_20240101_120000.mp4".into(),
                size: 52_428_800,
                duration_ms: 30_000,
                width: 5760,
                height: 2880,
            },
            MediaItem {
                filename: "IMG_20240101_120100.jpg".into(),
                size: 4_194_304,
                duration_ms: 0,
                width: 7680,
                height: 3840,
            },
        ]
    }

    fn handle(&self, payload: &[u8]) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        state.payloads.push(payload.to_vec());

        // Once paired the camera only speaks encrypted
        let shared = state.shared.clone();
        let plain = match &shared {
            Some(key) => self.crypto.decrypt(key, payload).expect("paired request must be encrypted"),
            None => payload.to_vec(),
        };
        let request = CameraApiRequest::from_bytes(&plain).expect("request decodes");
        state.handled.push(request.kind());

        let mut response = match request.kind() {
            RequestType::KeyExchangeInitiate => {
                let offer = request.key_exchange_request.clone().unwrap();
                state.client = Some((offer.public_key, offer.salt));
                let mut response = CameraApiResponse::with_status(self.initiate_status);
                response.key_exchange_response = Some(KeyExchangeResponse {
                    public_key: self.identity.public.clone(),
                    salt: self.identity.salt.clone(),
                });
                response
            }
            RequestType::KeyExchangeFinalize => {
                if self.finalize_status == StatusCode::Ok {
                    let (public, salt) = state.client.clone().unwrap();
                    let key = self
                        .crypto
                        .derive_shared_key(&self.identity.private, &public, &self.identity.salt, &salt)
                        .unwrap();
                    state.shared = Some(key);
                }
                CameraApiResponse::with_status(self.finalize_status)
            }
            RequestType::Status => CameraApiResponse {
                camera_status: Some(b"ready".to_vec()),
                ..CameraApiResponse::with_status(StatusCode::Ok)
            },
            RequestType::ListMedia => {
                let list = request.list_media_request.clone().unwrap();
                let media = Self::media()
                    .into_iter()
                    .skip(list.start_index as usize)
                    .take(list.media_count as usize)
                    .collect();
                CameraApiResponse {
                    list_media_response: Some(ListMediaResponse { media }),
                    ..CameraApiResponse::with_status(StatusCode::Ok)
                }
            }
            _ => CameraApiResponse::with_status(StatusCode::Ok),
        };
        response.request_id = request.request_id().unwrap_or_default();

        let bytes = response.to_bytes();
        match &shared {
            Some(key) => self.crypto.encrypt(key, &bytes).unwrap(),
            None => bytes,
        }
    }
}

/// GATT writer whose writes land on the simulated camera
pub struct CameraLink {
    camera: Arc<Camera>,
    notify: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait::async_trait]
impl GattWriter for CameraLink {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let payload = frame::decode(data).map_err(|e| TransportError::Write(e.to_string()))?;
        let reply = self.camera.handle(&payload);
        self.notify
            .unbounded_send(frame::encode(&reply))
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

pub type BleSession = Session<BleTransport<CameraLink>>;

pub fn ble_session(camera: Arc<Camera>) -> BleSession {
    let (notify, notifications) = mpsc::unbounded();
    let transport = BleTransport::new(CameraLink { camera, notify }, notifications);
    Session::new(transport, Arc::new(P256Provider::new()))
}

/// GATT writer for a camera that never answers on its own; the test
/// pushes notifications by hand.
pub struct QuietLink;

#[async_trait::async_trait]
impl GattWriter for QuietLink {
    async fn write(&self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

pub fn quiet_ble_session() -> (Session<BleTransport<QuietLink>>, mpsc::UnboundedSender<Vec<u8>>) {
    let (notify, notifications) = mpsc::unbounded();
    let transport = BleTransport::new(QuietLink, notifications);
    (Session::new(transport, Arc::new(P256Provider::new())), notify)
}
