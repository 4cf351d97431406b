//! Mirage camera wire protocol - API messages, BLE framing and endpoint constants

pub mod api;
pub mod ble;
pub mod frame;

pub use api::{
    CameraApiRequest, CameraApiResponse, CaptureType, MediaItem, ProjectionType, RequestHeader,
    RequestType, StatusCode,
};
pub use frame::{FrameAssembler, FramingError};
