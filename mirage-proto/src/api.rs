//! Camera API messages
//!
//! Requests and responses are protobuf messages. The same bytes travel over
//! both transports: framed (and, once paired, encrypted) on BLE, signed on
//! HTTPS. Nested messages the client does not interpret (status,
//! capabilities, viewfinder negotiation, debug logs) are declared as `bytes`
//! so they pass through unchanged.

use prost::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RequestType {
    Unknown = 0,
    KeyExchangeInitiate = 1,
    KeyExchangeFinalize = 2,
    Status = 3,
    GetCapabilities = 4,
    Configure = 5,
    StartCapture = 6,
    StopCapture = 7,
    FactoryReset = 8,
    ListMedia = 9,
    StartViewfinder = 10,
    StopViewfinder = 11,
    GetDebugLogs = 12,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CaptureType {
    Unknown = 0,
    Video = 1,
    Photo = 2,
    Live = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProjectionType {
    Unknown = 0,
    Equirect = 1,
    Fisheye = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Unknown = 0,
    Ok = 1,
    Error = 2,
    InvalidRequest = 3,
    RequestExpired = 4,
    Unauthorized = 5,
    Busy = 6,
}

#[derive(Clone, PartialEq, Message)]
pub struct RequestHeader {
    #[prost(int64, tag = "1")]
    pub request_id: i64,
    /// Wall-clock milliseconds after which the camera drops the request
    #[prost(int64, tag = "2")]
    pub expiration_timestamp: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct KeyExchangeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LocalWifiInfo {
    #[prost(string, tag = "1")]
    pub ssid: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimeConfiguration {
    /// UTC milliseconds
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub timezone: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct LiveModeConfiguration {
    #[prost(string, tag = "1")]
    pub rtmp_endpoint: String,
    #[prost(string, tag = "2")]
    pub stream_name_key: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CaptureMode {
    #[prost(enumeration = "CaptureType", tag = "1")]
    pub active_capture_type: i32,
    #[prost(message, optional, tag = "2")]
    pub configured_live_mode: Option<LiveModeConfiguration>,
    /// Current firmware accepts but ignores this field
    #[prost(enumeration = "ProjectionType", tag = "3")]
    pub projection_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConfigurationRequest {
    #[prost(message, optional, tag = "1")]
    pub local_wifi_info: Option<LocalWifiInfo>,
    #[prost(message, optional, tag = "2")]
    pub time_configuration: Option<TimeConfiguration>,
    #[prost(message, optional, tag = "3")]
    pub capture_mode: Option<CaptureMode>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartCaptureRequest {
    #[prost(int64, tag = "1")]
    pub auto_stop_duration_ms: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListMediaRequest {
    #[prost(int32, tag = "1")]
    pub start_index: i32,
    #[prost(int32, tag = "2")]
    pub media_count: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartViewfinderRequest {
    /// WebRTC offer, opaque to this crate
    #[prost(bytes = "vec", tag = "1")]
    pub offer: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CameraApiRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<RequestHeader>,
    #[prost(enumeration = "RequestType", tag = "2")]
    pub request_type: i32,
    #[prost(message, optional, tag = "3")]
    pub key_exchange_request: Option<KeyExchangeRequest>,
    #[prost(message, optional, tag = "4")]
    pub configuration_request: Option<ConfigurationRequest>,
    #[prost(message, optional, tag = "5")]
    pub start_capture_request: Option<StartCaptureRequest>,
    #[prost(message, optional, tag = "6")]
    pub list_media_request: Option<ListMediaRequest>,
    #[prost(message, optional, tag = "7")]
    pub start_viewfinder_request: Option<StartViewfinderRequest>,
}

impl CameraApiRequest {
    pub fn new(kind: RequestType) -> Self {
        Self {
            request_type: kind as i32,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> RequestType {
        RequestType::try_from(self.request_type).unwrap_or(RequestType::Unknown)
    }

    pub fn request_id(&self) -> Option<i64> {
        self.header.as_ref().map(|h| h.request_id)
    }

    pub fn expiration_timestamp(&self) -> Option<i64> {
        self.header.as_ref().map(|h| h.expiration_timestamp)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(data)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ResponseStatus {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct KeyExchangeResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MediaItem {
    #[prost(string, tag = "1")]
    pub filename: String,
    /// Bytes
    #[prost(int64, tag = "2")]
    pub size: i64,
    #[prost(int64, tag = "3")]
    pub duration_ms: i64,
    #[prost(int32, tag = "4")]
    pub width: i32,
    #[prost(int32, tag = "5")]
    pub height: i32,
}

impl MediaItem {
    /// Report columns: filename, size, duration, width, height
    pub fn columns(&self) -> [String; 5] {
        [
            self.filename.clone(),
            self.size.to_string(),
            self.duration_ms.to_string(),
            self.width.to_string(),
            self.height.to_string(),
        ]
    }
}

impl std::fmt::Display for MediaItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.columns().join("\t"))
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ListMediaResponse {
    #[prost(message, repeated, tag = "1")]
    pub media: Vec<MediaItem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartViewfinderResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub answer: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DebugLogsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub logs: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CameraApiResponse {
    #[prost(message, optional, tag = "1")]
    pub response_status: Option<ResponseStatus>,
    #[prost(int64, tag = "2")]
    pub request_id: i64,
    #[prost(message, optional, tag = "3")]
    pub key_exchange_response: Option<KeyExchangeResponse>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub camera_status: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub camera_capabilities: Option<Vec<u8>>,
    #[prost(message, optional, tag = "6")]
    pub list_media_response: Option<ListMediaResponse>,
    #[prost(message, optional, tag = "7")]
    pub start_viewfinder_response: Option<StartViewfinderResponse>,
    #[prost(message, optional, tag = "8")]
    pub debug_logs_response: Option<DebugLogsResponse>,
}

impl CameraApiResponse {
    /// A bare response carrying only a status code
    pub fn with_status(code: StatusCode) -> Self {
        Self {
            response_status: Some(ResponseStatus {
                status_code: code as i32,
                error_message: String::new(),
            }),
            ..Default::default()
        }
    }

    /// `None` when the status is missing or unset on the wire
    pub fn status(&self) -> Option<StatusCode> {
        let status = self.response_status.as_ref()?;
        match StatusCode::try_from(status.status_code) {
            Ok(StatusCode::Unknown) => None,
            Ok(code) => Some(code),
            // Newer firmware may report codes this crate does not know
            Err(_) => Some(StatusCode::Error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(StatusCode::Ok)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.response_status
            .as_ref()
            .map(|s| s.error_message.as_str())
            .filter(|m| !m.is_empty())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(data)
    }
}
