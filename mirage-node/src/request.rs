//! Request identity: ids and expiration

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mirage_proto::{CameraApiRequest, RequestHeader, RequestType};

/// Ids at or below this value may be assigned by the camera itself
pub const RESERVED_REQUEST_IDS: i64 = 2000;

/// How long the camera should honour a request after it was built
pub const EXPIRATION_HORIZON: Duration = Duration::from_secs(40);

/// Source of strictly increasing request ids
#[derive(Debug)]
pub struct RequestIds {
    last: AtomicI64,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIds {
    pub fn new() -> Self {
        Self::starting_after(RESERVED_REQUEST_IDS)
    }

    pub fn starting_after(last: i64) -> Self {
        Self { last: AtomicI64::new(last) }
    }

    pub fn next_id(&self) -> i64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// An empty request of `kind` with a fresh header
    pub fn new_request(&self, kind: RequestType) -> CameraApiRequest {
        let mut request = CameraApiRequest::new(kind);
        request.header = Some(RequestHeader {
            request_id: self.next_id(),
            expiration_timestamp: now_millis() + EXPIRATION_HORIZON.as_millis() as i64,
        });
        request
    }
}

/// Wall-clock milliseconds since the epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Name used in logs and errors
pub fn request_name(kind: RequestType) -> &'static str {
    match kind {
        RequestType::Unknown => "unknown",
        RequestType::KeyExchangeInitiate => "key_exchange_initiate",
        RequestType::KeyExchangeFinalize => "key_exchange_finalize",
        RequestType::Status => "status",
        RequestType::GetCapabilities => "get_capabilities",
        RequestType::Configure => "configure",
        RequestType::StartCapture => "start_capture",
        RequestType::StopCapture => "stop_capture",
        RequestType::FactoryReset => "factory_reset",
        RequestType::ListMedia => "list_media",
        RequestType::StartViewfinder => "start_viewfinder",
        RequestType::StopViewfinder => "stop_viewfinder",
        RequestType::GetDebugLogs => "get_debug_logs",
    }
}
