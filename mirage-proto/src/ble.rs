//! BLE GATT and HTTPS endpoint constants for Mirage cameras
//!
//! The camera advertises the pairing service while it is in pairing mode and
//! the control service otherwise. Both expose the same request/response
//! characteristic pair.

/// Control service UUID, advertised by a paired camera
pub const SERVICE_UUID: &str = "49eabc2a-73b0-411e-a26d-75415dd7708e";

/// Service UUID advertised only while the camera is in pairing mode
pub const PAIRING_SERVICE_UUID: &str = "18723f72-8c4e-4dd7-8f3e-b93b9c29481f";

/// API request characteristic (write)
pub const REQUEST_UUID: &str = "48f03338-852e-4dd5-aa44-cd1b32fcaeb9";

/// API response characteristic (notify)
pub const RESPONSE_UUID: &str = "9f14e1da-4add-4ec7-aa34-6106669e2c12";

/// API status characteristic (notify). Not used by the request/response flow.
pub const STATUS_UUID: &str = "a03fedd3-0923-4398-854e-e2806d159a7f";

/// HTTPS control endpoint
pub mod https {
    /// Path every API request is POSTed to
    pub const CONTROL_PATH: &str = "/daydreamcamera";

    /// Prefix of media retrieval/deletion paths
    pub const MEDIA_PATH_PREFIX: &str = "/media/";

    /// Scheme name used in the `Authorization` header
    pub const AUTH_SCHEME: &str = "daydreamcamera";

    /// Default HTTPS control port
    pub const DEFAULT_PORT: u16 = 8443;

    pub const CONTENT_TYPE: &str = "application/octet-stream";
}
