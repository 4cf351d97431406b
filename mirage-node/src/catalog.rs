//! Camera commands
//!
//! Each [`Command`] variant carries its own parameters. [`build`] turns a
//! command into a request (validating parameters first, so a bad command never
//! reaches the wire) and [`Command::interpret`] unwraps the matching reply.

use std::time::Duration;

use mirage_proto::api::{
    CaptureMode, ConfigurationRequest, KeyExchangeRequest, ListMediaRequest, LiveModeConfiguration,
    LocalWifiInfo, StartCaptureRequest, StartViewfinderRequest, TimeConfiguration,
};
use mirage_proto::{
    CameraApiRequest, CameraApiResponse, CaptureType, MediaItem, ProjectionType, RequestType,
    StatusCode,
};

use crate::request::now_millis;
use crate::{Error, RequestIds, ValidationError};

pub const DEFAULT_TIMEZONE: &str = "Europe/London";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeConfig {
    /// UTC milliseconds; the current time when `None`
    pub timestamp_ms: Option<i64>,
    pub timezone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timestamp_ms: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    pub mode: Option<CaptureType>,
    pub rtmp_endpoint: Option<String>,
    pub stream_name_key: Option<String>,
    /// Passed through as given; current firmware ignores it
    pub projection: Option<ProjectionType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartCapture {
    pub auto_stop: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMedia {
    pub start: u32,
    pub count: u32,
}

impl Default for ListMedia {
    fn default() -> Self {
        Self { start: 0, count: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewfinder {
    /// WebRTC offer, passed through unchanged
    pub offer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    GetCapabilities,
    ConfigWifi(WifiConfig),
    ConfigTime(TimeConfig),
    ConfigCapture(CaptureConfig),
    StartCapture(StartCapture),
    StopCapture,
    FactoryReset,
    ListMedia(ListMedia),
    StartViewfinder(Viewfinder),
    StopViewfinder,
    GetDebugLogs,
}

/// What a successful command produced
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Done,
    /// Serialized camera status, opaque to this crate
    Status(Vec<u8>),
    Capabilities(Vec<u8>),
    Media(Vec<MediaItem>),
    /// WebRTC answer
    Viewfinder(Vec<u8>),
    DebugLogs(Vec<u8>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::GetCapabilities => "get_capabilities",
            Self::ConfigWifi(_) => "config_wifi",
            Self::ConfigTime(_) => "config_time",
            Self::ConfigCapture(_) => "config_capture",
            Self::StartCapture(_) => "start_capture",
            Self::StopCapture => "stop_capture",
            Self::FactoryReset => "factory_reset",
            Self::ListMedia(_) => "list_media",
            Self::StartViewfinder(_) => "start_viewfinder",
            Self::StopViewfinder => "stop_viewfinder",
            Self::GetDebugLogs => "get_debug_logs",
        }
    }

    /// Unwrap the camera's reply to this command.
    pub fn interpret(&self, response: CameraApiResponse) -> Result<CommandOutput, Error> {
        let command = self.name();
        match response.status() {
            Some(StatusCode::Ok) => {}
            Some(status) => {
                return Err(Error::Status {
                    command,
                    status,
                    message: response.error_message().unwrap_or("no details").to_string(),
                });
            }
            None => {
                return Err(Error::Protocol {
                    command,
                    reason: "reply has no status code".to_string(),
                });
            }
        }

        Ok(match self {
            Self::Status => CommandOutput::Status(response.camera_status.unwrap_or_default()),
            Self::GetCapabilities => {
                CommandOutput::Capabilities(response.camera_capabilities.unwrap_or_default())
            }
            Self::ListMedia(_) => CommandOutput::Media(
                response.list_media_response.map(|l| l.media).unwrap_or_default(),
            ),
            Self::StartViewfinder(_) => CommandOutput::Viewfinder(
                response.start_viewfinder_response.map(|v| v.answer).unwrap_or_default(),
            ),
            Self::GetDebugLogs => CommandOutput::DebugLogs(
                response.debug_logs_response.map(|d| d.logs).unwrap_or_default(),
            ),
            Self::ConfigWifi(_)
            | Self::ConfigTime(_)
            | Self::ConfigCapture(_)
            | Self::StartCapture(_)
            | Self::StopCapture
            | Self::FactoryReset
            | Self::StopViewfinder => CommandOutput::Done,
        })
    }
}

fn require(command: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing { command, field });
    }
    Ok(())
}

fn to_i32(command: &'static str, field: &'static str, value: u32) -> Result<i32, ValidationError> {
    i32::try_from(value).map_err(|_| ValidationError::OutOfRange { command, field })
}

fn configure(ids: &RequestIds, configuration: ConfigurationRequest) -> CameraApiRequest {
    let mut request = ids.new_request(RequestType::Configure);
    request.configuration_request = Some(configuration);
    request
}

/// Build the request for `command`, allocating a fresh request id.
pub fn build(ids: &RequestIds, command: &Command) -> Result<CameraApiRequest, ValidationError> {
    let name = command.name();

    let request = match command {
        Command::Status => ids.new_request(RequestType::Status),
        Command::GetCapabilities => ids.new_request(RequestType::GetCapabilities),
        Command::StopCapture => ids.new_request(RequestType::StopCapture),
        Command::FactoryReset => ids.new_request(RequestType::FactoryReset),
        Command::StopViewfinder => ids.new_request(RequestType::StopViewfinder),
        Command::GetDebugLogs => ids.new_request(RequestType::GetDebugLogs),

        Command::ConfigWifi(wifi) => {
            require(name, "ssid", &wifi.ssid)?;
            require(name, "password", &wifi.password)?;
            configure(ids, ConfigurationRequest {
                local_wifi_info: Some(LocalWifiInfo {
                    ssid: wifi.ssid.clone(),
                    password: wifi.password.clone(),
                }),
                ..Default::default()
            })
        }

        Command::ConfigTime(time) => {
            require(name, "timezone", &time.timezone)?;
            configure(ids, ConfigurationRequest {
                time_configuration: Some(TimeConfiguration {
                    timestamp: time.timestamp_ms.unwrap_or_else(now_millis),
                    timezone: time.timezone.clone(),
                }),
                ..Default::default()
            })
        }

        Command::ConfigCapture(capture) => {
            if capture.mode.is_none()
                && capture.rtmp_endpoint.is_none()
                && capture.stream_name_key.is_none()
                && capture.projection.is_none()
            {
                return Err(ValidationError::Empty { command: name });
            }
            let live = (capture.rtmp_endpoint.is_some() || capture.stream_name_key.is_some()).then(
                || LiveModeConfiguration {
                    rtmp_endpoint: capture.rtmp_endpoint.clone().unwrap_or_default(),
                    stream_name_key: capture.stream_name_key.clone().unwrap_or_default(),
                },
            );
            configure(ids, ConfigurationRequest {
                capture_mode: Some(CaptureMode {
                    active_capture_type: capture.mode.unwrap_or(CaptureType::Unknown) as i32,
                    configured_live_mode: live,
                    projection_type: capture.projection.unwrap_or(ProjectionType::Unknown) as i32,
                }),
                ..Default::default()
            })
        }

        Command::StartCapture(start) => {
            let auto_stop_duration_ms = match start.auto_stop {
                Some(after) => i64::try_from(after.as_millis())
                    .map_err(|_| ValidationError::OutOfRange { command: name, field: "auto_stop" })?,
                None => 0,
            };
            let mut request = ids.new_request(RequestType::StartCapture);
            request.start_capture_request = Some(StartCaptureRequest { auto_stop_duration_ms });
            request
        }

        Command::ListMedia(list) => {
            if list.count == 0 {
                return Err(ValidationError::OutOfRange { command: name, field: "count" });
            }
            let list_media_request = ListMediaRequest {
                start_index: to_i32(name, "start", list.start)?,
                media_count: to_i32(name, "count", list.count)?,
            };
            let mut request = ids.new_request(RequestType::ListMedia);
            request.list_media_request = Some(list_media_request);
            request
        }

        Command::StartViewfinder(viewfinder) => {
            if viewfinder.offer.is_empty() {
                return Err(ValidationError::Missing { command: name, field: "offer" });
            }
            let mut request = ids.new_request(RequestType::StartViewfinder);
            request.start_viewfinder_request = Some(StartViewfinderRequest {
                offer: viewfinder.offer.clone(),
            });
            request
        }
    };

    Ok(request)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    Initiate,
    Finalize,
}

/// Pairing request carrying our public key and salt. These go out without a
/// header.
pub fn key_exchange(step: KeyExchange, public_key: &[u8], salt: &[u8]) -> CameraApiRequest {
    let kind = match step {
        KeyExchange::Initiate => RequestType::KeyExchangeInitiate,
        KeyExchange::Finalize => RequestType::KeyExchangeFinalize,
    };
    let mut request = CameraApiRequest::new(kind);
    request.key_exchange_request = Some(KeyExchangeRequest {
        public_key: public_key.to_vec(),
        salt: salt.to_vec(),
    });
    request
}
