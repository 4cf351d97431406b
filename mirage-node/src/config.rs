//! Client configuration stored as `config.json` in the mirage home directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Error;

/// Tunables for talking to a camera
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local identity name (`<identity>.key`, `.pub`, `.salt`)
    pub identity: String,
    /// Camera identity name (`<camera>.pub`, `.salt`)
    pub camera: String,
    pub request_timeout_ms: u64,
    /// Time the user gets to press the shutter key during pairing
    pub confirmation_delay_ms: u64,
    pub scan_interval_ms: u64,
    pub scan_attempts: u32,
    pub https_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: "me".to_string(),
            camera: "cam".to_string(),
            request_timeout_ms: 10_000,
            confirmation_delay_ms: 5_000,
            scan_interval_ms: 1_000,
            scan_attempts: 30,
            https_port: mirage_proto::ble::https::DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Load `config.json` from `home`, writing the defaults on first run.
    pub fn load_or_create(home: &Path) -> Result<Self, Error> {
        let path = home.join("config.json");
        let fail = |reason: String| Error::Config {
            path: path.display().to_string(),
            reason,
        };

        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| fail(e.to_string()))?;
            return serde_json::from_str(&data).map_err(|e| fail(e.to_string()));
        }

        let config = Self::default();
        std::fs::create_dir_all(home).map_err(|e| fail(e.to_string()))?;
        let data = serde_json::to_string_pretty(&config).map_err(|e| fail(e.to_string()))?;
        std::fs::write(&path, data).map_err(|e| fail(e.to_string()))?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(config)
    }
}

/// `$MIRAGE_HOME`, or `~/.mirage`
pub fn mirage_home() -> PathBuf {
    if let Ok(home) = std::env::var("MIRAGE_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".mirage")
}
