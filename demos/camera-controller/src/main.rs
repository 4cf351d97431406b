//! Camera Controller - CLI to pair with and control Mirage cameras
//!
//! Pairing and first-time setup go over BLE; once paired, everything else
//! can go over HTTPS on the camera's Wi-Fi address.
//!
//! Usage:
//!   MIRAGE_HOME=/tmp/mirage cargo run -p camera-controller -- <command>
//!
//! Commands:
//!   scan [--duration SECS]           - List nearby BLE devices
//!   pair                             - Pair with a camera in pairing mode
//!   ble status [--save]              - Camera status over BLE
//!   ble config-wifi --ssid S --password P
//!   ble config-time [--timezone TZ]
//!   ble factory-reset
//!   https --host HOST status [--save] - Camera status over HTTPS
//!   https --host HOST config-capture --mode live --rtmp-endpoint URL
//!   https --host HOST start-capture [--auto-stop MS]
//!   https --host HOST list-media [--start N] [--count N]
//!   https --host HOST fetch-media PATH --out FILE

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use mirage_ble_controller::{PollConfig, Purpose, open_ble_transport};
use mirage_node::catalog::{
    CaptureConfig, DEFAULT_TIMEZONE, ListMedia, StartCapture, TimeConfig, WifiConfig,
};
use mirage_node::mirage_keys::{CryptoProvider, FileKeyStore, P256Provider, SharedKey, load_shared_key};
use mirage_node::mirage_proto::{CaptureType, ProjectionType};
use mirage_node::{
    ClientConfig, Command, CommandOutput, HttpsTransport, PairingHandshake, PairingState, Session,
    mirage_home,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "camera-controller")]
#[command(about = "Pair with and control Mirage cameras via BLE and HTTPS")]
struct Cli {
    /// Directory holding config.json and key files (default: $MIRAGE_HOME or ~/.mirage)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    /// Local identity name
    #[arg(long, global = true)]
    key: Option<String>,
    /// Camera identity name
    #[arg(long, global = true)]
    camkey: Option<String>,
    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Pair with a camera advertising its pairing service
    Pair,
    /// Commands sent over BLE to a paired camera
    Ble {
        #[command(subcommand)]
        action: BleCommands,
    },
    /// Commands sent over HTTPS to a paired camera
    Https {
        /// Camera host name or address
        #[arg(long)]
        host: String,
        /// Camera HTTPS port (default from config)
        #[arg(long)]
        port: Option<u16>,
        #[command(subcommand)]
        action: HttpsCommands,
    },
}

#[derive(Subcommand)]
enum BleCommands {
    /// Get camera status
    Status {
        /// Also write the raw status reply to $MIRAGE_HOME/camera-status
        #[arg(long)]
        save: bool,
    },
    /// Get camera capabilities
    GetCapabilities,
    /// Set the camera clock to now
    ConfigTime {
        #[arg(long, default_value = DEFAULT_TIMEZONE)]
        timezone: String,
    },
    /// Send Wi-Fi credentials
    ConfigWifi {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
    },
    /// Clear all camera settings
    FactoryReset,
}

#[derive(Subcommand)]
enum HttpsCommands {
    /// Get camera status
    Status {
        /// Also write the raw status reply to $MIRAGE_HOME/camera-status
        #[arg(long)]
        save: bool,
    },
    /// Get camera capabilities
    GetCapabilities,
    /// Set the capture mode and live stream target
    ConfigCapture {
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long)]
        rtmp_endpoint: Option<String>,
        #[arg(long)]
        stream_name_key: Option<String>,
        #[arg(long, value_enum)]
        projection: Option<Projection>,
    },
    /// Start capturing
    StartCapture {
        /// Stop automatically after this many milliseconds
        #[arg(long)]
        auto_stop: Option<u64>,
    },
    /// Stop capturing
    StopCapture,
    /// List media on the camera
    ListMedia {
        #[arg(long, default_value = "0")]
        start: u32,
        #[arg(long, default_value = "10")]
        count: u32,
    },
    /// Download the camera's debug logs
    GetDebugLogs,
    /// Stop the viewfinder stream
    StopViewfinder,
    /// Download a media file
    FetchMedia {
        /// Media path as reported by list-media
        path: String,
        /// Output file (default: the media file name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a media file
    DeleteMedia {
        path: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Video,
    Photo,
    Live,
}

impl From<Mode> for CaptureType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Video => CaptureType::Video,
            Mode::Photo => CaptureType::Photo,
            Mode::Live => CaptureType::Live,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Projection {
    Equirect,
    Fisheye,
}

impl From<Projection> for ProjectionType {
    fn from(projection: Projection) -> Self {
        match projection {
            Projection::Equirect => ProjectionType::Equirect,
            Projection::Fisheye => ProjectionType::Fisheye,
        }
    }
}

/// Settings shared by every command, after CLI overrides
struct Context {
    home: PathBuf,
    config: ClientConfig,
    store: Arc<FileKeyStore>,
    crypto: Arc<dyn CryptoProvider>,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let home = cli.home.clone().unwrap_or_else(mirage_home);
        let mut config = ClientConfig::load_or_create(&home)?;
        if let Some(key) = &cli.key {
            config.identity = key.clone();
        }
        if let Some(camkey) = &cli.camkey {
            config.camera = camkey.clone();
        }
        if let Some(timeout) = cli.timeout {
            config.request_timeout_ms = timeout;
        }
        tracing::debug!(home = %home.display(), identity = %config.identity, camera = %config.camera, "loaded config");

        Ok(Self {
            store: Arc::new(FileKeyStore::new(&home)),
            crypto: Arc::new(P256Provider::new()),
            home,
            config,
        })
    }

    fn poll(&self) -> PollConfig {
        PollConfig::new(self.config.scan_interval(), self.config.scan_attempts)
    }

    fn shared_key(&self) -> Result<SharedKey, Box<dyn std::error::Error>> {
        let key = load_shared_key(&*self.store, &self.config.identity, &self.config.camera)?;
        key.ok_or_else(|| {
            format!(
                "no shared key for {}/{} in {}; run `camera-controller pair` first",
                self.config.identity,
                self.config.camera,
                self.home.display()
            )
            .into()
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(&cli)?;

    match cli.command {
        Commands::Scan { duration } => cmd_scan(duration).await?,
        Commands::Pair => cmd_pair(&ctx).await?,
        Commands::Ble { action } => run_ble(&ctx, action).await?,
        Commands::Https { host, port, action } => run_https(&ctx, host, port, action).await?,
    }

    Ok(())
}

// ============================================================================
// BLE Commands
// ============================================================================

async fn cmd_scan(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for BLE devices ({} seconds)...", duration);
    let devices = mirage_ble_controller::scan(Duration::from_secs(duration)).await?;

    let cameras: Vec<_> = devices.iter().filter(|d| d.is_camera).collect();
    let others: Vec<_> = devices.iter().filter(|d| !d.is_camera).collect();

    if !cameras.is_empty() {
        println!("\nMirage cameras:");
        for device in &cameras {
            let rssi = device.rssi.map(|r| format!(" ({}dBm)", r)).unwrap_or_default();
            let mode = if device.pairing { " [pairing]" } else { "" };
            println!("  {} - {}{}{}", device.name, device.address, rssi, mode);
        }
    }

    if !others.is_empty() {
        println!("\nOther devices:");
        for device in &others {
            let rssi = device.rssi.map(|r| format!(" ({}dBm)", r)).unwrap_or_default();
            println!("  {} - {}{}", device.name, device.address, rssi);
        }
    }

    if cameras.is_empty() {
        println!("\nNo Mirage cameras found.");
        println!("Make sure the camera is powered on.");
    }

    Ok(())
}

async fn cmd_pair(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    println!("Looking for a camera in pairing mode...");
    let link = open_ble_transport(Purpose::Pairing, ctx.poll()).await?;
    let mut session =
        Session::new(link.transport, Arc::clone(&ctx.crypto)).with_timeout(ctx.config.request_timeout());

    let mut handshake = PairingHandshake::new(
        ctx.store.clone(),
        ctx.config.identity.clone(),
        ctx.config.camera.clone(),
    )
    .with_confirmation_delay(ctx.config.confirmation_delay())
    .on_transition(|state| {
        if state == PairingState::AwaitingUserConfirmation {
            println!("Press the shutter key on the camera to confirm pairing.");
        }
    });

    let result = handshake.run(&mut session).await;
    link.connection.disconnect().await;
    result?;

    println!("Paired successfully!");
    println!("Shared key stored in {}", ctx.home.display());
    Ok(())
}

async fn run_ble(ctx: &Context, cmd: BleCommands) -> Result<(), Box<dyn std::error::Error>> {
    let key = ctx.shared_key()?;
    let save = matches!(cmd, BleCommands::Status { save: true });
    let command = match cmd {
        BleCommands::Status { .. } => Command::Status,
        BleCommands::GetCapabilities => Command::GetCapabilities,
        BleCommands::ConfigTime { timezone } => Command::ConfigTime(TimeConfig {
            timestamp_ms: None,
            timezone,
        }),
        BleCommands::ConfigWifi { ssid, password } => {
            println!("Sending Wi-Fi credentials for \"{}\"...", ssid);
            Command::ConfigWifi(WifiConfig { ssid, password })
        }
        BleCommands::FactoryReset => Command::FactoryReset,
    };

    let link = open_ble_transport(Purpose::Control, ctx.poll()).await?;
    let session = Session::new(link.transport, Arc::clone(&ctx.crypto))
        .with_shared_key(key)
        .with_timeout(ctx.config.request_timeout());

    let result = session.execute(&command).await;
    link.connection.disconnect().await;
    report(ctx, result?, save)
}

// ============================================================================
// HTTPS Commands
// ============================================================================

async fn run_https(
    ctx: &Context,
    host: String,
    port: Option<u16>,
    cmd: HttpsCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = ctx.shared_key()?;
    let transport = HttpsTransport::new(host, port.unwrap_or(ctx.config.https_port))?;
    let session = Session::new(transport, Arc::clone(&ctx.crypto))
        .with_shared_key(key)
        .with_timeout(ctx.config.request_timeout());

    let save = matches!(cmd, HttpsCommands::Status { save: true });
    let command = match cmd {
        HttpsCommands::Status { .. } => Command::Status,
        HttpsCommands::GetCapabilities => Command::GetCapabilities,
        HttpsCommands::ConfigCapture { mode, rtmp_endpoint, stream_name_key, projection } => {
            Command::ConfigCapture(CaptureConfig {
                mode: mode.map(Into::into),
                rtmp_endpoint,
                stream_name_key,
                projection: projection.map(Into::into),
            })
        }
        HttpsCommands::StartCapture { auto_stop } => Command::StartCapture(StartCapture {
            auto_stop: auto_stop.map(Duration::from_millis),
        }),
        HttpsCommands::StopCapture => Command::StopCapture,
        HttpsCommands::ListMedia { start, count } => Command::ListMedia(ListMedia { start, count }),
        HttpsCommands::GetDebugLogs => Command::GetDebugLogs,
        HttpsCommands::StopViewfinder => Command::StopViewfinder,
        HttpsCommands::FetchMedia { path, out } => {
            let data = session.fetch_media(&path).await?;
            let out = out.unwrap_or_else(|| {
                PathBuf::from(path.rsplit('/').next().unwrap_or("media.bin"))
            });
            std::fs::write(&out, &data)?;
            println!("Saved {} bytes to {}", data.len(), out.display());
            return Ok(());
        }
        HttpsCommands::DeleteMedia { path } => {
            session.delete_media(&path).await?;
            println!("Deleted {}.", path);
            return Ok(());
        }
    };

    report(ctx, session.execute(&command).await?, save)
}

/// Raw status reply, kept for tools that decode it later
const STATUS_FILE: &str = "camera-status";

fn report(ctx: &Context, output: CommandOutput, save: bool) -> Result<(), Box<dyn std::error::Error>> {
    if save {
        if let Some(path) = save_status(&ctx.home, &output)? {
            println!("Saved status to {}", path.display());
        }
    }
    print_output(output);
    Ok(())
}

/// Write a status reply under `home`; other outputs are left alone.
fn save_status(home: &Path, output: &CommandOutput) -> std::io::Result<Option<PathBuf>> {
    let CommandOutput::Status(bytes) = output else {
        return Ok(None);
    };
    std::fs::create_dir_all(home)?;
    let path = home.join(STATUS_FILE);
    std::fs::write(&path, bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved status");
    Ok(Some(path))
}

fn print_output(output: CommandOutput) {
    match output {
        CommandOutput::Done => println!("OK"),
        CommandOutput::Status(bytes) => println!("status: {}", data_encoding::HEXLOWER.encode(&bytes)),
        CommandOutput::Capabilities(bytes) => {
            println!("capabilities: {}", data_encoding::HEXLOWER.encode(&bytes))
        }
        CommandOutput::Media(items) => {
            if items.is_empty() {
                println!("No media.");
                return;
            }
            println!("filename\tsize\tduration_ms\twidth\theight");
            for item in items {
                println!("{}", item);
            }
        }
        CommandOutput::Viewfinder(answer) => {
            println!("answer: {}", data_encoding::HEXLOWER.encode(&answer))
        }
        CommandOutput::DebugLogs(logs) => print!("{}", String::from_utf8_lossy(&logs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camera-controller-{name}-{}", std::process::id()))
    }

    #[test]
    fn status_reply_is_saved_raw() {
        let home = scratch("status");
        let saved = save_status(&home, &CommandOutput::Status(vec![0, 1, 0xff])).unwrap();

        assert_eq!(saved, Some(home.join(STATUS_FILE)));
        assert_eq!(std::fs::read(home.join(STATUS_FILE)).unwrap(), vec![0, 1, 0xff]);
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn other_outputs_are_not_saved() {
        let home = scratch("done");
        assert_eq!(save_status(&home, &CommandOutput::Done).unwrap(), None);
        assert!(!home.exists());
    }

    #[test]
    fn save_flag_parses() {
        let cli = Cli::try_parse_from(["camera-controller", "https", "--host", "cam", "status", "--save"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Https { action: HttpsCommands::Status { save: true }, .. }
        ));
    }
}
