//! Configuration surface (§6.4).
//!
//! Mirrors `data_plane_controller::job::JobArgs`: a `clap::Parser` struct
//! with `env` fallbacks for every field, durations parsed via `humantime`,
//! and `serde` support so the whole thing can be logged and round-tripped
//! through a config file.

use std::path::PathBuf;

use crate::error::SupervisorError;

#[derive(clap::Parser, Debug, Clone, serde::Serialize, serde::Deserialize)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Path to an optional TOML/JSON config file, applied before CLI/env
    /// overrides (CLI and env always win).
    #[clap(long = "config", env = "SUPERVISOR_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Serial device connected to the PLC.
    #[clap(long = "serial-port", env = "SUPERVISOR_SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Baud rate for the PLC UART link.
    #[clap(
        long = "serial-baud",
        env = "SUPERVISOR_SERIAL_BAUD",
        default_value = "115200"
    )]
    pub serial_baud: u32,

    /// Deadline the PLC grants the supervisor to answer a scan command.
    #[clap(
        long = "response-timeout",
        env = "SUPERVISOR_RESPONSE_TIMEOUT",
        default_value = "12s"
    )]
    #[serde(with = "humantime_serde")]
    #[arg(value_parser = humantime::parse_duration)]
    pub response_timeout: std::time::Duration,

    /// Delay after asserting busy before triggering the QR source.
    #[clap(
        long = "busy-settle",
        env = "SUPERVISOR_BUSY_SETTLE",
        default_value = "20ms"
    )]
    #[serde(with = "humantime_serde")]
    #[arg(value_parser = humantime::parse_duration)]
    pub busy_settle: std::time::Duration,

    /// Path to the durable duplicate-store sqlite file.
    #[clap(
        long = "duplicates-path",
        env = "SUPERVISOR_DUPLICATES_PATH",
        default_value = "duplicates.sqlite3"
    )]
    pub duplicates_path: PathBuf,

    /// Directory where per-batch scan CSV logs are written.
    #[clap(
        long = "batch-log-dir",
        env = "SUPERVISOR_BATCH_LOG_DIR",
        default_value = "logs/batches"
    )]
    pub batch_log_dir: PathBuf,

    /// Directory where per-batch setup CSV logs are written.
    #[clap(
        long = "setup-log-dir",
        env = "SUPERVISOR_SETUP_LOG_DIR",
        default_value = "logs/setup"
    )]
    pub setup_log_dir: PathBuf,

    /// Path to the advisory recovery snapshot file.
    #[clap(
        long = "recovery-file",
        env = "SUPERVISOR_RECOVERY_FILE",
        default_value = "recovery.json"
    )]
    pub recovery_file: PathBuf,

    /// Hardware backend to drive: `gpio` or `mock`.
    #[clap(
        long = "hardware-backend",
        env = "SUPERVISOR_HARDWARE_BACKEND",
        default_value = "mock"
    )]
    pub hardware_backend: HardwareBackend,

    /// BCM pin number for the READY handshake line.
    #[clap(long = "pin-ready", env = "SUPERVISOR_PIN_READY", default_value = "17")]
    pub pin_ready: u8,
    /// BCM pin number for the red indicator.
    #[clap(long = "pin-red", env = "SUPERVISOR_PIN_RED", default_value = "27")]
    pub pin_red: u8,
    /// BCM pin number for the green indicator.
    #[clap(long = "pin-green", env = "SUPERVISOR_PIN_GREEN", default_value = "22")]
    pub pin_green: u8,
    /// BCM pin number for the yellow indicator.
    #[clap(long = "pin-yellow", env = "SUPERVISOR_PIN_YELLOW", default_value = "23")]
    pub pin_yellow: u8,
    /// BCM pin number for the buzzer.
    #[clap(long = "pin-buzzer", env = "SUPERVISOR_PIN_BUZZER", default_value = "24")]
    pub pin_buzzer: u8,

    /// Required length of a QR payload.
    #[clap(long = "qr-length", env = "SUPERVISOR_QR_LENGTH", default_value = "14")]
    pub qr_length: usize,

    /// Which `QrSource` implementation drives live scans.
    #[clap(long = "qr-source", env = "SUPERVISOR_QR_SOURCE", default_value = "imager")]
    pub qr_source: QrSourceBackend,

    /// Serial device the imager is connected to (`qr-source=imager` only).
    #[clap(long = "qr-source-port", env = "SUPERVISOR_QR_SOURCE_PORT")]
    pub qr_source_port: Option<String>,
}

/// Which adapter (§4.4) supplies QR payloads during live operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QrSourceBackend {
    /// Vendor imager adapter over its own serial handle.
    Imager,
    /// Text-injecting external scanner behaving like a keyboard, read as
    /// newline-delimited QR strings from standard input.
    InputEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    Gpio,
    Mock,
}

impl Config {
    /// Resolve the serial port to use, probing the OS-specific candidate
    /// list when none was configured explicitly.
    pub fn resolved_serial_port(&self) -> Result<String, SupervisorError> {
        if let Some(port) = &self.serial_port {
            return Ok(port.clone());
        }

        let candidates = tokio_serial::available_ports().unwrap_or_default();
        let prefixes = ["/dev/ttyUSB", "/dev/ttyACM", "/dev/ttyAMA"];

        candidates
            .into_iter()
            .map(|p| p.port_name)
            .find(|name| prefixes.iter().any(|prefix| name.starts_with(prefix)))
            .ok_or_else(|| {
                SupervisorError::Config(
                    "no serial.port configured and no candidate device found".into(),
                )
            })
    }

    /// Merge a config file (if any) underneath CLI/env supplied values.
    /// Fields parsed by clap always take precedence, matching the
    /// precedence `data_plane_controller` documents for its own config
    /// inputs (CLI/env over file).
    pub fn load_file_overlay(file_config: Config, cli_config: Config) -> Config {
        Config {
            serial_port: cli_config.serial_port.or(file_config.serial_port),
            qr_source_port: cli_config.qr_source_port.or(file_config.qr_source_port),
            ..cli_config
        }
    }
}
