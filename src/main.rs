use std::sync::Arc;

use clap::Parser;
use futures::FutureExt;
use tokio::sync::mpsc;

use cartridge_supervisor::config::{Config, HardwareBackend, QrSourceBackend};
use cartridge_supervisor::dupstore::DuplicateStore;
use cartridge_supervisor::events::new_event_bus;
use cartridge_supervisor::hal::{Hal, MockHal};
#[cfg(feature = "gpio")]
use cartridge_supervisor::hal::{GpioHal, GpioPins};
use cartridge_supervisor::link;
use cartridge_supervisor::qrsource::{ImagerQrSource, InputEventQrSource, QrSource};
use cartridge_supervisor::supervisor::{OperatorCommand, Supervisor, SupervisorConfig};

fn main() -> Result<(), anyhow::Error> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let config = load_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(runtime.spawn(run(config)));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}

/// `--config <path>` is merged underneath whatever clap already parsed from
/// CLI/env, matching the precedence `data_plane_controller`'s job binary
/// documents for its own config inputs.
fn load_config() -> Result<Config, anyhow::Error> {
    let cli_config = Config::parse();
    let Some(path) = &cli_config.config_file else {
        return Ok(cli_config);
    };
    let bytes = std::fs::read(path)
        .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
    let file_config: Config = serde_json::from_slice(&bytes)
        .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?;
    Ok(Config::load_file_overlay(file_config, cli_config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    // §4.1 startup policy: the handshake line must be driven LOW (busy)
    // before the serial port is opened, so the HAL is built first.
    let hal = build_hal(&config)?;

    let serial_port = config.resolved_serial_port()?;
    tracing::info!(serial_port, baud = config.serial_baud, "opening PLC serial link");
    let port = tokio_serial::new(&serial_port, config.serial_baud)
        .open_native_async()
        .map_err(|err| anyhow::anyhow!("opening PLC serial port {serial_port}: {err}"))?;

    // §7: a transient serial I/O failure gets one reopen attempt (against
    // the same device path) before the link declares itself down.
    let reopen_path = serial_port.clone();
    let reopen_baud = config.serial_baud;
    let reopen: link::Reopen<tokio_serial::SerialStream> = Box::new(move || {
        let path = reopen_path.clone();
        async move {
            tokio_serial::new(&path, reopen_baud)
                .open_native_async()
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
        }
        .boxed()
    });
    let (link_handle, link_events) = link::spawn_with_reopen(port, Some(reopen), config.response_timeout);

    let qr_source = build_qr_source(&config)?;

    let dup_store = Arc::new(
        DuplicateStore::open(&config.duplicates_path)
            .map_err(|err| anyhow::anyhow!("opening duplicate store {:?}: {err}", config.duplicates_path))?,
    );

    let events = new_event_bus();
    let supervisor_config = SupervisorConfig {
        response_timeout: config.response_timeout,
        busy_settle: config.busy_settle,
        qr_length: config.qr_length,
        batch_log_dir: config.batch_log_dir.clone(),
        setup_log_dir: config.setup_log_dir.clone(),
        recovery_file: config.recovery_file.clone(),
    };

    let supervisor = Supervisor::new(hal, dup_store, qr_source, link_handle, supervisor_config, events);

    // The operator UI collaborator (out of scope, §1) is the intended
    // producer of `OperatorCommand`s; here we only wire a channel that is
    // shut by Ctrl-C so the process exits cleanly once the supervisor's
    // `run` loop notices both its inputs have closed.
    let (operator_tx, operator_rx) = mpsc::channel::<OperatorCommand>(8);

    let mut supervisor_task = tokio::spawn(supervisor.run(operator_rx, link_events));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = operator_tx.send(OperatorCommand::Stop).await;
    drop(operator_tx);

    tokio::select! {
        result = &mut supervisor_task => result?,
        _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {
            tracing::warn!("supervisor did not shut down within grace period; aborting");
            supervisor_task.abort();
        }
    }
    Ok(())
}

fn build_hal(config: &Config) -> anyhow::Result<Arc<dyn Hal>> {
    match config.hardware_backend {
        HardwareBackend::Mock => Ok(Arc::new(MockHal::new())),
        HardwareBackend::Gpio => {
            #[cfg(feature = "gpio")]
            {
                let pins = GpioPins {
                    ready: config.pin_ready,
                    red: config.pin_red,
                    green: config.pin_green,
                    yellow: config.pin_yellow,
                    buzzer: config.pin_buzzer,
                };
                Ok(Arc::new(GpioHal::open(pins)?))
            }
            #[cfg(not(feature = "gpio"))]
            {
                anyhow::bail!("hardware-backend=gpio requires the `gpio` feature")
            }
        }
    }
}

fn build_qr_source(config: &Config) -> anyhow::Result<Box<dyn QrSource>> {
    match config.qr_source {
        QrSourceBackend::InputEvent => Ok(Box::new(InputEventQrSource::new(tokio::io::stdin()))),
        QrSourceBackend::Imager => {
            let port = config
                .qr_source_port
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("qr-source=imager requires --qr-source-port"))?;
            let transport = tokio_serial::new(port, config.serial_baud)
                .open_native_async()
                .map_err(|err| anyhow::anyhow!("opening imager serial port {port}: {err}"))?;
            Ok(Box::new(ImagerQrSource::new(transport)))
        }
    }
}
