use clap::Parser;
use serial_relay::config::{ConfigLoader, LogFormat, LoggingConfig};
use serial_relay::{
    Config, EndpointConfig, EndpointRegistry, RelayPair, RelaySetup, SystemDriver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-relay",
    version,
    about = "Relay bytes between serial ports.",
    long_about = "Reads from a source serial port and writes everything it receives to a destination port. Pairs come from the configuration file and/or --source/--destination."
)]
struct Args {
    /// Configuration file (defaults to the standard search path).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "serial_relay=trace". Overrides RUST_LOG and the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Source port for an ad-hoc direct pair.
    #[arg(short, long, requires = "destination")]
    source: Option<String>,

    /// Destination port for an ad-hoc direct pair.
    #[arg(short, long, requires = "source")]
    destination: Option<String>,

    /// Baud rate for the ad-hoc pair; 0 keeps the device default.
    #[arg(short, long, default_value_t = 0)]
    baud: u32,

    /// Also relay destination -> source for the ad-hoc pair.
    #[arg(long, requires = "source")]
    duplex: bool,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.list_ports {
        return list_ports();
    }

    let mut loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    if let (Some(source), Some(destination)) = (&args.source, &args.destination) {
        let setup = RelaySetup::direct(
            EndpointConfig::new(source).with_baud_rate(args.baud),
            EndpointConfig::new(destination).with_baud_rate(args.baud),
        );
        let pairs = &mut loader.config_mut().pairs;
        if args.duplex {
            pairs.push(setup.reversed());
        }
        pairs.push(setup);
    }

    if args.print_config {
        print!("{}", loader.to_toml()?);
        return Ok(());
    }

    let config = loader.into_config();
    init_tracing(&config.logging, args.log_level.as_deref());

    if config.pairs.is_empty() {
        return Err("no relay pairs configured: pass --source/--destination or add [[pair]] entries".into());
    }

    let registry = Arc::new(EndpointRegistry::new(Arc::new(SystemDriver)));
    let mut pairs = match start_pairs(&registry, &config) {
        Ok(pairs) => pairs,
        Err(e) => {
            registry.release_all();
            return Err(e.into());
        }
    };

    supervise(&mut pairs, &config).await;

    tokio::task::spawn_blocking(move || {
        for mut pair in pairs {
            let report = pair.stop();
            debug!(?report, "pair shut down");
        }
        registry.release_all();
    })
    .await?;

    info!("serial relay stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig, cli_level: Option<&str>) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

fn start_pairs(
    registry: &Arc<EndpointRegistry>,
    config: &Config,
) -> serial_relay::RelayResult<Vec<RelayPair>> {
    let mut pairs = Vec::with_capacity(config.pairs.len());
    for setup in &config.pairs {
        let mut pair = RelayPair::new(registry.clone())
            .with_channel_capacity(config.relay.channel_capacity)
            .with_read_chunk_size(config.relay.read_chunk_size);
        if let Err(e) = pair.configure(setup).and_then(|()| pair.start()) {
            error!(
                source = %setup.source.port_id,
                destination = %setup.destination.port_id,
                error = %e,
                "failed to start relay pair"
            );
            // Dropping `pairs` stops the ones already running.
            return Err(e);
        }
        pairs.push(pair);
    }
    Ok(pairs)
}

/// Wait for a shutdown signal, stopping pairs that fail along the way.
///
/// Returns early once no pair is left running.
async fn supervise(pairs: &mut [RelayPair], config: &Config) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(config.relay.supervise_interval());

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                for pair in pairs.iter_mut().filter(|p| p.has_failed()) {
                    let report = tokio::task::block_in_place(|| pair.stop());
                    warn!(?report, "relay pair failed and was stopped");
                }
                if !pairs.iter().any(RelayPair::is_running) {
                    warn!("no relay pair is running any more");
                    break;
                }
            }
        }
    }
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        let kind = match port.port_type {
            serialport::SerialPortType::UsbPort(info) => format!(
                "USB {:04x}:{:04x} {}",
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            serialport::SerialPortType::PciPort => "PCI".to_string(),
            serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            serialport::SerialPortType::Unknown => "unknown".to_string(),
        };
        println!("{}\t{}", port.port_name, kind);
    }
    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}
