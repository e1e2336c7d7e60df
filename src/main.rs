use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use daq_bridge::{
    BridgeBuilder, BridgeConfig, CloseHandle, ConnectionState, DeviceKind, SimulatedDevice,
};

/// Delay between attempts while the controller is not reachable yet.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bridge between a remote experiment controller and a local output device
#[derive(Parser, Debug)]
#[command(name = "daq-bridge", version, long_about = None)]
struct Args {
    /// Controller address
    #[arg(short, long, default_value = "192.168.1.114")]
    address: String,

    /// Controller port
    #[arg(short, long, default_value_t = 1028)]
    port: u16,

    /// Device name reported to the controller (default: "Dev1")
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// Device type: "6713" (analog) or "dio" (32 digital lines)
    #[arg(short = 't', long = "type", default_value = "6713")]
    device_type: String,

    /// Do not reconnect after the connection is lost
    #[arg(short = 'r', long)]
    no_reconnect: bool,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    // a pending stdin read cannot be cancelled
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(name) = args.device {
        config.identity = name;
    }
    if args.no_reconnect {
        config.reconnect = false;
    }
    let kind: DeviceKind = args.device_type.parse()?;
    let reconnect = config.reconnect;

    tracing::info!(identity = %config.identity, ?kind, "starting device");
    let device = SimulatedDevice::new(config.identity.clone(), kind);
    let mut bridge = BridgeBuilder::new().config(config).build(device)?;

    spawn_console(bridge.closer());
    spawn_ctrl_c(bridge.closer());

    let address = format!("{}:{}", args.address, args.port);
    loop {
        match bridge.connect(address.as_str()).await {
            Ok(()) => break,
            Err(e) if reconnect && e.is_transient() => {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(_) if bridge.state() == ConnectionState::Closing => break,
            Err(e) => {
                tracing::error!(%address, "could not connect: {}", e);
                break;
            }
        }
    }

    let device = bridge.wait_for_shutdown().await?;
    tracing::info!(commands = device.history().len(), "bridge stopped");
    Ok(())
}

/// Close on a "close" line from stdin.
fn spawn_console(closer: CloseHandle) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().eq_ignore_ascii_case("close") {
                closer.close();
                break;
            }
        }
    });
}

fn spawn_ctrl_c(closer: CloseHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            closer.close();
        }
    });
}
