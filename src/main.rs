use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rover_teleop::config::TeleopConfig;

#[derive(Parser, Debug)]
#[command(name = "rover-teleop", about = "Gamepad teleoperation for the four-wheel rover")]
struct Args {
    /// Serial port of the rover's microcontroller
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baudrate
    #[arg(short, long)]
    baud: Option<u32>,

    /// JSON config file; missing fields use built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => match TeleopConfig::load(path) {
            Ok(cfg) => {
                info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => TeleopConfig::default(),
    };
    if let Some(port) = args.port {
        cfg.link.port = port;
    }
    if let Some(baud) = args.baud {
        cfg.link.baudrate = baud;
    }

    if let Err(e) = rover_teleop::runtime::run(cfg).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
