use log::{info, warn};
use std::future::poll_fn;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::Poll;

use clap::Parser;
use tokio::signal::unix::{Signal, SignalKind, signal};

use gpiofwd::{
    AppConfig, AsyncFdQueue, Direction, HttpForwarder, PinCallback, PinOptions, PinRegistry,
    SysfsGpio, run_until,
};

/// Watches sysfs GPIO inputs and forwards every transition over HTTP.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file to use
    #[arg(short, long, env = "GPIOFWD_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Write a config file stub and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.write_config {
        println!("Writing default config file to {}", cli.config.display());
        AppConfig::default()
            .write_to_file(&cli.config)
            .map_err(io::Error::other)?;
        std::process::exit(1);
    }

    let config = AppConfig::load_from_file(&cli.config).map_err(io::Error::other)?;

    actix_rt::System::new().block_on(run(config))
}

async fn run(config: AppConfig) -> io::Result<()> {
    let fs = Arc::new(SysfsGpio::new(&config.sysfs_root));
    let queue = Arc::new(AsyncFdQueue::new());
    let mut registry = PinRegistry::new(config.registry_config(), fs, queue.clone());

    let forwarder: PinCallback = Arc::new(HttpForwarder::spawn(&config.forward));
    let active_low = u8::from(config.active_low);

    // all enabled pins are inputs
    for &number in &config.enabled_pins {
        info!("PIN {number} enabled as input");
        let options = PinOptions::watch(forwarder.clone(), config.edge).with_active_low(active_low);
        if let Err(e) = registry.alloc_pin(number, Direction::Input, options) {
            if let Err(cleanup) = registry.dealloc_all() {
                warn!("Cleanup after failed allocation incomplete: {cleanup}");
            }
            return Err(io::Error::other(e));
        }
    }

    info!(
        "Forwarding {} pins from {} to {}",
        config.enabled_pins.len(),
        config.sysfs_root.display(),
        config.forward.url
    );

    run_until(&queue, &mut registry, shutdown_signal()).await;

    registry.dealloc_all().map_err(io::Error::other)
}

async fn shutdown_signal() {
    let kinds = [
        ("HUP", SignalKind::hangup()),
        ("INT", SignalKind::interrupt()),
        ("QUIT", SignalKind::quit()),
        ("TERM", SignalKind::terminate()),
    ];

    let mut streams: Vec<(&str, Signal)> = Vec::new();
    for (name, kind) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((name, stream)),
            Err(e) => warn!("Cannot listen for SIG{name}: {e}"),
        }
    }

    let name = poll_fn(|cx| {
        for (name, stream) in streams.iter_mut() {
            if stream.poll_recv(cx).is_ready() {
                return Poll::Ready(*name);
            }
        }
        Poll::Pending
    })
    .await;

    info!("Caught signal (SIG{name}), quitting...");
}
