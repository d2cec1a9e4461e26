//! usbip-stub: a userspace USB/IP device-side stub server.
//!
//! Exports locally attached USB devices to remote USB/IP clients over TCP.
//! Accepts control-protocol connections (device list / import requests),
//! then hands each imported device's socket off to a pair of RX/TX actors
//! that speak the CMD_SUBMIT/CMD_UNLINK wire protocol against the device via
//! `libusb`.

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use server::config::ServerConfig;
use server::handshake;
use server::usb::{build_rusb_device, spawn};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "usbip-stub")]
#[command(author, version, about = "Userspace USB/IP device-side stub server")]
#[command(long_about = "
Exports USB devices attached to this host to remote USB/IP clients.

EXAMPLES:
    # Run with default config
    usbip-stub

    # Run with a specific config file
    usbip-stub --config /path/to/server.toml

    # List exportable USB devices and exit
    usbip-stub --list-devices

    # Save the default configuration and exit
    usbip-stub --save-config

CONFIGURATION:
    Configuration is read from, in order:
    1. The path given with --config
    2. ~/.config/usbip-stub/server.toml
    3. /etc/usbip-stub/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// List exportable USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ServerConfig::load(Some(path.clone())).context("failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("failed to setup logging")?;

    info!("usbip-stub v{}", env!("CARGO_PKG_VERSION"));

    let context = rusb::Context::new().context("failed to initialize libusb context")?;
    let filters = config.device_filters();

    if args.list_devices {
        return list_devices_mode(&context, &filters);
    }

    run_server(config, context, filters).await
}

/// List every device this configuration would export, and exit.
fn list_devices_mode(context: &rusb::Context, filters: &server::config::DeviceFilters) -> Result<()> {
    let devices = handshake::enumerate_exportable(context, filters)
        .context("failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No exportable USB devices found.");
    } else {
        println!("Found {} exportable USB device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {} {:04x}:{:04x} (class {:#04x})",
                device.busid, device.vendor_id, device.product_id, device.device_class
            );
        }
    }
    Ok(())
}

/// Bind the control-protocol listener and accept connections until Ctrl+C.
async fn run_server(config: ServerConfig, context: rusb::Context, filters: server::config::DeviceFilters) -> Result<()> {
    let listener = TcpListener::bind(&config.server.bind_addr)
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;

    info!("listening on {}", config.server.bind_addr);
    info!("press Ctrl+C to shut down");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept failed")?;
                let context = context.clone();
                let filters = filters.clone();
                let stream = stream.into_std()?;
                stream.set_nonblocking(false)?;
                std::thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &context, &filters) {
                        warn!(%peer, error = %e, "session ended with an error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                return Ok(());
            }
        }
    }
}

/// Drive the control-protocol handshake on one accepted connection, then run
/// the imported device's stub engine until the client disconnects.
fn handle_connection(
    stream: std::net::TcpStream,
    context: &rusb::Context,
    filters: &server::config::DeviceFilters,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let mut control_stream = stream.try_clone().context("failed to clone control stream")?;

    let imported = handshake::negotiate(&mut control_stream, context, filters)
        .context("handshake failed")?;

    let Some((handle, devid, endpoints)) = imported else {
        info!(?peer, "peer disconnected after devlist queries without importing a device");
        return Ok(());
    };

    info!(?peer, devid, "device imported, starting stub engine");

    let reader = stream.try_clone().context("failed to clone session stream")?;
    let writer = stream;
    let device = build_rusb_device(devid, endpoints, context.clone(), handle);
    let engine = spawn(Arc::clone(&device), reader, writer);
    engine.join();

    info!(?peer, devid, "session ended");
    Ok(())
}
