use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use ota_client::boot::{Bootloader, FLASH_BY_ADDR, UpgradeFlag};
use ota_client::config::{self, DEFAULT_PATH, DEFAULT_PORT, DEFAULT_VERSION_FILE, EngineConfig, OtaConfig, ServerConfig};
use ota_client::core::updater::Target;
use ota_client::protocol::FirmwareVersion;
use ota_client::services::{DEFAULT_FLASH_SIZE, HostPaths, build_updater};

#[derive(Parser, Debug)]
#[command(name = "ota-client", about = "Dual-bank OTA firmware updater")]
struct Args {
    /// XML config file (<ota> document); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Update server host name or dotted address
    #[arg(long)]
    host: Option<String>,

    /// Update server TCP port
    #[arg(long)]
    port: Option<u16>,

    /// URL prefix prepended to every file name
    #[arg(long)]
    path: Option<String>,

    /// Version manifest file name
    #[arg(long)]
    version_file: Option<String>,

    /// Image requested when slot 0 is the target
    #[arg(long)]
    rom0: Option<String>,

    /// Image requested when slot 1 is the target
    #[arg(long)]
    rom1: Option<String>,

    /// Image requested when flashing by address
    #[arg(long)]
    raw_file: Option<String>,

    /// Write the raw image at this flash address instead of the inactive slot
    #[arg(long, value_parser = parse_address)]
    raw_address: Option<u32>,

    /// Version of the running firmware, e.g. 1.0
    #[arg(long)]
    current_version: Option<FirmwareVersion>,

    /// Network timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// File emulating the device flash
    #[arg(long, default_value = "flash.bin")]
    flash_image: PathBuf,

    /// Size of the emulated flash in bytes
    #[arg(long, default_value_t = DEFAULT_FLASH_SIZE, value_parser = parse_address)]
    flash_size: u32,

    /// Directory holding the boot config record and upgrade flag
    #[arg(long, default_value = "boot-state")]
    state_dir: PathBuf,

    /// Boot the new slot next time after a successful flash
    #[arg(long)]
    activate: bool,

    /// Request a reboot after activating
    #[arg(long, requires = "activate")]
    reboot: bool,

    /// Clear an upgrade flag left at "started" by an interrupted run
    #[arg(long)]
    recover: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Accepts decimal or 0x-prefixed hex.
fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

/// Merge the optional config file with command-line overrides.
fn resolve_config(args: &Args) -> Result<OtaConfig> {
    let mut ota = match &args.config {
        Some(path) => config::parse_config_file(path)?,
        None => {
            let host = args
                .host
                .clone()
                .context("--host is required when no --config file is given")?;
            OtaConfig {
                server: ServerConfig::new(
                    host,
                    DEFAULT_PORT,
                    DEFAULT_PATH,
                    DEFAULT_VERSION_FILE,
                    "rom0.bin",
                    "rom1.bin",
                ),
                engine: EngineConfig::default(),
            }
        }
    };

    let server = &mut ota.server;
    if let Some(host) = &args.host {
        server.host = host.clone();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(path) = &args.path {
        server.path = path.clone();
    }
    if let Some(file) = &args.version_file {
        server.version_file = file.clone();
    }
    if let Some(file) = &args.rom0 {
        server.rom0_file = file.clone();
    }
    if let Some(file) = &args.rom1 {
        server.rom1_file = file.clone();
    }
    if let Some(file) = &args.raw_file {
        server.raw_file = file.clone();
    }

    if let Some(version) = args.current_version {
        ota.engine.local_version = version;
    }
    if let Some(ms) = args.timeout_ms {
        ota.engine.network_timeout = Duration::from_millis(ms);
    }
    Ok(ota)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .init();

    let ota = resolve_config(&args)?;
    info!(
        "ota-client v{} starting (server {}:{}{}, running {})",
        env!("CARGO_PKG_VERSION"),
        ota.server.host,
        ota.server.port,
        ota.server.path,
        ota.engine.local_version
    );

    let paths = HostPaths {
        flash_image: args.flash_image.clone(),
        flash_size: args.flash_size,
        state_dir: args.state_dir.clone(),
    };
    let mut updater = build_updater(ota.server, ota.engine, &paths)?;

    let boot = updater.engine_mut().bootloader_mut();
    match boot.upgrade_flag()? {
        UpgradeFlag::Started if args.recover => {
            warn!("Previous upgrade was interrupted, clearing its flag");
            boot.set_upgrade_flag(UpgradeFlag::Idle)?;
        }
        UpgradeFlag::Started => {
            warn!("Previous upgrade was interrupted; rerun with --recover to clear it");
        }
        UpgradeFlag::Finished | UpgradeFlag::Idle => {}
    }

    let target = match args.raw_address {
        Some(address) => Target::Address(address),
        None => Target::InactiveSlot,
    };
    let outcome = updater.run(target).await?;

    match &outcome.result {
        Ok(completion) => info!("Upgrade succeeded: {:?}", completion),
        Err(e) => anyhow::bail!("Upgrade failed: {}", e),
    }

    if outcome.flashed() && args.activate {
        if outcome.slot == FLASH_BY_ADDR {
            warn!("Raw image written by address, nothing to activate");
        } else {
            let boot = updater.engine_mut().bootloader_mut();
            boot.set_active_slot(outcome.slot)
                .context("Failed to switch boot slot")?;
            if args.reboot {
                boot.reboot()?;
            }
        }
    }

    info!("ota-client done");
    Ok(())
}
