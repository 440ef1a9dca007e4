/// Services manager: wires the host services into an update driver.
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{EngineConfig, ServerConfig};
use crate::core::OtaEngine;
use crate::core::updater::Updater;
use crate::services::boot_store::FileBootStore;
use crate::services::flash_file::FileFlash;
use crate::services::tcp::TcpTransport;
use crate::services::watchdog::TokioWatchdog;

/// Default emulated part: 1 MiB, room for both banks of the default layout
pub const DEFAULT_FLASH_SIZE: u32 = 0x10_0000;

pub type HostUpdater = Updater<TcpTransport, TokioWatchdog, FileFlash, FileBootStore>;

/// Where the host keeps its emulated device
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub flash_image: PathBuf,
    pub flash_size: u32,
    pub state_dir: PathBuf,
}

/// Open the flash image and boot state, then build an updater whose transport
/// and watchdog report into a fresh event channel. Must run inside a tokio
/// runtime.
pub fn build_updater(
    server: ServerConfig,
    config: EngineConfig,
    paths: &HostPaths,
) -> anyhow::Result<HostUpdater> {
    let flash = FileFlash::open(&paths.flash_image, paths.flash_size)?;
    let boot = FileBootStore::open(&paths.state_dir)?;
    info!(
        "Host device: flash {} ({} bytes), boot state in {}",
        paths.flash_image.display(),
        paths.flash_size,
        paths.state_dir.display()
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let engine = OtaEngine::new(
        server,
        config,
        TcpTransport::new(tx.clone()),
        TokioWatchdog::new(tx),
        flash,
        boot,
    );
    Ok(Updater::new(engine, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{Bootloader, UpgradeFlag};

    #[tokio::test]
    async fn test_build_creates_device_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = HostPaths {
            flash_image: dir.path().join("flash.bin"),
            flash_size: DEFAULT_FLASH_SIZE,
            state_dir: dir.path().join("state"),
        };
        let server = ServerConfig::new("127.0.0.1", 80, "/", "app.ver", "rom0.bin", "rom1.bin");

        let updater = build_updater(server, EngineConfig::default(), &paths).unwrap();
        assert!(!updater.engine().is_busy());
        assert_eq!(updater.engine().flash().size(), DEFAULT_FLASH_SIZE);
        assert_eq!(
            updater.engine().bootloader().upgrade_flag().unwrap(),
            UpgradeFlag::Idle
        );
        assert!(paths.state_dir.join("rboot.cfg").exists());
    }
}
