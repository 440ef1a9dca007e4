/// Bootloader state kept in a directory: the rBoot config record and the
/// upgrade flag byte.
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::boot::{BootError, Bootloader, RbootConfig, UpgradeFlag};

const CONFIG_FILE: &str = "rboot.cfg";
const FLAG_FILE: &str = "upgrade.flag";

pub struct FileBootStore {
    dir: PathBuf,
    config: RbootConfig,
    reboot_requests: usize,
}

impl FileBootStore {
    /// Load the state in `dir`, writing the default two-bank record if none
    /// exists yet.
    pub fn open(dir: &Path) -> Result<Self, BootError> {
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE);

        let config = if config_path.exists() {
            RbootConfig::decode(&std::fs::read(&config_path)?)?
        } else {
            let config = RbootConfig::default();
            std::fs::write(&config_path, config.encode())?;
            info!("Created default boot config at {}", config_path.display());
            config
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            reboot_requests: 0,
        })
    }

    /// Reboots requested through this handle.
    pub fn reboot_requests(&self) -> usize {
        self.reboot_requests
    }

    fn save_config(&self) -> Result<(), BootError> {
        std::fs::write(self.dir.join(CONFIG_FILE), self.config.encode())?;
        Ok(())
    }
}

impl Bootloader for FileBootStore {
    fn active_slot(&self) -> Result<u8, BootError> {
        Ok(self.config.current_rom)
    }

    fn set_active_slot(&mut self, slot: u8) -> Result<(), BootError> {
        self.config.rom_address(slot)?;
        self.config.current_rom = slot;
        self.save_config()?;
        info!("Next boot from slot {}", slot);
        Ok(())
    }

    fn slot_address(&self, slot: u8) -> Result<u32, BootError> {
        self.config.rom_address(slot)
    }

    fn upgrade_flag(&self) -> Result<UpgradeFlag, BootError> {
        let path = self.dir.join(FLAG_FILE);
        if !path.exists() {
            return Ok(UpgradeFlag::Idle);
        }
        match std::fs::read(&path)?.first() {
            Some(byte) => UpgradeFlag::from_byte(*byte),
            None => {
                warn!("Empty upgrade flag file {}", path.display());
                Ok(UpgradeFlag::Idle)
            }
        }
    }

    fn set_upgrade_flag(&mut self, flag: UpgradeFlag) -> Result<(), BootError> {
        std::fs::write(self.dir.join(FLAG_FILE), [flag as u8])?;
        Ok(())
    }

    fn reboot(&mut self) -> Result<(), BootError> {
        self.reboot_requests += 1;
        info!(
            "Reboot requested, bootloader will start slot {} at 0x{:08X}",
            self.config.current_rom,
            self.config.rom_address(self.config.current_rom)?
        );
        Ok(())
    }
}
