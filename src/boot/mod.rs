/// Bootloader interface: active bank record, persisted upgrade flag, reboot.
pub mod rboot;

pub use rboot::RbootConfig;

/// Pseudo slot used when flashing a raw image at an explicit address.
pub const FLASH_BY_ADDR: u8 = 0xFF;

/// Reboot-surviving marker of the last upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpgradeFlag {
    Idle = 0x00,
    Started = 0x01,
    Finished = 0x02,
}

impl UpgradeFlag {
    pub fn from_byte(byte: u8) -> Result<Self, BootError> {
        match byte {
            0x00 => Ok(UpgradeFlag::Idle),
            0x01 => Ok(UpgradeFlag::Started),
            0x02 => Ok(UpgradeFlag::Finished),
            other => Err(BootError::BadFlag(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("boot config truncated: {0} bytes")]
    Truncated(usize),
    #[error("boot config has bad magic 0x{0:02X}")]
    BadMagic(u8),
    #[error("boot config checksum mismatch (stored 0x{stored:02X}, computed 0x{computed:02X})")]
    BadChecksum { stored: u8, computed: u8 },
    #[error("no rom slot {0}")]
    NoSuchSlot(u8),
    #[error("invalid upgrade flag value 0x{0:02X}")]
    BadFlag(u8),
    #[error("boot state I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Services the dual-bank bootloader exposes to the application.
pub trait Bootloader {
    /// Slot the running image was booted from
    fn active_slot(&self) -> Result<u8, BootError>;
    /// Select the slot to boot next
    fn set_active_slot(&mut self, slot: u8) -> Result<(), BootError>;
    /// Flash base address of a slot
    fn slot_address(&self, slot: u8) -> Result<u32, BootError>;
    fn upgrade_flag(&self) -> Result<UpgradeFlag, BootError>;
    fn set_upgrade_flag(&mut self, flag: UpgradeFlag) -> Result<(), BootError>;
    fn reboot(&mut self) -> Result<(), BootError>;
}

/// The bank that is not currently running.
pub fn inactive_slot(active: u8) -> u8 {
    if active == 0 { 1 } else { 0 }
}
