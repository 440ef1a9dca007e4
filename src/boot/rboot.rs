/// rBoot configuration record (the bootloader's "which rom boots" sector).
///
/// Layout, little-endian:
/// `magic, version, mode, current_rom, gpio_rom, count, unused[2], roms[4] (u32), chksum`
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use super::BootError;

pub const BOOT_CONFIG_MAGIC: u8 = 0xE1;
pub const BOOT_CONFIG_VERSION: u8 = 0x01;
pub const MAX_ROMS: usize = 4;
pub const RECORD_LEN: usize = 8 + MAX_ROMS * 4 + 1;

const CHKSUM_INIT: u8 = 0xEF;

pub const MODE_STANDARD: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbootConfig {
    pub version: u8,
    pub mode: u8,
    pub current_rom: u8,
    pub gpio_rom: u8,
    pub count: u8,
    pub roms: [u32; MAX_ROMS],
}

impl Default for RbootConfig {
    /// Two 512 KiB banks on a 1 MiB part, first bank after the bootloader
    /// and config sectors.
    fn default() -> Self {
        Self {
            version: BOOT_CONFIG_VERSION,
            mode: MODE_STANDARD,
            current_rom: 0,
            gpio_rom: 0,
            count: 2,
            roms: [0x0000_2000, 0x0008_2000, 0, 0],
        }
    }
}

impl RbootConfig {
    pub fn rom_address(&self, slot: u8) -> Result<u32, BootError> {
        if slot >= self.count || slot as usize >= MAX_ROMS {
            return Err(BootError::NoSuchSlot(slot));
        }
        Ok(self.roms[slot as usize])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_LEN);
        out.push(BOOT_CONFIG_MAGIC);
        out.push(self.version);
        out.push(self.mode);
        out.push(self.current_rom);
        out.push(self.gpio_rom);
        out.push(self.count);
        out.extend_from_slice(&[0, 0]);
        for rom in self.roms {
            out.extend_from_slice(&rom.to_le_bytes());
        }
        out.push(checksum(&out));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BootError> {
        if bytes.len() < RECORD_LEN {
            return Err(BootError::Truncated(bytes.len()));
        }
        if bytes[0] != BOOT_CONFIG_MAGIC {
            return Err(BootError::BadMagic(bytes[0]));
        }
        let stored = bytes[RECORD_LEN - 1];
        let computed = checksum(&bytes[..RECORD_LEN - 1]);
        if stored != computed {
            return Err(BootError::BadChecksum { stored, computed });
        }

        let mut roms = [0u32; MAX_ROMS];
        let mut cursor = Cursor::new(&bytes[8..8 + MAX_ROMS * 4]);
        for rom in roms.iter_mut() {
            *rom = cursor.read_u32::<LittleEndian>()?;
        }

        Ok(Self {
            version: bytes[1],
            mode: bytes[2],
            current_rom: bytes[3],
            gpio_rom: bytes[4],
            count: bytes[5],
            roms,
        })
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(CHKSUM_INIT, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_layout() {
        let config = RbootConfig {
            current_rom: 1,
            ..RbootConfig::default()
        };
        let bytes = config.encode();
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(&bytes[..6], &[0xE1, 0x01, 0x00, 0x01, 0x00, 0x02]);
        assert_eq!(&bytes[8..12], &[0x00, 0x20, 0x00, 0x00]);
        assert_eq!(&bytes[12..16], &[0x00, 0x20, 0x08, 0x00]);
        assert_eq!(RbootConfig::decode(&bytes).unwrap(), config);
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let mut bytes = RbootConfig::default().encode();
        bytes[3] ^= 0x01;
        assert!(matches!(
            RbootConfig::decode(&bytes),
            Err(BootError::BadChecksum { .. })
        ));

        bytes[0] = 0x00;
        assert!(matches!(RbootConfig::decode(&bytes), Err(BootError::BadMagic(0))));
        assert!(matches!(RbootConfig::decode(&bytes[..4]), Err(BootError::Truncated(4))));
    }

    #[test]
    fn test_rom_address_bounds() {
        let config = RbootConfig::default();
        assert_eq!(config.rom_address(1).unwrap(), 0x0008_2000);
        assert!(matches!(config.rom_address(2), Err(BootError::NoSuchSlot(2))));
    }
}
