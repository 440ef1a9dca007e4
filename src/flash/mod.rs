/// Raw flash access and the sequential slot writer built on top of it.
pub mod writer;

pub use writer::FlashWriter;

/// Erase granularity of the SPI flash.
pub const SECTOR_SIZE: u32 = 0x1000;

/// Value every byte reads back as after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("erase of sector {sector} failed: {reason}")]
    Erase { sector: u32, reason: String },
    #[error("program of {len} bytes at 0x{addr:08X} failed: {reason}")]
    Program { addr: u32, len: usize, reason: String },
    #[error("image does not fit: write would end at 0x{end:08X}, slot ends at 0x{limit:08X}")]
    OutOfSpace { end: u64, limit: u32 },
    #[error("flash I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw NOR flash primitives provided by the platform.
///
/// `write` only clears bits; callers erase the covering sectors first.
pub trait Flash {
    fn erase_sector(&mut self, sector: u32) -> Result<(), FlashError>;
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;
}
