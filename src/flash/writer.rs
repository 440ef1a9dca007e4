/// Sequential slot writer.
/// Streams arbitrary-sized chunks into flash, keeping writes 4-byte aligned and
/// erasing each sector just before the cursor first enters it.
use tracing::debug;

use super::{ERASED_BYTE, Flash, FlashError, SECTOR_SIZE};

const WORD: usize = 4;

#[derive(Debug, Clone)]
pub struct FlashWriter {
    /// Next address to program
    cursor: u32,
    /// Highest sector erased so far (None until the first erase)
    last_sector_erased: Option<u32>,
    /// First address past the end of the slot
    limit: u32,
    /// Trailing bytes held back until a full word is available
    extra: [u8; WORD],
    extra_count: usize,
    /// Bytes accepted from callers, including held-back ones
    accepted: u64,
}

impl FlashWriter {
    /// Open a writer at `base` able to hold at most `capacity` bytes.
    pub fn new(base: u32, capacity: u32) -> Self {
        Self {
            cursor: base,
            last_sector_erased: None,
            limit: base.saturating_add(capacity),
            extra: [ERASED_BYTE; WORD],
            extra_count: 0,
            accepted: 0,
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Write the next chunk of the image.
    pub fn write_chunk<F: Flash + ?Sized>(
        &mut self,
        flash: &mut F,
        data: &[u8],
    ) -> Result<(), FlashError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(self.extra_count + data.len());
        buffer.extend_from_slice(&self.extra[..self.extra_count]);
        buffer.extend_from_slice(data);

        let keep = buffer.len() % WORD;
        let aligned = buffer.len() - keep;

        let end = self.cursor as u64 + buffer.len() as u64;
        if end > self.limit as u64 {
            return Err(FlashError::OutOfSpace {
                end,
                limit: self.limit,
            });
        }

        if aligned > 0 {
            self.program(flash, &buffer[..aligned])?;
        }

        self.extra = [ERASED_BYTE; WORD];
        self.extra[..keep].copy_from_slice(&buffer[aligned..]);
        self.extra_count = keep;
        self.accepted += data.len() as u64;
        Ok(())
    }

    /// Flush held-back bytes, padding the last word with the erased value.
    pub fn finish<F: Flash + ?Sized>(&mut self, flash: &mut F) -> Result<(), FlashError> {
        if self.extra_count == 0 {
            return Ok(());
        }
        let word = self.extra;
        self.program(flash, &word)?;
        self.extra = [ERASED_BYTE; WORD];
        self.extra_count = 0;
        Ok(())
    }

    fn program<F: Flash + ?Sized>(&mut self, flash: &mut F, bytes: &[u8]) -> Result<(), FlashError> {
        let last_sector = (self.cursor + bytes.len() as u32 - 1) / SECTOR_SIZE;
        let mut next = match self.last_sector_erased {
            Some(sector) => sector + 1,
            None => self.cursor / SECTOR_SIZE,
        };
        while next <= last_sector {
            debug!("Erasing flash sector {} (0x{:08X})", next, next * SECTOR_SIZE);
            flash.erase_sector(next)?;
            self.last_sector_erased = Some(next);
            next += 1;
        }

        flash.write(self.cursor, bytes)?;
        self.cursor += bytes.len() as u32;
        Ok(())
    }
}
