/// NOR flash emulated by a file on disk.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::flash::{ERASED_BYTE, Flash, FlashError, SECTOR_SIZE};

pub struct FileFlash {
    path: PathBuf,
    file: File,
    size: u32,
}

impl FileFlash {
    /// Open or create a flash image of `size` bytes. A new or short file is
    /// extended with erased bytes.
    pub fn open(path: &Path, size: u32) -> Result<Self, FlashError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < size as u64 {
            file.seek(SeekFrom::Start(current))?;
            let fill = vec![ERASED_BYTE; (size as u64 - current) as usize];
            file.write_all(&fill)?;
            file.flush()?;
            info!("Initialised {} byte flash image at {}", size, path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn read_at(&self, addr: u32, len: usize) -> Result<Vec<u8>, FlashError> {
        if addr as u64 + len as u64 > self.size as u64 {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read past end of {} byte flash", self.size),
            )));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(addr as u64))?;
        let mut out = vec![0u8; len];
        file.read_exact(&mut out)?;
        Ok(out)
    }
}

impl Flash for FileFlash {
    fn erase_sector(&mut self, sector: u32) -> Result<(), FlashError> {
        let start = sector as u64 * SECTOR_SIZE as u64;
        if start + SECTOR_SIZE as u64 > self.size as u64 {
            return Err(FlashError::Erase {
                sector,
                reason: format!("beyond end of {} byte flash", self.size),
            });
        }
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(&[ERASED_BYTE; SECTOR_SIZE as usize])?;
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if addr as u64 + data.len() as u64 > self.size as u64 {
            return Err(FlashError::Program {
                addr,
                len: data.len(),
                reason: format!("beyond end of {} byte flash", self.size),
            });
        }
        // Programming can only clear bits.
        let mut cells = self.read_at(addr, data.len())?;
        for (cell, byte) in cells.iter_mut().zip(data) {
            *cell &= *byte;
        }
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.write_all(&cells)?;
        Ok(())
    }
}
