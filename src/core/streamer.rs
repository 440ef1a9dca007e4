/// Firmware download: every body segment goes straight into flash.
use tracing::{debug, info};

use crate::boot::{Bootloader, UpgradeFlag};
use crate::core::engine::OtaEngine;
use crate::core::error::UpgradeError;
use crate::core::session::{Exit, UpgradeSession};
use crate::flash::Flash;
use crate::protocol::parse_response_head;
use crate::transport::{Transport, Watchdog};

enum Progress {
    Partial,
    Complete,
}

impl<T, W, F, B> OtaEngine<T, W, F, B>
where
    T: Transport,
    W: Watchdog,
    F: Flash,
    B: Bootloader,
{
    pub(super) fn on_firmware_data(&mut self, data: &[u8]) {
        let max_image_size = self.config.max_image_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match stream_segment(session, &mut self.flash, max_image_size, data) {
            Ok(Progress::Partial) => self.arm_watchdog(),
            Ok(Progress::Complete) => self.complete_download(),
            Err(e) => self.finish_upgrade(Exit::Failed(e)),
        }
    }

    /// All bytes are in: flush the writer tail, then mark the flag finished.
    fn complete_download(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.writer.finish(&mut self.flash) {
            return self.finish_upgrade(Exit::Failed(e.into()));
        }

        let digest = session.digest.clone().compute();
        info!(
            "Image complete: {} bytes ending at 0x{:08X}, md5 {:x}",
            session.writer.accepted(),
            session.writer.cursor(),
            digest
        );

        match self.boot.set_upgrade_flag(UpgradeFlag::Finished) {
            Ok(()) => self.finish_upgrade(Exit::Flashed),
            Err(e) => self.finish_upgrade(Exit::Failed(e.into())),
        }
    }
}

fn stream_segment<F: Flash>(
    session: &mut UpgradeSession,
    flash: &mut F,
    max_image_size: u32,
    data: &[u8],
) -> Result<Progress, UpgradeError> {
    let (expected, body) = match session.content_len {
        Some(expected) => (expected, data),
        None => {
            let head = parse_response_head(data)?;
            let size = head.content_length;
            if size == 0 || size > max_image_size {
                return Err(UpgradeError::BadImageSize {
                    size,
                    max: max_image_size,
                });
            }
            info!("Downloading {} byte image into slot {}", size, session.slot);
            session.content_len = Some(size);
            (size, head.body)
        }
    };

    let remaining = expected - session.total_len;
    if body.len() as u64 > remaining as u64 {
        return Err(UpgradeError::BodyOverrun {
            content_len: expected,
        });
    }

    session.writer.write_chunk(flash, body)?;
    session.digest.consume(body);
    session.total_len += body.len() as u32;
    debug!("Written {}/{} bytes", session.total_len, expected);

    if session.total_len == expected {
        Ok(Progress::Complete)
    } else {
        Ok(Progress::Partial)
    }
}
