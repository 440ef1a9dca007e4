/// Version negotiation: ask for the manifest, decide whether to download.
use tracing::{debug, info};

use crate::boot::Bootloader;
use crate::core::engine::OtaEngine;
use crate::core::error::UpgradeError;
use crate::core::session::{Exit, Operation, Phase};
use crate::flash::Flash;
use crate::protocol::{FirmwareVersion, build_get_request, parse_manifest, parse_response_head};
use crate::transport::{ConnId, Transport, Watchdog};

impl<T, W, F, B> OtaEngine<T, W, F, B>
where
    T: Transport,
    W: Watchdog,
    F: Flash,
    B: Bootloader,
{
    pub(super) fn on_connected(&mut self, conn: ConnId) {
        let connecting = self
            .session
            .as_ref()
            .is_some_and(|s| s.phase == Phase::Connecting);
        if !connecting {
            debug!("Duplicate connect notification for {}", conn);
            return;
        }
        self.disarm_watchdog();

        if let Some(session) = self.session.as_mut() {
            let addr = session.addr.map(|a| a.to_string()).unwrap_or_default();
            info!(
                "Connected to {} ({}), requesting {}{}",
                self.server.host, addr, self.server.path, self.server.version_file
            );
            session.begin_reply(Operation::FetchVersion);
        }
        let request = build_get_request(&self.server.host, &self.server.path, &self.server.version_file);
        self.send_request(conn, &request);
    }

    /// Send on the session's connection and wait for the answer.
    pub(super) fn send_request(&mut self, conn: ConnId, request: &[u8]) {
        match self.transport.send(conn, request) {
            Ok(()) => self.arm_watchdog(),
            Err(e) => self.finish_upgrade(Exit::Failed(e.into())),
        }
    }

    pub(super) fn on_version_reply(&mut self, data: &[u8]) {
        let server_version = match read_manifest(data) {
            Ok(version) => version,
            Err(e) => return self.finish_upgrade(Exit::Failed(e)),
        };

        let local = self.config.local_version;
        if !server_version.is_newer_than(&local) {
            info!("Running {}, server offers {}: nothing to do", local, server_version);
            return self.finish_upgrade(Exit::UpToDate);
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(conn) = session.conn else {
            return self.finish_upgrade(Exit::Failed(UpgradeError::Disconnected));
        };

        let file = self.server.firmware_file(session.slot);
        info!(
            "Server offers {} (running {}), fetching {}{}",
            server_version, local, self.server.path, file
        );
        session.begin_reply(Operation::FetchFirmware);
        let request = build_get_request(&self.server.host, &self.server.path, file);
        self.send_request(conn, &request);
    }
}

/// The manifest must arrive whole in the first segment of the reply.
fn read_manifest(data: &[u8]) -> Result<FirmwareVersion, UpgradeError> {
    let head = parse_response_head(data)?;
    if head.body.len() < head.content_length as usize {
        debug!(
            "Manifest reply carries {} of {} bytes, parsing what arrived",
            head.body.len(),
            head.content_length
        );
    }
    Ok(parse_manifest(head.body)?)
}
