/// OTA update engine.
///
/// A single-flight state machine fed one [`Event`] at a time. It owns the
/// collaborators (transport, watchdog timer, flash, bootloader) and at most one
/// [`UpgradeSession`]. Every exit path, success or failure, goes through
/// [`OtaEngine::finish_upgrade`], which releases the session exactly once and
/// fires the completion callback exactly once.
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, warn};

use crate::boot::{Bootloader, FLASH_BY_ADDR, UpgradeFlag, inactive_slot};
use crate::config::{EngineConfig, ServerConfig};
use crate::core::error::{StartError, UpgradeError};
use crate::core::event::Event;
use crate::core::session::{Completion, DoneCallback, Exit, Operation, Phase, UpgradeOutcome, UpgradeSession};
use crate::flash::{Flash, FlashWriter};
use crate::transport::{ConnId, Resolution, Transport, Watchdog};

pub struct OtaEngine<T, W, F, B> {
    pub(super) server: ServerConfig,
    pub(super) config: EngineConfig,
    pub(super) transport: T,
    watchdog: W,
    pub(super) flash: F,
    pub(super) boot: B,
    pub(super) session: Option<UpgradeSession>,
    next_generation: u64,
    /// Bumped on every arm; a firing for any other epoch is stale
    timer_epoch: u64,
    timer_armed: bool,
}

impl<T, W, F, B> OtaEngine<T, W, F, B>
where
    T: Transport,
    W: Watchdog,
    F: Flash,
    B: Bootloader,
{
    pub fn new(
        server: ServerConfig,
        config: EngineConfig,
        transport: T,
        watchdog: W,
        flash: F,
        boot: B,
    ) -> Self {
        Self {
            server,
            config,
            transport,
            watchdog,
            flash,
            boot,
            session: None,
            next_generation: 1,
            timer_epoch: 0,
            timer_armed: false,
        }
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    /// Generation of the running session, echoed back by `Event::Resolved`.
    pub fn current_generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn bootloader(&self) -> &B {
        &self.boot
    }

    pub fn bootloader_mut(&mut self) -> &mut B {
        &mut self.boot
    }

    /// Download the newer firmware, if any, into the inactive bank.
    ///
    /// Returns the target slot once the session is admitted; `on_done` then
    /// fires exactly once. On `Err` nothing was started and `on_done` is dropped
    /// without being called.
    pub fn start_upgrade<C>(&mut self, on_done: C) -> Result<u8, StartError>
    where
        C: FnOnce(UpgradeOutcome) + Send + 'static,
    {
        self.ensure_idle()?;
        let active = self.boot.active_slot()?;
        let slot = inactive_slot(active);
        let base = self.boot.slot_address(slot)?;
        info!("Running from slot {}, updating slot {} at 0x{:08X}", active, slot, base);
        self.begin(slot, base, Box::new(on_done))?;
        Ok(slot)
    }

    /// Same as [`start_upgrade`](Self::start_upgrade) but writes the raw image
    /// at `address`, bypassing the banks.
    pub fn start_raw_upgrade<C>(&mut self, address: u32, on_done: C) -> Result<(), StartError>
    where
        C: FnOnce(UpgradeOutcome) + Send + 'static,
    {
        self.ensure_idle()?;
        info!("Flashing raw image at 0x{:08X}", address);
        self.begin(FLASH_BY_ADDR, address, Box::new(on_done))
    }

    fn ensure_idle(&self) -> Result<(), StartError> {
        if self.session.is_some() || self.boot.upgrade_flag()? == UpgradeFlag::Started {
            warn!("Upgrade requested while another one is in progress");
            return Err(StartError::InProgress);
        }
        Ok(())
    }

    fn begin(&mut self, slot: u8, base: u32, on_done: DoneCallback) -> Result<(), StartError> {
        let writer = FlashWriter::new(base, self.config.max_image_size);
        self.boot.set_upgrade_flag(UpgradeFlag::Started)?;

        let generation = self.next_generation;
        self.next_generation += 1;
        self.session = Some(UpgradeSession::new(generation, slot, writer, on_done));
        self.arm_watchdog();

        match self.transport.resolve(&self.server.host, generation) {
            Ok(Resolution::Ready(ip)) => {
                self.disarm_watchdog();
                self.on_resolved(ip);
            }
            Ok(Resolution::Pending) => {
                debug!("Resolving {}", self.server.host);
            }
            Err(e) => {
                warn!("Cannot resolve {}: {}", self.server.host, e);
                self.disarm_watchdog();
                self.session = None;
                if let Err(e) = self.boot.set_upgrade_flag(UpgradeFlag::Idle) {
                    warn!("Failed to reset upgrade flag: {}", e);
                }
                return Err(StartError::Resolve(e));
            }
        }
        Ok(())
    }

    /// Feed one transport or timer event into the engine.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Resolved { generation, addr } => {
                let waiting = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.generation == generation && s.phase == Phase::Resolving);
                if !waiting {
                    debug!("Ignoring stale lookup result for session {}", generation);
                    return;
                }
                self.disarm_watchdog();
                match addr {
                    Some(ip) => self.on_resolved(ip),
                    None => {
                        let host = self.server.host.clone();
                        self.finish_upgrade(Exit::Failed(UpgradeError::DnsFailed(host)));
                    }
                }
            }
            Event::Connected { conn } => {
                if self.owns(conn) {
                    self.on_connected(conn);
                } else {
                    debug!("Ignoring connect of stale {}", conn);
                }
            }
            Event::Received { conn, data } => {
                if self.owns(conn) {
                    self.on_received(&data);
                } else {
                    debug!("Dropping {} bytes from stale {}", data.len(), conn);
                }
            }
            Event::Disconnected { conn } => self.on_disconnected(conn),
            Event::Error { conn, error } => {
                if !self.owns(conn) {
                    debug!("Ignoring error on stale {}: {}", conn, error);
                    return;
                }
                warn!("Transport error on {}: {}", conn, error);
                self.disarm_watchdog();
                self.finish_upgrade(Exit::Failed(error.into()));
            }
            Event::TimerFired { epoch } => self.on_timer(epoch),
        }
    }

    fn owns(&self, conn: ConnId) -> bool {
        self.session.as_ref().is_some_and(|s| s.conn == Some(conn))
    }

    fn on_resolved(&mut self, ip: IpAddr) {
        let addr = SocketAddr::new(ip, self.server.port);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.addr = Some(addr);

        match self.transport.connect(addr) {
            Ok(conn) => {
                debug!("Connecting to {} on {}", addr, conn);
                session.conn = Some(conn);
                session.phase = Phase::Connecting;
                self.arm_watchdog();
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", addr, e);
                self.finish_upgrade(Exit::Failed(e.into()));
            }
        }
    }

    fn on_received(&mut self, data: &[u8]) {
        let phase = match self.session.as_ref() {
            Some(session) => session.phase,
            None => return,
        };
        match phase {
            Phase::AwaitingReply(Operation::FetchVersion) => {
                self.disarm_watchdog();
                self.on_version_reply(data);
            }
            Phase::AwaitingReply(Operation::FetchFirmware) => {
                self.disarm_watchdog();
                self.on_firmware_data(data);
            }
            _ => debug!("Dropping {} bytes received before any request", data.len()),
        }
    }

    fn on_disconnected(&mut self, conn: ConnId) {
        // The session may already be gone, or belong to a later attempt.
        let Some(session) = self.session.as_mut().filter(|s| s.conn == Some(conn)) else {
            debug!("Ignoring disconnect of stale {}", conn);
            return;
        };
        session.conn = None;

        let error = match (session.phase, session.content_len) {
            (Phase::AwaitingReply(Operation::FetchFirmware), Some(expected)) => {
                UpgradeError::Incomplete {
                    received: session.total_len,
                    expected,
                }
            }
            _ => UpgradeError::Disconnected,
        };
        warn!("{} closed: {}", conn, error);
        self.disarm_watchdog();
        self.finish_upgrade(Exit::Failed(error));
    }

    fn on_timer(&mut self, epoch: u64) {
        if !self.timer_armed || epoch != self.timer_epoch {
            debug!("Ignoring stale watchdog epoch {}", epoch);
            return;
        }
        self.timer_armed = false;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let phase = session.phase;
        warn!("Watchdog expired while {}", phase);

        if phase == Phase::Connecting {
            // Treat an overdue connect like the connection dropping.
            if let Some(conn) = session.conn.take() {
                self.transport.disconnect(conn);
            }
        }
        self.finish_upgrade(Exit::Failed(UpgradeError::Timeout(phase)));
    }

    pub(super) fn arm_watchdog(&mut self) {
        self.watchdog.disarm();
        self.timer_epoch += 1;
        self.timer_armed = true;
        self.watchdog.arm(self.timer_epoch, self.config.network_timeout);
    }

    pub(super) fn disarm_watchdog(&mut self) {
        self.watchdog.disarm();
        self.timer_armed = false;
    }

    /// Single cleanup and notification point. Safe to call when no session
    /// exists.
    pub(super) fn finish_upgrade(&mut self, exit: Exit) {
        self.disarm_watchdog();

        let Some(session) = self.session.take() else {
            debug!("Cleanup requested with no active session");
            return;
        };
        let operation = session.operation();
        let UpgradeSession {
            generation,
            slot,
            conn,
            on_done,
            ..
        } = session;

        if let Some(conn) = conn {
            self.transport.disconnect(conn);
        }

        let flag = self.boot.upgrade_flag().unwrap_or_else(|e| {
            warn!("Cannot read upgrade flag: {}", e);
            UpgradeFlag::Idle
        });

        let result = if flag == UpgradeFlag::Finished {
            Ok(Completion::Flashed)
        } else {
            if let Err(e) = self.boot.set_upgrade_flag(UpgradeFlag::Idle) {
                warn!("Failed to reset upgrade flag: {}", e);
            }
            match exit {
                Exit::UpToDate => Ok(Completion::UpToDate),
                Exit::Failed(error) => Err(error),
                Exit::Flashed => Err(UpgradeError::NotConfirmed),
            }
        };

        match &result {
            Ok(Completion::Flashed) => info!("Upgrade {} complete, new image in slot {}", generation, slot),
            Ok(Completion::UpToDate) => info!("Upgrade {} finished, firmware already current", generation),
            Err(e) => warn!("Upgrade {} failed during {:?}: {}", generation, operation, e),
        }

        on_done(UpgradeOutcome { slot, result });
    }
}
