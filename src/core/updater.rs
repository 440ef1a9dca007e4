/// Async driver: pumps transport and timer events into the engine until the
/// running upgrade reports back.
use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::boot::Bootloader;
use crate::core::engine::OtaEngine;
use crate::core::event::Event;
use crate::core::session::UpgradeOutcome;
use crate::flash::Flash;
use crate::transport::{Transport, Watchdog};

/// What to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The rom matching the inactive bank
    InactiveSlot,
    /// The raw image, written at this flash address
    Address(u32),
}

pub struct Updater<T, W, F, B> {
    engine: OtaEngine<T, W, F, B>,
    /// Channel for receiving events from the transport and watchdog
    events: mpsc::UnboundedReceiver<Event>,
}

impl<T, W, F, B> Updater<T, W, F, B>
where
    T: Transport,
    W: Watchdog,
    F: Flash,
    B: Bootloader,
{
    /// `events` must be the receiving end of the channel the engine's
    /// transport and watchdog report into.
    pub fn new(engine: OtaEngine<T, W, F, B>, events: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { engine, events }
    }

    pub fn engine(&self) -> &OtaEngine<T, W, F, B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut OtaEngine<T, W, F, B> {
        &mut self.engine
    }

    /// Run one upgrade to completion.
    pub async fn run(&mut self, target: Target) -> Result<UpgradeOutcome> {
        let (done_tx, mut done_rx) = oneshot::channel();
        let on_done = move |outcome: UpgradeOutcome| {
            let _ = done_tx.send(outcome);
        };

        match target {
            Target::InactiveSlot => {
                let slot = self
                    .engine
                    .start_upgrade(on_done)
                    .context("Upgrade was not started")?;
                info!("Upgrade of slot {} started", slot);
            }
            Target::Address(address) => {
                self.engine
                    .start_raw_upgrade(address, on_done)
                    .context("Raw upgrade was not started")?;
                info!("Raw upgrade at 0x{:08X} started", address);
            }
        }

        loop {
            tokio::select! {
                outcome = &mut done_rx => {
                    return outcome.context("Upgrade session dropped without reporting");
                }
                event = self.events.recv() => match event {
                    Some(event) => self.engine.handle(event),
                    None => anyhow::bail!("Event channel closed while an upgrade was running"),
                },
            }
        }
    }
}
