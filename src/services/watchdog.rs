/// One-shot timer backed by a sleeping tokio task.
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::Event;
use crate::transport::Watchdog;

pub struct TokioWatchdog {
    events: mpsc::UnboundedSender<Event>,
    pending: Option<JoinHandle<()>>,
}

impl TokioWatchdog {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            pending: None,
        }
    }
}

impl Watchdog for TokioWatchdog {
    fn arm(&mut self, epoch: u64, after: Duration) {
        self.disarm();
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Event::TimerFired { epoch });
        }));
    }

    fn disarm(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for TokioWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
