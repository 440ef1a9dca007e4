/// Network and timer primitives the update engine drives.
///
/// Every operation returns immediately. Outcomes arrive later as
/// [`Event`](crate::core::event::Event)s delivered to the engine.
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Identifies one TCP connection for its whole lifetime. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Result of starting a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Address known already (literal or cached)
    Ready(IpAddr),
    /// Lookup in flight; an `Event::Resolved` follows
    Pending,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid host name {0:?}")]
    InvalidHost(String),
    #[error("{0} is not open")]
    NotConnected(ConnId),
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Transport {
    /// Start resolving `host`. `generation` is echoed back in `Event::Resolved`.
    fn resolve(&mut self, host: &str, generation: u64) -> Result<Resolution, TransportError>;
    /// Open a connection. Completion arrives as `Event::Connected` or `Event::Error`.
    fn connect(&mut self, addr: SocketAddr) -> Result<ConnId, TransportError>;
    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), TransportError>;
    /// Close a connection. Safe to call on a connection that is already gone.
    fn disconnect(&mut self, conn: ConnId);
}

/// The single reusable one-shot timer.
pub trait Watchdog {
    /// Fire `Event::TimerFired { epoch }` after `after`, replacing any armed timer.
    fn arm(&mut self, epoch: u64, after: Duration);
    fn disarm(&mut self);
}
