/// Everything that can re-enter the update engine.
use std::net::IpAddr;

use crate::transport::{ConnId, TransportError};

#[derive(Debug)]
pub enum Event {
    /// Asynchronous name lookup finished (`None` = lookup failed)
    Resolved { generation: u64, addr: Option<IpAddr> },
    Connected { conn: ConnId },
    Received { conn: ConnId, data: Vec<u8> },
    Disconnected { conn: ConnId },
    /// Connect failure or socket error
    Error { conn: ConnId, error: TransportError },
    TimerFired { epoch: u64 },
}
