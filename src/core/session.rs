/// State of the single in-flight upgrade.
use std::fmt;
use std::net::SocketAddr;

use crate::core::error::UpgradeError;
use crate::flash::FlashWriter;
use crate::transport::ConnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchVersion,
    FetchFirmware,
}

/// What the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Connecting,
    AwaitingReply(Operation),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Resolving => write!(f, "resolving the server"),
            Phase::Connecting => write!(f, "connecting"),
            Phase::AwaitingReply(Operation::FetchVersion) => write!(f, "waiting for the version manifest"),
            Phase::AwaitingReply(Operation::FetchFirmware) => write!(f, "downloading firmware"),
        }
    }
}

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// New image fully written to the target slot
    Flashed,
    /// Server had nothing newer; nothing was written
    UpToDate,
}

/// Final report handed to the completion callback.
#[derive(Debug)]
pub struct UpgradeOutcome {
    /// Target slot, or `FLASH_BY_ADDR`
    pub slot: u8,
    pub result: Result<Completion, UpgradeError>,
}

impl UpgradeOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// True only when a new image is waiting in `slot`.
    pub fn flashed(&self) -> bool {
        matches!(self.result, Ok(Completion::Flashed))
    }
}

pub type DoneCallback = Box<dyn FnOnce(UpgradeOutcome) + Send>;

/// How the engine is leaving a session; reconciled with the persisted flag
/// during cleanup.
#[derive(Debug)]
pub(crate) enum Exit {
    Flashed,
    UpToDate,
    Failed(UpgradeError),
}

pub(crate) struct UpgradeSession {
    pub generation: u64,
    pub slot: u8,
    pub phase: Phase,
    pub conn: Option<ConnId>,
    pub addr: Option<SocketAddr>,
    /// Body bytes of the current reply consumed so far
    pub total_len: u32,
    /// Unknown until the reply head has been parsed
    pub content_len: Option<u32>,
    pub writer: FlashWriter,
    pub digest: md5::Context,
    pub on_done: DoneCallback,
}

impl UpgradeSession {
    pub fn new(generation: u64, slot: u8, writer: FlashWriter, on_done: DoneCallback) -> Self {
        Self {
            generation,
            slot,
            phase: Phase::Resolving,
            conn: None,
            addr: None,
            total_len: 0,
            content_len: None,
            writer,
            digest: md5::Context::new(),
            on_done,
        }
    }

    pub fn operation(&self) -> Operation {
        match self.phase {
            Phase::AwaitingReply(op) => op,
            _ => Operation::FetchVersion,
        }
    }

    /// A request for `op` was sent; expect a fresh reply head.
    pub fn begin_reply(&mut self, op: Operation) {
        self.phase = Phase::AwaitingReply(op);
        self.total_len = 0;
        self.content_len = None;
    }
}
