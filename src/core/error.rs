use crate::boot::BootError;
use crate::core::session::Phase;
use crate::flash::FlashError;
use crate::protocol::{HttpError, ManifestError};
use crate::transport::TransportError;

/// Why an upgrade was refused before it started. No callback follows.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("an upgrade is already in progress")]
    InProgress,
    #[error("bootloader: {0}")]
    Boot(#[from] BootError),
    #[error("name lookup rejected: {0}")]
    Resolve(#[from] TransportError),
}

/// Why an admitted upgrade failed. Delivered through the completion callback.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("DNS lookup for {0} failed")]
    DnsFailed(String),
    #[error("timed out while {0}")]
    Timeout(Phase),
    #[error("connection closed by server")]
    Disconnected,
    #[error("connection closed after {received} of {expected} bytes")]
    Incomplete { received: u32, expected: u32 },
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("http: {0}")]
    Http(#[from] HttpError),
    #[error("version manifest: {0}")]
    Manifest(#[from] ManifestError),
    #[error("reply body longer than its Content-Length of {content_len}")]
    BodyOverrun { content_len: u32 },
    #[error("image size {size} not accepted (limit {max})")]
    BadImageSize { size: u32, max: u32 },
    #[error("flash: {0}")]
    Flash(#[from] FlashError),
    #[error("bootloader: {0}")]
    Boot(#[from] BootError),
    #[error("download ended but the upgrade flag was never marked finished")]
    NotConfirmed,
}
