pub mod engine;
pub mod error;
pub mod event;
mod negotiator;
pub mod session;
mod streamer;
pub mod updater;

pub use engine::OtaEngine;
pub use error::{StartError, UpgradeError};
pub use event::Event;
pub use session::{Completion, Operation, Phase, UpgradeOutcome};
