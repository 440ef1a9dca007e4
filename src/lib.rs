//! Dual-bank over-the-air firmware updater.
//!
//! [`core::OtaEngine`] is a sans-IO state machine that fetches a version
//! manifest over HTTP, and when the server offers something newer, streams the
//! matching image into the bank that is not running. The platform supplies
//! the [`transport`], [`flash`] and [`boot`] services; [`services`] has host
//! implementations on tokio and plain files.
pub mod boot;
pub mod config;
pub mod core;
pub mod flash;
pub mod protocol;
pub mod services;
pub mod transport;

#[cfg(test)]
mod testing;
