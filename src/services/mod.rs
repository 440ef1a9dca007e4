/// Host implementations of the platform services the engine drives.
pub mod boot_store;
pub mod flash_file;
pub mod manager;
pub mod tcp;
pub mod watchdog;

pub use boot_store::FileBootStore;
pub use flash_file::FileFlash;
pub use manager::{DEFAULT_FLASH_SIZE, HostPaths, HostUpdater, build_updater};
pub use tcp::TcpTransport;
pub use watchdog::TokioWatchdog;
