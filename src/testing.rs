//! In-memory collaborators for driving the engine deterministically in tests.
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::boot::{BootError, Bootloader, RbootConfig, UpgradeFlag};
use crate::core::UpgradeOutcome;
use crate::flash::{ERASED_BYTE, Flash, FlashError, SECTOR_SIZE};
use crate::transport::{ConnId, Resolution, Transport, TransportError, Watchdog};

pub enum ResolveMode {
    Ready(IpAddr),
    Pending,
    Reject,
}

/// Records every call; connection ids start at 1.
pub struct FakeTransport {
    mode: ResolveMode,
    next_conn: u64,
    pub resolves: Vec<(String, u64)>,
    pub connects: Vec<(SocketAddr, ConnId)>,
    pub sent: Vec<(ConnId, Vec<u8>)>,
    pub disconnects: Vec<ConnId>,
    pub fail_send: bool,
}

impl FakeTransport {
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            next_conn: 1,
            resolves: Vec::new(),
            connects: Vec::new(),
            sent: Vec::new(),
            disconnects: Vec::new(),
            fail_send: false,
        }
    }
}

impl Transport for FakeTransport {
    fn resolve(&mut self, host: &str, generation: u64) -> Result<Resolution, TransportError> {
        self.resolves.push((host.to_string(), generation));
        match self.mode {
            ResolveMode::Ready(ip) => Ok(Resolution::Ready(ip)),
            ResolveMode::Pending => Ok(Resolution::Pending),
            ResolveMode::Reject => Err(TransportError::InvalidHost(host.to_string())),
        }
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<ConnId, TransportError> {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;
        self.connects.push((addr, conn));
        Ok(conn)
    }

    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::NotConnected(conn));
        }
        self.sent.push((conn, bytes.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnId) {
        self.disconnects.push(conn);
    }
}

#[derive(Default)]
pub struct FakeWatchdog {
    pub armed: Option<(u64, Duration)>,
    pub last_epoch: u64,
}

impl Watchdog for FakeWatchdog {
    fn arm(&mut self, epoch: u64, after: Duration) {
        self.armed = Some((epoch, after));
        self.last_epoch = epoch;
    }

    fn disarm(&mut self) {
        self.armed = None;
    }
}

/// NOR flash in a `Vec`. Starts zeroed so unerased writes show up as corruption.
pub struct MemFlash {
    pub data: Vec<u8>,
    pub erased: Vec<u32>,
    pub writes: usize,
    pub fail_writes: bool,
}

impl MemFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0x00; size],
            erased: Vec::new(),
            writes: 0,
            fail_writes: false,
        }
    }
}

impl Flash for MemFlash {
    fn erase_sector(&mut self, sector: u32) -> Result<(), FlashError> {
        let start = (sector * SECTOR_SIZE) as usize;
        self.data[start..start + SECTOR_SIZE as usize].fill(ERASED_BYTE);
        self.erased.push(sector);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if self.fail_writes {
            return Err(FlashError::Program {
                addr,
                len: data.len(),
                reason: "injected failure".into(),
            });
        }
        assert_eq!(addr % 4, 0, "unaligned program at 0x{addr:X}");
        assert_eq!(data.len() % 4, 0, "unaligned length {}", data.len());
        let start = addr as usize;
        for (dst, src) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        self.writes += 1;
        Ok(())
    }
}

/// Bootloader with the default two-bank layout. The flag is shared so a
/// completion callback can observe it.
pub struct MemBoot {
    config: RbootConfig,
    flag: Arc<Mutex<UpgradeFlag>>,
    pub reboots: usize,
    /// Reject every `set_upgrade_flag` while set
    pub fail_flag_writes: bool,
}

impl MemBoot {
    pub fn new(active: u8) -> Self {
        Self {
            config: RbootConfig {
                current_rom: active,
                ..RbootConfig::default()
            },
            flag: Arc::new(Mutex::new(UpgradeFlag::Idle)),
            reboots: 0,
            fail_flag_writes: false,
        }
    }

    /// Layout with only slot 0, so slot 1 has no address.
    pub fn single_bank(active: u8) -> Self {
        let mut boot = Self::new(active);
        boot.config.count = 1;
        boot
    }

    pub fn flag(&self) -> UpgradeFlag {
        *self.flag.lock().unwrap()
    }

    pub fn set_flag(&mut self, flag: UpgradeFlag) {
        *self.flag.lock().unwrap() = flag;
    }

    pub fn flag_handle(&self) -> Arc<Mutex<UpgradeFlag>> {
        self.flag.clone()
    }
}

impl Bootloader for MemBoot {
    fn active_slot(&self) -> Result<u8, BootError> {
        Ok(self.config.current_rom)
    }

    fn set_active_slot(&mut self, slot: u8) -> Result<(), BootError> {
        self.config.rom_address(slot)?;
        self.config.current_rom = slot;
        Ok(())
    }

    fn slot_address(&self, slot: u8) -> Result<u32, BootError> {
        self.config.rom_address(slot)
    }

    fn upgrade_flag(&self) -> Result<UpgradeFlag, BootError> {
        Ok(self.flag())
    }

    fn set_upgrade_flag(&mut self, flag: UpgradeFlag) -> Result<(), BootError> {
        if self.fail_flag_writes {
            return Err(BootError::Io(std::io::Error::other("flag sector write failed")));
        }
        self.set_flag(flag);
        Ok(())
    }

    fn reboot(&mut self) -> Result<(), BootError> {
        self.reboots += 1;
        Ok(())
    }
}

/// Collects completion reports and the flag value seen at each one.
pub struct Recorder {
    outcomes: Arc<Mutex<Vec<UpgradeOutcome>>>,
    flags_seen: Arc<Mutex<Vec<UpgradeFlag>>>,
    flag: Arc<Mutex<UpgradeFlag>>,
}

impl Recorder {
    pub fn new(flag: Arc<Mutex<UpgradeFlag>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            flags_seen: Arc::new(Mutex::new(Vec::new())),
            flag,
        }
    }

    pub fn callback(&self) -> impl FnOnce(UpgradeOutcome) + Send + 'static + use<> {
        let outcomes = self.outcomes.clone();
        let flags_seen = self.flags_seen.clone();
        let flag = self.flag.clone();
        move |outcome| {
            flags_seen.lock().unwrap().push(*flag.lock().unwrap());
            outcomes.lock().unwrap().push(outcome);
        }
    }

    pub fn outcomes(&self) -> MutexGuard<'_, Vec<UpgradeOutcome>> {
        self.outcomes.lock().unwrap()
    }

    pub fn flag_at_callback(&self) -> Vec<UpgradeFlag> {
        self.flags_seen.lock().unwrap().clone()
    }
}
