//! Protection zones
//!
//! A zone is a read/write view of one register window of an open handle.
//! While the accelerator is usable its window is accessed directly. While
//! the port is held in soft reset (partial reconfiguration) direct access is
//! dropped by hardware, so the zone relays through the port mailbox feature
//! of the companion device instead. A device whose feature list has no
//! mailbox offers no mediated path and the access is refused before any
//! register is touched.
//!
//! ```text
//! Zone::read(offset)
//!   ├─ handle open?            no  → InvalidState
//!   ├─ offset in range/aligned? no → InvalidArgument
//!   ├─ resolve path (port CONTROL.SOFT_RESET)
//!   └─ dyn ProtectionZone
//!        ├─ DirectZone    window.read_u64(offset)
//!        └─ MediatedZone  companion PORT_MAILBOX feature:
//!                         CTRL/WR_DATA/RD_DATA + ack poll
//! ```
//!
//! The path is resolved on every call; nothing is cached.

use crate::dfl;
use crate::error::{FpgaError, Result};
use crate::handle::HandleInner;
use crate::mmio::{check_access, poll_bits, RegisterSpace};
use fpga_chip::{dfl::id, mailbox};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Access path taken by a zone operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePath {
    /// The resource's own register window
    Direct,
    /// Relayed through the companion mailbox
    Mediated,
}

/// Register access over one path
pub trait ProtectionZone: Debug + Send + Sync {
    /// Path this backend implements
    fn path(&self) -> ZonePath;

    /// Read the 64-bit register at `offset`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unreachable offset, `Timeout` if a
    /// mediated access is not acknowledged.
    fn read(&self, offset: usize) -> Result<u64>;

    /// Write the 64-bit register at `offset`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unreachable offset, `Timeout` if a
    /// mediated access is not acknowledged.
    fn write(&self, offset: usize, value: u64) -> Result<()>;
}

/// Direct window access
#[derive(Debug)]
pub struct DirectZone {
    window: Arc<dyn RegisterSpace>,
}

impl DirectZone {
    /// Zone over `window`
    pub fn new(window: Arc<dyn RegisterSpace>) -> Self {
        Self { window }
    }
}

impl ProtectionZone for DirectZone {
    fn path(&self) -> ZonePath {
        ZonePath::Direct
    }

    fn read(&self, offset: usize) -> Result<u64> {
        self.window.read_u64(offset)
    }

    fn write(&self, offset: usize, value: u64) -> Result<()> {
        self.window.write_u64(offset, value)
    }
}

/// Mailbox-relayed access
///
/// Write: clear CTRL, load WR_DATA, issue write command, poll ACK.
/// Read: clear CTRL, issue read command, poll ACK, fetch RD_DATA.
#[derive(Debug)]
pub struct MediatedZone {
    mailbox: Arc<dyn RegisterSpace>,
    base: usize,
    timeout: Duration,
    poll_interval: Duration,
}

impl MediatedZone {
    /// Zone relaying through the mailbox feature at `base` in `mailbox`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the feature registers do not fit the
    /// window.
    pub fn new(
        mailbox: Arc<dyn RegisterSpace>,
        base: usize,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        check_access(base.saturating_add(mailbox::RD_DATA), 8, mailbox.size())?;
        Ok(Self {
            mailbox,
            base,
            timeout,
            poll_interval,
        })
    }

    fn check_address(offset: usize) -> Result<()> {
        if offset > mailbox::MAX_ADDRESS {
            return Err(FpgaError::invalid_argument(format!(
                "Offset {offset:#x} not reachable through mailbox (max {:#x})",
                mailbox::MAX_ADDRESS
            )));
        }
        Ok(())
    }

    fn wait_ack(&self) -> Result<()> {
        poll_bits(
            self.mailbox.as_ref(),
            self.base + mailbox::CTRL,
            mailbox::ACK,
            true,
            self.timeout,
            self.poll_interval,
        )
        .map(|_| ())
    }
}

impl ProtectionZone for MediatedZone {
    fn path(&self) -> ZonePath {
        ZonePath::Mediated
    }

    fn read(&self, offset: usize) -> Result<u64> {
        Self::check_address(offset)?;
        let ctrl = self.base + mailbox::CTRL;

        self.mailbox.write_u64(ctrl, 0)?;
        self.mailbox
            .write_u64(ctrl, mailbox::command(mailbox::CMD_READ, offset))?;
        self.wait_ack()?;

        let value = self.mailbox.read_u64(self.base + mailbox::RD_DATA)?;
        tracing::trace!("Mediated read @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write(&self, offset: usize, value: u64) -> Result<()> {
        Self::check_address(offset)?;
        tracing::trace!("Mediated write @ {offset:#x} = {value:#x}");
        let ctrl = self.base + mailbox::CTRL;

        self.mailbox.write_u64(ctrl, 0)?;
        self.mailbox.write_u64(self.base + mailbox::WR_DATA, value)?;
        self.mailbox
            .write_u64(ctrl, mailbox::command(mailbox::CMD_WRITE, offset))?;
        self.wait_ack()
    }
}

/// Protection zone bound to one window of a handle
///
/// Obtained from [`crate::Handle::zone`]. Every operation fails with
/// `InvalidState` once the handle is closed.
#[derive(Debug, Clone)]
pub struct Zone {
    handle: Arc<HandleInner>,
    index: usize,
}

impl Zone {
    pub(crate) fn new(handle: Arc<HandleInner>, index: usize) -> Self {
        Self { handle, index }
    }

    /// Window index within the handle
    pub fn index(&self) -> usize {
        self.index
    }

    /// Window size in bytes
    pub fn size(&self) -> usize {
        self.handle.window_size(self.index)
    }

    /// Path the next access would take
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the handle is closed, and propagates the
    /// port control read.
    pub fn path(&self) -> Result<ZonePath> {
        self.handle.ensure_open()?;
        self.handle.zone_path()
    }

    /// Read the 64-bit register at `offset`
    ///
    /// # Errors
    ///
    /// `InvalidState` after close, or for a mediated path with no open
    /// companion or a companion without a mailbox feature. `InvalidArgument`
    /// for a bad offset, `Timeout` if the mailbox does not acknowledge.
    pub fn read(&self, offset: usize) -> Result<u64> {
        self.handle.ensure_open()?;
        check_access(offset, 8, self.size())?;
        self.backend()?.read(offset)
    }

    /// Write the 64-bit register at `offset`
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`]. A rejected offset never reaches hardware.
    pub fn write(&self, offset: usize, value: u64) -> Result<()> {
        self.handle.ensure_open()?;
        check_access(offset, 8, self.size())?;
        self.backend()?.write(offset, value)
    }

    fn backend(&self) -> Result<Box<dyn ProtectionZone>> {
        let path = self.handle.zone_path()?;
        tracing::trace!("Zone {} of {} via {path:?}", self.index, self.handle.id());

        match path {
            ZonePath::Direct => Ok(Box::new(DirectZone::new(self.handle.window(self.index)?))),
            ZonePath::Mediated => {
                if self.index != 0 {
                    return Err(FpgaError::invalid_state(format!(
                        "No mediated path for window {}",
                        self.index
                    )));
                }
                let companion = self.handle.companion()?;
                let config = self.handle.config();
                let window = companion.window(0)?;
                let base = dfl::features(window.as_ref(), config.max_features)?
                    .into_iter()
                    .find(|f| f.id == id::PORT_MAILBOX)
                    .map(|f| f.offset)
                    .ok_or_else(|| {
                        FpgaError::invalid_state(format!(
                            "{} has no port mailbox; no mediated path to {}",
                            companion.id(),
                            self.handle.id()
                        ))
                    })?;
                Ok(Box::new(MediatedZone::new(
                    window,
                    base,
                    config.mailbox_timeout,
                    config.mailbox_poll_interval,
                )?))
            }
        }
    }
}
