//! Open resource handles
//!
//! A [`Handle`] owns the mapped register windows of one resource and its
//! lease on that resource. It is usable from a successful
//! [`crate::FpgaManager::open`] until [`Handle::close`]; dropping an open
//! handle closes it.

use crate::config::HalConfig;
use crate::error::{FpgaError, Result};
use crate::mmio::{poll_bits, RegisterSpace};
use crate::platform::{Resource, ResourceId};
use crate::properties::{ObjectType, ResourceProperties};
use crate::zone::{Zone, ZonePath};
use fpga_chip::port;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Requested sharing of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Sole holder; fails if any handle is open on the resource
    #[default]
    Exclusive,
    /// Coexists with other shared handles
    Shared,
}

/// Reconfiguration state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigMode {
    /// Accelerator running; registers reachable directly
    Normal,
    /// Port held in soft reset for partial reconfiguration
    Reconfiguring,
}

#[derive(Debug, Clone, Copy)]
enum Lease {
    Exclusive,
    Shared(usize),
}

/// Per-resource open handles, shared by a manager and its handles
#[derive(Debug, Default)]
pub(crate) struct LeaseTable {
    leases: Mutex<HashMap<ResourceId, Lease>>,
}

impl LeaseTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn acquire(&self, id: &ResourceId, mode: AccessMode) -> Result<()> {
        let mut leases = self.lock();
        match (leases.get(id).copied(), mode) {
            (None, AccessMode::Exclusive) => {
                leases.insert(id.clone(), Lease::Exclusive);
            }
            (None, AccessMode::Shared) => {
                leases.insert(id.clone(), Lease::Shared(1));
            }
            (Some(Lease::Shared(n)), AccessMode::Shared) => {
                leases.insert(id.clone(), Lease::Shared(n + 1));
            }
            (Some(Lease::Exclusive), _) => {
                return Err(FpgaError::resource_busy(format!("{id} is open exclusively")));
            }
            (Some(Lease::Shared(n)), AccessMode::Exclusive) => {
                return Err(FpgaError::resource_busy(format!(
                    "{id} has {n} shared handle(s) open"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn release(&self, id: &ResourceId) {
        let mut leases = self.lock();
        match leases.get(id).copied() {
            Some(Lease::Shared(n)) if n > 1 => {
                leases.insert(id.clone(), Lease::Shared(n - 1));
            }
            Some(_) => {
                leases.remove(id);
            }
            None => tracing::warn!("Released {id} with no lease held"),
        }
    }

    pub(crate) fn holders(&self, id: &ResourceId) -> usize {
        match self.lock().get(id) {
            Some(Lease::Exclusive) => 1,
            Some(Lease::Shared(n)) => *n,
            None => 0,
        }
    }
}

/// State shared between a handle and the zones it hands out
#[derive(Debug)]
pub(crate) struct HandleInner {
    resource: Resource,
    mode: AccessMode,
    windows: Mutex<Vec<Arc<dyn RegisterSpace>>>,
    open: AtomicBool,
    companion: Mutex<Option<Arc<HandleInner>>>,
    leases: Arc<LeaseTable>,
    config: HalConfig,
}

impl HandleInner {
    pub(crate) fn id(&self) -> &ResourceId {
        &self.resource.id
    }

    pub(crate) fn config(&self) -> &HalConfig {
        &self.config
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(FpgaError::invalid_state(format!("Handle on {} is closed", self.id())))
        }
    }

    fn windows(&self) -> MutexGuard<'_, Vec<Arc<dyn RegisterSpace>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn window(&self, index: usize) -> Result<Arc<dyn RegisterSpace>> {
        let windows = self.windows();
        if !self.is_open() {
            return Err(FpgaError::invalid_state(format!("Handle on {} is closed", self.id())));
        }
        windows.get(index).cloned().ok_or_else(|| {
            FpgaError::invalid_argument(format!(
                "{} has {} window(s), not {index}",
                self.id(),
                windows.len()
            ))
        })
    }

    pub(crate) fn window_size(&self, index: usize) -> usize {
        self.windows().get(index).map_or(0, |w| w.size())
    }

    pub(crate) fn reconfig_mode(&self) -> Result<ReconfigMode> {
        if self.resource.properties.object_type == ObjectType::Device {
            return Ok(ReconfigMode::Normal);
        }
        let control = self.window(0)?.read_u64(port::CONTROL)?;
        Ok(if control & port::control::SOFT_RESET == 0 {
            ReconfigMode::Normal
        } else {
            ReconfigMode::Reconfiguring
        })
    }

    pub(crate) fn zone_path(&self) -> Result<ZonePath> {
        Ok(match self.reconfig_mode()? {
            ReconfigMode::Normal => ZonePath::Direct,
            ReconfigMode::Reconfiguring => ZonePath::Mediated,
        })
    }

    pub(crate) fn companion(&self) -> Result<Arc<HandleInner>> {
        let companion = self
            .companion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                FpgaError::invalid_state(format!(
                    "{} is reconfiguring and has no companion bound",
                    self.id()
                ))
            })?;
        companion.ensure_open()?;
        Ok(companion)
    }

    fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.companion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Unmaps once no in-flight access still holds a window.
        self.windows().clear();
        self.leases.release(self.id());
        true
    }
}

/// Open binding to one resource
///
/// ```
/// use fpga_driver::{AccessMode, FpgaManager, ObjectType, Properties};
///
/// # fn main() -> fpga_driver::Result<()> {
/// let mgr = FpgaManager::simulated();
/// let filter = Properties::new().with_object_type(ObjectType::Accelerator);
/// let found = mgr.enumerate(&[filter], 1)?;
///
/// let handle = mgr.open(&found.tokens[0], AccessMode::Exclusive)?;
/// handle.zone(0)?.write(0x100, 0x5a)?;
/// assert_eq!(handle.zone(0)?.read(0x100)?, 0x5a);
/// handle.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn new(
        resource: Resource,
        mode: AccessMode,
        windows: Vec<Arc<dyn RegisterSpace>>,
        leases: Arc<LeaseTable>,
        config: HalConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                resource,
                mode,
                windows: Mutex::new(windows),
                open: AtomicBool::new(true),
                companion: Mutex::new(None),
                leases,
                config,
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<HandleInner> {
        &self.inner
    }

    /// Platform name of the resource
    pub fn resource_id(&self) -> &ResourceId {
        self.inner.id()
    }

    /// Attributes of the resource at open time
    pub fn properties(&self) -> &ResourceProperties {
        &self.inner.resource.properties
    }

    /// Sharing mode the handle was opened with
    pub fn access_mode(&self) -> AccessMode {
        self.inner.mode
    }

    /// Number of mapped register windows, zero once closed
    pub fn num_windows(&self) -> usize {
        self.inner.windows().len()
    }

    /// Whether the handle has not been closed
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Release the resource and unmap its register windows
    ///
    /// Zones obtained from this handle stop working; they keep the handle's
    /// bookkeeping alive but not its mappings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the handle was already closed.
    pub fn close(&self) -> Result<()> {
        if !self.inner.close() {
            return Err(FpgaError::invalid_state(format!(
                "Handle on {} already closed",
                self.resource_id()
            )));
        }
        tracing::info!("Closed {}", self.resource_id());
        Ok(())
    }

    /// Protection zone over window `index`
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, `InvalidArgument` for an unknown
    /// window.
    pub fn zone(&self, index: usize) -> Result<Zone> {
        self.inner.ensure_open()?;
        self.inner.window(index)?;
        Ok(Zone::new(Arc::clone(&self.inner), index))
    }

    /// Current reconfiguration state, read from hardware
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, and propagates the register read.
    pub fn reconfig_mode(&self) -> Result<ReconfigMode> {
        self.inner.ensure_open()?;
        self.inner.reconfig_mode()
    }

    /// Read a 64-bit register of window `index` directly
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, `InvalidArgument` for a bad window
    /// or offset.
    pub fn read64(&self, index: usize, offset: usize) -> Result<u64> {
        self.inner.ensure_open()?;
        self.inner.window(index)?.read_u64(offset)
    }

    /// Write a 64-bit register of window `index` directly
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, `InvalidArgument` for a bad window
    /// or offset.
    pub fn write64(&self, index: usize, offset: usize, value: u64) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.window(index)?.write_u64(offset, value)
    }

    /// Read a 32-bit register of window `index` directly
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, `InvalidArgument` for a bad window
    /// or offset.
    pub fn read32(&self, index: usize, offset: usize) -> Result<u32> {
        self.inner.ensure_open()?;
        self.inner.window(index)?.read_u32(offset)
    }

    /// Write a 32-bit register of window `index` directly
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed, `InvalidArgument` for a bad window
    /// or offset.
    pub fn write32(&self, index: usize, offset: usize, value: u32) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.window(index)?.write_u32(offset, value)
    }

    /// Use `companion` (the owning device) for mediated access
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if either handle is closed, `InvalidArgument`
    /// unless this is an accelerator and `companion` its parent device.
    pub fn bind_companion(&self, companion: &Handle) -> Result<()> {
        self.inner.ensure_open()?;
        companion.inner.ensure_open()?;

        if self.inner.resource.parent.as_ref() != Some(companion.resource_id()) {
            return Err(FpgaError::invalid_argument(format!(
                "{} is not the device owning {}",
                companion.resource_id(),
                self.resource_id()
            )));
        }

        tracing::debug!("Bound {} to companion {}", self.resource_id(), companion.resource_id());
        *self
            .inner
            .companion
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&companion.inner));
        Ok(())
    }

    /// Drop the companion binding
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if closed.
    pub fn unbind_companion(&self) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner
            .companion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    /// Hold the port in soft reset and wait for the acknowledge
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a device handle, `Timeout` if the port
    /// does not acknowledge within the configured reset timeout.
    pub fn assert_reset(&self) -> Result<()> {
        self.set_reset(true)
    }

    /// Release the port from soft reset and wait for the acknowledge to drop
    ///
    /// # Errors
    ///
    /// Same as [`Self::assert_reset`].
    pub fn release_reset(&self) -> Result<()> {
        self.set_reset(false)
    }

    /// Pulse the port soft reset
    ///
    /// # Errors
    ///
    /// Same as [`Self::assert_reset`].
    pub fn reset(&self) -> Result<()> {
        self.assert_reset()?;
        self.release_reset()
    }

    fn set_reset(&self, asserted: bool) -> Result<()> {
        self.inner.ensure_open()?;
        if self.properties().object_type != ObjectType::Accelerator {
            return Err(FpgaError::invalid_argument(format!(
                "{} is not an accelerator port",
                self.resource_id()
            )));
        }

        let window = self.inner.window(0)?;
        let control = window.read_u64(port::CONTROL)?;
        let control = if asserted {
            control | port::control::SOFT_RESET
        } else {
            control & !port::control::SOFT_RESET
        };
        window.write_u64(port::CONTROL, control)?;

        poll_bits(
            window.as_ref(),
            port::CONTROL,
            port::control::SOFT_RESET_ACK,
            asserted,
            self.inner.config.reset_timeout,
            self.inner.config.mailbox_poll_interval,
        )?;

        tracing::debug!(
            "Port {} soft reset {}",
            self.resource_id(),
            if asserted { "asserted" } else { "released" }
        );
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.inner.close() {
            tracing::warn!("Handle on {} dropped without close", self.inner.id());
        }
    }
}
