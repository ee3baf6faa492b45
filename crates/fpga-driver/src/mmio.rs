//! Memory-mapped register windows
//!
//! [`RegisterSpace`] is the seam between the access layer and whatever backs
//! a window: a real `mmap` of a PCI resource file ([`MmapRegion`]) or the
//! simulated card in [`crate::platform::sim`].
//!
//! All accesses are bounds-checked and naturally aligned. An access that
//! fails the check returns `InvalidArgument` and never reaches hardware.
//!
//! # Evolution
//!
//! Mapping goes through `rustix` safe wrappers rather than raw libc.

use crate::error::{FpgaError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::{Duration, Instant};

/// A window of 32/64-bit hardware registers
///
/// Writes take `&self`: several handles (and threads) may share one window.
/// Ordering between concurrent writers to the same register is the caller's
/// responsibility.
pub trait RegisterSpace: Debug + Send + Sync {
    /// Window size in bytes
    fn size(&self) -> usize;

    /// Read a 64-bit register
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the access is out of bounds or misaligned.
    fn read_u64(&self, offset: usize) -> Result<u64>;

    /// Write a 64-bit register
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the access is out of bounds or misaligned.
    fn write_u64(&self, offset: usize, value: u64) -> Result<()>;

    /// Read a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the access is out of bounds or misaligned.
    fn read_u32(&self, offset: usize) -> Result<u32>;

    /// Write a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the access is out of bounds or misaligned.
    fn write_u32(&self, offset: usize, value: u32) -> Result<()>;
}

/// Validate an access of `width` bytes at `offset` in a window of `size`
///
/// # Errors
///
/// Returns `InvalidArgument` if the access would leave the window or is not
/// aligned to its width.
pub fn check_access(offset: usize, width: usize, size: usize) -> Result<()> {
    if offset.checked_add(width).map_or(true, |end| end > size) {
        return Err(FpgaError::invalid_argument(format!(
            "Out of bounds access: offset={offset:#x}, size={width}, limit={size:#x}"
        )));
    }
    if offset % width != 0 {
        return Err(FpgaError::invalid_argument(format!(
            "Misaligned access: offset={offset:#x}, size={width}"
        )));
    }
    Ok(())
}

/// Poll a register until `(value & mask != 0) == set`
///
/// # Errors
///
/// Returns `Timeout` once `timeout` elapses, and propagates read failures.
pub(crate) fn poll_bits(
    region: &dyn RegisterSpace,
    offset: usize,
    mask: u64,
    set: bool,
    timeout: Duration,
    interval: Duration,
) -> Result<u64> {
    let start = Instant::now();

    loop {
        let value = region.read_u64(offset)?;
        if (value & mask != 0) == set {
            return Ok(value);
        }

        if start.elapsed() > timeout {
            tracing::debug!("Timeout waiting for {mask:#x} at {offset:#x} (last {value:#x})");
            return Err(FpgaError::timeout(timeout));
        }

        std::thread::sleep(interval);
    }
}

/// Memory-mapped PCI resource file
///
/// Maps the whole file shared, read/write. The file stays open for the
/// lifetime of the mapping and the mapping is released on drop.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    path: PathBuf,
}

impl MmapRegion {
    /// Map a resource file such as `/sys/bus/pci/devices/{addr}/resource0`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened, sized or mapped, and
    /// `InvalidState` if it is empty (BAR not enabled).
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!("Mapping register window: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| FpgaError::io(format!("open {}", path.display()), e))?;

        let len = file
            .metadata()
            .map_err(|e| FpgaError::io(format!("stat {}", path.display()), e))?
            .len();
        let size = usize::try_from(len).map_err(|_| {
            FpgaError::invalid_state(format!("{} is too large to map", path.display()))
        })?;

        if size == 0 {
            return Err(FpgaError::invalid_state(format!(
                "{} has size 0 (device not enabled?)",
                path.display()
            )));
        }

        // SAFETY: mmap preconditions hold:
        // - the descriptor is valid (just opened, kept alive in `_file`)
        // - size is non-zero and equals the file length, offset is 0
        // - PROT_READ|PROT_WRITE with MAP_SHARED is what a register BAR needs
        // - the mapping is released exactly once in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &file,
                0,
            )
        }
        .map_err(|e| FpgaError::io(format!("mmap {}", path.display()), e.into()))?;

        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            FpgaError::invalid_state(format!("mmap of {} returned null", path.display()))
        })?;

        tracing::info!("Mapped {} ({size:#x} bytes at {ptr:p})", path.display());

        Ok(Self {
            ptr,
            size,
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the mapped file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegisterSpace for MmapRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn read_u64(&self, offset: usize) -> Result<u64> {
        check_access(offset, 8, self.size)?;

        // SAFETY: offset + 8 <= size was checked above, the pointer comes from
        // a live mapping of `size` bytes, and offset is 8-byte aligned on a
        // page-aligned base. Volatile: the device may change the value.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u64>().read_volatile() };

        tracing::trace!("Read u64 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write_u64(&self, offset: usize, value: u64) -> Result<()> {
        check_access(offset, 8, self.size)?;
        tracing::trace!("Write u64 @ {offset:#x} = {value:#x}");

        // SAFETY: same bounds and alignment argument as read_u64. Volatile:
        // register writes have side effects and must not be elided or merged.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u64>()
                .write_volatile(value);
        }
        Ok(())
    }

    fn read_u32(&self, offset: usize) -> Result<u32> {
        check_access(offset, 4, self.size)?;

        // SAFETY: offset + 4 <= size and 4-byte alignment checked above.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };

        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        check_access(offset, 4, self.size)?;
        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");

        // SAFETY: offset + 4 <= size and 4-byte alignment checked above.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_volatile(value);
        }
        Ok(())
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        tracing::debug!("Unmapping {} ({:#x} bytes)", self.path.display(), self.size);

        // SAFETY: ptr/size are exactly what mmap returned in open(), and Drop
        // runs once, so the range is still mapped and unmapped only here.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: Send - the mapping is process-wide and owned exclusively by this
// value; moving it between threads does not invalidate it.
unsafe impl Send for MmapRegion {}

// SAFETY: Sync - every access is a bounds-checked volatile load or store of a
// naturally aligned word; no Rust references into the mapping are handed out.
// Concurrent writers to one register race at the hardware level only.
unsafe impl Sync for MmapRegion {}
