//! Simulated FPGA card
//!
//! A register-level stand-in for hardware, used by CI and by `fpgainfo
//! --simulate`. Each card exposes a device (FME) window and an accelerator
//! (port) window with the behaviour the access layer depends on:
//!
//! - device feature lists in both windows
//! - port soft reset mirrored into its acknowledge bit
//! - direct access to accelerator registers during reset is dropped and
//!   flagged in the port error register
//! - a device mailbox feature relays commands to the accelerator window
//! - write-1-to-clear port error status
//! - free-running global performance counters
//!
//! Every external access is counted per window, and a window can be stalled
//! so mailbox commands are never acknowledged.

use super::{AttributeStore, Platform, Resource, ResourceId};
use crate::error::{FpgaError, Result};
use crate::mmio::{check_access, RegisterSpace};
use crate::properties::{ObjectType, PciAddress, ResourceProperties};
use fpga_chip::{dfl, errors, mailbox, pcie, perf, port};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Size of the simulated device window
pub const DEVICE_REGION_SIZE: usize = 0x1000;
/// FME global error feature offset in the device window
pub const FME_ERROR_OFFSET: usize = 0x100;
/// FME global performance feature offset in the device window
pub const FME_PERF_OFFSET: usize = 0x200;
/// Port mailbox feature offset in the device window
pub const FME_MAILBOX_OFFSET: usize = 0x300;
/// Size of the simulated accelerator window
pub const ACCELERATOR_REGION_SIZE: usize = 0x2000;
/// Port error feature offset in the accelerator window
pub const PORT_ERROR_OFFSET: usize = 0x1000;

const PORT_ERROR_STATUS: usize = PORT_ERROR_OFFSET + port::error::STATUS;
const MAILBOX_CTRL: usize = FME_MAILBOX_OFFSET + mailbox::CTRL;
const MAILBOX_WR_DATA: usize = FME_MAILBOX_OFFSET + mailbox::WR_DATA;
const MAILBOX_RD_DATA: usize = FME_MAILBOX_OFFSET + mailbox::RD_DATA;

#[derive(Debug, Clone, Copy)]
struct Ticker {
    offset: usize,
    step: u64,
    mask: u64,
}

#[derive(Debug)]
enum Behaviour {
    Fme {
        port: Arc<SimRegion>,
        tickers: Vec<Ticker>,
    },
    Port,
}

/// One simulated register window
#[derive(Debug)]
pub struct SimRegion {
    words: Mutex<Vec<u64>>,
    size: usize,
    accesses: AtomicUsize,
    stalled: AtomicBool,
    behaviour: Behaviour,
}

impl SimRegion {
    fn port() -> Self {
        let mut words = vec![0u64; ACCELERATOR_REGION_SIZE / 8];
        words[0] = dfl::encode(dfl::kind::FIU, dfl::id::PORT_HEADER, PORT_ERROR_OFFSET, false);
        words[PORT_ERROR_OFFSET / 8] = dfl::encode(dfl::kind::PRIVATE, dfl::id::PORT_ERROR, 0, true);

        Self {
            words: Mutex::new(words),
            size: ACCELERATOR_REGION_SIZE,
            accesses: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            behaviour: Behaviour::Port,
        }
    }

    fn fme(port: Arc<SimRegion>) -> Self {
        let mut words = vec![0u64; DEVICE_REGION_SIZE / 8];
        words[0] = dfl::encode(dfl::kind::FIU, dfl::id::FME_HEADER, FME_ERROR_OFFSET, false);
        words[FME_ERROR_OFFSET / 8] = dfl::encode(
            dfl::kind::PRIVATE,
            dfl::id::FME_GLOBAL_ERROR,
            FME_PERF_OFFSET - FME_ERROR_OFFSET,
            false,
        );
        words[FME_PERF_OFFSET / 8] = dfl::encode(
            dfl::kind::PRIVATE,
            dfl::id::FME_GLOBAL_PERF,
            FME_MAILBOX_OFFSET - FME_PERF_OFFSET,
            false,
        );
        words[FME_MAILBOX_OFFSET / 8] =
            dfl::encode(dfl::kind::PRIVATE, dfl::id::PORT_MAILBOX, 0, true);

        let tickers = perf::COUNTERS
            .iter()
            .zip(1u64..)
            .map(|(counter, n)| Ticker {
                offset: FME_PERF_OFFSET + counter.offset,
                step: if counter.width == perf::CLOCK_COUNTER_WIDTH {
                    1_000
                } else {
                    n * 16
                },
                mask: counter.mask(),
            })
            .collect();

        Self {
            words: Mutex::new(words),
            size: DEVICE_REGION_SIZE,
            accesses: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            behaviour: Behaviour::Fme { port, tickers },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u64>> {
        self.words.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a word with no side effects and without counting the access
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range or misaligned offset.
    pub fn peek(&self, offset: usize) -> Result<u64> {
        check_access(offset, 8, self.size)?;
        Ok(self.lock()[offset / 8])
    }

    /// Overwrite a word with no side effects and without counting the access
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range or misaligned offset.
    pub fn poke(&self, offset: usize, value: u64) -> Result<()> {
        check_access(offset, 8, self.size)?;
        self.lock()[offset / 8] = value;
        Ok(())
    }

    /// External accesses since creation or the last [`Self::reset_accesses`]
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    /// Zero the access counter
    pub fn reset_accesses(&self) {
        self.accesses.store(0, Ordering::SeqCst);
    }

    /// Stop (or resume) acknowledging mailbox commands
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    fn load(&self, words: &mut [u64], offset: usize) -> u64 {
        let index = offset / 8;
        let value = words[index];
        if let Behaviour::Fme { tickers, .. } = &self.behaviour {
            if let Some(t) = tickers.iter().find(|t| t.offset == offset) {
                words[index] = value.wrapping_add(t.step) & t.mask;
            }
        }
        value
    }

    fn store(&self, words: &mut [u64], offset: usize, value: u64, mask: u64) {
        let index = offset / 8;
        let merged = (words[index] & !mask) | (value & mask);

        match &self.behaviour {
            Behaviour::Port if offset == PORT_ERROR_STATUS => {
                words[index] &= !(value & mask);
            }
            Behaviour::Port if offset == port::CONTROL => {
                words[index] = if merged & port::control::SOFT_RESET == 0 {
                    merged & !port::control::SOFT_RESET_ACK
                } else {
                    merged | port::control::SOFT_RESET_ACK
                };
            }
            Behaviour::Fme { port, .. } if offset == MAILBOX_CTRL => {
                words[index] = self.relay(words, merged, port);
            }
            _ => words[index] = merged,
        }
    }

    fn relay(&self, words: &mut [u64], ctrl: u64, port: &SimRegion) -> u64 {
        if ctrl & (mailbox::CMD_WRITE | mailbox::CMD_READ) == 0 {
            return ctrl;
        }
        if self.stalled.load(Ordering::SeqCst) {
            tracing::trace!("Mailbox stalled, command {ctrl:#x} not acknowledged");
            return ctrl;
        }

        #[allow(clippy::cast_possible_truncation)]
        let address = (ctrl & mailbox::ADDR_MASK) as usize;

        if ctrl & mailbox::CMD_WRITE != 0 {
            port.relayed_write(address, words[MAILBOX_WR_DATA / 8]);
        }
        if ctrl & mailbox::CMD_READ != 0 {
            words[MAILBOX_RD_DATA / 8] = port.relayed_read(address);
        }
        ctrl | mailbox::ACK
    }

    fn relayed_write(&self, offset: usize, value: u64) {
        if check_access(offset, 8, self.size).is_err() {
            tracing::warn!("Mailbox write to {offset:#x} outside accelerator window");
            return;
        }
        let mut words = self.lock();
        self.store(&mut words, offset, value, u64::MAX);
    }

    fn relayed_read(&self, offset: usize) -> u64 {
        if check_access(offset, 8, self.size).is_err() {
            tracing::warn!("Mailbox read from {offset:#x} outside accelerator window");
            return u64::MAX;
        }
        let mut words = self.lock();
        self.load(&mut words, offset)
    }

    fn blocked_by_reset(&self, words: &mut [u64], offset: usize, error_bit: u64) -> bool {
        if !matches!(self.behaviour, Behaviour::Port) {
            return false;
        }
        let in_reset = words[port::CONTROL / 8] & port::control::SOFT_RESET != 0;
        if in_reset && (port::HEADER_SIZE..PORT_ERROR_OFFSET).contains(&offset) {
            words[PORT_ERROR_STATUS / 8] |= error_bit;
            tracing::debug!("Direct access to {offset:#x} while port in reset");
            return true;
        }
        false
    }

    fn counted(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }
}

impl RegisterSpace for SimRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn read_u64(&self, offset: usize) -> Result<u64> {
        check_access(offset, 8, self.size)?;
        self.counted();
        let mut words = self.lock();
        if self.blocked_by_reset(&mut words, offset, errors::MMIO_READ_WHILE_RESET) {
            return Ok(u64::MAX);
        }
        Ok(self.load(&mut words, offset))
    }

    fn write_u64(&self, offset: usize, value: u64) -> Result<()> {
        check_access(offset, 8, self.size)?;
        self.counted();
        let mut words = self.lock();
        if !self.blocked_by_reset(&mut words, offset, errors::MMIO_WRITE_WHILE_RESET) {
            self.store(&mut words, offset, value, u64::MAX);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_u32(&self, offset: usize) -> Result<u32> {
        check_access(offset, 4, self.size)?;
        self.counted();
        let word = offset & !7;
        let shift = (offset & 4) * 8;
        let mut words = self.lock();
        if self.blocked_by_reset(&mut words, word, errors::MMIO_READ_WHILE_RESET) {
            return Ok(u32::MAX);
        }
        Ok((self.load(&mut words, word) >> shift) as u32)
    }

    fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        check_access(offset, 4, self.size)?;
        self.counted();
        let word = offset & !7;
        let shift = (offset & 4) * 8;
        let mut words = self.lock();
        if !self.blocked_by_reset(&mut words, word, errors::MMIO_WRITE_WHILE_RESET) {
            self.store(
                &mut words,
                word,
                u64::from(value) << shift,
                0xFFFF_FFFF_u64 << shift,
            );
        }
        Ok(())
    }
}

/// Identity of one simulated card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCard {
    /// PCI location
    pub pci: PciAddress,
    /// CPU socket
    pub socket_id: u8,
    /// PCI vendor ID
    pub vendor_id: u16,
    /// PCI device ID
    pub device_id: u16,
    /// FME partial reconfiguration interface GUID
    pub interface_id: Uuid,
    /// Accelerator GUID of the loaded image
    pub afu_id: Uuid,
}

impl Default for SimCard {
    fn default() -> Self {
        Self {
            pci: PciAddress {
                segment: 0,
                bus: 0x5e,
                device: 0,
                function: 0,
            },
            socket_id: 0,
            vendor_id: pcie::INTEL_VENDOR_ID,
            device_id: pcie::device_id::N3000,
            interface_id: Uuid::from_u128(0x9346_116d_a52d_5ca8_b06a_a9a389ef7c8d),
            afu_id: Uuid::from_u128(0xd842_4dc4_a4a3_c413_f89e_4336_83f9_040b),
        }
    }
}

#[derive(Debug)]
struct SimSlot {
    card: SimCard,
    device: ResourceId,
    accelerator: ResourceId,
    fme: Arc<SimRegion>,
    port: Arc<SimRegion>,
}

/// Platform made of simulated cards
#[derive(Debug)]
pub struct SimPlatform {
    slots: Vec<SimSlot>,
}

impl SimPlatform {
    /// Build a platform with the given cards, numbered in order
    pub fn new(cards: impl IntoIterator<Item = SimCard>) -> Self {
        let slots = cards
            .into_iter()
            .enumerate()
            .map(|(n, card)| {
                let port = Arc::new(SimRegion::port());
                let fme = Arc::new(SimRegion::fme(Arc::clone(&port)));
                SimSlot {
                    card,
                    device: ResourceId::new(format!("intel-fpga-dev.{n}/intel-fpga-fme.{n}")),
                    accelerator: ResourceId::new(format!("intel-fpga-dev.{n}/intel-fpga-port.{n}")),
                    fme,
                    port,
                }
            })
            .collect();

        Self { slots }
    }

    /// One default card: a device and its accelerator
    pub fn single_card() -> Self {
        Self::new([SimCard::default()])
    }

    /// Register window 0 of a resource
    pub fn region(&self, resource: &ResourceId) -> Option<Arc<SimRegion>> {
        self.lookup(resource).map(|(slot, is_port)| {
            if is_port {
                Arc::clone(&slot.port)
            } else {
                Arc::clone(&slot.fme)
            }
        })
    }

    /// External accesses summed over every window
    pub fn total_accesses(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.fme.accesses() + s.port.accesses())
            .sum()
    }

    fn lookup(&self, resource: &ResourceId) -> Option<(&SimSlot, bool)> {
        self.slots.iter().find_map(|slot| {
            if &slot.device == resource {
                Some((slot, false))
            } else if &slot.accelerator == resource {
                Some((slot, true))
            } else {
                None
            }
        })
    }

    fn unknown(resource: &ResourceId) -> FpgaError {
        FpgaError::invalid_argument(format!("Unknown simulated resource {resource}"))
    }

    fn no_attribute(resource: &ResourceId, name: &str) -> FpgaError {
        FpgaError::io(
            format!("{resource}/{name}"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )
    }
}

impl AttributeStore for SimPlatform {
    fn read_attribute(&self, resource: &ResourceId, name: &str) -> Result<String> {
        let (slot, is_port) = self.lookup(resource).ok_or_else(|| Self::unknown(resource))?;

        match (is_port, name) {
            (true, "errors/errors") => Ok(format!("0x{:016x}\n", slot.port.peek(PORT_ERROR_STATUS)?)),
            (true, "afu_id") => Ok(format!("{}\n", slot.card.afu_id.simple())),
            (false, "socket_id") => Ok(format!("{}\n", slot.card.socket_id)),
            (false, "pr/interface_id") => Ok(format!("{}\n", slot.card.interface_id.simple())),
            _ => Err(Self::no_attribute(resource, name)),
        }
    }

    fn write_attribute(&self, resource: &ResourceId, name: &str, value: &str) -> Result<()> {
        let (slot, is_port) = self.lookup(resource).ok_or_else(|| Self::unknown(resource))?;

        if !(is_port && name == "errors/clear") {
            return Err(Self::no_attribute(resource, name));
        }

        let mask = u64::from_str_radix(value.trim().trim_start_matches("0x"), 16).map_err(|e| {
            FpgaError::io(
                format!("{resource}/{name}"),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            )
        })?;

        let mut words = slot.port.lock();
        slot.port.store(&mut words, PORT_ERROR_STATUS, mask, u64::MAX);
        Ok(())
    }
}

impl Platform for SimPlatform {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn scan(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::with_capacity(self.slots.len() * 2);

        for slot in &self.slots {
            let card = &slot.card;
            let properties = |object_type, guid| ResourceProperties {
                object_type,
                guid: Some(guid),
                pci: card.pci,
                socket_id: card.socket_id,
                vendor_id: card.vendor_id,
                device_id: card.device_id,
                num_regions: 1,
            };

            resources.push(Resource {
                id: slot.device.clone(),
                properties: properties(ObjectType::Device, card.interface_id),
                parent: None,
            });
            resources.push(Resource {
                id: slot.accelerator.clone(),
                properties: properties(ObjectType::Accelerator, card.afu_id),
                parent: Some(slot.device.clone()),
            });
        }

        Ok(resources)
    }

    fn map_region(&self, resource: &ResourceId, index: u32) -> Result<Arc<dyn RegisterSpace>> {
        if index != 0 {
            return Err(FpgaError::invalid_argument(format!(
                "{resource} has no register window {index}"
            )));
        }
        let region = self.region(resource).ok_or_else(|| Self::unknown(resource))?;
        Ok(region)
    }
}
