//! Userspace access layer for reconfigurable accelerator cards (FPGAs).
//!
//! Discovers devices and their accelerators, hands out tokens and handles
//! with exclusive/shared ownership, mediates register access while an
//! accelerator is being reconfigured, and exposes the global performance
//! counters and port error telemetry.
//!
//! # Layering
//!
//! ```text
//! FpgaManager::enumerate(filters)  → Token
//! FpgaManager::open(token, mode)   → Handle   (lease + mapped windows)
//! Handle::zone(i)                  → Zone     (direct | mediated, per call)
//! PerfCounter::new(&handle)        → start / stop / print
//! Handle::read_status / FpgaManager::read_status
//! ```
//!
//! Platforms:
//!
//! ```text
//! SysfsPlatform : intel-fpga class tree, PCI BAR mmap (hardware)
//! SimPlatform   : simulated card (CI, no hardware)
//! ```
//!
//! # Quick start
//!
//! ```
//! use fpga_driver::{perf::PerfCounter, AccessMode, FpgaManager, ObjectType, Properties};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mgr = FpgaManager::simulated();
//! let devices = mgr.enumerate(&[Properties::new().with_object_type(ObjectType::Device)], 1)?;
//! assert_eq!(devices.match_count, 1);
//!
//! let handle = mgr.open(&devices.tokens[0], AccessMode::Shared)?;
//! let counters = PerfCounter::new(&handle);
//! counters.init()?;
//! counters.start()?;
//! counters.stop()?;
//! counters.print(&mut std::io::stdout())?;
//! counters.destroy()?;
//! handle.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod dfl;
mod discovery;
mod error;
mod handle;
pub mod mmio;
pub mod perf;
pub mod platform;
mod properties;
mod telemetry;
mod token;
pub mod zone;

/// Register model constants (re-exported from fpga-chip).
pub mod chip {
    pub use fpga_chip::errors::{decode as decode_port_errors, PORT_ERROR_BITS};
    pub use fpga_chip::pcie::{device_id, CardVariant, ALL_DEVICE_IDS, INTEL_VENDOR_ID};
    pub use fpga_chip::perf::{CounterDef, COUNTERS};
}

pub use config::HalConfig;
pub use discovery::{FpgaManager, Matches};
pub use error::{ErrorKind, FpgaError, Result};
pub use handle::{AccessMode, Handle, ReconfigMode};
pub use mmio::{MmapRegion, RegisterSpace};
pub use perf::{CounterDelta, PerfCounter};
pub use platform::{
    select_platform, AttributeStore, Platform, PlatformSelection, Resource, ResourceId,
    SimCard, SimPlatform, SysfsPlatform,
};
pub use properties::{ObjectType, PciAddress, Properties, ResourceProperties};
pub use token::Token;
pub use zone::{ProtectionZone, Zone, ZonePath};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AccessMode, FpgaError, FpgaManager, Handle, HalConfig, ObjectType, PerfCounter,
        Properties, Result, Token, Zone, ZonePath,
    };
}
