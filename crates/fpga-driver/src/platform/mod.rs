//! Platform providers
//!
//! The access layer never touches `/sys` directly. A [`Platform`] lists the
//! live resources and maps their register windows; its [`AttributeStore`]
//! half reads and writes persisted per-resource state.
//!
//! ```text
//! SysfsPlatform  : intel-fpga class tree + PCI resource mmap (hardware)
//! SimPlatform    : register-accurate simulated card (CI, tests)
//! ```

pub mod sim;
pub mod sysfs;

use crate::config::HalConfig;
use crate::error::Result;
use crate::mmio::RegisterSpace;
use crate::properties::ResourceProperties;
use std::fmt::Debug;
use std::sync::Arc;

pub use sim::{SimCard, SimPlatform, SimRegion};
pub use sysfs::SysfsPlatform;

/// Stable platform-level name of a resource
///
/// For sysfs this is the path below `class/fpga`, e.g.
/// `intel-fpga-dev.0/intel-fpga-port.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap a platform name
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resource reported by a scan
#[derive(Debug, Clone)]
pub struct Resource {
    /// Platform name
    pub id: ResourceId,
    /// Matchable attributes
    pub properties: ResourceProperties,
    /// Owning device, for accelerators
    pub parent: Option<ResourceId>,
}

/// Persisted per-resource state (sysfs attributes)
pub trait AttributeStore: Send + Sync {
    /// Read attribute `name` (a path relative to the resource)
    ///
    /// # Errors
    ///
    /// Returns `Io` if the attribute cannot be read.
    fn read_attribute(&self, resource: &ResourceId, name: &str) -> Result<String>;

    /// Write `value` to attribute `name`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the attribute cannot be written.
    fn write_attribute(&self, resource: &ResourceId, name: &str, value: &str) -> Result<()>;
}

/// Topology provider
pub trait Platform: AttributeStore + Debug + Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// List live resources, each device followed by its accelerators
    ///
    /// # Errors
    ///
    /// Returns `Io` if the topology cannot be read.
    fn scan(&self) -> Result<Vec<Resource>>;

    /// Map register window `index` of a resource
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown resource or window, `Io` if
    /// mapping fails.
    fn map_region(&self, resource: &ResourceId, index: u32) -> Result<Arc<dyn RegisterSpace>>;
}

/// Platform selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformSelection {
    /// Sysfs when the FPGA class exists, otherwise a simulated card
    #[default]
    Auto,
    /// Force the sysfs platform
    Sysfs,
    /// Force a simulated single-card platform
    Simulated,
}

/// Select a platform provider
///
/// # Errors
///
/// Currently infallible; kept fallible so providers that query hardware at
/// construction can report it.
pub fn select_platform(selection: PlatformSelection, config: &HalConfig) -> Result<Arc<dyn Platform>> {
    match selection {
        PlatformSelection::Auto => {
            let sysfs = SysfsPlatform::new(&config.sysfs_root);
            if sysfs.class_dir().is_dir() {
                tracing::info!("Using sysfs platform at {}", sysfs.class_dir().display());
                return Ok(Arc::new(sysfs));
            }

            tracing::info!(
                "{} not present, using simulated card",
                sysfs.class_dir().display()
            );
            Ok(Arc::new(SimPlatform::single_card()))
        }

        PlatformSelection::Sysfs => Ok(Arc::new(SysfsPlatform::new(&config.sysfs_root))),

        PlatformSelection::Simulated => Ok(Arc::new(SimPlatform::single_card())),
    }
}
