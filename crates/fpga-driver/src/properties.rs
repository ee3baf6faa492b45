//! Resource attributes and structural filters
//!
//! A [`ResourceProperties`] describes one discovered resource. A
//! [`Properties`] filter constrains any subset of those attributes; an
//! unconstrained attribute matches everything.

use crate::error::{FpgaError, Result};
use uuid::Uuid;

/// Kind of resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Card-level management resource (FME)
    Device,
    /// Reconfigurable accelerator slot behind a port
    Accelerator,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// PCI location: segment, bus, device, function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PciAddress {
    /// PCI segment (domain)
    pub segment: u16,
    /// Bus number
    pub bus: u8,
    /// Device number (0..=31)
    pub device: u8,
    /// Function number (0..=7)
    pub function: u8,
}

impl PciAddress {
    /// Parse `ssss:bb:dd.f` as found in sysfs
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string is not a PCI address.
    pub fn parse(s: &str) -> Result<Self> {
        let bad = || FpgaError::invalid_argument(format!("Not a PCI address: {s:?}"));

        let (segment, rest) = s.split_once(':').ok_or_else(bad)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(bad)?;
        let (device, function) = rest.split_once('.').ok_or_else(bad)?;

        let addr = Self {
            segment: u16::from_str_radix(segment, 16).map_err(|_| bad())?,
            bus: u8::from_str_radix(bus, 16).map_err(|_| bad())?,
            device: u8::from_str_radix(device, 16).map_err(|_| bad())?,
            function: u8::from_str_radix(function, 16).map_err(|_| bad())?,
        };

        if addr.device > 0x1F || addr.function > 0x7 {
            return Err(bad());
        }
        Ok(addr)
    }
}

impl std::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.segment, self.bus, self.device, self.function
        )
    }
}

/// Attributes of one discovered resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProperties {
    /// Resource kind
    pub object_type: ObjectType,

    /// Interface GUID (device) or accelerator GUID (accelerator)
    pub guid: Option<Uuid>,

    /// PCI location of the card
    pub pci: PciAddress,

    /// CPU socket the card is attached to
    pub socket_id: u8,

    /// PCI vendor ID
    pub vendor_id: u16,

    /// PCI device ID
    pub device_id: u16,

    /// Number of mappable register windows
    pub num_regions: u32,
}

/// Structural filter over [`ResourceProperties`]
///
/// Every field left as `None` is a wildcard.
///
/// ```
/// use fpga_driver::{ObjectType, Properties};
///
/// let filter = Properties::new()
///     .with_object_type(ObjectType::Accelerator)
///     .with_socket_id(0);
/// assert_eq!(filter.object_type, Some(ObjectType::Accelerator));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Required object kind
    pub object_type: Option<ObjectType>,
    /// Required GUID
    pub guid: Option<Uuid>,
    /// Required PCI segment
    pub segment: Option<u16>,
    /// Required bus number
    pub bus: Option<u8>,
    /// Required device number
    pub device: Option<u8>,
    /// Required function number
    pub function: Option<u8>,
    /// Required socket
    pub socket_id: Option<u8>,
    /// Required vendor ID
    pub vendor_id: Option<u16>,
    /// Required device ID
    pub device_id: Option<u16>,
}

impl Properties {
    /// Filter that matches every resource
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain the object kind
    #[must_use]
    pub const fn with_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    /// Constrain the GUID
    #[must_use]
    pub const fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = Some(guid);
        self
    }

    /// Constrain segment, bus, device and function at once
    #[must_use]
    pub const fn with_pci_address(mut self, addr: PciAddress) -> Self {
        self.segment = Some(addr.segment);
        self.bus = Some(addr.bus);
        self.device = Some(addr.device);
        self.function = Some(addr.function);
        self
    }

    /// Constrain the bus number
    #[must_use]
    pub const fn with_bus(mut self, bus: u8) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Constrain the device number
    #[must_use]
    pub const fn with_device(mut self, device: u8) -> Self {
        self.device = Some(device);
        self
    }

    /// Constrain the function number
    #[must_use]
    pub const fn with_function(mut self, function: u8) -> Self {
        self.function = Some(function);
        self
    }

    /// Constrain the socket
    #[must_use]
    pub const fn with_socket_id(mut self, socket_id: u8) -> Self {
        self.socket_id = Some(socket_id);
        self
    }

    /// Constrain the PCI vendor ID
    #[must_use]
    pub const fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    /// Constrain the PCI device ID
    #[must_use]
    pub const fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Reject constraints no PCI resource can satisfy
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a device number above 31 or a function
    /// number above 7.
    pub fn validate(&self) -> Result<()> {
        if let Some(device) = self.device.filter(|&d| d > 0x1F) {
            return Err(FpgaError::invalid_argument(format!(
                "Filter device number {device:#x} exceeds 0x1f"
            )));
        }
        if let Some(function) = self.function.filter(|&f| f > 0x7) {
            return Err(FpgaError::invalid_argument(format!(
                "Filter function number {function:#x} exceeds 0x7"
            )));
        }
        Ok(())
    }

    /// Whether every constrained attribute equals the resource's
    pub fn matches(&self, props: &ResourceProperties) -> bool {
        fn check<T: PartialEq>(want: Option<T>, have: T) -> bool {
            want.map_or(true, |w| w == have)
        }

        check(self.object_type, props.object_type)
            && self.guid.map_or(true, |g| props.guid == Some(g))
            && check(self.segment, props.pci.segment)
            && check(self.bus, props.pci.bus)
            && check(self.device, props.pci.device)
            && check(self.function, props.pci.function)
            && check(self.socket_id, props.socket_id)
            && check(self.vendor_id, props.vendor_id)
            && check(self.device_id, props.device_id)
    }
}
