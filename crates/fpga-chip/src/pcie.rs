//! PCIe identifiers for supported accelerator cards.

/// Intel Corporation PCI vendor ID.
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// Device IDs (physical and virtual functions).
pub mod device_id {
    /// Programmable Acceleration Card with Arria 10 GX (PF).
    pub const PAC_A10: u16 = 0x09C4;
    /// Programmable Acceleration Card with Arria 10 GX (VF).
    pub const PAC_A10_VF: u16 = 0x09C5;
    /// PAC D5005 (PF).
    pub const D5005: u16 = 0x0B2B;
    /// PAC D5005 (VF).
    pub const D5005_VF: u16 = 0x0B2C;
    /// PAC N3000 (PF).
    pub const N3000: u16 = 0x0B30;
    /// PAC N3000 (VF).
    pub const N3000_VF: u16 = 0x0B31;
}

/// All known device IDs, physical functions first.
pub const ALL_DEVICE_IDS: &[u16] = &[
    device_id::PAC_A10,
    device_id::D5005,
    device_id::N3000,
    device_id::PAC_A10_VF,
    device_id::D5005_VF,
    device_id::N3000_VF,
];

/// Card family, derived from the PCI device ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardVariant {
    /// Arria 10 GX PAC
    PacA10,
    /// Stratix 10 PAC D5005
    D5005,
    /// PAC N3000
    N3000,
    /// Any other device ID
    Unknown(u16),
}

impl CardVariant {
    /// Classify a PCI device ID.
    #[must_use]
    pub const fn from_device_id(id: u16) -> Self {
        match id {
            device_id::PAC_A10 | device_id::PAC_A10_VF => Self::PacA10,
            device_id::D5005 | device_id::D5005_VF => Self::D5005,
            device_id::N3000 | device_id::N3000_VF => Self::N3000,
            other => Self::Unknown(other),
        }
    }

    /// Whether the ID is a virtual function.
    #[must_use]
    pub const fn is_virtual_function(id: u16) -> bool {
        matches!(
            id,
            device_id::PAC_A10_VF | device_id::D5005_VF | device_id::N3000_VF
        )
    }
}
