//! Port header registers.
//!
//! The port header is part of the static FPGA interface and stays readable
//! while the accelerator behind it is being reconfigured. Everything past
//! [`HEADER_SIZE`] belongs to the accelerator and must not be touched
//! directly while [`control::SOFT_RESET`] is asserted.

/// Size of the port header block in bytes.
pub const HEADER_SIZE: usize = 0x40;

/// Port capability register.
pub const CAPABILITY: usize = 0x30;

/// Port control register.
pub const CONTROL: usize = 0x38;

/// Port control register bits.
pub mod control {
    /// Hold the accelerator in reset (set for partial reconfiguration).
    pub const SOFT_RESET: u64 = 1 << 0;
    /// Set by hardware once the reset request has taken effect.
    pub const SOFT_RESET_ACK: u64 = 1 << 4;
}

/// Registers of the port error feature, relative to its header.
pub mod error {
    /// Error mask register.
    pub const MASK: usize = 0x08;
    /// Error status register (write 1 to clear).
    pub const STATUS: usize = 0x10;
    /// First error latched since the last clear.
    pub const FIRST: usize = 0x18;
}
