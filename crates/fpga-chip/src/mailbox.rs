//! Port mailbox for mediated register access.
//!
//! While a port is held in soft reset its own window drops every access.
//! The owning device can carry a `PORT_MAILBOX` feature in its feature list
//! that relays accesses to the port. Register offsets below are relative to
//! that feature's header; a device without the feature has no mediated path.
//!
//! ```text
//! base+0x00  DFH
//! base+0x20  CTRL      command | address, ACK set on completion
//! base+0x28  WR_DATA
//! base+0x30  RD_DATA
//!
//! write:  CTRL <- 0;  WR_DATA <- value;  CTRL <- CMD_WRITE | addr;  poll CTRL.ACK
//! read:   CTRL <- 0;  CTRL <- CMD_READ | addr;  poll CTRL.ACK;  value <- RD_DATA
//! ```

/// Control register: command bits, target address, acknowledge.
pub const CTRL: usize = 0x0020;
/// Data to write on `CMD_WRITE`.
pub const WR_DATA: usize = 0x0028;
/// Data returned by `CMD_READ`.
pub const RD_DATA: usize = 0x0030;
/// Target byte address, bits `[15:0]`.
pub const ADDR_MASK: u64 = 0xFFFF;
/// Relay a write.
pub const CMD_WRITE: u64 = 1 << 16;
/// Relay a read.
pub const CMD_READ: u64 = 1 << 17;
/// Set by hardware once the command completed.
pub const ACK: u64 = 1 << 32;

/// Largest target address the mailbox can express.
pub const MAX_ADDRESS: usize = ADDR_MASK as usize;

/// Compose a control word.
#[must_use]
pub const fn command(cmd: u64, address: usize) -> u64 {
    cmd | (address as u64 & ADDR_MASK)
}
