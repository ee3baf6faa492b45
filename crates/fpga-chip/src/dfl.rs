//! Device feature header (DFH) layout.
//!
//! Every register window starts with a linked list of 64-bit feature
//! headers. Each header carries a feature ID and the byte offset of the
//! next header; the last one sets the end-of-list bit.
//!
//! ```text
//!  63    60 59       41 40  39                 16 15   12 11        0
//! ┌────────┬───────────┬───┬─────────────────────┬───────┬───────────┐
//! │  type  │ reserved  │EOL│  next header offset │  rev  │ feature id│
//! └────────┴───────────┴───┴─────────────────────┴───────┴───────────┘
//! ```

/// Feature ID field, bits `[11:0]`.
pub const ID_MASK: u64 = 0xFFF;
/// Revision field shift.
pub const REVISION_SHIFT: u32 = 12;
/// Revision field mask (after shift).
pub const REVISION_MASK: u64 = 0xF;
/// Next-header offset shift.
pub const NEXT_SHIFT: u32 = 16;
/// Next-header offset mask (after shift), 24 bits.
pub const NEXT_MASK: u64 = 0xFF_FFFF;
/// End-of-list bit.
pub const EOL: u64 = 1 << 40;
/// Feature type shift.
pub const TYPE_SHIFT: u32 = 60;

/// Feature types (bits `[63:60]`).
pub mod kind {
    /// Accelerator function unit header.
    pub const AFU: u8 = 0x1;
    /// Private feature (error, perf, ...).
    pub const PRIVATE: u8 = 0x3;
    /// FPGA interface unit header (FME or port).
    pub const FIU: u8 = 0x4;
}

/// Feature IDs.
pub mod id {
    /// FME header.
    pub const FME_HEADER: u16 = 0x000;
    /// Port header.
    pub const PORT_HEADER: u16 = 0x001;
    /// FME global error reporting.
    pub const FME_GLOBAL_ERROR: u16 = 0x004;
    /// FME global performance counters.
    pub const FME_GLOBAL_PERF: u16 = 0x007;
    /// Port error reporting.
    pub const PORT_ERROR: u16 = 0x010;
    /// Port register relay in the device window (see [`crate::mailbox`]).
    pub const PORT_MAILBOX: u16 = 0x0F0;
}

/// Decoded view of one header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dfh(pub u64);

impl Dfh {
    /// Feature ID.
    #[must_use]
    pub const fn id(self) -> u16 {
        (self.0 & ID_MASK) as u16
    }

    /// Feature revision.
    #[must_use]
    pub const fn revision(self) -> u8 {
        ((self.0 >> REVISION_SHIFT) & REVISION_MASK) as u8
    }

    /// Offset from this header to the next one (0 when absent).
    #[must_use]
    pub const fn next(self) -> usize {
        ((self.0 >> NEXT_SHIFT) & NEXT_MASK) as usize
    }

    /// Whether this is the last header.
    #[must_use]
    pub const fn is_eol(self) -> bool {
        self.0 & EOL != 0
    }

    /// Feature type.
    #[must_use]
    pub const fn kind(self) -> u8 {
        (self.0 >> TYPE_SHIFT) as u8
    }
}

/// Encode a header word. Used by simulators and test fixtures.
#[must_use]
pub const fn encode(kind: u8, feature_id: u16, next: usize, eol: bool) -> u64 {
    let mut word = ((kind as u64) << TYPE_SHIFT)
        | (((next as u64) & NEXT_MASK) << NEXT_SHIFT)
        | (feature_id as u64 & ID_MASK);
    if eol {
        word |= EOL;
    }
    word
}
