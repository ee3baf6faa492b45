//! FME global performance counter block.
//!
//! Offsets are relative to the block's feature header (feature ID
//! [`crate::dfl::id::FME_GLOBAL_PERF`]). Counters are free-running and
//! monotonic; all but the clock wrap at [`EVENT_COUNTER_WIDTH`] bits.

/// Width of the fabric and cache event counters in bits.
pub const EVENT_COUNTER_WIDTH: u32 = 48;
/// Width of the clock counter in bits.
pub const CLOCK_COUNTER_WIDTH: u32 = 64;

/// One hardware counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDef {
    /// Event name as printed.
    pub name: &'static str,
    /// Byte offset from the block header.
    pub offset: usize,
    /// Counter width in bits (1..=64).
    pub width: u32,
}

impl CounterDef {
    /// Mask of the valid counter bits.
    #[must_use]
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// `stop - start` modulo the counter width.
    #[must_use]
    pub const fn delta(&self, start: u64, stop: u64) -> u64 {
        stop.wrapping_sub(start) & self.mask()
    }
}

const fn event(name: &'static str, offset: usize) -> CounterDef {
    CounterDef {
        name,
        offset,
        width: EVENT_COUNTER_WIDTH,
    }
}

/// Tracked counters, in print order.
pub const COUNTERS: &[CounterDef] = &[
    CounterDef {
        name: "clock",
        offset: 0x08,
        width: CLOCK_COUNTER_WIDTH,
    },
    event("cache_read_hit", 0x10),
    event("cache_write_hit", 0x18),
    event("cache_read_miss", 0x20),
    event("cache_write_miss", 0x28),
    event("fab_pcie0_read", 0x30),
    event("fab_pcie0_write", 0x38),
    event("fab_mmio_read", 0x40),
    event("fab_mmio_write", 0x48),
];

/// Bytes spanned by the block (header plus counters).
pub const BLOCK_SIZE: usize = 0x50;
