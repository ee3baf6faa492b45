//! Port error register bit assignments.
//!
//! Bits are listed explicitly as `(position, name)` pairs in ascending order.
//! Positions not listed are reserved.

/// MMIO read issued while the port was held in reset.
pub const MMIO_READ_WHILE_RESET: u64 = 1 << 9;
/// MMIO write issued while the port was held in reset.
pub const MMIO_WRITE_WHILE_RESET: u64 = 1 << 10;

/// Named port error bits.
pub const PORT_ERROR_BITS: &[(u32, &str)] = &[
    (0, "TxCh0Overflow"),
    (1, "TxCh0InvalidReqEncoding"),
    (2, "TxCh0Len3NotSupported"),
    (3, "TxCh0Len2NotAligned"),
    (4, "TxCh0Len4NotAligned"),
    (9, "MMIORdWhileRst"),
    (10, "MMIOWrWhileRst"),
    (16, "TxCh1Overflow"),
    (17, "TxCh1InvalidReqEncoding"),
    (18, "TxCh1Len3NotSupported"),
    (19, "TxCh1Len2NotAligned"),
    (20, "TxCh1Len4NotAligned"),
    (21, "TxCh1InsufficientData"),
    (22, "TxCh1DataPayloadOverrun"),
    (23, "TxCh1IncorrectAddr"),
    (24, "TxCh1NonZeroSOP"),
    (32, "MMIOTimedOut"),
    (33, "TxCh2FifoOverflow"),
    (34, "UnexpMMIOResp"),
    (40, "TxReqCounterOverflow"),
    (41, "L1prSmrrError"),
    (42, "L1prSmrr2Error"),
    (43, "L1prMesegError"),
    (44, "GenProtRangeError"),
    (45, "LegRangeLowError"),
    (46, "LegRangeHighError"),
    (47, "VgaMemRangeError"),
    (48, "PageFault"),
    (49, "PMRError"),
    (50, "Ap6Event"),
    (51, "VfFlrAccessError"),
];

/// Mask of every named bit.
#[must_use]
pub fn known_mask() -> u64 {
    PORT_ERROR_BITS.iter().fold(0, |m, &(bit, _)| m | (1 << bit))
}

/// Names of the bits set in `raw`, in bit order. Reserved bits are skipped.
pub fn decode(raw: u64) -> impl Iterator<Item = &'static str> {
    PORT_ERROR_BITS
        .iter()
        .filter(move |&&(bit, _)| raw & (1 << bit) != 0)
        .map(|&(_, name)| name)
}
