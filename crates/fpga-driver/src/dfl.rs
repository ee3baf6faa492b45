//! Device feature list walk
//!
//! Perf counters and port errors are located by walking the DFH chain of a
//! register window instead of assuming fixed offsets.

use crate::error::{FpgaError, Result};
use crate::mmio::RegisterSpace;
use fpga_chip::dfl::Dfh;

/// One entry of a device feature list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    /// Feature ID (`fpga_chip::dfl::id`)
    pub id: u16,
    /// Header type (`fpga_chip::dfl::kind`)
    pub kind: u8,
    /// Feature revision
    pub revision: u8,
    /// Byte offset of the header in the window
    pub offset: usize,
}

/// Walk the feature list starting at offset 0
///
/// # Errors
///
/// Returns `InvalidState` if the list points outside the window or is longer
/// than `max_features`, and propagates register read failures.
pub fn features(region: &dyn RegisterSpace, max_features: usize) -> Result<Vec<Feature>> {
    let mut found = Vec::new();
    let mut offset = 0usize;

    loop {
        if found.len() >= max_features {
            return Err(FpgaError::invalid_state(format!(
                "Feature list longer than {max_features} entries"
            )));
        }

        let dfh = Dfh(region.read_u64(offset)?);
        tracing::trace!("DFH @ {offset:#x}: id={:#x} kind={}", dfh.id(), dfh.kind());

        found.push(Feature {
            id: dfh.id(),
            kind: dfh.kind(),
            revision: dfh.revision(),
            offset,
        });

        if dfh.is_eol() || dfh.next() == 0 {
            break;
        }

        offset = offset
            .checked_add(dfh.next())
            .filter(|next| next + 8 <= region.size())
            .ok_or_else(|| {
                FpgaError::invalid_state(format!(
                    "Feature at {offset:#x} links outside the window"
                ))
            })?;
    }

    Ok(found)
}

/// Offset of the first feature with `id`
///
/// # Errors
///
/// Returns `InvalidArgument` if the window has no such feature, and anything
/// [`features`] returns.
pub fn find(region: &dyn RegisterSpace, id: u16, max_features: usize) -> Result<usize> {
    features(region, max_features)?
        .into_iter()
        .find(|f| f.id == id)
        .map(|f| f.offset)
        .ok_or_else(|| FpgaError::invalid_argument(format!("No feature {id:#x} in window")))
}
