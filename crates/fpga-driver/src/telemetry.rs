//! Port error telemetry
//!
//! The port error status is a raw 64-bit bitfield. It can be reached two
//! ways:
//!
//! - through an open accelerator handle, at the port error feature found in
//!   its feature list (write-1-to-clear)
//! - through the platform attributes `errors/errors` and `errors/clear`,
//!   which needs only a token
//!
//! Bits are returned as-is; `fpga_chip::errors::decode` names them.

use crate::dfl;
use crate::discovery::FpgaManager;
use crate::error::{FpgaError, Result};
use crate::handle::Handle;
use crate::token::Token;
use fpga_chip::dfl::id;
use fpga_chip::port;

const STATUS_ATTRIBUTE: &str = "errors/errors";
const CLEAR_ATTRIBUTE: &str = "errors/clear";

fn parse_status(context: &str, text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    u64::from_str_radix(digits, 16).map_err(|e| {
        FpgaError::io(
            context,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

impl FpgaManager {
    /// Port error status from the persisted attribute
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad token, `Io` if the attribute is missing
    /// or unparsable.
    pub fn read_status(&self, token: &Token) -> Result<u64> {
        let resource = self.resource(token)?;
        let text = self.platform().read_attribute(&resource.id, STATUS_ATTRIBUTE)?;
        parse_status(&format!("{}/{STATUS_ATTRIBUTE}", resource.id), &text)
    }

    /// Clear `mask` bits through the persisted attribute and re-read
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_status`].
    pub fn clear_status(&self, token: &Token, mask: u64) -> Result<u64> {
        let resource = self.resource(token)?;
        tracing::debug!("Clearing port errors {mask:#x} on {}", resource.id);

        self.platform()
            .write_attribute(&resource.id, CLEAR_ATTRIBUTE, &format!("0x{mask:x}\n"))?;
        self.read_status(token)
    }
}

impl Handle {
    fn status_offset(&self) -> Result<usize> {
        let inner = self.inner();
        inner.ensure_open()?;
        let window = inner.window(0)?;
        let base = dfl::find(window.as_ref(), id::PORT_ERROR, inner.config().max_features)?;
        Ok(base + port::error::STATUS)
    }

    /// Port error status read through the handle's zone
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed, `InvalidArgument` if the resource has no
    /// port error feature, plus any zone failure.
    pub fn read_status(&self) -> Result<u64> {
        let offset = self.status_offset()?;
        self.zone(0)?.read(offset)
    }

    /// Write-1-to-clear `mask` and return the re-read status
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_status`].
    pub fn clear_status(&self, mask: u64) -> Result<u64> {
        let offset = self.status_offset()?;
        let zone = self.zone(0)?;
        tracing::debug!("Clearing port errors {mask:#x} on {}", self.resource_id());
        zone.write(offset, mask)?;
        zone.read(offset)
    }
}
