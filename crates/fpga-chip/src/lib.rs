//! Register-level model of FPGA accelerator cards.
//!
//! This crate has **no dependencies** and **no hardware access**: it is a
//! pure model of the register interface the userspace driver talks to:
//! device feature headers, port control, the port mailbox feature, the global
//! performance counter block, and the port error bits.
//!
//! Offsets follow the Device Feature List (DFL) layout used by the
//! `intel-fpga` / `dfl` kernel drivers. Where the kernel multiplexes a
//! register, this model exposes the flattened view the driver reads.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pcie`] | Vendor/device IDs of supported cards |
//! | [`dfl`] | Device feature header (DFH) fields and feature IDs |
//! | [`port`] | Port header registers (soft reset / acknowledge) |
//! | [`mailbox`] | Port mailbox feature used for mediated register access |
//! | [`perf`] | Global performance counter block |
//! | [`errors`] | Port error register bit table |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dfl;
pub mod errors;
pub mod mailbox;
pub mod pcie;
pub mod perf;
pub mod port;
