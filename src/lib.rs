// SPDX-License-Identifier: MIT OR Apache-2.0

//! Emulation core for an ARM GICv3 Interrupt Translation Service.
//!
//! This crate owns the ITS register file, its cached `BASER`/`CBASER`
//! table descriptors, the command queue interpreter, and the
//! DTE/ITE/CTE translation pipeline. It does not own guest memory or the
//! redistributors that ultimately receive pended LPIs: callers supply
//! both through the [`memory::GuestMemory`] and [`redistributor::Redistributor`]
//! traits on every entry point that needs them.

#![forbid(unsafe_code)]

pub mod device_driver;
pub mod error;
pub mod memory;
pub mod redistributor;

pub use device_driver::{GicIts, ItsConfig};
pub use error::{GuestMemoryError, ItsError};
pub use memory::GuestMemory;
pub use redistributor::Redistributor;
