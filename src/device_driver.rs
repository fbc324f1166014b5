// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device driver top level.

mod its;

pub use its::*;
