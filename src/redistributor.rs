// SPDX-License-Identifier: MIT OR Apache-2.0

//! The redistributor collaborator the ITS forwards pend/clear calls to.
//!
//! The parent GICv3 distributor owns the redistributor array; this trait is
//! the only call the ITS core makes into it. At most one call is made per
//! `INT`/`CLEAR`/`DISCARD` command and per `GITS_TRANSLATER` write.

pub trait Redistributor {
    /// Marks LPI `intid` pending on the redistributor attached to `cpu`.
    fn pend_lpi(&mut self, cpu: u64, intid: u32);

    /// Clears LPI `intid` on the redistributor attached to `cpu`.
    fn clear_lpi(&mut self, cpu: u64, intid: u32);
}

/// A [`Redistributor`] that records every call it receives, in order. Used by
/// tests to assert the exact sequence of pend/clear calls a command
/// sequence produces.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingRedistributor {
    pub calls: Vec<RedistributorCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedistributorCall {
    Pend { cpu: u64, intid: u32 },
    Clear { cpu: u64, intid: u32 },
}

impl Redistributor for RecordingRedistributor {
    fn pend_lpi(&mut self, cpu: u64, intid: u32) {
        self.calls.push(RedistributorCall::Pend { cpu, intid });
    }

    fn clear_lpi(&mut self, cpu: u64, intid: u32) {
        self.calls.push(RedistributorCall::Clear { cpu, intid });
    }
}
