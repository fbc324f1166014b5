// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached table descriptors, recomputed on every `BASER`/`CBASER` write.
//!
//! Per Design Notes §9 these live on the `GicIts` instance, not on a shared
//! class-level cache — there is exactly one of each per ITS instance.

use register::LocalRegisterCopy;

use super::regs::{self, BASER_REG, CBASER_REG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Device,
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevTable {
    pub valid: bool,
    pub indirect: bool,
    pub entry_sz: u64,
    pub max_entries: u64,
    pub max_devids: u64,
    pub base_addr: u64,
    /// Page size in bytes of the table's own `BASER[0]`. Needed by the
    /// indirect walk to split an id into an L1 pointer index and an L2 slot
    /// index; a flat table ignores it.
    pub page_sz: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollTable {
    pub valid: bool,
    pub indirect: bool,
    pub entry_sz: u64,
    pub max_entries: u64,
    pub max_collids: u64,
    pub base_addr: u64,
    /// Page size in bytes of the table's own `BASER[1]`. Design Notes §9:
    /// this must come from the owning `BASER[i]`, never from `BASER[0]`.
    pub page_sz: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmdQ {
    pub valid: bool,
    pub max_entries: u64,
    pub base_addr: u64,
}

pub const CMDQ_PAGE_SIZE: u64 = 4 * 1024;
pub const CMDQ_ENTRY_SIZE: u64 = 32;

/// Derives `max_entries` the way §4.3 defines it: a flat table holds
/// `(num_pages + 1) * page_sz / entry_sz` entries; an indirect table holds
/// one L2 page's worth of entries (`page_sz / entry_sz`) per L1 pointer, and
/// there are `(num_pages + 1) * page_sz / 8` L1 pointers (each 8 bytes).
fn max_entries(num_pages: u64, page_sz: u64, entry_sz: u64, indirect: bool) -> u64 {
    let pages = num_pages + 1;
    if indirect {
        let l1_pointers = pages * page_sz / 8;
        let slots_per_l2 = page_sz / entry_sz;
        l1_pointers * slots_per_l2
    } else {
        pages * page_sz / entry_sz
    }
}

/// Assembles the 52-bit table base address out of a `BASER` value, following
/// §4.3: 4K/16K pages pack a linear 48-bit address in `PHYADDR_48`; 64K pages
/// split it into two non-contiguous bit groups.
fn base_addr_from_baser(reg: &LocalRegisterCopy<u64, BASER_REG::Register>, page_sz_type: u64) -> u64 {
    if page_sz_type == 2 {
        let low = reg.read(BASER_REG::PHYADDR_64K_LOW) << 16;
        let high = reg.read(BASER_REG::PHYADDR_64K_HIGH) << 48;
        low | high
    } else {
        reg.read(BASER_REG::PHYADDR_48) << 12
    }
}

/// Extracts a `DevTable` or `CollTable` descriptor from a live `BASER[i]`
/// value. Returns `None` if the page-size type is reserved or the table type
/// is neither Device nor Collection, in which case the caller clears the
/// register to zero and logs a `MalformedDescriptor`.
///
/// `idbits_or_cidbits` and `cil` come from `TYPER` and are only consulted
/// for the Collection table's `max_collids`; the Device table's
/// `max_devids` reads `DEVBITS` from the same `TYPER` value.
pub fn extract_table(
    reg: &LocalRegisterCopy<u64, BASER_REG::Register>,
    devbits: u64,
    cidbits: u64,
    cil: bool,
) -> Option<(TableKind, DevTable, CollTable)> {
    let page_sz_type = reg.read(BASER_REG::PAGE_SIZE);
    let page_sz = regs::page_size_bytes(page_sz_type)?;
    let num_pages = reg.read(BASER_REG::SIZE);
    let entry_sz = reg.read(BASER_REG::ENTRY_SIZE) + 1;
    let indirect = reg.read(BASER_REG::INDIRECT) != 0;
    let valid = reg.read(BASER_REG::VALID) != 0;
    let base_addr = base_addr_from_baser(reg, page_sz_type);
    let entries = max_entries(num_pages, page_sz, entry_sz, indirect);

    match reg.read(BASER_REG::TYPE) {
        1 => Some((
            TableKind::Device,
            DevTable {
                valid,
                indirect,
                entry_sz,
                max_entries: entries,
                max_devids: 1 << (devbits + 1),
                base_addr,
                page_sz,
            },
            CollTable::default(),
        )),
        4 => {
            let max_collids = if cil { 1 << (cidbits + 1) } else { 1 << 16 };
            Some((
                TableKind::Collection,
                DevTable::default(),
                CollTable {
                    valid,
                    indirect,
                    entry_sz,
                    max_entries: entries,
                    max_collids,
                    base_addr,
                    page_sz,
                },
            ))
        }
        _ => None,
    }
}

/// Extracts the command queue descriptor from a live `CBASER` value. The
/// queue always uses 4 KiB pages and 32-byte entries regardless of what the
/// `PAGE_SIZE` field says, per §4.3.
pub fn extract_cmdq(reg: &LocalRegisterCopy<u64, CBASER_REG::Register>) -> CmdQ {
    let num_pages = reg.read(CBASER_REG::SIZE);
    let valid = reg.read(CBASER_REG::VALID) != 0;
    let base_addr = reg.read(CBASER_REG::PHYADDR) << 12;
    CmdQ {
        valid,
        max_entries: max_entries(num_pages, CMDQ_PAGE_SIZE, CMDQ_ENTRY_SIZE, false),
        base_addr,
    }
}
