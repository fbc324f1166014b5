// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMIO offsets and register bitfield layouts for the ITS control and
//! translation frames.
//!
//! Registers are modeled the way the rest of this codebase models real
//! hardware register blocks — named fields over a fixed-width integer via
//! `register_bitfields!` — except the backing value here is a plain word
//! held on the instance, not a pointer into mapped MMIO: the ITS's own
//! registers are emulated, not read off silicon.

use register::register_bitfields;

//--------------------------------------------------------------------------------------------------
// Control frame offsets
//--------------------------------------------------------------------------------------------------

pub const CTLR: u64 = 0x0000;
pub const IIDR: u64 = 0x0004;
pub const TYPER: u64 = 0x0008;
pub const CBASER: u64 = 0x0080;
pub const CWRITER: u64 = 0x0088;
pub const CREADR: u64 = 0x0090;
pub const BASER: u64 = 0x0100;
pub const BASER_STRIDE: u64 = 0x0008;
pub const BASER_COUNT: u64 = 8;
pub const PIDR2: u64 = 0xFFE8;
pub const PIDR2_VALUE: u32 = 0x30;

//--------------------------------------------------------------------------------------------------
// Translation frame offsets
//--------------------------------------------------------------------------------------------------

pub const GITS_TRANSLATER: u64 = 0x0040;

//--------------------------------------------------------------------------------------------------
// Register bitfields
//--------------------------------------------------------------------------------------------------

register_bitfields! {u32,
    pub CTLR_REG [
        ENABLED OFFSET(0) NUMBITS(1) [],
        QUIESCENT OFFSET(31) NUMBITS(1) [],
    ]
}

register_bitfields! {u64,
    pub TYPER_REG [
        PHYSICAL OFFSET(0) NUMBITS(1) [],
        ITT_ENTRY_SIZE OFFSET(4) NUMBITS(4) [],
        IDBITS OFFSET(8) NUMBITS(5) [],
        DEVBITS OFFSET(13) NUMBITS(5) [],
        SEIS OFFSET(18) NUMBITS(1) [],
        PTA OFFSET(19) NUMBITS(1) [],
        CIDBITS OFFSET(32) NUMBITS(4) [],
        CIL OFFSET(36) NUMBITS(1) [],
    ],

    pub CBASER_REG [
        SIZE OFFSET(0) NUMBITS(8) [],
        PAGE_SIZE OFFSET(8) NUMBITS(2) [
            Size4K = 0,
            Size16K = 1,
            Size64K = 2,
        ],
        PHYADDR OFFSET(12) NUMBITS(40) [],
        VALID OFFSET(63) NUMBITS(1) [],
    ],

    pub CX_READR_WRITER [
        OFFSET OFFSET(5) NUMBITS(15) [],
    ],

    pub BASER_REG [
        SIZE OFFSET(0) NUMBITS(8) [],
        PAGE_SIZE OFFSET(8) NUMBITS(2) [
            Size4K = 0,
            Size16K = 1,
            Size64K = 2,
        ],
        PHYADDR_48 OFFSET(12) NUMBITS(36) [],
        PHYADDR_64K_HIGH OFFSET(12) NUMBITS(4) [],
        PHYADDR_64K_LOW OFFSET(16) NUMBITS(32) [],
        ENTRY_SIZE OFFSET(48) NUMBITS(5) [],
        TYPE OFFSET(56) NUMBITS(3) [
            Unimplemented = 0,
            Device = 1,
            Collection = 4,
        ],
        INDIRECT OFFSET(62) NUMBITS(1) [],
        VALID OFFSET(63) NUMBITS(1) [],
    ]
}

/// Every bit `BASER_REG` assigns meaning to. A high-word write strips
/// anything outside this mask before the descriptor is re-extracted, so
/// stray bits the guest wrote into reserved positions never leak into the
/// cached descriptor or the readback value.
pub const GITS_BASER_VAL_MASK: u64 = BASER_REG::SIZE.mask << BASER_REG::SIZE.shift
    | BASER_REG::PAGE_SIZE.mask << BASER_REG::PAGE_SIZE.shift
    | BASER_REG::PHYADDR_48.mask << BASER_REG::PHYADDR_48.shift
    | BASER_REG::ENTRY_SIZE.mask << BASER_REG::ENTRY_SIZE.shift
    | BASER_REG::TYPE.mask << BASER_REG::TYPE.shift
    | BASER_REG::INDIRECT.mask << BASER_REG::INDIRECT.shift
    | BASER_REG::VALID.mask << BASER_REG::VALID.shift;

/// Page size in bytes, given a `PAGE_SIZE` field value. `3` is reserved.
pub fn page_size_bytes(page_size_type: u64) -> Option<u64> {
    match page_size_type {
        0 => Some(4 * 1024),
        1 => Some(16 * 1024),
        2 => Some(64 * 1024),
        _ => None,
    }
}
