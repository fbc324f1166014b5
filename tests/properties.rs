// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the invariants a guest is allowed to rely on.

use gicv3_its_core::device_driver::regs::{self, BASER_REG, CBASER_REG};
use gicv3_its_core::memory::VecGuestMemory;
use gicv3_its_core::redistributor::RecordingRedistributor;
use gicv3_its_core::{GicIts, GuestMemory, ItsConfig};
use proptest::prelude::*;
use register::LocalRegisterCopy;

fn config() -> ItsConfig {
    ItsConfig {
        iidr: 0x0043_b000,
        num_cpu: 4,
        idbits: 15,
        devbits: 15,
        cidbits: 14,
        cil: true,
        max_intid: (1 << 24) - 1,
    }
}

fn new_its() -> (GicIts, VecGuestMemory, RecordingRedistributor) {
    (GicIts::new(config()), VecGuestMemory::new(1 << 20), RecordingRedistributor::default())
}

fn program_tables(its: &mut GicIts, mem: &mut VecGuestMemory, redist: &mut RecordingRedistributor) {
    let mut baser0 = LocalRegisterCopy::<u64, BASER_REG::Register>::new(0);
    baser0.write(
        BASER_REG::TYPE.val(1)
            + BASER_REG::PAGE_SIZE.val(2)
            + BASER_REG::ENTRY_SIZE.val(7)
            + BASER_REG::PHYADDR_64K_LOW.val(0x1000_0000 >> 16)
            + BASER_REG::VALID.val(1),
    );
    its.control_write(regs::BASER, 4, baser0.get() & 0xffff_ffff, mem, redist);
    its.control_write(regs::BASER + 4, 4, (baser0.get() >> 32) & 0xffff_ffff, mem, redist);

    let mut baser1 = LocalRegisterCopy::<u64, BASER_REG::Register>::new(0);
    baser1.write(
        BASER_REG::TYPE.val(4)
            + BASER_REG::PAGE_SIZE.val(2)
            + BASER_REG::ENTRY_SIZE.val(7)
            + BASER_REG::PHYADDR_64K_LOW.val(0x1001_0000 >> 16)
            + BASER_REG::VALID.val(1),
    );
    its.control_write(regs::BASER + regs::BASER_STRIDE, 4, baser1.get() & 0xffff_ffff, mem, redist);
    its.control_write(
        regs::BASER + regs::BASER_STRIDE + 4,
        4,
        (baser1.get() >> 32) & 0xffff_ffff,
        mem,
        redist,
    );

    let mut cbaser = LocalRegisterCopy::<u64, CBASER_REG::Register>::new(0);
    cbaser.write(CBASER_REG::VALID.val(1) + CBASER_REG::PHYADDR.val(0x1002_0000 >> 12));
    its.control_write(regs::CBASER, 4, cbaser.get() & 0xffff_ffff, mem, redist);
    its.control_write(regs::CBASER + 4, 4, (cbaser.get() >> 32) & 0xffff_ffff, mem, redist);

    its.control_write(regs::CTLR, 4, 1, mem, redist);
}

fn submit(mem: &mut VecGuestMemory, its: &mut GicIts, redist: &mut RecordingRedistributor, slot: u64, cmd: [u8; 32]) {
    mem.write_bytes(0x1002_0000 + slot * 32, &cmd).unwrap();
    its.control_write(regs::CWRITER, 4, (slot + 1) << 5, mem, redist);
}

fn mapd(devid: u64, size: u64, itt_addr: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0..8].copy_from_slice(&(0x08u64 | (devid << 32)).to_le_bytes());
    buf[8..16].copy_from_slice(&size.to_le_bytes());
    buf[16..24].copy_from_slice(&(((itt_addr >> 8) << 8) | (1 << 63)).to_le_bytes());
    buf
}

fn mapc(icid: u64, rdbase: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0..8].copy_from_slice(&0x09u64.to_le_bytes());
    buf[16..24].copy_from_slice(&(icid | (rdbase << 16) | (1 << 63)).to_le_bytes());
    buf
}

fn mapti(devid: u64, eventid: u64, pintid: u32, icid: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0..8].copy_from_slice(&(0x0au64 | (devid << 32)).to_le_bytes());
    buf[8..16].copy_from_slice(&(eventid | (u64::from(pintid) << 32)).to_le_bytes());
    buf[16..24].copy_from_slice(&icid.to_le_bytes());
    buf
}

fn int_cmd(devid: u64, eventid: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0..8].copy_from_slice(&(0x03u64 | (devid << 32)).to_le_bytes());
    buf[8..16].copy_from_slice(&eventid.to_le_bytes());
    buf
}

proptest! {
    /// Invariant 1 (§8): writing CBASER or BASER[i] while enabled never
    /// changes the stored value, for any width or payload.
    #[test]
    fn baser_and_cbaser_are_locked_while_enabled(
        value in any::<u64>(),
        width in prop_oneof![Just(4u8), Just(8u8)],
        reg_offset in prop_oneof![Just(regs::CBASER), Just(regs::BASER), Just(regs::BASER + regs::BASER_STRIDE)],
    ) {
        let (mut its, mut mem, mut redist) = new_its();
        its.control_write(regs::CTLR, 4, 1, &mut mem, &mut redist);

        let before = its.control_read(reg_offset, 8);
        its.control_write(reg_offset, width, value, &mut mem, &mut redist);
        let after = its.control_read(reg_offset, 8);

        prop_assert_eq!(before, after);
    }

    /// Invariant 2 (§8): a reserved page-size type in BASER[i] always
    /// clears the register, regardless of what else the guest set.
    #[test]
    fn malformed_baser_page_size_always_clears(
        table_type in prop_oneof![Just(1u64), Just(4u64)],
        entry_size in 0u64..31,
        size in 0u64..255,
    ) {
        let (mut its, mut mem, mut redist) = new_its();

        let mut reg = LocalRegisterCopy::<u64, BASER_REG::Register>::new(0);
        reg.write(
            BASER_REG::TYPE.val(table_type)
                + BASER_REG::PAGE_SIZE.val(3)
                + BASER_REG::ENTRY_SIZE.val(entry_size)
                + BASER_REG::SIZE.val(size)
                + BASER_REG::VALID.val(1),
        );
        its.control_write(regs::BASER, 4, reg.get() & 0xffff_ffff, &mut mem, &mut redist);
        its.control_write(regs::BASER + 4, 4, (reg.get() >> 32) & 0xffff_ffff, &mut mem, &mut redist);

        prop_assert_eq!(its.control_read(regs::BASER, 8), 0);
    }

    /// Invariant 3 (§8): CREADR is never mutated by a direct guest write.
    #[test]
    fn creadr_write_is_a_no_op(value in any::<u64>(), width in prop_oneof![Just(4u8), Just(8u8)]) {
        let (mut its, mut mem, mut redist) = new_its();

        let before = its.control_read(regs::CREADR, 8);
        its.control_write(regs::CREADR, width, value, &mut mem, &mut redist);
        let after = its.control_read(regs::CREADR, 8);

        prop_assert_eq!(before, after);
    }

    /// Invariant 5 (§8): a valid MAPD/MAPC/MAPTI triple followed by an
    /// INT always produces exactly one pend_lpi call with the mapped
    /// cpu/intid pair, for any in-range devid/icid/eventid/pintid/rdbase.
    #[test]
    fn valid_mapping_triple_pends_exactly_once(
        devid in 0u64..1000,
        icid in 0u64..100,
        eventid in 0u64..16,
        pintid in 8192u32..100_000,
        rdbase in 0u64..4,
    ) {
        let (mut its, mut mem, mut redist) = new_its();
        program_tables(&mut its, &mut mem, &mut redist);

        submit(&mut mem, &mut its, &mut redist, 0, mapd(devid, 4, 0x1003_0000));
        submit(&mut mem, &mut its, &mut redist, 1, mapc(icid, rdbase));
        submit(&mut mem, &mut its, &mut redist, 2, mapti(devid, eventid, pintid, icid));
        submit(&mut mem, &mut its, &mut redist, 3, int_cmd(devid, eventid));

        prop_assert_eq!(redist.calls.len(), 1);
        if let Some(call) = redist.calls.first() {
            prop_assert_eq!(*call, gicv3_its_core::redistributor::RedistributorCall::Pend { cpu: rdbase, intid: pintid });
        }
    }

    /// Invariant 7 (§8): an out-of-range pINTID in MAPTI is skipped, so a
    /// following INT on that (devid, eventid) never reaches the
    /// redistributor, and the queue still drains to CWRITER.
    #[test]
    fn out_of_range_pintid_is_skipped_and_queue_still_advances(
        devid in 0u64..1000,
        icid in 0u64..100,
        eventid in 0u64..16,
        bad_pintid in 0u32..8192,
    ) {
        let (mut its, mut mem, mut redist) = new_its();
        program_tables(&mut its, &mut mem, &mut redist);

        submit(&mut mem, &mut its, &mut redist, 0, mapd(devid, 4, 0x1003_0000));
        submit(&mut mem, &mut its, &mut redist, 1, mapc(icid, 1));
        submit(&mut mem, &mut its, &mut redist, 2, mapti(devid, eventid, bad_pintid, icid));
        submit(&mut mem, &mut its, &mut redist, 3, int_cmd(devid, eventid));

        prop_assert!(redist.calls.is_empty());
        prop_assert_eq!(its.control_read(regs::CREADR, 4), 4 << 5);
    }
}
