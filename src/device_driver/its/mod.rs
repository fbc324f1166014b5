// SPDX-License-Identifier: MIT OR Apache-2.0

//! GICv3 Interrupt Translation Service emulation core.

mod commands;
mod descriptors;
pub mod regs;
mod tables;
mod translate;

use log::warn;
use register::LocalRegisterCopy;

use crate::error::ItsError;
use crate::memory::{read_command, GuestMemory};
use crate::redistributor::Redistributor;

use commands::{Command, CommandCtx};
use descriptors::{CmdQ, CollTable, DevTable, TableKind};
use regs::{BASER_REG, CBASER_REG, CTLR_REG, CX_READR_WRITER, TYPER_REG};

pub use commands::{Opcode, LPI_START};
pub use descriptors::{CmdQ as CommandQueueDescriptor, CollTable as CollectionTableDescriptor, DevTable as DeviceTableDescriptor};
pub use tables::{Cte, Dte, Ite};

const BASER_DEVICE_INDEX: usize = 0;
const BASER_COLLECTION_INDEX: usize = 1;
const BASER_COUNT: usize = 8;

/// Fixed architectural capabilities the parent GICv3 distributor supplies at
/// construction time. These are baked into `TYPER` on every `reset()`; the
/// guest cannot change them.
#[derive(Debug, Clone, Copy)]
pub struct ItsConfig {
    pub iidr: u32,
    pub num_cpu: u64,
    pub idbits: u64,
    pub devbits: u64,
    pub cidbits: u64,
    pub cil: bool,
    /// Largest LPI INTID the attached redistributors support. Not an
    /// architectural `TYPER` field — it comes from the redistributor's own
    /// property table sizing, which this crate does not own.
    pub max_intid: u32,
}

/// The ITS emulation core: register file, cached table descriptors, command
/// queue interpreter, and translation pipeline.
///
/// `GicIts` owns only its own register file and descriptors (Design Notes
/// §9). Guest memory and the redistributor are external collaborators,
/// passed in by the caller on every entry point that needs them, never
/// stored on the instance.
pub struct GicIts {
    config: ItsConfig,

    ctlr: LocalRegisterCopy<u32, CTLR_REG::Register>,
    typer: LocalRegisterCopy<u64, TYPER_REG::Register>,
    cbaser: LocalRegisterCopy<u64, CBASER_REG::Register>,
    creadr: LocalRegisterCopy<u64, CX_READR_WRITER::Register>,
    cwriter: LocalRegisterCopy<u64, CX_READR_WRITER::Register>,
    baser: [LocalRegisterCopy<u64, BASER_REG::Register>; BASER_COUNT],
    translater: u32,

    dt: DevTable,
    ct: CollTable,
    cq: CmdQ,
}

impl GicIts {
    pub fn new(config: ItsConfig) -> Self {
        let mut its = Self {
            config,
            ctlr: LocalRegisterCopy::new(0),
            typer: LocalRegisterCopy::new(0),
            cbaser: LocalRegisterCopy::new(0),
            creadr: LocalRegisterCopy::new(0),
            cwriter: LocalRegisterCopy::new(0),
            baser: [LocalRegisterCopy::new(0); BASER_COUNT],
            translater: 0,
            dt: DevTable::default(),
            ct: CollTable::default(),
            cq: CmdQ::default(),
        };
        its.reset();
        its
    }

    /// Produces architectural reset values for `TYPER`, `CTLR`, and
    /// `BASER[0..1]` (§4.7). All cached descriptors are invalidated.
    pub fn reset(&mut self) {
        self.dt = DevTable::default();
        self.ct = CollTable::default();
        self.cq = CmdQ::default();
        self.creadr.set(0);
        self.cwriter.set(0);
        self.translater = 0;

        self.ctlr.write(CTLR_REG::QUIESCENT.val(1));

        self.typer.write(
            TYPER_REG::PHYSICAL.val(1)
                + TYPER_REG::ITT_ENTRY_SIZE.val(16)
                + TYPER_REG::IDBITS.val(self.config.idbits)
                + TYPER_REG::DEVBITS.val(self.config.devbits)
                + TYPER_REG::CIL.val(self.config.cil as u64)
                + TYPER_REG::CIDBITS.val(self.config.cidbits),
        );

        for reg in self.baser.iter_mut() {
            reg.set(0);
        }
        self.baser[BASER_DEVICE_INDEX].write(
            BASER_REG::TYPE::Device
                + BASER_REG::PAGE_SIZE::Size64K
                + BASER_REG::ENTRY_SIZE.val(15),
        );
        self.baser[BASER_COLLECTION_INDEX].write(
            BASER_REG::TYPE::Collection
                + BASER_REG::PAGE_SIZE::Size64K
                + BASER_REG::ENTRY_SIZE.val(15),
        );
    }

    fn enabled(&self) -> bool {
        self.ctlr.is_set(CTLR_REG::ENABLED)
    }

    fn pta(&self) -> bool {
        self.typer.read(TYPER_REG::PTA) != 0
    }

    //----------------------------------------------------------------------
    // Control frame
    //----------------------------------------------------------------------

    /// Reads the control frame. Never fails visibly: a reserved offset or
    /// unsupported width is logged and answered as RAZ.
    pub fn control_read(&mut self, offset: u64, width: u8) -> u64 {
        match self.control_read_inner(offset, width) {
            Ok(value) => value,
            Err(err) => {
                warn!("ITS control frame read rejected: {}", err);
                0
            }
        }
    }

    fn control_read_inner(&self, offset: u64, width: u8) -> Result<u64, ItsError> {
        if width == 1 {
            return Err(ItsError::InvalidAccess { offset, width });
        }

        if offset == regs::CTLR {
            return read_word32(self.ctlr.get(), width, offset);
        }
        if offset == regs::IIDR {
            return read_word32(self.config.iidr, width, offset);
        }
        if (regs::TYPER..regs::TYPER + 8).contains(&offset) {
            return read_word64(self.typer.get(), offset, regs::TYPER, width);
        }
        if (regs::CBASER..regs::CBASER + 8).contains(&offset) {
            return read_word64(self.cbaser.get(), offset, regs::CBASER, width);
        }
        if (regs::CREADR..regs::CREADR + 8).contains(&offset) {
            return read_word64(self.creadr.get(), offset, regs::CREADR, width);
        }
        if (regs::CWRITER..regs::CWRITER + 8).contains(&offset) {
            return read_word64(self.cwriter.get(), offset, regs::CWRITER, width);
        }
        if (regs::BASER..regs::BASER + regs::BASER_STRIDE * regs::BASER_COUNT).contains(&offset) {
            let idx = ((offset - regs::BASER) / regs::BASER_STRIDE) as usize;
            let reg_base = regs::BASER + idx as u64 * regs::BASER_STRIDE;
            return read_word64(self.baser[idx].get(), offset, reg_base, width);
        }
        if offset == regs::PIDR2 {
            return read_word32(regs::PIDR2_VALUE, width, offset);
        }

        Err(ItsError::InvalidAccess { offset, width })
    }

    /// Writes the control frame. Like reads, never fails visibly.
    pub fn control_write<M: GuestMemory, R: Redistributor>(
        &mut self,
        offset: u64,
        width: u8,
        value: u64,
        mem: &mut M,
        redist: &mut R,
    ) {
        if let Err(err) = self.control_write_inner(offset, width, value, mem, redist) {
            warn!("ITS control frame write rejected: {}", err);
        }
    }

    fn control_write_inner<M: GuestMemory, R: Redistributor>(
        &mut self,
        offset: u64,
        width: u8,
        value: u64,
        mem: &mut M,
        redist: &mut R,
    ) -> Result<(), ItsError> {
        if width == 1 {
            return Err(ItsError::InvalidAccess { offset, width });
        }

        if offset == regs::CTLR {
            if width != 4 {
                return Err(ItsError::InvalidAccess { offset, width });
            }
            let new = self.ctlr.get() | (value as u32);
            self.ctlr.set(new);
            return Ok(());
        }

        if offset == regs::IIDR {
            return Err(ItsError::InvalidRegisterWrite { register: "IIDR" });
        }
        if (regs::TYPER..regs::TYPER + 8).contains(&offset) {
            return Err(ItsError::InvalidRegisterWrite { register: "TYPER" });
        }
        if (regs::CREADR..regs::CREADR + 8).contains(&offset) {
            return Err(ItsError::InvalidRegisterWrite { register: "CREADR" });
        }

        if (regs::CBASER..regs::CBASER + 8).contains(&offset) {
            return self.write_cbaser(offset, width, value);
        }

        if (regs::CWRITER..regs::CWRITER + 8).contains(&offset) {
            return self.write_cwriter(offset, width, value, mem, redist);
        }

        if (regs::BASER..regs::BASER + regs::BASER_STRIDE * regs::BASER_COUNT).contains(&offset) {
            let idx = ((offset - regs::BASER) / regs::BASER_STRIDE) as usize;
            let sub = (offset - regs::BASER) % regs::BASER_STRIDE;
            return self.write_baser(idx, sub, width, value);
        }

        Err(ItsError::InvalidAccess { offset, width })
    }

    fn write_cbaser(&mut self, offset: u64, width: u8, value: u64) -> Result<(), ItsError> {
        if self.enabled() {
            return Err(ItsError::InvalidRegisterWrite { register: "CBASER" });
        }
        let sub = offset - regs::CBASER;
        match (sub, width) {
            (0, 4) => {
                let old = self.cbaser.get();
                self.cbaser.set((old & 0xffff_ffff_0000_0000) | (value & 0xffff_ffff));
                Ok(())
            }
            (4, 4) => {
                let old = self.cbaser.get();
                self.cbaser.set((old & 0xffff_ffff) | (value << 32));
                self.reextract_cmdq();
                Ok(())
            }
            (0, 8) => {
                self.cbaser.set(value);
                self.reextract_cmdq();
                Ok(())
            }
            _ => Err(ItsError::InvalidAccess { offset, width }),
        }
    }

    fn reextract_cmdq(&mut self) {
        self.cq = descriptors::extract_cmdq(&self.cbaser);
        self.creadr.set(0);
    }

    fn write_cwriter<M: GuestMemory, R: Redistributor>(
        &mut self,
        offset: u64,
        width: u8,
        value: u64,
        mem: &mut M,
        redist: &mut R,
    ) -> Result<(), ItsError> {
        let sub = offset - regs::CWRITER;
        match (sub, width) {
            (0, 4) => {
                let old = self.cwriter.get();
                self.cwriter.set((old & 0xffff_ffff_0000_0000) | (value & 0xffff_ffff));
            }
            (4, 4) => {
                let old = self.cwriter.get();
                self.cwriter.set((old & 0xffff_ffff) | (value << 32));
            }
            (0, 8) => self.cwriter.set(value),
            _ => return Err(ItsError::InvalidAccess { offset, width }),
        }

        if self.enabled() && self.cwriter.get() != self.creadr.get() {
            self.run_commands(mem, redist);
        }
        Ok(())
    }

    fn write_baser(&mut self, idx: usize, sub: u64, width: u8, value: u64) -> Result<(), ItsError> {
        if self.enabled() {
            return Err(ItsError::InvalidRegisterWrite { register: "BASER" });
        }
        let offset = regs::BASER + idx as u64 * regs::BASER_STRIDE + sub;
        match (sub, width) {
            (0, 4) => {
                let old = self.baser[idx].get();
                self.baser[idx].set((old & 0xffff_ffff_0000_0000) | (value & 0xffff_ffff));
                Ok(())
            }
            (4, 4) => {
                let old = self.baser[idx].get();
                let stripped = (value << 32) & regs::GITS_BASER_VAL_MASK;
                self.baser[idx].set((old & 0xffff_ffff) | stripped);
                self.reextract_baser(idx);
                Ok(())
            }
            (0, 8) => {
                self.baser[idx].set(value & regs::GITS_BASER_VAL_MASK);
                self.reextract_baser(idx);
                Ok(())
            }
            _ => Err(ItsError::InvalidAccess { offset, width }),
        }
    }

    fn reextract_baser(&mut self, idx: usize) {
        let extracted = descriptors::extract_table(
            &self.baser[idx],
            self.config.devbits,
            self.config.cidbits,
            self.config.cil,
        );

        let expected = match idx {
            BASER_DEVICE_INDEX => Some(TableKind::Device),
            BASER_COLLECTION_INDEX => Some(TableKind::Collection),
            _ => None,
        };

        match (expected, extracted) {
            (Some(TableKind::Device), Some((TableKind::Device, dt, _))) => self.dt = dt,
            (Some(TableKind::Collection), Some((TableKind::Collection, _, ct))) => self.ct = ct,
            _ => {
                warn!("malformed descriptor written to BASER[{}], clearing", idx);
                self.baser[idx].set(0);
                match expected {
                    Some(TableKind::Device) => self.dt = DevTable::default(),
                    Some(TableKind::Collection) => self.ct = CollTable::default(),
                    None => {}
                }
            }
        }
    }

    //----------------------------------------------------------------------
    // Translation frame
    //----------------------------------------------------------------------

    /// The translation frame is write-only; any read fails.
    pub fn translation_read(&mut self, offset: u64, width: u8) -> u64 {
        warn!(
            "ITS translation frame read at offset {:#x} width {} rejected",
            offset, width
        );
        0
    }

    pub fn translation_write<M: GuestMemory, R: Redistributor>(
        &mut self,
        offset: u64,
        width: u8,
        value: u64,
        requester_id: u16,
        mem: &mut M,
        redist: &mut R,
    ) {
        if offset != regs::GITS_TRANSLATER || (width != 2 && width != 4) {
            warn!(
                "ITS translation frame write at offset {:#x} width {} rejected",
                offset, width
            );
            return;
        }

        self.translater = value as u32;

        if !self.enabled() {
            return;
        }

        let eventid = u64::from(self.translater);
        if let Err(err) = translate::translate(
            mem,
            redist,
            &self.dt,
            &self.ct,
            self.dt.max_devids,
            self.pta(),
            u64::from(requester_id),
            eventid,
            true,
        ) {
            warn!("translation pipeline faulted: {}", err);
        }
    }

    //----------------------------------------------------------------------
    // Command queue interpreter (§4.4)
    //----------------------------------------------------------------------

    fn run_commands<M: GuestMemory, R: Redistributor>(&mut self, mem: &mut M, redist: &mut R) {
        let wr = self.cwriter.read(CX_READR_WRITER::OFFSET);
        let mut rd = self.creadr.read(CX_READR_WRITER::OFFSET);

        if self.cq.max_entries == 0 {
            warn!("command queue has no valid descriptor, ignoring CWRITER update");
            return;
        }
        if wr > self.cq.max_entries {
            warn!("CWRITER {} exceeds queue size {}, aborting", wr, self.cq.max_entries);
            return;
        }

        while rd != wr {
            let addr = self.cq.base_addr + rd * commands::COMMAND_SIZE;
            let raw = match read_command(mem, addr) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("command queue stalled at entry {}: {}", rd, err);
                    break;
                }
            };

            let cmd: Command = commands::parse(raw);
            let mut ctx = CommandCtx {
                mem,
                redist,
                dt: &self.dt,
                ct: &self.ct,
                max_devids: self.dt.max_devids,
                idbits: self.config.idbits,
                max_intid: self.config.max_intid,
                num_cpu: self.config.num_cpu,
                pta: self.pta(),
            };

            match commands::dispatch(&cmd, &mut ctx) {
                Ok(()) => {
                    rd = (rd + 1) % self.cq.max_entries;
                    self.creadr.write(CX_READR_WRITER::OFFSET.val(rd));
                }
                Err(err) => {
                    warn!("command queue stalled at entry {}: {}", rd, err);
                    break;
                }
            }
        }
    }
}

fn read_word32(value: u32, width: u8, offset: u64) -> Result<u64, ItsError> {
    if width != 4 {
        return Err(ItsError::InvalidAccess { offset, width });
    }
    Ok(u64::from(value))
}

/// Reads a 64-bit logical register at `reg_base`, honoring a 32-bit read of
/// either half or a full 64-bit read, per §4.2.
fn read_word64(value: u64, offset: u64, reg_base: u64, width: u8) -> Result<u64, ItsError> {
    let sub = offset - reg_base;
    match (sub, width) {
        (0, 4) => Ok(value & 0xffff_ffff),
        (4, 4) => Ok(value >> 32),
        (0, 8) => Ok(value),
        _ => Err(ItsError::InvalidAccess { offset, width }),
    }
}
