// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command queue entry parsing and per-opcode dispatch (§4.4, §6.2).

use log::{debug, warn};

use crate::error::ItsError;
use crate::memory::GuestMemory;
use crate::redistributor::Redistributor;

use super::descriptors::{CollTable, DevTable};
use super::tables::{self, Cte, Dte, Ite};
use super::translate;

/// The first LPI number; INTIDs below this are SPIs/PPIs/SGIs and are never
/// valid targets for `MAPTI`.
pub const LPI_START: u32 = 8192;

/// Three doublewords of payload per command; the fourth is unused.
pub const COMMAND_SIZE: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Mapd,
    Mapc,
    Mapi,
    Mapti,
    Int,
    Clear,
    Discard,
    Sync,
    Unknown(u8),
}

impl Opcode {
    fn from_u8(byte: u8) -> Self {
        match byte {
            0x08 => Opcode::Mapd,
            0x09 => Opcode::Mapc,
            0x0b => Opcode::Mapi,
            0x0a => Opcode::Mapti,
            0x03 => Opcode::Int,
            0x04 => Opcode::Clear,
            0x0f => Opcode::Discard,
            0x05 => Opcode::Sync,
            other => Opcode::Unknown(other),
        }
    }
}

/// A parsed, 32-byte command queue entry. Not every field is meaningful for
/// every opcode; see §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub devid: u64,
    pub eventid: u64,
    pub pintid: u32,
    pub icid: u64,
    pub rdbase: u64,
    pub size: u64,
    pub itt_addr: u64,
    pub valid: bool,
}

fn dword(buf: &[u8; 32], index: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[index * 8..index * 8 + 8]);
    u64::from_le_bytes(word)
}

pub fn parse(buf: [u8; 32]) -> Command {
    let d0 = dword(&buf, 0);
    let d1 = dword(&buf, 1);
    let d2 = dword(&buf, 2);

    Command {
        opcode: Opcode::from_u8((d0 & 0xff) as u8),
        devid: d0 >> 32,
        eventid: d1 & 0xffff_ffff,
        pintid: (d1 >> 32) as u32,
        icid: d2 & 0xffff,
        rdbase: (d2 >> 16) & 0x7_ffff_ffff,
        size: d1 & 0x1f,
        itt_addr: ((d2 >> 8) << 8) & 0x000f_ffff_ffff_ff00,
        valid: d2 >> 63 != 0,
    }
}

/// Everything a command handler needs besides the command itself. Bundled so
/// individual handlers stay readable and unit-testable without threading the
/// whole `GicIts` instance through.
pub struct CommandCtx<'a, M: GuestMemory, R: Redistributor> {
    pub mem: &'a mut M,
    pub redist: &'a mut R,
    pub dt: &'a DevTable,
    pub ct: &'a CollTable,
    pub max_devids: u64,
    pub idbits: u64,
    pub max_intid: u32,
    pub num_cpu: u64,
    pub pta: bool,
}

/// Outcome of dispatching a single command. `Ok` always means "advance
/// `CREADR`"; the distinction between an operand that was silently skipped
/// and one that succeeded is handled entirely through logging, per §4.4 and
/// §7: a command is never "failed" in a way that stalls the queue except on
/// a guest memory fault, which surfaces as `Err`.
pub fn dispatch<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
) -> Result<(), ItsError> {
    match cmd.opcode {
        Opcode::Mapd => mapd(cmd, ctx),
        Opcode::Mapc => mapc(cmd, ctx),
        Opcode::Mapi => mapti(
            &Command {
                pintid: cmd.eventid as u32,
                ..*cmd
            },
            ctx,
        ),
        Opcode::Mapti => mapti(cmd, ctx),
        Opcode::Int => int(cmd, ctx, true),
        Opcode::Clear => int(cmd, ctx, false),
        Opcode::Discard => discard(cmd, ctx),
        Opcode::Sync => {
            debug!("SYNC(rdbase={}): no-op, execution is already synchronous", cmd.rdbase);
            Ok(())
        }
        Opcode::Unknown(op) => {
            warn!("unrecognized ITS command opcode {:#x}, skipping", op);
            Ok(())
        }
    }
}

fn mapd<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
) -> Result<(), ItsError> {
    if cmd.devid > ctx.max_devids {
        warn!("MAPD: devid {} out of range, skipping", cmd.devid);
        return Ok(());
    }
    if cmd.valid && cmd.size > ctx.idbits {
        warn!("MAPD: size {} exceeds IDBITS {}, skipping", cmd.size, ctx.idbits);
        return Ok(());
    }

    let dte = if cmd.valid {
        Dte {
            valid: true,
            size: cmd.size,
            itt_addr: cmd.itt_addr,
        }
    } else {
        Dte::default()
    };

    tables::write_dte(
        ctx.mem,
        ctx.dt.base_addr,
        ctx.dt.entry_sz,
        ctx.dt.page_sz,
        ctx.dt.indirect,
        cmd.devid,
        &dte,
    )
}

fn mapc<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
) -> Result<(), ItsError> {
    if cmd.icid > ctx.ct.max_collids {
        warn!("MAPC: icid {} out of range, skipping", cmd.icid);
        return Ok(());
    }
    if cmd.valid && !ctx.pta && cmd.rdbase > ctx.num_cpu {
        warn!("MAPC: rdbase {} exceeds num_cpu {}, skipping", cmd.rdbase, ctx.num_cpu);
        return Ok(());
    }

    let cte = if cmd.valid {
        Cte {
            valid: true,
            rdbase: cmd.rdbase,
        }
    } else {
        Cte::default()
    };

    tables::write_cte(
        ctx.mem,
        ctx.ct.base_addr,
        ctx.ct.entry_sz,
        ctx.ct.page_sz,
        ctx.ct.indirect,
        cmd.icid,
        &cte,
        ctx.pta,
    )
}

fn mapti<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
) -> Result<(), ItsError> {
    if cmd.devid > ctx.max_devids {
        warn!("MAPTI: devid {} out of range, skipping", cmd.devid);
        return Ok(());
    }
    let dte = tables::read_dte(
        ctx.mem,
        ctx.dt.base_addr,
        ctx.dt.entry_sz,
        ctx.dt.page_sz,
        ctx.dt.indirect,
        cmd.devid,
    )?;
    if !dte.valid {
        warn!("MAPTI: devid {} has no DTE mapped, skipping", cmd.devid);
        return Ok(());
    }
    if cmd.eventid > dte.max_eventid() {
        warn!("MAPTI: eventid {} out of range, skipping", cmd.eventid);
        return Ok(());
    }
    if cmd.icid > ctx.ct.max_collids {
        warn!("MAPTI: icid {} out of range, skipping", cmd.icid);
        return Ok(());
    }
    if cmd.pintid < LPI_START || cmd.pintid > ctx.max_intid {
        warn!("MAPTI: pINTID {:#x} out of range, skipping", cmd.pintid);
        return Ok(());
    }

    let ite = Ite {
        valid: true,
        physical: true,
        pintid: cmd.pintid,
        interrupt_spurious: INTID_SPURIOUS,
        icid: cmd.icid as u16,
    };

    tables::write_ite(ctx.mem, dte.itt_addr, cmd.eventid, &ite)
}

/// Reserved/spurious INTID value GICv3 uses in the `InterruptSpurious`
/// field of a freshly mapped ITE.
pub const INTID_SPURIOUS: u32 = 1023;

fn int<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
    pend: bool,
) -> Result<(), ItsError> {
    translate::translate(
        ctx.mem,
        ctx.redist,
        ctx.dt,
        ctx.ct,
        ctx.max_devids,
        ctx.pta,
        cmd.devid,
        cmd.eventid,
        pend,
    )
}

fn discard<M: GuestMemory, R: Redistributor>(
    cmd: &Command,
    ctx: &mut CommandCtx<'_, M, R>,
) -> Result<(), ItsError> {
    translate::translate(
        ctx.mem,
        ctx.redist,
        ctx.dt,
        ctx.ct,
        ctx.max_devids,
        ctx.pta,
        cmd.devid,
        cmd.eventid,
        false,
    )?;

    if cmd.devid <= ctx.max_devids {
        let dte = tables::read_dte(
            ctx.mem,
            ctx.dt.base_addr,
            ctx.dt.entry_sz,
            ctx.dt.page_sz,
            ctx.dt.indirect,
            cmd.devid,
        )?;
        if dte.valid && cmd.eventid <= dte.max_eventid() {
            tables::write_ite(ctx.mem, dte.itt_addr, cmd.eventid, &Ite::default())?;
        }
    }

    Ok(())
}
