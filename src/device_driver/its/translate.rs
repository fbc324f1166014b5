// SPDX-License-Identifier: MIT OR Apache-2.0

//! The translation pipeline (§4.5): DTE → ITE → CTE → redistributor.
//!
//! Every abandonment here is silent to the caller (the command that invoked
//! it still advances, and a `GITS_TRANSLATER` write still returns success):
//! the pipeline only ever logs on a miss.

use log::debug;

use crate::error::ItsError;
use crate::memory::GuestMemory;
use crate::redistributor::Redistributor;

use super::descriptors::{CollTable, DevTable};
use super::tables;

/// Runs the DTE → ITE → CTE → redistributor pipeline for `(devid, eventid)`.
/// `pend == true` calls `pend_lpi`; `pend == false` calls `clear_lpi`
/// (servicing `CLEAR`/`DISCARD`, or a `GITS_TRANSLATER` write is always a
/// pend). Returns `Ok(())` whether or not a redistributor call happened —
/// abandonment is not an error, only `GuestMemoryError` propagates as one.
#[allow(clippy::too_many_arguments)]
pub fn translate<M: GuestMemory, R: Redistributor>(
    mem: &M,
    redist: &mut R,
    dt: &DevTable,
    ct: &CollTable,
    max_devids: u64,
    pta: bool,
    devid: u64,
    eventid: u64,
    pend: bool,
) -> Result<(), ItsError> {
    if devid > max_devids {
        debug!("translate: devid {} out of range, abandoning", devid);
        return Ok(());
    }

    let dte = tables::read_dte(mem, dt.base_addr, dt.entry_sz, dt.page_sz, dt.indirect, devid)?;
    if !dte.valid {
        debug!("translate: devid {} has no DTE, abandoning", devid);
        return Ok(());
    }

    if eventid > dte.max_eventid() {
        debug!("translate: eventid {} out of range for devid {}, abandoning", eventid, devid);
        return Ok(());
    }

    let ite = tables::read_ite(mem, dte.itt_addr, eventid)?;
    if !ite.valid || !ite.physical {
        debug!(
            "translate: devid {} eventid {} has no valid physical ITE, abandoning",
            devid, eventid
        );
        return Ok(());
    }

    let cte = tables::read_cte(
        mem,
        ct.base_addr,
        ct.entry_sz,
        ct.page_sz,
        ct.indirect,
        u64::from(ite.icid),
        pta,
    )?;
    if !cte.valid {
        debug!("translate: icid {} has no valid CTE, abandoning", ite.icid);
        return Ok(());
    }

    if pta {
        debug!("translate: TYPER.PTA==1 is out of scope, ignoring translation");
        return Ok(());
    }

    if pend {
        redist.pend_lpi(cte.rdbase, ite.pintid);
    } else {
        redist.clear_lpi(cte.rdbase, ite.pintid);
    }

    Ok(())
}
