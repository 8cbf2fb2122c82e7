//! The page-fault dispatcher: the one entry point that ties the page table,
//! buddy allocator, swap store, demand loader, and software TLB together.
//! Grounded on the original's (non-`dumbvm`) `vm_fault`, generalized to the
//! swap-aware, CoW-aware form the canonical-header decision (Open Question
//! 1) settled on.

use crate::addrspace::AddressSpace;
use crate::area::AreaKind;
use crate::buddy::{PhysicalMemory, Zone};
use crate::config::{page_floor, PAGE_SIZE};
use crate::error::{VmError, VmResult};
use crate::loader::{load_demand_page, Executable};
use crate::pte::{Pte, PteFlags};
use crate::stats::FaultStats;
use crate::swap::{SwapBackend, SwapStore};
use crate::tlb::Tlb;

/// Why the TLB trapped into software. Numeric values match the exception
/// codes a MIPS-style TLB-refill/TLB-mod trap reports.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FaultType {
    /// TLB refill on a load: no translation was cached for this page at all.
    Read = 0,
    /// TLB refill on a store.
    Write = 1,
    /// TLB Mod: a translation *was* cached, but it was marked read-only and
    /// software now has to decide whether that's a CoW unshare or a real
    /// permission violation.
    ReadOnly = 2,
}

/// Handles a page fault at `va` of kind `fault_type` against `a_s`.
///
/// `a_s` is `None` exactly when there is no current process or no current
/// address space (an interrupt, or a fault taken before process setup
/// completes); that's always `EFAULT`, per the external scheduler/process
/// boundary this core treats as given.
#[allow(clippy::too_many_arguments)]
pub fn vm_fault<E: Executable, B: SwapBackend>(
    a_s: Option<&mut AddressSpace<E>>,
    fault_type: FaultType,
    va: usize,
    zone: &mut Zone,
    mem: &PhysicalMemory,
    swap: &SwapStore<B>,
    tlb: &mut Tlb,
    stats: &FaultStats,
) -> VmResult<()> {
    let a_s = a_s.ok_or(VmError::Fault)?;
    let va_page = page_floor(va);

    let area = a_s.find_area(va_page).ok_or(VmError::Fault)?;
    let wants_write = matches!(fault_type, FaultType::Write | FaultType::ReadOnly);
    if wants_write && !area.permissions.contains(crate::area::Permissions::WRITE) {
        return Err(VmError::Fault);
    }
    if !wants_write && !area.permissions.contains(crate::area::Permissions::READ) {
        return Err(VmError::Fault);
    }
    let area_kind = area.kind.clone();

    let pte = a_s.page_table.lookup(va_page);

    match fault_type {
        FaultType::ReadOnly => {
            let pfn = pte.as_present_frame().ok_or(VmError::Fault)?;
            let frame = zone.frame(pfn);
            if frame.user_count > 1 {
                // Genuinely shared: unshare by copying into a fresh frame.
                let new_pfn = zone.alloc_user_page()?;
                // SAFETY: new_pfn just came off the allocator (exclusive);
                // pfn is read-only to every sharer, so a concurrent reader
                // here can't race a write.
                unsafe { mem.copy_frame(pfn, new_pfn) };
                zone.frame_mut(pfn).user_count -= 1;
                let new_pte = Pte::new_present(new_pfn, PteFlags::WRITABLE | PteFlags::DIRTY)
                    .with_accessed(true);
                a_s.page_table.set(va_page, new_pte);
                tlb.set_page(va_page, new_pfn, true, stats);
            } else {
                // Sole owner already (e.g. the other CoW sibling already
                // unshared and dropped its reference): just flip writable.
                let new_pte = pte.with_writable(true).with_dirty(true).with_accessed(true);
                a_s.page_table.set(va_page, new_pte);
                tlb.set_page(va_page, pfn, true, stats);
            }
            Ok(())
        }

        FaultType::Read | FaultType::Write => {
            if let Some(pfn) = pte.as_present_frame() {
                // Spurious: PTE is fine, the TLB just lost the entry. This is
                // the one case `tlb_reloads` counts: a miss for a page
                // already in memory, not a fresh install backing a fault.
                let writable = pte.is_writable();
                stats.inc_tlb_reload();
                tlb.set_page(va_page, pfn, writable, stats);
                return Ok(());
            }

            let writable = wants_write && area.permissions.contains(crate::area::Permissions::WRITE);

            let pfn = if let Some(slot) = pte.as_swap_slot() {
                stats.inc_page_fault_disk();
                stats.inc_page_fault_swap();
                let new_pfn = zone.alloc_user_page()?;
                let mut buf = [0u8; PAGE_SIZE];
                swap.get_page(slot, &mut buf)?;
                swap.dec_page(slot);
                // SAFETY: new_pfn just came off the allocator.
                unsafe { mem.frame_bytes_mut(new_pfn).copy_from_slice(&buf) };
                new_pfn
            } else {
                match &area_kind {
                    AreaKind::ExecutableFile { .. } => {
                        stats.inc_page_fault_disk();
                        stats.inc_page_fault_elf();
                        let new_pfn = zone.alloc_user_page()?;
                        let exec = a_s.executable().ok_or(VmError::Fault)?.clone();
                        let mut buf = [0u8; PAGE_SIZE];
                        load_demand_page(&mut *exec.borrow_mut(), area, va_page, &mut buf)?;
                        // SAFETY: new_pfn just came off the allocator.
                        unsafe { mem.frame_bytes_mut(new_pfn).copy_from_slice(&buf) };
                        new_pfn
                    }
                    AreaKind::AnonymousMapping | AreaKind::ArgumentRegion | AreaKind::Stack => {
                        stats.inc_page_fault_zero();
                        let new_pfn = zone.alloc_user_page()?;
                        // SAFETY: new_pfn just came off the allocator.
                        unsafe { mem.zero_frame(new_pfn) };
                        new_pfn
                    }
                }
            };

            let mut flags = PteFlags::empty();
            if writable {
                flags |= PteFlags::WRITABLE;
            }
            let new_pte = Pte::new_present(pfn, flags).with_accessed(true);
            a_s.page_table.set(va_page, new_pte);
            tlb.set_page(va_page, pfn, writable, stats);

            if zone.over_watermark() {
                log::debug!("zone over reclaim watermark, running one clock-hand step");
                a_s.reclaim_one_page(zone, mem, swap, tlb, stats)?;
            }

            Ok(())
        }
    }
}
