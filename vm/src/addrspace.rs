//! The address space: a page table plus the ordered list of areas that
//! describe what each range of it is for. Owns the full lifecycle —
//! creation, `fork`-style copy, teardown, and the TLB flush a context switch
//! needs on activation.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::area::{Area, AreaKind, Permissions};
use crate::buddy::{PhysicalMemory, Zone};
use crate::config::{page_ceil, page_floor, ARGS_ALIGN, ARGS_GUARD, PAGE_SIZE, STACK_PAGES};
use crate::error::{VmError, VmResult};
use crate::loader::Executable;
use crate::pagetable::PageTable;
use crate::pte::{Pte, PteFlags};
use crate::swap::{SwapBackend, SwapStore};
use crate::tlb::Tlb;

/// Result of laying out an argument block: where each `argv` entry landed
/// (byte offset from the area's start) and the total size written.
pub struct ArgsLayout {
    pub offsets: Vec<usize>,
    pub total_len: usize,
}

/// One process's virtual address space.
pub struct AddressSpace<E: Executable> {
    pub page_table: PageTable,
    areas: Vec<Area>,
    executable: Option<Rc<RefCell<E>>>,
    legacy_regions: usize,
    /// Clock hand for `reclaim_one_page`: the page index (within the
    /// address space's own resident set, walked area by area) to resume
    /// scanning from next time.
    clock_hand: usize,
}

impl<E: Executable> AddressSpace<E> {
    pub fn new() -> Self {
        AddressSpace {
            page_table: PageTable::new(),
            areas: Vec::new(),
            executable: None,
            legacy_regions: 0,
            clock_hand: 0,
        }
    }

    pub fn set_executable(&mut self, exec: Rc<RefCell<E>>) {
        self.executable = Some(exec);
    }

    pub fn executable(&self) -> Option<&Rc<RefCell<E>>> {
        self.executable.as_ref()
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn find_area(&self, va: usize) -> Option<&Area> {
        self.areas.iter().find(|a| a.contains(va))
    }

    fn overlaps_existing(&self, start: usize, end: usize) -> bool {
        self.areas.iter().any(|a| a.overlaps(start, end))
    }

    fn validate_permissions(perms: Permissions) -> VmResult<()> {
        let effective = perms
            & (Permissions::READ | Permissions::WRITE | Permissions::EXEC);
        let may = Permissions::MAY_READ | Permissions::MAY_WRITE | Permissions::MAY_EXEC;
        let may_bits = perms & may;
        let effective_as_may = Permissions::from_bits_truncate(effective.bits() << 3);
        if !may_bits.contains(effective_as_may) {
            return Err(VmError::Invalid);
        }
        Ok(())
    }

    /// Adds a new area covering `[vaddr, end)`, rounded out to page
    /// boundaries (a segment's `vaddr` need not itself be page-aligned — an
    /// `ExecutableFile` area has its `file_offset`/`file_size` shifted to
    /// match, and the area remembers how many leading bytes of its first
    /// page aren't real segment data so the demand loader can leave them
    /// zeroed). Reserves PTE table slots for the rounded range — still
    /// unmapped, demand paging fills them on first fault. `EINVAL` if the
    /// range is empty, overlaps an existing area, or if `perms`' effective
    /// bits exceed its own `MAY_*` bits.
    pub fn as_define_region(
        &mut self,
        vaddr: usize,
        end: usize,
        perms: Permissions,
        kind: AreaKind,
    ) -> VmResult<()> {
        if vaddr >= end {
            return Err(VmError::Invalid);
        }
        Self::validate_permissions(perms)?;

        let skip = vaddr - page_floor(vaddr);
        let start = page_floor(vaddr);
        let end = page_ceil(end);
        let kind = match kind {
            AreaKind::ExecutableFile { file_offset, file_size } => AreaKind::ExecutableFile {
                file_offset: file_offset.checked_sub(skip).ok_or(VmError::Invalid)?,
                file_size: file_size + skip,
            },
            other => other,
        };

        if self.overlaps_existing(start, end) {
            return Err(VmError::Invalid);
        }
        self.page_table.reserve_range(start, end);
        self.areas
            .push(Area::new(start, end, perms, kind).with_first_page_skip(skip));
        Ok(())
    }

    /// Adds the stack area: `STACK_PAGES` pages ending (exclusive) at `top`,
    /// eagerly allocated and zero-filled (the stack is always touched
    /// immediately on process entry, so there's no reason to fault it in a
    /// page at a time). Returns `top` as the initial stack pointer.
    pub fn as_define_stack(
        &mut self,
        top: usize,
        zone: &mut Zone,
        mem: &PhysicalMemory,
    ) -> VmResult<usize> {
        if top % PAGE_SIZE != 0 {
            return Err(VmError::Invalid);
        }
        let start = top
            .checked_sub(STACK_PAGES * PAGE_SIZE)
            .ok_or(VmError::Invalid)?;
        self.as_define_region(
            start,
            top,
            Permissions::READ | Permissions::WRITE | Permissions::MAY_READ | Permissions::MAY_WRITE,
            AreaKind::Stack,
        )?;
        for va in (start..top).step_by(PAGE_SIZE) {
            let pfn = zone.alloc_user_page()?;
            // SAFETY: pfn just came off the allocator.
            unsafe { mem.zero_frame(pfn) };
            let pte = Pte::new_present(pfn, PteFlags::WRITABLE).with_accessed(true);
            self.page_table.set(va, pte);
        }
        Ok(top)
    }

    /// Lays out `argv` as a packed, NUL-terminated, 8-byte-aligned argument
    /// block starting at `start`, with an 8-byte zero guard past the last
    /// argument, then registers the covering area. `E2BIG` if the packed
    /// block doesn't fit in one page (this core keeps `argv` to a single
    /// page, matching the original's fixed-size argument region).
    pub fn as_define_args(&mut self, start: usize, argv: &[&[u8]]) -> VmResult<ArgsLayout> {
        let mut offsets = Vec::with_capacity(argv.len());
        let mut cursor = 0usize;
        for arg in argv {
            offsets.push(cursor);
            let with_nul = arg.len() + 1;
            let padded = (with_nul + ARGS_ALIGN - 1) & !(ARGS_ALIGN - 1);
            cursor += padded;
        }
        let total_len = cursor + ARGS_GUARD;
        if total_len > PAGE_SIZE {
            return Err(VmError::TooBig);
        }

        let end = start + page_ceil(total_len.max(1));
        self.as_define_region(
            start,
            end,
            Permissions::READ | Permissions::MAY_READ,
            AreaKind::ArgumentRegion,
        )?;
        Ok(ArgsLayout { offsets, total_len })
    }

    /// Writes an already-computed `ArgsLayout`'s bytes into the backing
    /// page(s) of the argument area. Callers allocate/zero the page through
    /// the normal fault path first (or call this right after
    /// `as_define_args`, before the area is ever faulted, using a
    /// caller-supplied freshly zeroed page).
    pub fn write_args_block(page: &mut [u8], argv: &[&[u8]], layout: &ArgsLayout) {
        page[..layout.total_len].fill(0);
        for (arg, &offset) in argv.iter().zip(layout.offsets.iter()) {
            page[offset..offset + arg.len()].copy_from_slice(arg);
            page[offset + arg.len()] = 0;
        }
    }

    /// Registers a legacy-compatibility region. Only the first
    /// `MAX_LEGACY_REGIONS` succeed; any further request is `ENOSYS` (see
    /// `crate::legacy`).
    pub fn as_define_legacy_region(
        &mut self,
        start: usize,
        end: usize,
        perms: Permissions,
    ) -> VmResult<()> {
        crate::legacy::define_legacy_region(self, start, end, perms)
    }

    pub(crate) fn legacy_region_count(&self) -> usize {
        self.legacy_regions
    }

    pub(crate) fn bump_legacy_region_count(&mut self) {
        self.legacy_regions += 1;
    }

    /// Tears down every area, reclaiming present frames back to `zone` and
    /// dropping swap references. The address space is left empty and ready
    /// to be dropped.
    pub fn destroy<B: SwapBackend>(&mut self, zone: &mut Zone, swap: &SwapStore<B>) {
        for area in self.areas.drain(..).collect::<Vec<_>>() {
            self.page_table
                .destroy_range(area.start, area.end, swap, |pfn| zone.free_pages(pfn, 0));
        }
    }

    /// Builds a child address space sharing this one's executable and
    /// CoW-sharing every present page (fork). Frames shared this way have
    /// their user-count bumped in `zone` by the caller via `on_present`.
    pub fn fork<B: SwapBackend>(&mut self, swap: &SwapStore<B>, zone: &mut Zone) -> AddressSpace<E> {
        let mut child = AddressSpace::new();
        child.executable = self.executable.clone();
        child.legacy_regions = self.legacy_regions;
        for area in self.areas.clone() {
            self.page_table.copy_range(
                &mut child.page_table,
                area.start,
                area.end,
                swap,
                |pfn| zone.frame_mut(pfn).user_count += 1,
            );
            child.areas.push(area);
        }
        child
    }

    /// Called on a context switch to this address space: flushes the
    /// software TLB, since it carries no address-space tag and must not
    /// serve stale translations for the previous address space.
    pub fn activate(&self, tlb: &mut Tlb) {
        tlb.flush_all();
    }

    /// Runs one clock-hand step of the page-reclaim scan (§4.6): walks this
    /// address space's own resident pages starting from where the last scan
    /// left off, clearing the `Accessed` bit on anything it passes over,
    /// and evicts the first frame it finds already unaccessed that also
    /// passes the original's `swap_check_page` guard — a single, unshared
    /// (`user_count == 1`, `order == 0`) user page. Shared (CoW) and
    /// multi-frame allocations are skipped entirely: they are never valid
    /// swap victims. Returns `Ok(())` having evicted nothing if the whole
    /// address space was scanned without finding a victim.
    pub fn reclaim_one_page<B: SwapBackend>(
        &mut self,
        zone: &mut Zone,
        mem: &PhysicalMemory,
        swap: &SwapStore<B>,
        tlb: &mut Tlb,
        stats: &crate::stats::FaultStats,
    ) -> VmResult<()> {
        let pages: Vec<usize> = self
            .areas
            .iter()
            .flat_map(|a| (a.start..a.end).step_by(PAGE_SIZE))
            .collect();
        if pages.is_empty() {
            return Ok(());
        }

        for step in 0..pages.len() {
            let idx = (self.clock_hand + step) % pages.len();
            let va = pages[idx];
            let pte = self.page_table.lookup(va);
            let Some(pfn) = pte.as_present_frame() else {
                continue;
            };
            let frame = zone.frame(pfn);
            if frame.order != 0 || frame.user_count != 1 {
                continue;
            }
            if pte.is_accessed() {
                self.page_table.set(va, pte.with_accessed(false));
                zone.frame_mut(pfn).accessed = false;
                continue;
            }

            // Found a victim: write it out, replace its PTE with a swap
            // entry, drop its TLB translation, and free the frame.
            let mut buf = [0u8; PAGE_SIZE];
            // SAFETY: user_count == 1, so no other mapping can race this read.
            buf.copy_from_slice(unsafe { mem.frame_bytes(pfn) });
            let slot = swap.add_page(&buf)?;
            stats.inc_swap_write();
            self.page_table.set(va, crate::pte::Pte::new_swap(slot));
            tlb.flush_one(va, stats);
            zone.free_pages(pfn, 0);
            self.clock_hand = (idx + 1) % pages.len();
            return Ok(());
        }

        self.clock_hand = 0;
        Ok(())
    }
}

impl<E: Executable> Default for AddressSpace<E> {
    fn default() -> Self {
        AddressSpace::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MemBackend, MemExecutable};

    fn perms(r: bool, w: bool, x: bool) -> Permissions {
        let mut p = Permissions::MAY_READ | Permissions::MAY_WRITE | Permissions::MAY_EXEC;
        if r {
            p |= Permissions::READ;
        }
        if w {
            p |= Permissions::WRITE;
        }
        if x {
            p |= Permissions::EXEC;
        }
        p
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let mut a_s = AddressSpace::<MemExecutable>::new();
        a_s.as_define_region(0, 0x2000, perms(true, true, false), AreaKind::AnonymousMapping)
            .unwrap();
        let err = a_s
            .as_define_region(0x1000, 0x3000, perms(true, true, false), AreaKind::AnonymousMapping)
            .unwrap_err();
        assert_eq!(err, VmError::Invalid);
    }

    #[test]
    fn effective_perms_must_be_a_subset_of_may_bits() {
        let mut a_s = AddressSpace::<MemExecutable>::new();
        let bad = Permissions::WRITE | Permissions::MAY_READ; // WRITE without MAY_WRITE
        let err = a_s
            .as_define_region(0, 0x1000, bad, AreaKind::AnonymousMapping)
            .unwrap_err();
        assert_eq!(err, VmError::Invalid);
    }

    #[test]
    fn stack_area_lands_below_top_and_is_eagerly_zeroed() {
        let mut zone = Zone::new(crate::frame::Pfn(0), 16);
        let mem = PhysicalMemory::new(crate::frame::Pfn(0), 16);
        let mut a_s = AddressSpace::<MemExecutable>::new();
        let sp = a_s.as_define_stack(0x10000, &mut zone, &mem).unwrap();
        assert_eq!(sp, 0x10000);

        let area = a_s.find_area(0x10000 - 4).unwrap();
        assert_eq!(area.end, 0x10000);
        assert_eq!(area.start, 0x10000 - STACK_PAGES * PAGE_SIZE);

        for va in (area.start..area.end).step_by(PAGE_SIZE) {
            let pfn = a_s.page_table.lookup(va).as_present_frame().unwrap();
            assert!(unsafe { mem.frame_bytes(pfn) }.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn argv_layout_packs_with_alignment_and_guard() {
        let mut a_s = AddressSpace::<MemExecutable>::new();
        let argv: [&[u8]; 2] = [b"a", b"bb"];
        let layout = a_s.as_define_args(0x7000_0000, &argv).unwrap();
        assert_eq!(layout.offsets, alloc::vec![0, 8]);
        // "a\0" -> 2 bytes, padded to 8; "bb\0" -> 3 bytes, padded to 8; +8 guard.
        assert_eq!(layout.total_len, 8 + 8 + 8);
    }

    #[test]
    fn fork_shares_present_frames_read_only() {
        let mut zone = Zone::new(crate::frame::Pfn(0), 4);
        let swap = SwapStore::new(MemBackend::new());
        let mut parent = AddressSpace::<MemExecutable>::new();
        parent
            .as_define_region(0, 0x1000, perms(true, true, false), AreaKind::AnonymousMapping)
            .unwrap();
        let pfn = zone.alloc_user_page().unwrap();
        parent.page_table.set(
            0,
            crate::pte::Pte::new_present(pfn, crate::pte::PteFlags::WRITABLE),
        );
        let child = parent.fork(&swap, &mut zone);
        assert!(!parent.page_table.lookup(0).is_writable());
        assert!(!child.page_table.lookup(0).is_writable());
        assert_eq!(zone.frame(pfn).user_count, 2);
    }

    #[test]
    fn reclaim_swaps_out_an_unaccessed_single_owner_page() {
        let mut zone = Zone::new(crate::frame::Pfn(0), 4);
        let mem = PhysicalMemory::new(crate::frame::Pfn(0), 4);
        let swap = SwapStore::new(MemBackend::new());
        let mut tlb = Tlb::new(1);
        let stats = crate::stats::FaultStats::new();

        let mut a_s = AddressSpace::<MemExecutable>::new();
        a_s.as_define_region(0, PAGE_SIZE, perms(true, true, false), AreaKind::AnonymousMapping)
            .unwrap();
        let pfn = zone.alloc_user_page().unwrap();
        zone.frame_mut(pfn).accessed = false;
        a_s.page_table.set(
            0,
            crate::pte::Pte::new_present(pfn, crate::pte::PteFlags::WRITABLE)
                .with_accessed(false),
        );

        a_s.reclaim_one_page(&mut zone, &mem, &swap, &mut tlb, &stats)
            .unwrap();

        assert!(a_s.page_table.lookup(0).is_swapped());
        assert_eq!(zone.allocated_pages(), 0);
    }

    #[test]
    fn reclaim_skips_shared_pages_and_clears_accessed_instead() {
        let mut zone = Zone::new(crate::frame::Pfn(0), 4);
        let mem = PhysicalMemory::new(crate::frame::Pfn(0), 4);
        let swap = SwapStore::new(MemBackend::new());
        let mut tlb = Tlb::new(1);
        let stats = crate::stats::FaultStats::new();

        let mut a_s = AddressSpace::<MemExecutable>::new();
        a_s.as_define_region(0, PAGE_SIZE, perms(true, true, false), AreaKind::AnonymousMapping)
            .unwrap();
        let pfn = zone.alloc_user_page().unwrap();
        zone.frame_mut(pfn).user_count = 2;
        a_s.page_table.set(
            0,
            crate::pte::Pte::new_present(pfn, crate::pte::PteFlags::empty()).with_accessed(false),
        );

        a_s.reclaim_one_page(&mut zone, &mem, &swap, &mut tlb, &stats)
            .unwrap();

        assert!(a_s.page_table.lookup(0).as_present_frame().is_some());
        assert_eq!(zone.allocated_pages(), 1);
    }
}
