//! The physical page allocator: one `Zone` spanning a contiguous run of RAM,
//! split into power-of-two blocks on per-order free-lists, plus the raw byte
//! arena the frames actually live in.
//!
//! Grounded on the original's `vm/vm.h` zone/free_area layout (`MAX_ORDER`,
//! the per-order free-list array) and `coremap.c`'s expand/coalesce shape,
//! reworked as safe indexed lists over `FrameTable` rather than the
//! original's linked pointers, per the ownership-tree redesign direction.

use core::cell::UnsafeCell;

use crate::config::{MAX_ORDER, PAGE_SIZE, RECLAIM_WATERMARK_PERCENT};
use crate::error::{VmError, VmResult};
use crate::frame::{Frame, FrameState, FrameTable, Pfn};

/// The raw backing bytes for every frame a `Zone` manages, addressed by
/// `Pfn`. Kept apart from the frame table's bookkeeping lock: zeroing or
/// copying a page's contents shouldn't require holding the zone spinlock,
/// only possession of the frame (enforced by the caller's protocol, not by
/// the borrow checker — the same trust boundary the original has between
/// `page_to_kvaddr` and the coremap lock).
pub struct PhysicalMemory {
    first_pfn: Pfn,
    num_frames: usize,
    bytes: UnsafeCell<alloc::boxed::Box<[u8]>>,
}

// SAFETY: callers only ever reach into disjoint, per-frame slices; never two
// overlapping slices of the same frame at once. See `frame_bytes_mut`.
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    pub fn new(first_pfn: Pfn, num_frames: usize) -> Self {
        PhysicalMemory {
            first_pfn,
            num_frames,
            bytes: UnsafeCell::new(alloc::vec![0u8; num_frames * PAGE_SIZE].into_boxed_slice()),
        }
    }

    fn offset(&self, pfn: Pfn) -> usize {
        debug_assert!(pfn.0 >= self.first_pfn.0);
        ((pfn.0 - self.first_pfn.0) as usize) * PAGE_SIZE
    }

    /// Read-only view of `pfn`'s contents.
    ///
    /// # Safety
    /// The caller must not hold a concurrent mutable view of the same frame.
    pub unsafe fn frame_bytes(&self, pfn: Pfn) -> &[u8] {
        let off = self.offset(pfn);
        let base = &*self.bytes.get();
        &base[off..off + PAGE_SIZE]
    }

    /// Mutable view of `pfn`'s contents.
    ///
    /// # Safety
    /// The caller must hold exclusive logical ownership of `pfn` (it just
    /// came off the allocator, or its `user_count` is 1 and the caller holds
    /// the address space lock that serializes writers).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn frame_bytes_mut(&self, pfn: Pfn) -> &mut [u8] {
        let off = self.offset(pfn);
        let base = &mut *self.bytes.get();
        &mut base[off..off + PAGE_SIZE]
    }

    pub unsafe fn zero_frame(&self, pfn: Pfn) {
        self.frame_bytes_mut(pfn).fill(0);
    }

    /// Copies `src`'s contents into `dst`. Used by CoW unshare and by
    /// swap-in/out.
    pub unsafe fn copy_frame(&self, src: Pfn, dst: Pfn) {
        let s = self.frame_bytes(src).to_vec();
        self.frame_bytes_mut(dst).copy_from_slice(&s);
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }
}

/// Physical page allocator bookkeeping for one zone: the frame table plus a
/// free-list head per order. Guarded as a unit by a single lock at the call
/// site (see `crate::sync::SpinLock`) — every field here is touched under
/// that one lock, matching the concurrency model's "operations on the zone
/// serialize on a single lock" rule.
pub struct Zone {
    frames: FrameTable,
    free_heads: [Option<Pfn>; (MAX_ORDER + 1) as usize],
    free_counts: [usize; (MAX_ORDER + 1) as usize],
    allocated_pages: usize,
}

impl Zone {
    /// Builds a zone over `num_frames` pages starting at `first_pfn`,
    /// carving the whole range into free blocks at the largest order that
    /// divides it evenly (mirrors the original's zone-init loop).
    pub fn new(first_pfn: Pfn, num_frames: usize) -> Self {
        let mut frames = FrameTable::new(first_pfn, num_frames);
        let mut free_heads = [None; (MAX_ORDER + 1) as usize];
        let mut free_counts = [0usize; (MAX_ORDER + 1) as usize];

        let mut cursor = 0usize;
        while cursor < num_frames {
            let remaining = num_frames - cursor;
            let mut order = MAX_ORDER;
            while order > 0 && ((1usize << order) > remaining || cursor % (1usize << order) != 0) {
                order -= 1;
            }
            let pfn = first_pfn.offset(cursor as u32);
            Zone::push_free(&mut frames, &mut free_heads, &mut free_counts, pfn, order);
            cursor += 1usize << order;
        }

        Zone {
            frames,
            free_heads,
            free_counts,
            allocated_pages: 0,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.frames.num_frames()
    }

    pub fn allocated_pages(&self) -> usize {
        self.allocated_pages
    }

    /// True once the zone has crossed the reclaim watermark (§4.6):
    /// allocation should trigger a clock-hand reclaim pass before (or
    /// instead of) failing with `ENOMEM`.
    pub fn over_watermark(&self) -> bool {
        self.allocated_pages * 100 >= self.total_pages() * RECLAIM_WATERMARK_PERCENT
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameTable {
        &mut self.frames
    }

    fn push_free(
        frames: &mut FrameTable,
        heads: &mut [Option<Pfn>],
        counts: &mut [usize],
        pfn: Pfn,
        order: u32,
    ) {
        let old_head = heads[order as usize];
        frames.set_links(pfn, None, old_head);
        if let Some(h) = old_head {
            let (_, next) = (frames.link_prev(h), frames.link_next(h));
            frames.set_links(h, Some(pfn), next);
        }
        heads[order as usize] = Some(pfn);
        counts[order as usize] += 1;
        let f = frames.get_mut(pfn);
        f.state = FrameState::InBuddy;
        f.order = order;
    }

    fn pop_free(
        frames: &mut FrameTable,
        heads: &mut [Option<Pfn>],
        counts: &mut [usize],
        order: u32,
    ) -> Option<Pfn> {
        let head = heads[order as usize]?;
        let next = frames.link_next(head);
        heads[order as usize] = next;
        if let Some(n) = next {
            let (_, nn) = (frames.link_prev(n), frames.link_next(n));
            frames.set_links(n, None, nn);
        }
        frames.unlink(head);
        counts[order as usize] -= 1;
        Some(head)
    }

    fn remove_free(
        frames: &mut FrameTable,
        heads: &mut [Option<Pfn>],
        counts: &mut [usize],
        pfn: Pfn,
        order: u32,
    ) {
        let (prev, next) = (frames.link_prev(pfn), frames.link_next(pfn));
        match prev {
            Some(p) => {
                let pn = frames.link_next(p);
                debug_assert_eq!(pn, Some(pfn));
                let pp = frames.link_prev(p);
                frames.set_links(p, pp, next);
            }
            None => heads[order as usize] = next,
        }
        if let Some(n) = next {
            let np = frames.link_prev(n);
            debug_assert_eq!(np, Some(pfn));
            let nn = frames.link_next(n);
            frames.set_links(n, np, nn);
            let _ = nn;
        }
        frames.unlink(pfn);
        counts[order as usize] -= 1;
    }

    /// Splits a free block at `order` down to `target_order`, pushing each
    /// upper half back onto the free-list at the order it was split at.
    fn expand(&mut self, pfn: Pfn, mut order: u32, target_order: u32) -> Pfn {
        while order > target_order {
            order -= 1;
            let buddy = pfn.buddy(order);
            Zone::push_free(
                &mut self.frames,
                &mut self.free_heads,
                &mut self.free_counts,
                buddy,
                order,
            );
        }
        pfn
    }

    /// Allocates a block of `2^order` contiguous pages. Returns the PFN of
    /// the block's first page, left in `FrameState::AllocatedKernel` — the
    /// caller reclassifies to `AllocatedUser` if appropriate.
    pub fn alloc_pages(&mut self, order: u32) -> VmResult<Pfn> {
        assert!(order <= MAX_ORDER, "order exceeds MAX_ORDER");
        let mut search = order;
        while search <= MAX_ORDER {
            if let Some(pfn) = Zone::pop_free(
                &mut self.frames,
                &mut self.free_heads,
                &mut self.free_counts,
                search,
            ) {
                let pfn = self.expand(pfn, search, order);
                let f = self.frames.get_mut(pfn);
                f.state = FrameState::AllocatedKernel;
                f.order = order;
                f.user_count = 0;
                f.accessed = false;
                self.allocated_pages += 1usize << order;
                return Ok(pfn);
            }
            search += 1;
        }
        Err(VmError::NoMemory)
    }

    /// Returns a `2^order` block starting at `pfn` to the free lists,
    /// coalescing with its buddy for as long as the buddy is free at the
    /// same order (mirrors the original coalesce loop in `coremap.c`).
    pub fn free_pages(&mut self, mut pfn: Pfn, mut order: u32) {
        self.allocated_pages -= 1usize << order;
        {
            let f = self.frames.get_mut(pfn);
            f.user_count = 0;
        }
        while order < MAX_ORDER {
            let buddy = pfn.buddy(order);
            if !self.frames.contains(buddy) {
                break;
            }
            let buddy_frame = self.frames.get(buddy);
            if buddy_frame.state != FrameState::InBuddy || buddy_frame.order != order {
                break;
            }
            Zone::remove_free(
                &mut self.frames,
                &mut self.free_heads,
                &mut self.free_counts,
                buddy,
                order,
            );
            pfn = if buddy.0 < pfn.0 { buddy } else { pfn };
            order += 1;
        }
        Zone::push_free(
            &mut self.frames,
            &mut self.free_heads,
            &mut self.free_counts,
            pfn,
            order,
        );
    }

    /// Convenience for the common order-0 kernel-page allocation used for
    /// PMD/PTE tables.
    pub fn alloc_kpages(&mut self, order: u32) -> VmResult<Pfn> {
        self.alloc_pages(order)
    }

    pub fn free_kpages(&mut self, pfn: Pfn, order: u32) {
        self.free_pages(pfn, order);
    }

    /// Allocates a single user page (order 0), marked `AllocatedUser` with
    /// `user_count == 1`.
    pub fn alloc_user_page(&mut self) -> VmResult<Pfn> {
        let pfn = self.alloc_pages(0)?;
        let f = self.frames.get_mut(pfn);
        f.state = FrameState::AllocatedUser;
        f.user_count = 1;
        f.accessed = true;
        Ok(pfn)
    }

    /// Returns a frame entry, for callers that need to inspect state/order
    /// without going through allocation (reclaim scan, stats dump).
    pub fn frame(&self, pfn: Pfn) -> &Frame {
        self.frames.get(pfn)
    }

    pub fn frame_mut(&mut self, pfn: Pfn) -> &mut Frame {
        self.frames.get_mut(pfn)
    }

    /// A human-readable per-order free count dump, the `vm` analogue of the
    /// original's coremap page-statistics printout.
    pub fn dump_page_stats(&self) {
        for order in 0..=MAX_ORDER {
            log::debug!(
                "zone: order {} free blocks = {}",
                order,
                self.free_counts[order as usize]
            );
        }
        log::debug!(
            "zone: {} / {} pages allocated",
            self.allocated_pages,
            self.total_pages()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_init_covers_every_frame_exactly_once() {
        let zone = Zone::new(Pfn(0), 16);
        assert_eq!(zone.total_pages(), 16);
        assert_eq!(zone.allocated_pages(), 0);
    }

    #[test]
    fn alloc_and_free_single_page_round_trips() {
        let mut zone = Zone::new(Pfn(0), 16);
        let pfn = zone.alloc_pages(0).unwrap();
        assert_eq!(zone.allocated_pages(), 1);
        zone.free_pages(pfn, 0);
        assert_eq!(zone.allocated_pages(), 0);
    }

    #[test]
    fn exhausting_the_zone_returns_no_memory() {
        let mut zone = Zone::new(Pfn(0), 4);
        let _a = zone.alloc_pages(0).unwrap();
        let _b = zone.alloc_pages(0).unwrap();
        let _c = zone.alloc_pages(0).unwrap();
        let _d = zone.alloc_pages(0).unwrap();
        assert_eq!(zone.alloc_pages(0), Err(VmError::NoMemory));
    }

    #[test]
    fn freeing_both_buddies_coalesces_back_to_full_order() {
        let mut zone = Zone::new(Pfn(0), 16);
        let block = zone.alloc_pages(4).unwrap();
        zone.free_pages(block, 4);
        // A full 16-frame zone split at order 4 should coalesce back to one
        // order-MAX_ORDER-or-4 block capable of satisfying another order-4 alloc.
        let again = zone.alloc_pages(4).unwrap();
        assert_eq!(again, block);
    }

    #[test]
    fn alloc_user_page_sets_user_state_and_count() {
        let mut zone = Zone::new(Pfn(0), 4);
        let pfn = zone.alloc_user_page().unwrap();
        let f = zone.frame(pfn);
        assert_eq!(f.state, FrameState::AllocatedUser);
        assert_eq!(f.user_count, 1);
    }

    #[test]
    fn watermark_trips_past_ninety_percent() {
        let mut zone = Zone::new(Pfn(0), 10);
        for _ in 0..8 {
            zone.alloc_pages(0).unwrap();
        }
        assert!(zone.over_watermark());
    }

    #[test]
    fn physical_memory_zero_and_copy() {
        let mem = PhysicalMemory::new(Pfn(0), 2);
        unsafe {
            mem.frame_bytes_mut(Pfn(0))[0] = 0xAB;
            mem.copy_frame(Pfn(0), Pfn(1));
            assert_eq!(mem.frame_bytes(Pfn(1))[0], 0xAB);
            mem.zero_frame(Pfn(1));
            assert_eq!(mem.frame_bytes(Pfn(1))[0], 0);
        }
    }
}
