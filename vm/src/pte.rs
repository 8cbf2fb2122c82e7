//! The single-word tagged page table entry: flags in the low `PAGE_SHIFT`
//! bits, a page-aligned value (frame number or swap slot) in the rest.
//!
//! Grounded on the original's `pte_t` (`include/vm.h`) and its accessor
//! family (`pte_present`, `pte_writable`, `pte_to_paddr`, `pte_set_swap`),
//! reworked with `bitflags` for the flag bits and a typed `Pfn`/slot-index
//! accessor pair instead of raw shifts at call sites — per Open Question 1,
//! the value field holds a `Pfn` rather than a literal kernel virtual
//! address or swap byte offset; on this architecture's direct-mapped kernel
//! segment the two are an `O(1)` bijection, so storing the smaller, safer
//! `Pfn` loses nothing.

use bitflags::bitflags;

use crate::config::PAGE_SHIFT;
use crate::frame::Pfn;
use crate::swap::SwapSlot;

bitflags! {
    /// Flag bits packed into the low `PAGE_SHIFT` bits of a `Pte`.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PteFlags: u32 {
        /// The entry currently maps to a resident frame.
        const PRESENT = 1 << 0;
        /// Writable. Cleared on a CoW-shared page; the read-only fault path
        /// checks this bit to decide whether a write fault is a CoW unshare
        /// or a real permission violation.
        const WRITABLE = 1 << 1;
        /// Write-through caching hint, carried for parity with the
        /// original's PTE but not acted on by the TLB manager (no cache
        /// model in scope here).
        const WRITE_THROUGH = 1 << 2;
        /// Set by the TLB reload path when hardware (here: software) use of
        /// the mapping is observed; consulted and cleared by the clock-hand
        /// reclaim scan.
        const ACCESSED = 1 << 3;
        /// The frame has been written since it was loaded; a swap-out of
        /// this page must write its contents rather than drop them.
        const DIRTY = 1 << 4;
        /// The value field is a swap slot index, not a frame number.
        const SWAP = 1 << 5;
    }
}

const VALUE_SHIFT: u32 = PAGE_SHIFT;

/// A page table entry: `PteFlags` plus one page-aligned value, packed into a
/// single machine word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pte(u32);

impl Pte {
    /// The entry with no mapping at all (all flags clear, value zero).
    pub const NONE: Pte = Pte(0);

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & ((1 << VALUE_SHIFT) - 1))
    }

    fn value(self) -> u32 {
        self.0 >> VALUE_SHIFT
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    pub fn is_writable(self) -> bool {
        self.flags().contains(PteFlags::WRITABLE)
    }

    pub fn is_dirty(self) -> bool {
        self.flags().contains(PteFlags::DIRTY)
    }

    pub fn is_accessed(self) -> bool {
        self.flags().contains(PteFlags::ACCESSED)
    }

    pub fn is_swapped(self) -> bool {
        self.flags().contains(PteFlags::SWAP)
    }

    /// The mapped frame, if this entry is present.
    pub fn as_present_frame(self) -> Option<Pfn> {
        self.is_present().then(|| Pfn(self.value()))
    }

    /// The swap slot backing this entry, if it was swapped out.
    pub fn as_swap_slot(self) -> Option<SwapSlot> {
        self.is_swapped().then(|| SwapSlot(self.value()))
    }

    /// Builds a present, resident entry mapping `pfn` with the given flags.
    /// `flags` should not include `SWAP`.
    pub fn new_present(pfn: Pfn, flags: PteFlags) -> Pte {
        debug_assert!(!flags.contains(PteFlags::SWAP));
        Pte(((pfn.0) << VALUE_SHIFT) | (flags | PteFlags::PRESENT).bits())
    }

    /// Builds a swapped-out entry pointing at `slot`. Never present.
    pub fn new_swap(slot: SwapSlot) -> Pte {
        Pte((slot.0 << VALUE_SHIFT) | PteFlags::SWAP.bits())
    }

    /// Returns a copy of this entry with `ACCESSED` set (the TLB reload
    /// path marking use) or cleared (the reclaim scan's clock sweep).
    pub fn with_accessed(self, accessed: bool) -> Pte {
        self.with_flag(PteFlags::ACCESSED, accessed)
    }

    /// Returns a copy of this entry with `DIRTY` set, e.g. on a first write
    /// after a CoW unshare or a fresh zero-fill.
    pub fn with_dirty(self, dirty: bool) -> Pte {
        self.with_flag(PteFlags::DIRTY, dirty)
    }

    /// Returns a copy of this entry with `WRITABLE` cleared — used to mark a
    /// page CoW-shared between parent and child after `pt_copy`.
    pub fn with_writable(self, writable: bool) -> Pte {
        self.with_flag(PteFlags::WRITABLE, writable)
    }

    fn with_flag(self, flag: PteFlags, set: bool) -> Pte {
        let mut f = self.flags();
        f.set(flag, set);
        Pte((self.value() << VALUE_SHIFT) | f.bits())
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_none() {
            write!(f, "Pte(none)")
        } else if let Some(pfn) = self.as_present_frame() {
            write!(f, "Pte(present {:?} {:?})", pfn, self.flags())
        } else if let Some(slot) = self.as_swap_slot() {
            write!(f, "Pte(swap {:?})", slot)
        } else {
            write!(f, "Pte(raw {:#x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_entry_has_no_frame_and_no_slot() {
        let pte = Pte::NONE;
        assert!(pte.is_none());
        assert_eq!(pte.as_present_frame(), None);
        assert_eq!(pte.as_swap_slot(), None);
    }

    #[test]
    fn present_entry_round_trips_frame_and_flags() {
        let pte = Pte::new_present(Pfn(7), PteFlags::WRITABLE);
        assert!(pte.is_present());
        assert!(pte.is_writable());
        assert_eq!(pte.as_present_frame(), Some(Pfn(7)));
        assert_eq!(pte.as_swap_slot(), None);
    }

    #[test]
    fn swap_entry_round_trips_slot_and_is_never_present() {
        let pte = Pte::new_swap(SwapSlot(42));
        assert!(!pte.is_present());
        assert!(pte.is_swapped());
        assert_eq!(pte.as_swap_slot(), Some(SwapSlot(42)));
    }

    #[test]
    fn with_writable_clears_without_disturbing_frame() {
        let pte = Pte::new_present(Pfn(3), PteFlags::WRITABLE | PteFlags::DIRTY);
        let ro = pte.with_writable(false);
        assert!(!ro.is_writable());
        assert!(ro.is_dirty());
        assert_eq!(ro.as_present_frame(), Some(Pfn(3)));
    }
}
