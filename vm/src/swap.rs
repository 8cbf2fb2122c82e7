//! The disk-backed swap store: a fixed number of page-sized slots with a
//! refcount each, so a slot shared by CoW-forked processes (neither of which
//! has faulted it back in yet) isn't freed until the last reference drops.
//!
//! Grounded on the original's `vm/swap.c` (`swap_add_page`, `swap_get_page`,
//! `swap_inc_page`, `swap_dec_page`, the `swap_check_page` single-order-0
//! guard before eviction) and `vm.h`'s `SWAP_SIZE`/slot bitmap. The file
//! itself is modeled as an external, block-addressable backing store (the
//! `SwapBackend` trait) rather than a literal file descriptor, so the core
//! stays host-testable; `vm::testkit` supplies an in-memory one for tests
//! and the `kernel` crate supplies a real disk-backed one.

use crate::config::{PAGE_SIZE, SWAP_ENTRIES};
use crate::error::VmResult;
use crate::sync::{SleepLock, SpinLock};

/// Index of a page-sized slot in the swap store.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SwapSlot(pub u32);

/// The block device a `SwapStore` writes pages to and reads them back from.
/// Reads and writes may block (disk I/O), so callers only reach this trait
/// from behind a `SleepLock`, never a `SpinLock`.
pub trait SwapBackend {
    fn read_slot(&mut self, slot: SwapSlot, buf: &mut [u8; PAGE_SIZE]) -> VmResult<()>;
    fn write_slot(&mut self, slot: SwapSlot, buf: &[u8; PAGE_SIZE]) -> VmResult<()>;
}

struct SlotIndex {
    refcounts: alloc::vec::Vec<u32>,
}

impl SlotIndex {
    fn new(entries: usize) -> Self {
        SlotIndex {
            refcounts: alloc::vec![0u32; entries],
        }
    }

    /// Panics if every slot is in use. Swap is a fixed-size resource with no
    /// further backing store of its own; there's nowhere left to put the
    /// page, same as the original's full-swap behavior.
    fn alloc_slot(&mut self) -> SwapSlot {
        for (i, rc) in self.refcounts.iter_mut().enumerate() {
            if *rc == 0 {
                *rc = 1;
                return SwapSlot(i as u32);
            }
        }
        panic!("swap space exhausted: all {} slots in use", self.refcounts.len());
    }

    fn inc(&mut self, slot: SwapSlot) {
        self.refcounts[slot.0 as usize] += 1;
    }

    /// Decrements the refcount, returning `true` if it dropped to zero (the
    /// slot is now free and the backend copy can be considered garbage).
    fn dec(&mut self, slot: SwapSlot) -> bool {
        let rc = &mut self.refcounts[slot.0 as usize];
        debug_assert!(*rc > 0);
        *rc -= 1;
        *rc == 0
    }
}

/// The swap store: the slot-refcount index (spinlock, never sleeps) plus the
/// backend (sleepable lock, may block on I/O). Matches the concurrency
/// model's split between the two lock kinds for this component.
pub struct SwapStore<B: SwapBackend> {
    index: SpinLock<SlotIndex>,
    backend: SleepLock<B>,
}

impl<B: SwapBackend> SwapStore<B> {
    pub fn new(backend: B) -> Self {
        SwapStore {
            index: SpinLock::new(SlotIndex::new(SWAP_ENTRIES)),
            backend: SleepLock::new(backend),
        }
    }

    /// Writes `page` out to a freshly allocated slot with refcount 1,
    /// returning the slot. Mirrors `swap_add_page`. Panics if swap is full;
    /// fails with `VmError` only on a backend I/O error.
    pub fn add_page(&self, page: &[u8; PAGE_SIZE]) -> VmResult<SwapSlot> {
        let slot = self.index.lock().alloc_slot();
        let mut backend = self.backend.lock();
        if let Err(e) = backend.write_slot(slot, page) {
            drop(backend);
            self.index.lock().dec(slot);
            return Err(e);
        }
        Ok(slot)
    }

    /// Reads `slot`'s contents back into `page`. Mirrors `swap_get_page`.
    /// Does not touch the refcount — the caller decides separately whether
    /// this read also consumes the reference (via `dec_page`).
    pub fn get_page(&self, slot: SwapSlot, page: &mut [u8; PAGE_SIZE]) -> VmResult<()> {
        self.backend.lock().read_slot(slot, page)
    }

    /// Adds a reference to an existing slot (a CoW fork copying the parent's
    /// swapped-out PTE rather than the frame itself). Mirrors
    /// `swap_inc_page`.
    pub fn inc_page(&self, slot: SwapSlot) {
        self.index.lock().inc(slot);
    }

    /// Drops a reference, freeing the slot once it reaches zero. Mirrors
    /// `swap_dec_page`.
    pub fn dec_page(&self, slot: SwapSlot) {
        self.index.lock().dec(slot);
    }

    pub fn free_slots(&self) -> usize {
        self.index
            .lock()
            .refcounts
            .iter()
            .filter(|&&rc| rc == 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemBackend;

    #[test]
    fn add_then_get_round_trips_contents() {
        let store = SwapStore::new(MemBackend::new());
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0x42;
        let slot = store.add_page(&page).unwrap();
        let mut out = [0u8; PAGE_SIZE];
        store.get_page(slot, &mut out).unwrap();
        assert_eq!(out[0], 0x42);
    }

    #[test]
    fn refcount_keeps_slot_alive_until_last_dec() {
        let store = SwapStore::new(MemBackend::new());
        let page = [0u8; PAGE_SIZE];
        let slot = store.add_page(&page).unwrap();
        store.inc_page(slot);
        let before = store.free_slots();
        store.dec_page(slot);
        assert_eq!(store.free_slots(), before, "still one ref left");
        store.dec_page(slot);
        assert_eq!(store.free_slots(), before + 1);
    }

    #[test]
    fn exhausting_every_slot_panics() {
        use std::panic;

        let store = SwapStore::new(MemBackend::new());
        let page = [0u8; PAGE_SIZE];
        for _ in 0..SWAP_ENTRIES {
            store.add_page(&page).unwrap();
        }

        let res = panic::catch_unwind(panic::AssertUnwindSafe(|| store.add_page(&page)));
        assert!(res.is_err(), "expected a panic on full swap");
    }
}
