//! The software TLB cache manager: the architecture's hardware TLB has no
//! walker of its own, so every miss traps and this module decides which
//! entry to (re)write. Grounded on the original's `vm_tlb.c`, reworked to
//! the swap/CoW-aware dispatch spec.md settles on (see Open Question 1):
//! `Dirty` here means "writable", not "has been written", matching the
//! original's overloaded use of the bit for permission rather than history.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::config::NUM_TLB_ENTRIES;
use crate::frame::Pfn;
use crate::stats::FaultStats;

/// One hardware TLB slot as the software cache sees it.
#[derive(Clone, Copy)]
struct Entry {
    valid: bool,
    va_page: usize,
    pfn: Pfn,
    /// Writable. The architecture's TLB has no separate accessed/dirty
    /// bits of its own; "dirty" here is this module's name for the
    /// writable permission bit, per the original's convention.
    dirty: bool,
}

impl Entry {
    const INVALID: Entry = Entry {
        valid: false,
        va_page: 0,
        pfn: Pfn(0),
        dirty: false,
    };
}

/// The software-managed TLB: `NUM_TLB_ENTRIES` slots, refilled entirely by
/// this module on every miss (no hardware page-table walk exists on this
/// architecture).
pub struct Tlb {
    entries: [Entry; NUM_TLB_ENTRIES],
    rng: SmallRng,
}

impl Tlb {
    pub fn new(seed: u64) -> Self {
        Tlb {
            entries: [Entry::INVALID; NUM_TLB_ENTRIES],
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn probe(&self, va_page: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && e.va_page == va_page)
    }

    fn first_invalid(&self) -> Option<usize> {
        self.entries.iter().position(|e| !e.valid)
    }

    fn victim_slot(&mut self) -> usize {
        (self.rng.next_u32() as usize) % NUM_TLB_ENTRIES
    }

    /// Installs `va_page -> pfn` with the given writable bit, replacing any
    /// existing translation for `va_page`, reusing a free slot if one
    /// exists, or evicting a random victim otherwise. Mirrors the
    /// probe/first-free/random-replace policy in the original.
    ///
    /// Does not itself count a reload: whether this install is a spurious
    /// reload of an already-resident page or a fresh install backing a page
    /// fault is a distinction only the caller knows, so `fault.rs` counts
    /// `inc_tlb_reload` itself at the one call site that's spurious.
    pub fn set_page(&mut self, va_page: usize, pfn: Pfn, writable: bool, stats: &FaultStats) {
        stats.inc_tlb_fault();
        let slot = if let Some(existing) = self.probe(va_page) {
            // Overwriting a still-valid entry for this same VA doesn't evict
            // a different page's translation, so it's counted the same way
            // as landing in a free slot.
            stats.inc_tlb_fault_with_free();
            existing
        } else if let Some(free) = self.first_invalid() {
            stats.inc_tlb_fault_with_free();
            free
        } else {
            stats.inc_tlb_fault_with_replace();
            self.victim_slot()
        };
        self.entries[slot] = Entry {
            valid: true,
            va_page,
            pfn,
            dirty: writable,
        };
    }

    /// Clears the writable bit on `va_page`'s entry, if cached — used when a
    /// CoW-shared page needs its permission downgraded without evicting the
    /// translation entirely.
    pub fn set_readonly(&mut self, va_page: usize) {
        if let Some(slot) = self.probe(va_page) {
            self.entries[slot].dirty = false;
        }
    }

    /// Invalidates a single translation (a page was unmapped or swapped
    /// out).
    pub fn flush_one(&mut self, va_page: usize, stats: &FaultStats) {
        if let Some(slot) = self.probe(va_page) {
            self.entries[slot] = Entry::INVALID;
            stats.inc_tlb_invalidation();
        }
    }

    /// Invalidates every entry (a context switch to a different address
    /// space, or a full teardown).
    pub fn flush_all(&mut self) {
        for e in self.entries.iter_mut() {
            *e = Entry::INVALID;
        }
    }

    pub fn is_writable(&self, va_page: usize) -> bool {
        self.probe(va_page).map(|s| self.entries[s].dirty).unwrap_or(false)
    }
}
