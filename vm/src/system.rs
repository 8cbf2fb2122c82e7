//! The process-wide singleton: one zone, one physical memory arena, one
//! swap store, one TLB, one set of fault counters. Per the concurrency
//! model's "global singletons, bootstrap order frame table → zone → swap,
//! each behind a typed module entry point" note, this struct is the single
//! typed entry point; `kernel` holds exactly one of these behind a
//! `spin::Mutex<Option<System<...>>>`, the same pattern the teacher uses
//! for `PHYS_MEM_ALLOC`/`VIRT_MEM_ALLOC`.

use crate::addrspace::AddressSpace;
use crate::buddy::{PhysicalMemory, Zone};
use crate::error::VmResult;
use crate::fault::{vm_fault, FaultType};
use crate::frame::Pfn;
use crate::loader::Executable;
use crate::stats::FaultStats;
use crate::swap::{SwapBackend, SwapStore};
use crate::sync::SpinLock;
use crate::tlb::Tlb;

/// Bundles every piece of process-wide VM state behind one name.
pub struct System<B: SwapBackend> {
    pub zone: SpinLock<Zone>,
    pub mem: PhysicalMemory,
    pub swap: SwapStore<B>,
    pub tlb: SpinLock<Tlb>,
    pub stats: FaultStats,
}

impl<B: SwapBackend> System<B> {
    /// Brings up the zone over `[first_pfn, first_pfn + num_frames)`, a
    /// swap store on `backend`, and an empty TLB. Mirrors the bootstrap
    /// order the design notes call out: frame table (inside the zone) then
    /// zone then swap.
    pub fn init(first_pfn: Pfn, num_frames: usize, backend: B, tlb_seed: u64) -> Self {
        System {
            zone: SpinLock::new(Zone::new(first_pfn, num_frames)),
            mem: PhysicalMemory::new(first_pfn, num_frames),
            swap: SwapStore::new(backend),
            tlb: SpinLock::new(Tlb::new(tlb_seed)),
            stats: FaultStats::new(),
        }
    }

    /// The single entry point the trap handler calls into.
    pub fn vm_fault<E: Executable>(
        &self,
        a_s: Option<&mut AddressSpace<E>>,
        fault_type: FaultType,
        va: usize,
    ) -> VmResult<()> {
        let mut zone = self.zone.lock();
        let mut tlb = self.tlb.lock();
        vm_fault(
            a_s,
            fault_type,
            va,
            &mut zone,
            &self.mem,
            &self.swap,
            &mut tlb,
            &self.stats,
        )
    }

    /// Tears down an address space, returning its frames and swap slots.
    pub fn destroy_address_space<E: Executable>(&self, a_s: &mut AddressSpace<E>) {
        let mut zone = self.zone.lock();
        a_s.destroy(&mut zone, &self.swap);
    }

    /// Forks an address space, sharing CoW pages and bumping their
    /// reference counts.
    pub fn fork_address_space<E: Executable>(
        &self,
        a_s: &mut AddressSpace<E>,
    ) -> AddressSpace<E> {
        let mut zone = self.zone.lock();
        a_s.fork(&self.swap, &mut zone)
    }

    /// Logs the zone's per-order free counts and the fault-stat dump plus
    /// its invariant cross-checks.
    pub fn dump_stats(&self) {
        self.zone.lock().dump_page_stats();
        self.stats.dump_fault_stats();
    }
}
