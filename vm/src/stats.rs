//! The ten fault/TLB counters and the invariant checks the original prints
//! warnings for, ported from `instrumentation/fault_stat.c`.

use core::sync::atomic::{AtomicU64, Ordering};

/// Process-wide fault and TLB-event counters. Each field is independently
/// atomic (relaxed ordering — these are statistics, not synchronization
/// points) so any lock held elsewhere doesn't need to cover incrementing
/// them too.
#[derive(Default)]
pub struct FaultStats {
    pub tlb_faults: AtomicU64,
    pub tlb_faults_with_free: AtomicU64,
    pub tlb_faults_with_replace: AtomicU64,
    pub tlb_invalidations: AtomicU64,
    pub tlb_reloads: AtomicU64,
    pub page_faults_zero: AtomicU64,
    pub page_faults_disk: AtomicU64,
    pub page_faults_elf: AtomicU64,
    pub page_faults_swap: AtomicU64,
    pub swap_writes: AtomicU64,
}

macro_rules! bump {
    ($field:expr) => {
        $field.fetch_add(1, Ordering::Relaxed)
    };
}

impl FaultStats {
    pub const fn new() -> Self {
        FaultStats {
            tlb_faults: AtomicU64::new(0),
            tlb_faults_with_free: AtomicU64::new(0),
            tlb_faults_with_replace: AtomicU64::new(0),
            tlb_invalidations: AtomicU64::new(0),
            tlb_reloads: AtomicU64::new(0),
            page_faults_zero: AtomicU64::new(0),
            page_faults_disk: AtomicU64::new(0),
            page_faults_elf: AtomicU64::new(0),
            page_faults_swap: AtomicU64::new(0),
            swap_writes: AtomicU64::new(0),
        }
    }

    pub fn inc_tlb_fault(&self) {
        bump!(self.tlb_faults);
    }
    pub fn inc_tlb_fault_with_free(&self) {
        bump!(self.tlb_faults_with_free);
    }
    pub fn inc_tlb_fault_with_replace(&self) {
        bump!(self.tlb_faults_with_replace);
    }
    pub fn inc_tlb_invalidation(&self) {
        bump!(self.tlb_invalidations);
    }
    pub fn inc_tlb_reload(&self) {
        bump!(self.tlb_reloads);
    }
    pub fn inc_page_fault_zero(&self) {
        bump!(self.page_faults_zero);
    }
    pub fn inc_page_fault_disk(&self) {
        bump!(self.page_faults_disk);
    }
    pub fn inc_page_fault_elf(&self) {
        bump!(self.page_faults_elf);
    }
    pub fn inc_page_fault_swap(&self) {
        bump!(self.page_faults_swap);
    }
    pub fn inc_swap_write(&self) {
        bump!(self.swap_writes);
    }

    fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Logs every counter, then the three cross-checks the original warns
    /// on: a TLB fault must have been satisfied by exactly one of "found a
    /// free slot" or "had to replace a victim"; every TLB fault is either a
    /// reload of an already-resident page or a page fault that had to pull
    /// the page in from disk or zero-fill it; and every disk-backed page
    /// fault is either an ELF load or a swap-in, never both or neither.
    pub fn dump_fault_stats(&self) {
        let tlb_faults = Self::load(&self.tlb_faults);
        let with_free = Self::load(&self.tlb_faults_with_free);
        let with_replace = Self::load(&self.tlb_faults_with_replace);
        let invalidations = Self::load(&self.tlb_invalidations);
        let reloads = Self::load(&self.tlb_reloads);
        let pf_zero = Self::load(&self.page_faults_zero);
        let pf_disk = Self::load(&self.page_faults_disk);
        let pf_elf = Self::load(&self.page_faults_elf);
        let pf_swap = Self::load(&self.page_faults_swap);
        let swap_writes = Self::load(&self.swap_writes);

        log::info!("tlb_faults: {}", tlb_faults);
        log::info!("tlb_faults_with_free: {}", with_free);
        log::info!("tlb_faults_with_replace: {}", with_replace);
        log::info!("tlb_invalidations: {}", invalidations);
        log::info!("tlb_reloads: {}", reloads);
        log::info!("page_faults_zero: {}", pf_zero);
        log::info!("page_faults_disk: {}", pf_disk);
        log::info!("page_faults_elf: {}", pf_elf);
        log::info!("page_faults_swap: {}", pf_swap);
        log::info!("swap_writes: {}", swap_writes);

        if with_free + with_replace != tlb_faults {
            log::warn!(
                "fault_stat: tlb_faults_with_free + tlb_faults_with_replace ({}) != tlb_faults ({})",
                with_free + with_replace,
                tlb_faults
            );
        }
        if tlb_faults != reloads + pf_disk + pf_zero {
            log::warn!(
                "fault_stat: reload + disk + zeroed faults don't sum up to TLB faults ({} != {} + {} + {})",
                tlb_faults,
                reloads,
                pf_disk,
                pf_zero
            );
        }
        if pf_disk != pf_elf + pf_swap {
            log::warn!(
                "fault_stat: swap + ELF faults don't sum up to disk faults ({} != {} + {})",
                pf_disk,
                pf_elf,
                pf_swap
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = FaultStats::new();
        assert_eq!(FaultStats::load(&stats.tlb_faults), 0);
    }

    #[test]
    fn increments_are_observable() {
        let stats = FaultStats::new();
        stats.inc_tlb_fault();
        stats.inc_tlb_fault();
        assert_eq!(FaultStats::load(&stats.tlb_faults), 2);
    }
}
