//! The kernel's one `vm::System` singleton, following the same
//! `Mutex<Option<T>>`-behind-a-named-static shape the teacher used for
//! `PHYS_MEM_ALLOC`/`VIRT_MEM_ALLOC`.

use spin::Mutex;

use vm::frame::Pfn;
use vm::system::System;

use crate::swapdev::DiskSwap;

pub static SYSTEM: Mutex<Option<System<DiskSwap>>> = Mutex::new(None);

/// Brings up the zone over `[first_pfn, first_pfn + num_frames)` of
/// physical RAM. Call once, before any fault can occur.
pub fn init(first_pfn: Pfn, num_frames: usize, tlb_seed: u64) {
    *SYSTEM.lock() = Some(System::init(first_pfn, num_frames, DiskSwap, tlb_seed));
}
