//! The real backing store for `vm::swap::SwapStore`: a fixed-size region of
//! a disk addressed by page-sized slot. The actual block I/O is a hardware
//! concern this bare-metal scaffold doesn't implement yet (see the `todo!`
//! below) — `vm::testkit::MemBackend` is the one actually exercised by the
//! test suite.

use vm::config::PAGE_SIZE;
use vm::error::VmResult;
use vm::swap::{SwapBackend, SwapSlot};

pub struct DiskSwap;

impl SwapBackend for DiskSwap {
    fn read_slot(&mut self, _slot: SwapSlot, _buf: &mut [u8; PAGE_SIZE]) -> VmResult<()> {
        todo!("ATA/virtio block read for the swap partition")
    }

    fn write_slot(&mut self, _slot: SwapSlot, _buf: &[u8; PAGE_SIZE]) -> VmResult<()> {
        todo!("ATA/virtio block write for the swap partition")
    }
}
