//! A tiny in-memory test harness standing in for the real backing stores
//! (disk-backed swap, an ELF-like executable) the same way `kernel-vmem`'s
//! `TestPhys`/`BumpAlloc` stand in for a real frame allocator and mapper.
//!
//! Built on nothing but `alloc`, so it's available in both the `std`
//! test/dev build and — if ever useful — a real `no_std` boot, not gated
//! behind `cfg(test)`.

use alloc::vec::Vec;

use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::loader::Executable;
use crate::swap::{SwapBackend, SwapSlot};

/// An in-memory swap backend: a flat byte buffer indexed by slot.
pub struct MemBackend {
    storage: Vec<[u8; PAGE_SIZE]>,
}

impl MemBackend {
    pub fn new() -> Self {
        MemBackend {
            storage: Vec::new(),
        }
    }

    fn ensure_len(&mut self, slot: SwapSlot) {
        let idx = slot.0 as usize;
        if idx >= self.storage.len() {
            self.storage.resize(idx + 1, [0u8; PAGE_SIZE]);
        }
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        MemBackend::new()
    }
}

impl SwapBackend for MemBackend {
    fn read_slot(&mut self, slot: SwapSlot, buf: &mut [u8; PAGE_SIZE]) -> VmResult<()> {
        let idx = slot.0 as usize;
        let page = self.storage.get(idx).ok_or(VmError::Invalid)?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_slot(&mut self, slot: SwapSlot, buf: &[u8; PAGE_SIZE]) -> VmResult<()> {
        self.ensure_len(slot);
        self.storage[slot.0 as usize].copy_from_slice(buf);
        Ok(())
    }
}

/// An in-memory executable: a flat byte buffer with a declared in-memory
/// size (which may exceed the file's length — the tail is demand-zeroed,
/// the BSS case).
pub struct MemExecutable {
    bytes: Vec<u8>,
    mem_size: usize,
}

impl MemExecutable {
    pub fn new(bytes: Vec<u8>, mem_size: usize) -> Self {
        MemExecutable { bytes, mem_size }
    }
}

impl Executable for MemExecutable {
    fn file_size(&self) -> usize {
        self.bytes.len()
    }

    fn mem_size(&self) -> usize {
        self.mem_size
    }

    fn read_at(&mut self, file_offset: usize, buf: &mut [u8]) -> VmResult<usize> {
        if file_offset >= self.bytes.len() {
            return Ok(0);
        }
        let avail = self.bytes.len() - file_offset;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.bytes[file_offset..file_offset + n]);
        Ok(n)
    }
}
