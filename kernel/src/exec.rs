//! The concrete `vm::loader::Executable` this kernel hands to `vm`: a
//! program image already sitting in physical memory (placed there by
//! whatever loaded the kernel — a boot module, a ramdisk entry), described
//! by a base pointer and length rather than re-implementing a filesystem
//! here. Finding and opening a program image is explicitly external to the
//! VM core (spec.md §1); this is the thinnest thing that satisfies the
//! trait.

use vm::error::VmResult;
use vm::loader::Executable;

pub struct ImageExecutable {
    base: *const u8,
    file_len: usize,
    mem_len: usize,
}

impl ImageExecutable {
    /// # Safety
    /// `base..base + file_len` must be valid to read for the lifetime of
    /// this value.
    pub unsafe fn new(base: *const u8, file_len: usize, mem_len: usize) -> Self {
        ImageExecutable {
            base,
            file_len,
            mem_len,
        }
    }
}

impl Executable for ImageExecutable {
    fn file_size(&self) -> usize {
        self.file_len
    }

    fn mem_size(&self) -> usize {
        self.mem_len
    }

    fn read_at(&mut self, file_offset: usize, buf: &mut [u8]) -> VmResult<usize> {
        if file_offset >= self.file_len {
            return Ok(0);
        }
        let avail = self.file_len - file_offset;
        let n = avail.min(buf.len());
        // SAFETY: constructor's contract guarantees `base..base+file_len`
        // is valid to read.
        unsafe {
            core::ptr::copy_nonoverlapping(self.base.add(file_offset), buf.as_mut_ptr(), n);
        }
        Ok(n)
    }
}
