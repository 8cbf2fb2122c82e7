//! Compile-time and boot-time constants for the address space layout.
//!
//! Mirrors the way the teacher hardcodes its memory map as `const`s in
//! `memory/paging/mod.rs` (`KERNEL_HEAP_START`, `ADDRESS_SPACE_WIDTH`, ...).
//! Values that are genuinely architecture-defined (where the top of the user
//! address space sits, how much physical RAM a zone spans) are passed in at
//! bootstrap instead of baked in here, so the core stays host-testable.

/// Bytes per page.
pub const PAGE_SIZE: usize = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the page-aligned portion of an address (clears the offset bits).
pub const PAGE_FRAME: usize = !(PAGE_SIZE - 1);

/// Entries per PMD table and per PTE table.
pub const PTRS_PER_PMD: usize = 1024;
pub const PTRS_PER_PTE: usize = 1024;

/// Bits of virtual address consumed by each page-table index.
pub const PMD_INDEX_BITS: u32 = 10;
pub const PTE_INDEX_BITS: u32 = 10;

/// Bytes of virtual address space one PMD entry covers (4 MiB).
pub const PMD_ADDR_SIZE: usize = PTRS_PER_PTE * PAGE_SIZE;

/// Mask used to round a virtual address down to its containing PMD region.
pub const PMD_ADDR_MASK: usize = !(PMD_ADDR_SIZE - 1);

/// Largest order the buddy allocator will hand out (inclusive). Largest block
/// is `PAGE_SIZE << MAX_ORDER` = 256 KiB.
pub const MAX_ORDER: u32 = 6;

/// Number of stack pages installed by `as_define_stack`.
pub const STACK_PAGES: usize = 16;

/// Swap file size (9 MiB) and the resulting number of page-sized slots.
pub const SWAP_SIZE: usize = 9 * 1024 * 1024;
pub const SWAP_ENTRIES: usize = SWAP_SIZE / PAGE_SIZE;

/// Argument block alignment and trailing guard, per `as_define_args`.
pub const ARGS_ALIGN: usize = 8;
pub const ARGS_GUARD: usize = 8;

/// Reclaim kicks in once the zone is this saturated (see `buddy::Zone::alloc_pages`).
pub const RECLAIM_WATERMARK_PERCENT: usize = 90;

/// Number of hardware TLB entries the software cache manages (the MIPS
/// R3000-class TLB this target models has a small, fully software-refilled
/// entry array rather than a hardware page-table walker).
pub const NUM_TLB_ENTRIES: usize = 64;

/// More than this many legacy regions on one address space is `ENOSYS` (see `legacy`).
pub const MAX_LEGACY_REGIONS: usize = 2;

/// Round `addr` down to a page boundary.
#[inline]
pub const fn page_floor(addr: usize) -> usize {
    addr & PAGE_FRAME
}

/// Round `addr` up to a page boundary.
#[inline]
pub const fn page_ceil(addr: usize) -> usize {
    page_floor(addr + PAGE_SIZE - 1)
}

/// `PMD` index (top bits) of a virtual address.
#[inline]
pub const fn pmd_index(va: usize) -> usize {
    (va >> (PAGE_SHIFT + PTE_INDEX_BITS)) & (PTRS_PER_PMD - 1)
}

/// `PTE` index (middle bits) of a virtual address.
#[inline]
pub const fn pte_index(va: usize) -> usize {
    (va >> PAGE_SHIFT) & (PTRS_PER_PTE - 1)
}

/// The byte offset of `addr` within its page.
#[inline]
pub const fn page_offset(addr: usize) -> usize {
    addr & (PAGE_SIZE - 1)
}

/// First address of the next PMD region after `addr`, clamped to `end`.
#[inline]
pub const fn pmd_addr_end(addr: usize, end: usize) -> usize {
    let boundary = (addr + PMD_ADDR_SIZE) & PMD_ADDR_MASK;
    if boundary == 0 || boundary > end {
        end
    } else {
        boundary
    }
}
