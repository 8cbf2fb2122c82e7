//! An address-space area: a half-open virtual range with a permission mask
//! and a backing kind, the unit `as_define_region` and friends operate on.

use bitflags::bitflags;

use crate::config::PAGE_SIZE;

bitflags! {
    /// Effective and maximum ("may") permission bits for one area. Mirrors
    /// the original's `addrspace_area` permission word: the `MAY_*` bits
    /// cap what `mprotect`-equivalents could later grant, independent of
    /// what's effective right now.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Permissions: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const MAY_READ = 1 << 3;
        const MAY_WRITE = 1 << 4;
        const MAY_EXEC = 1 << 5;
    }
}

/// What backs an area's pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AreaKind {
    /// Demand-loaded from an executable image. `file_offset`/`file_size`
    /// describe the window of the file this area maps; bytes past
    /// `file_size` within the area are BSS (demand-zeroed).
    ExecutableFile { file_offset: usize, file_size: usize },
    /// Zero-fill-on-demand, no backing file (heap, anonymous mappings).
    AnonymousMapping,
    /// The `argv`/`envp` block built by `as_define_args`.
    ArgumentRegion,
    /// The process's stack.
    Stack,
}

/// One region of a process's virtual address space: `[start, end)`,
/// permissions, and what backs it.
#[derive(Clone, Debug)]
pub struct Area {
    pub start: usize,
    pub end: usize,
    pub permissions: Permissions,
    pub kind: AreaKind,
    /// How many bytes of the area's first page precede the segment's real
    /// data (0 unless `as_define_region` rounded a non-page-aligned start
    /// down to build this area). Those leading bytes are never read from
    /// the file; the demand loader leaves them zeroed.
    first_page_skip: usize,
}

impl Area {
    pub fn new(start: usize, end: usize, permissions: Permissions, kind: AreaKind) -> Self {
        debug_assert!(start < end);
        debug_assert!(start % crate::config::PAGE_SIZE == 0);
        debug_assert!(end % crate::config::PAGE_SIZE == 0);
        Area {
            start,
            end,
            permissions,
            kind,
            first_page_skip: 0,
        }
    }

    /// Records how far into its first page the area's real data starts.
    /// Used only by `as_define_region` when it rounds a non-page-aligned
    /// `vaddr` down to a page boundary.
    pub(crate) fn with_first_page_skip(mut self, skip: usize) -> Self {
        self.first_page_skip = skip;
        self
    }

    pub fn contains(&self, va: usize) -> bool {
        va >= self.start && va < self.end
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    /// The in-page destination offset for the page starting at `va_page`:
    /// `first_page_skip` for the area's very first page, zero otherwise.
    fn dest_offset(&self, va_page: usize) -> usize {
        if va_page == self.start {
            self.first_page_skip
        } else {
            0
        }
    }

    /// For an `ExecutableFile` area, the file offset the page starting at
    /// `va_page` corresponds to. Panics on areas of any other kind.
    pub fn file_offset_for(&self, va_page: usize) -> usize {
        match self.kind {
            AreaKind::ExecutableFile { file_offset, .. } => {
                file_offset + (va_page - self.start) + self.dest_offset(va_page)
            }
            _ => unreachable!("file_offset_for called on a non-file area"),
        }
    }

    /// For an `ExecutableFile` area, where in a fresh page buffer the demand
    /// loader should start writing the page starting at `va_page`, and the
    /// maximum number of bytes it may read there (capped by both the page
    /// and how much of the segment remains). The leading `first_page_skip`
    /// bytes of the area's first page, and anything past the segment's file
    /// window, are left at the buffer's zeroed default. Panics on areas of
    /// any other kind.
    pub fn demand_load_window(&self, va_page: usize) -> (usize, usize) {
        match self.kind {
            AreaKind::ExecutableFile { file_size, .. } => {
                let page_offset = va_page - self.start;
                let dest_offset = self.dest_offset(va_page);
                let room_in_page = PAGE_SIZE - dest_offset;
                let remaining_in_segment = file_size.saturating_sub(page_offset);
                (dest_offset, room_in_page.min(remaining_in_segment))
            }
            _ => unreachable!("demand_load_window called on a non-file area"),
        }
    }
}
