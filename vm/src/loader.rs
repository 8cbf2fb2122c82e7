//! The demand loader: turns a page fault inside an executable-backed area
//! into a read of the right byte range from the backing executable, zero
//! filling whatever the file doesn't cover (the BSS tail).
//!
//! The executable itself is an external interface — `Executable` is the
//! boundary spec.md §1 draws around "however the kernel finds and opens a
//! program image"; `vm` only needs page-sized windows out of it.

use crate::area::Area;
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};

/// A backing executable image, as much of it as the demand loader needs:
/// its size on disk, its size in memory (which can exceed the file size —
/// the excess is BSS, demand-zeroed), and random-access reads.
pub trait Executable {
    /// Size of the backing file, in bytes.
    fn file_size(&self) -> usize;

    /// Size of the image once loaded into memory, in bytes. May exceed
    /// `file_size` (BSS); never less.
    fn mem_size(&self) -> usize;

    /// Reads up to `buf.len()` bytes starting at `file_offset`, returning
    /// the number actually read (short at end-of-file, like `pread`).
    fn read_at(&mut self, file_offset: usize, buf: &mut [u8]) -> VmResult<usize>;
}

/// Loads the page of `exec` starting at `va_page` (which must fall inside
/// `area`, an `ExecutableFile` area) into `page`, zero-filling any part of
/// the page the file doesn't cover. Handles a segment whose start isn't
/// page-aligned via `area`'s `demand_load_window`/`file_offset_for`: the
/// leading bytes of the area's first page that precede the real segment
/// data are left zeroed rather than read from whatever precedes it in the
/// file.
///
/// Returns `VmError::BadExecutable` if the file is shorter than its own
/// declared size would require (a truncated executable).
pub fn load_demand_page<E: Executable>(
    exec: &mut E,
    area: &Area,
    va_page: usize,
    page: &mut [u8; PAGE_SIZE],
) -> VmResult<()> {
    page.fill(0);

    let (dest_offset, max_read) = area.demand_load_window(va_page);
    if max_read == 0 {
        // Entirely past the segment's file window: pure BSS, already
        // zeroed above.
        return Ok(());
    }

    let file_offset = area.file_offset_for(va_page);
    if file_offset >= exec.file_size() {
        return Ok(());
    }

    let remaining_in_file = exec.file_size() - file_offset;
    let want = remaining_in_file.min(max_read);
    let got = exec.read_at(file_offset, &mut page[dest_offset..dest_offset + want])?;
    if got < want {
        return Err(VmError::BadExecutable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{AreaKind, Permissions};
    use crate::testkit::MemExecutable;

    fn file_area(start: usize, end: usize, file_offset: usize, file_size: usize) -> Area {
        Area::new(
            start,
            end,
            Permissions::READ | Permissions::MAY_READ,
            AreaKind::ExecutableFile { file_offset, file_size },
        )
    }

    #[test]
    fn full_page_read_from_file() {
        let mut data = alloc::vec![0u8; PAGE_SIZE];
        data[10] = 0xAA;
        let mut exec = MemExecutable::new(data.clone(), PAGE_SIZE);
        let area = file_area(0, PAGE_SIZE, 0, PAGE_SIZE);
        let mut page = [0u8; PAGE_SIZE];
        load_demand_page(&mut exec, &area, 0, &mut page).unwrap();
        assert_eq!(page[10], 0xAA);
    }

    #[test]
    fn partial_file_page_zero_fills_the_bss_tail() {
        let data = alloc::vec![0x11u8; 100];
        let mut exec = MemExecutable::new(data, PAGE_SIZE);
        let area = file_area(0, PAGE_SIZE, 0, 100);
        let mut page = [0u8; PAGE_SIZE];
        load_demand_page(&mut exec, &area, 0, &mut page).unwrap();
        assert_eq!(page[0], 0x11);
        assert_eq!(page[99], 0x11);
        assert_eq!(page[100], 0);
        assert_eq!(page[PAGE_SIZE - 1], 0);
    }

    #[test]
    fn page_entirely_past_file_is_pure_bss() {
        let data = alloc::vec![0x11u8; 10];
        let mut exec = MemExecutable::new(data, 2 * PAGE_SIZE);
        let area = file_area(0, 2 * PAGE_SIZE, 0, 10);
        let mut page = [0xFFu8; PAGE_SIZE];
        load_demand_page(&mut exec, &area, PAGE_SIZE, &mut page).unwrap();
        assert!(page.iter().all(|&b| b == 0));
    }

    #[test]
    fn truncated_file_is_rejected() {
        struct Liar;
        impl Executable for Liar {
            fn file_size(&self) -> usize {
                PAGE_SIZE
            }
            fn mem_size(&self) -> usize {
                PAGE_SIZE
            }
            fn read_at(&mut self, _file_offset: usize, buf: &mut [u8]) -> VmResult<usize> {
                Ok(buf.len() / 2) // lies about how much it actually has
            }
        }
        let mut exec = Liar;
        let area = file_area(0, PAGE_SIZE, 0, PAGE_SIZE);
        let mut page = [0u8; PAGE_SIZE];
        assert_eq!(
            load_demand_page(&mut exec, &area, 0, &mut page),
            Err(VmError::BadExecutable)
        );
    }

    #[test]
    fn non_page_aligned_segment_start_skips_the_leading_bytes() {
        // A segment whose p_vaddr lands 0x40 into its first page: the area
        // gets rounded down to the page boundary, with a first-page skip of
        // 0x40 recording how much of that page is padding, not segment data.
        let skip = 0x40;
        let data: alloc::vec::Vec<u8> = (0..PAGE_SIZE).map(|i| i as u8).collect();
        let mut exec = MemExecutable::new(data.clone(), 2 * PAGE_SIZE);
        let area = file_area(0, PAGE_SIZE, 0, PAGE_SIZE + skip).with_first_page_skip(skip);

        let mut page = [0xFFu8; PAGE_SIZE];
        load_demand_page(&mut exec, &area, 0, &mut page).unwrap();
        assert!(page[..skip].iter().all(|&b| b == 0), "padding must stay zero");
        assert_eq!(&page[skip..], &data[..PAGE_SIZE - skip]);
    }
}
