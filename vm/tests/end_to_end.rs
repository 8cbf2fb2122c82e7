//! Whole-flow scenarios driven through `vm::System`, the same aggregate a
//! real trap handler would hold, rather than the individual-function unit
//! tests living next to each module.

use vm::addrspace::AddressSpace;
use vm::area::{AreaKind, Permissions};
use vm::config::PAGE_SIZE;
use vm::system::System;
use vm::testkit::{MemBackend, MemExecutable};
use vm::FaultType;

fn rw() -> Permissions {
    Permissions::READ | Permissions::WRITE | Permissions::MAY_READ | Permissions::MAY_WRITE
}

#[test]
fn zero_fill_on_first_write_to_a_fresh_anonymous_page() {
    let system = System::init(vm::Pfn(0), 16, MemBackend::new(), 1);
    let mut a_s = AddressSpace::<MemExecutable>::new();
    a_s.as_define_region(0, PAGE_SIZE, rw(), AreaKind::AnonymousMapping)
        .unwrap();

    system
        .vm_fault(Some(&mut a_s), FaultType::Write, 0x40)
        .expect("first write to a freshly defined anonymous page should succeed");

    let pfn = a_s.page_table.lookup(0).as_present_frame().unwrap();
    assert!(unsafe { system.mem.frame_bytes(pfn) }.iter().all(|&b| b == 0));
    assert!(a_s.page_table.lookup(0).is_writable());
}

#[test]
fn fork_then_write_unshares_the_shared_frame() {
    let system = System::init(vm::Pfn(0), 16, MemBackend::new(), 1);
    let mut parent = AddressSpace::<MemExecutable>::new();
    parent
        .as_define_region(0, PAGE_SIZE, rw(), AreaKind::AnonymousMapping)
        .unwrap();

    // Populate the page, then fork: parent and child now CoW-share one frame.
    system.vm_fault(Some(&mut parent), FaultType::Write, 0).unwrap();
    let shared_pfn = parent.page_table.lookup(0).as_present_frame().unwrap();
    unsafe { system.mem.frame_bytes_mut(shared_pfn)[0] = 0xAB };

    let mut child = system.fork_address_space(&mut parent);
    assert_eq!(system.zone.lock().frame(shared_pfn).user_count, 2);
    assert!(!parent.page_table.lookup(0).is_writable());
    assert!(!child.page_table.lookup(0).is_writable());

    // The TLB still thinks the page is read-only-for-write; a store to it
    // traps as a TLB-Mod exception (`ReadOnly`), which should unshare.
    system
        .vm_fault(Some(&mut child), FaultType::ReadOnly, 0)
        .unwrap();

    let child_pfn = child.page_table.lookup(0).as_present_frame().unwrap();
    assert_ne!(child_pfn, shared_pfn, "child should have gotten its own copy");
    assert!(child.page_table.lookup(0).is_writable());
    assert_eq!(unsafe { system.mem.frame_bytes(child_pfn)[0] }, 0xAB);

    // Parent is now the sole owner of the original frame; a subsequent write
    // fault on it is an in-place writable flip, not another copy.
    system
        .vm_fault(Some(&mut parent), FaultType::ReadOnly, 0)
        .unwrap();
    assert_eq!(
        parent.page_table.lookup(0).as_present_frame(),
        Some(shared_pfn)
    );
    assert!(parent.page_table.lookup(0).is_writable());
}

#[test]
fn reclaim_swaps_a_page_out_and_a_later_access_swaps_it_back_in() {
    // A small zone (16 frames, matching MAX_ORDER's largest single block) so
    // crossing the 90% watermark takes only a handful of allocations.
    let system = System::init(vm::Pfn(0), 16, MemBackend::new(), 7);
    let mut a_s = AddressSpace::<MemExecutable>::new();
    a_s.as_define_region(0, 16 * PAGE_SIZE, rw(), AreaKind::AnonymousMapping)
        .unwrap();

    // Touch pages one at a time; once the zone passes the watermark, the
    // fault handler itself triggers a clock-hand reclaim step.
    let mut touched = vec![];
    for i in 0..15usize {
        let va = i * PAGE_SIZE;
        system.vm_fault(Some(&mut a_s), FaultType::Write, va).unwrap();
        unsafe {
            let pfn = a_s.page_table.lookup(va).as_present_frame().unwrap();
            system.mem.frame_bytes_mut(pfn)[0] = (i + 1) as u8;
        }
        touched.push(va);
    }

    let swapped_out: Vec<usize> = touched
        .iter()
        .copied()
        .filter(|&va| a_s.page_table.lookup(va).is_swapped())
        .collect();
    assert!(
        !swapped_out.is_empty(),
        "crossing the watermark should have evicted at least one page"
    );

    // Faulting the evicted page back in must restore its exact contents and
    // release the swap slot it occupied.
    let victim = swapped_out[0];
    let expected = (victim / PAGE_SIZE + 1) as u8;
    let free_slots_before = system.swap.free_slots();
    system
        .vm_fault(Some(&mut a_s), FaultType::Read, victim)
        .unwrap();
    let pfn = a_s.page_table.lookup(victim).as_present_frame().unwrap();
    assert_eq!(unsafe { system.mem.frame_bytes(pfn)[0] }, expected);
    assert_eq!(system.swap.free_slots(), free_slots_before + 1);
}

#[test]
fn exec_backed_area_demand_loads_from_the_right_file_offset() {
    let system = System::init(vm::Pfn(0), 16, MemBackend::new(), 1);

    // A two-page image: page 0 is all 0x11, page 1 (the BSS tail) only has
    // its first half backed by the file — the rest must come back zeroed.
    let mut image = vec![0x11u8; PAGE_SIZE];
    image.extend(vec![0x22u8; PAGE_SIZE / 2]);
    let file_size = image.len();
    let exec = std::rc::Rc::new(core::cell::RefCell::new(MemExecutable::new(
        image,
        2 * PAGE_SIZE,
    )));

    let mut a_s = AddressSpace::<MemExecutable>::new();
    a_s.set_executable(exec);
    a_s.as_define_region(
        0x1000_0000,
        0x1000_0000 + 2 * PAGE_SIZE,
        Permissions::READ | Permissions::EXEC | Permissions::MAY_READ | Permissions::MAY_EXEC,
        AreaKind::ExecutableFile {
            file_offset: 0,
            file_size,
        },
    )
    .unwrap();

    system
        .vm_fault(Some(&mut a_s), FaultType::Read, 0x1000_0000)
        .unwrap();
    let pfn0 = a_s.page_table.lookup(0x1000_0000).as_present_frame().unwrap();
    assert!(unsafe { system.mem.frame_bytes(pfn0) }.iter().all(|&b| b == 0x11));

    let page1 = 0x1000_0000 + PAGE_SIZE;
    system.vm_fault(Some(&mut a_s), FaultType::Read, page1).unwrap();
    let pfn1 = a_s.page_table.lookup(page1).as_present_frame().unwrap();
    let bytes1 = unsafe { system.mem.frame_bytes(pfn1) };
    assert!(bytes1[..PAGE_SIZE / 2].iter().all(|&b| b == 0x22));
    assert!(bytes1[PAGE_SIZE / 2..].iter().all(|&b| b == 0));
}

#[test]
fn writing_to_a_read_only_executable_area_is_a_permission_fault() {
    let system = System::init(vm::Pfn(0), 16, MemBackend::new(), 1);
    let exec = std::rc::Rc::new(core::cell::RefCell::new(MemExecutable::new(
        vec![0u8; PAGE_SIZE],
        PAGE_SIZE,
    )));
    let mut a_s = AddressSpace::<MemExecutable>::new();
    a_s.set_executable(exec);
    a_s.as_define_region(
        0,
        PAGE_SIZE,
        Permissions::READ | Permissions::EXEC | Permissions::MAY_READ | Permissions::MAY_EXEC,
        AreaKind::ExecutableFile {
            file_offset: 0,
            file_size: PAGE_SIZE,
        },
    )
    .unwrap();

    let err = system
        .vm_fault(Some(&mut a_s), FaultType::Write, 0)
        .unwrap_err();
    assert_eq!(err, vm::VmError::Fault);
    assert_eq!(err.errno(), 14); // EFAULT

    // And a fault with no current address space at all is the same error.
    let err = system
        .vm_fault::<MemExecutable>(None, FaultType::Write, 0)
        .unwrap_err();
    assert_eq!(err, vm::VmError::Fault);
}

#[test]
fn argument_block_layout_matches_a_two_element_argv() {
    let mut a_s = AddressSpace::<MemExecutable>::new();
    let argv: [&[u8]; 2] = [b"a", b"bb"];
    let layout = a_s.as_define_args(0x7fff_0000, &argv).unwrap();

    // "a\0" (2 bytes) rounds up to 8; "bb\0" (3 bytes) rounds up to 8; the
    // block additionally carries an 8-byte trailing zero guard.
    assert_eq!(layout.offsets, vec![0, 8]);
    assert_eq!(layout.total_len, 24);

    let mut page = [0xFFu8; PAGE_SIZE];
    AddressSpace::<MemExecutable>::write_args_block(&mut page, &argv, &layout);
    assert_eq!(&page[0..2], b"a\0");
    assert_eq!(&page[8..11], b"bb\0");
    // The guard and inter-argument padding must be zeroed, not left as the
    // page's previous contents.
    assert!(page[2..8].iter().all(|&b| b == 0));
    assert!(page[11..layout.total_len].iter().all(|&b| b == 0));

    let area = a_s.find_area(0x7fff_0000).unwrap();
    assert_eq!(area.kind, AreaKind::ArgumentRegion);
}
