//! The process/scheduler boundary. spec.md §1 treats "which process is
//! current" and "how it's scheduled" as external to the VM core; this
//! module is the seam where that external state lives, holding exactly the
//! one `vm::AddressSpace` a real scheduler would hang off its current task
//! control block.

use spin::Mutex;

use vm::AddressSpace;

use crate::exec::ImageExecutable;

/// The address space of whatever task is presently running. `None` before
/// the first task is scheduled, or between a task exiting and its successor
/// being picked — both conditions `vm::fault::vm_fault` reports as
/// `VmError::Fault` rather than panicking on.
pub static CURRENT_ADDRESS_SPACE: Mutex<Option<AddressSpace<ImageExecutable>>> = Mutex::new(None);

pub fn set_current(a_s: AddressSpace<ImageExecutable>) {
    *CURRENT_ADDRESS_SPACE.lock() = Some(a_s);
}

pub fn clear_current() {
    *CURRENT_ADDRESS_SPACE.lock() = None;
}
