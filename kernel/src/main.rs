//! Bare-metal scaffold: brings up the serial console, the VM subsystem, and
//! the capability registry, then hands off to the scheduler.
//!
//! Task scheduling, the syscall trap glue that decodes a real trap frame,
//! and a filesystem to load program images from are all external to this
//! core (spec.md §1) and are not implemented by this scaffold — see
//! `trap.rs` and `exec.rs` for the seams a real scheduler/loader plug into.

#![no_std]
#![no_main]

extern crate alloc;

#[macro_use]
mod debug;
#[macro_use]
mod cap;
mod exec;
mod machine;
mod proc;
mod swapdev;
mod trap;
mod vmstate;

use core::panic::PanicInfo;

use vm::frame::Pfn;

/// Physical RAM the zone spans, in page-sized frames. A real boot sequence
/// would read this out of the machine's memory map; fixed here since this
/// scaffold has no boot protocol of its own to parse one out of.
const RAM_FRAMES: usize = 4096;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    debug::install_logger();
    printk!("\nvm kernel scaffold booting\n");

    log::info!("bringing up vm::System over {} frames", RAM_FRAMES);
    vmstate::init(Pfn(0), RAM_FRAMES, 0xC0FFEE);

    cap::init();
    log::info!("capability registry ready");

    log::info!("no scheduler wired up; halting");
    halt_forever()
}

fn halt_forever() -> ! {
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    printk!("PANIC: {}\n", info);
    halt_forever()
}
