//! Serial console output, used both for the handful of boot messages that
//! predate `log` being installed and as the sink `log::Log` impl writes
//! into once it is.

use core::fmt::Write;

use crate::machine::outb;

const SERIAL_PORT: u16 = 0x3F8;

pub struct Debug;

impl Write for Debug {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            unsafe { outb(SERIAL_PORT, byte) };
        }
        Ok(())
    }
}

/// Prints straight to the serial port, bypassing `log`. Used before
/// `install_logger` runs and for panic output, where the logger may itself
/// be in an inconsistent state.
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::debug::Debug, $($arg)*);
    }};
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        printk!("[{}] {}\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

static SERIAL_LOGGER: SerialLogger = SerialLogger;

/// Installs the serial console as the `log` crate's sink. `vm` logs
/// entirely through `log::{trace, debug, warn, error}`; this is the only
/// place that wires those calls to an actual output device.
pub fn install_logger() {
    log::set_logger(&SERIAL_LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .expect("install_logger must only be called once");
}
