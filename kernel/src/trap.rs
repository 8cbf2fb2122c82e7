//! The trap/process boundary: where a MIPS-style TLB exception (refill or
//! mod) becomes a call into `vm::System::vm_fault`.
//!
//! The actual exception vector — saving/restoring the trap frame in
//! assembly, reading the `Cause`/`BadVAddr` coprocessor-0 registers — is
//! architecture glue this scaffold doesn't implement; `handle_tlb_exception`
//! is the point a real vector would call into once it has decoded those
//! two things.

use vm::FaultType;

use crate::proc::CURRENT_ADDRESS_SPACE;
use crate::vmstate::SYSTEM;

/// MIPS coprocessor-0 `ExcCode` values this handler cares about.
#[derive(Clone, Copy)]
pub enum ExcCode {
    TlbLoad,
    TlbStore,
    TlbModify,
}

impl From<ExcCode> for FaultType {
    fn from(code: ExcCode) -> Self {
        match code {
            ExcCode::TlbLoad => FaultType::Read,
            ExcCode::TlbStore => FaultType::Write,
            ExcCode::TlbModify => FaultType::ReadOnly,
        }
    }
}

/// Handles one TLB exception at faulting address `bad_vaddr`. On success,
/// the caller's assembly trampoline simply retries the faulting
/// instruction. On failure, delivers a fatal signal to the current
/// process — stubbed as a panic here since process/signal delivery is the
/// scheduler's responsibility, external to this core.
pub fn handle_tlb_exception(code: ExcCode, bad_vaddr: usize) {
    let system_guard = SYSTEM.lock();
    let system = system_guard.as_ref().expect("vm::System not initialized");
    let mut current = CURRENT_ADDRESS_SPACE.lock();

    if let Err(e) = system.vm_fault(current.as_mut(), code.into(), bad_vaddr) {
        log::error!("fault at {:#x}: {}", bad_vaddr, e);
        panic!("fatal fault delivered to current process: {:?}", e.errno());
    }
}
