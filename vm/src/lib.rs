//! Virtual memory core: buddy-allocated physical pages, a two-level
//! software page table, demand paging, copy-on-write fork, a disk-backed
//! swap store, and the software TLB cache manager for a 32-bit MIPS-like
//! target with no hardware page-table walker.
//!
//! `no_std` on the real target; pulls in `std` under `cargo test` the same
//! way `kernel-vmem` does, so the whole core is exercised on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod addrspace;
pub mod area;
pub mod buddy;
pub mod config;
pub mod error;
pub mod fault;
pub mod frame;
pub mod legacy;
pub mod loader;
pub mod pagetable;
pub mod pte;
pub mod stats;
pub mod swap;
pub mod sync;
pub mod system;
pub mod testkit;
pub mod tlb;

pub use addrspace::AddressSpace;
pub use error::{VmError, VmResult};
pub use fault::FaultType;
pub use frame::Pfn;
pub use system::System;
