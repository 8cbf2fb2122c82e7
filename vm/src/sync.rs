//! The two lock flavors the concurrency model distinguishes: a busy-wait
//! spinlock for short, non-sleeping critical sections (zone bookkeeping, the
//! TLB, the swap slot index), and a sleepable lock for the one thing that may
//! block on I/O (the swap file itself).
//!
//! Both are thin wrappers around `spin::Mutex` rather than two independent
//! implementations — on a single host-test thread, and even on the real
//! target (which has no blocking scheduler primitive inside this crate to
//! wrap), the two behave identically. The separate types exist so call sites
//! say which discipline they're under, and so code review can check that a
//! `SleepLock` guard is never held across a call that also wants a
//! `SpinLock`.

use spin::{Mutex, MutexGuard};

/// A lock that must never be held across anything that can block or sleep.
pub struct SpinLock<T>(Mutex<T>);

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        SpinLock(Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }
}

/// A lock that may be held while waiting on disk I/O (the swap file).
/// Never nest a `SpinLock` acquisition inside a held `SleepLock`'s critical
/// section without releasing the spinlock first.
pub struct SleepLock<T>(Mutex<T>);

impl<T> SleepLock<T> {
    pub const fn new(value: T) -> Self {
        SleepLock(Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }
}
