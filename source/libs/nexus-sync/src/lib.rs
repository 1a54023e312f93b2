// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-safe critical sections for kernel objects shared across CPUs
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 5 unit tests
//! PUBLIC API: IsrLock (lock/into_inner), IsrLockGuard, isr::{disable,enable,is_enabled}, IsrLevel
//! DEPENDS_ON: spin::Mutex, riscv sstatus (OS), thread-local level simulation (host, `std`)
//! INVARIANTS: Interrupts are disabled for the whole lifetime of a guard; levels are restored in strict stack order;
//!             a guard never outlives its lock and is the only way to leave the section

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod isr;

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

pub use isr::IsrLevel;

/// Spin lock that masks local interrupts while it is held.
///
/// This is the short, non-blocking section protecting kernel object state. Code running under the
/// guard must never suspend.
pub struct IsrLock<T> {
    inner: spin::Mutex<T>,
}

static_assertions::assert_impl_all!(IsrLock<u64>: Send, Sync);

impl<T> IsrLock<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: spin::Mutex::new(value) }
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Disables local interrupts, then spins until the lock is acquired.
    pub fn lock(&self) -> IsrLockGuard<'_, T> {
        let level = isr::disable();
        let guard = self.inner.lock();
        IsrLockGuard { guard: ManuallyDrop::new(guard), level }
    }

}

/// Guard of an [`IsrLock`]; dropping it releases the lock, then restores the interrupt level.
pub struct IsrLockGuard<'a, T> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    level: IsrLevel,
}

impl<'a, T> Deref for IsrLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<'a, T> DerefMut for IsrLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<'a, T> Drop for IsrLockGuard<'a, T> {
    fn drop(&mut self) {
        // SAFETY: the inner guard is dropped exactly once, here, and never touched afterwards.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        isr::enable(self.level);
    }
}
