// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Local interrupt enable/disable with saved levels
//! OWNERS: @kernel-sync-team
//! PUBLIC API: disable(), enable(level), is_enabled(), IsrLevel
//! DEPENDS_ON: riscv::register::sstatus (OS); thread-local depth counter (host)
//! INVARIANTS: enable() receives the level returned by the matching disable(), innermost first

/// Interrupt level saved by [`disable`]; opaque outside this module.
#[must_use = "the saved level must be handed back to isr::enable"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IsrLevel(usize);

/// Masks local interrupts and returns the previous level.
#[inline]
pub fn disable() -> IsrLevel {
    imp::disable()
}

/// Restores a level returned by [`disable`].
#[inline]
pub fn enable(level: IsrLevel) {
    imp::enable(level)
}

/// Returns `true` when local interrupts are currently enabled.
#[inline]
pub fn is_enabled() -> bool {
    imp::is_enabled()
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod imp {
    use super::IsrLevel;
    use riscv::register::sstatus;

    pub fn disable() -> IsrLevel {
        let was_enabled = sstatus::read().sie();
        // SAFETY: masking supervisor interrupts on the local hart has no memory-safety impact.
        unsafe { sstatus::clear_sie() };
        IsrLevel(was_enabled as usize)
    }

    pub fn enable(level: IsrLevel) {
        if level.0 != 0 {
            // SAFETY: only re-enables interrupts that were enabled before the paired disable().
            unsafe { sstatus::set_sie() };
        }
    }

    pub fn is_enabled() -> bool {
        sstatus::read().sie()
    }
}

// Host: every OS thread acts as one CPU, the level is the nesting depth before disable().
#[cfg(all(any(test, feature = "std"), not(all(target_arch = "riscv64", target_os = "none"))))]
mod imp {
    use super::IsrLevel;
    use core::cell::Cell;

    std::thread_local! {
        static DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    pub fn disable() -> IsrLevel {
        DEPTH.with(|depth| {
            let previous = depth.get();
            depth.set(previous + 1);
            IsrLevel(previous)
        })
    }

    pub fn enable(level: IsrLevel) {
        DEPTH.with(|depth| {
            debug_assert_eq!(depth.get(), level.0 + 1, "interrupt levels restored out of order");
            depth.set(level.0);
        })
    }

    pub fn is_enabled() -> bool {
        DEPTH.with(|depth| depth.get() == 0)
    }
}

#[cfg(not(any(test, feature = "std", all(target_arch = "riscv64", target_os = "none"))))]
mod imp {
    use super::IsrLevel;
    use core::sync::atomic::{compiler_fence, Ordering};

    pub fn disable() -> IsrLevel {
        compiler_fence(Ordering::SeqCst);
        IsrLevel(1)
    }

    pub fn enable(_level: IsrLevel) {
        compiler_fence(Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        true
    }
}
