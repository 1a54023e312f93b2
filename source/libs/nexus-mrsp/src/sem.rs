// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Semaphore directives over an MrsP resource (binary semaphore with MrsP ceiling)
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Stable (status codes are ABI)
//! TEST_COVERAGE: 3 unit tests + tests/semaphore.rs
//!
//! PUBLIC API: Semaphore (create/obtain/release/flush/set_priority/delete), Status, ObtainOption,
//!             CURRENT_PRIORITY
//!
//! DEPENDS_ON: crate::MrspControl, nexus-sched::DomainRegistry
//! INVARIANTS: Raw priorities cross this boundary, core priorities never do

use alloc::sync::Arc;

use log::debug;
use nexus_sched::{Deadline, DomainId, DomainRegistry, TaskControl};

use crate::control::MrspControl;
use crate::engine::Wait;
use crate::error::MrspError;

/// Passing this to [`Semaphore::set_priority`] only queries the ceiling.
pub const CURRENT_PRIORITY: u64 = 0;

/// Directive status codes.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Successful = 0,
    InvalidId = 4,
    Timeout = 6,
    InvalidNumber = 10,
    NotDefined = 11,
    ResourceInUse = 12,
    Unsatisfied = 13,
    IncorrectState = 14,
    InvalidPriority = 19,
    NotOwnerOfResource = 23,
    InternalError = 25,
    NoMemory = 26,
}

impl Status {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Collapses a directive result into its status code.
    pub fn of(result: Result<(), Status>) -> Self {
        match result {
            Ok(()) => Self::Successful,
            Err(status) => status,
        }
    }
}

impl From<MrspError> for Status {
    fn from(err: MrspError) -> Self {
        match err {
            MrspError::CeilingViolation => Self::InvalidPriority,
            MrspError::SelfDeadlock | MrspError::Deadlock | MrspError::Unavailable => {
                Self::Unsatisfied
            }
            MrspError::UnlockOrder => Self::IncorrectState,
            MrspError::Timeout => Self::Timeout,
            MrspError::NotOwner => Self::NotOwnerOfResource,
            MrspError::ResourceInUse => Self::ResourceInUse,
            MrspError::InvalidDomain => Self::InvalidId,
            MrspError::NoMemory => Self::NoMemory,
            MrspError::Priority(_) => Self::InternalError,
        }
    }
}

/// Blocking option of [`Semaphore::obtain`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObtainOption {
    NoWait,
    /// Wait forever (`None`) or until the deadline.
    Wait(Option<Deadline>),
}

impl From<ObtainOption> for Wait {
    fn from(option: ObtainOption) -> Self {
        match option {
            ObtainOption::NoWait => Wait::NonBlocking,
            ObtainOption::Wait(None) => Wait::Blocking,
            ObtainOption::Wait(Some(deadline)) => Wait::Until(deadline),
        }
    }
}

/// Binary semaphore using the MrsP locking protocol.
pub struct Semaphore<'r, T: TaskControl, R: DomainRegistry + ?Sized> {
    registry: &'r R,
    control: MrspControl<T>,
}

impl<'r, T: TaskControl, R: DomainRegistry + ?Sized> Semaphore<'r, T, R> {
    /// `count` 1 creates an unlocked semaphore, 0 one owned by `executing`.
    pub fn create(
        registry: &'r R,
        home: DomainId,
        ceiling: u64,
        count: u32,
        executing: &Arc<T>,
    ) -> Result<Self, Status> {
        if !registry.contains(home) {
            return Err(Status::InvalidId);
        }
        let ceiling = registry.map_priority(home, ceiling).ok_or(Status::InvalidPriority)?;
        let initially_locked = match count {
            0 => true,
            1 => false,
            _ => return Err(Status::InvalidNumber),
        };
        let control = MrspControl::initialize(registry, home, ceiling, initially_locked, executing)?;
        Ok(Self { registry, control })
    }

    pub fn obtain(&self, executing: &Arc<T>, option: ObtainOption) -> Result<(), Status> {
        self.control.seize(executing, option.into()).map_err(Status::from)
    }

    pub fn release(&self, executing: &T) -> Result<(), Status> {
        self.control.surrender(executing).map_err(Status::from)
    }

    /// Flushing is not defined for MrsP semaphores.
    pub fn flush(&self) -> Result<(), Status> {
        Err(Status::NotDefined)
    }

    /// Sets the ceiling of `domain` to `new` and returns the old raw ceiling.
    /// [`CURRENT_PRIORITY`] leaves the ceiling unchanged.
    pub fn set_priority(&self, domain: DomainId, new: u64) -> Result<u64, Status> {
        if !self.registry.contains(domain) {
            return Err(Status::InvalidId);
        }
        let old = if new == CURRENT_PRIORITY {
            self.control.ceiling(domain)?
        } else {
            let ceiling =
                self.registry.map_priority(domain, new).ok_or(Status::InvalidPriority)?;
            self.control.set_ceiling(domain, ceiling)?
        };
        self.registry.unmap_priority(domain, old).ok_or(Status::InternalError)
    }

    /// Deletes an unowned semaphore. An owned one is handed back with `ResourceInUse`.
    pub fn delete(self) -> Result<(), (Status, Self)> {
        if let Err(err) = self.control.can_destroy() {
            debug!("sem: delete of busy mrsp {} refused", self.control.id().raw());
            return Err((err.into(), self));
        }
        self.control.destroy();
        Ok(())
    }

    pub fn control(&self) -> &MrspControl<T> {
        &self.control
    }
}

impl<T: TaskControl, R: DomainRegistry + ?Sized> core::fmt::Debug for Semaphore<'_, T, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore").field("control", &self.control).finish_non_exhaustive()
    }
}
