// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Status taxonomy of the MrsP lock
//! OWNERS: @kernel-sync-team
//! PUBLIC API: MrspError, Result
//! INVARIANTS: Every error is returned after full rollback of the failing call

use nexus_sched::{EnqueueError, PriorityError};
use thiserror::Error;

/// Failures of MrsP operations.
#[must_use = "MrsP errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MrspError {
    /// The caller already runs above the resource ceiling.
    #[error("ceiling violation")]
    CeilingViolation,
    /// The caller already owns the resource.
    #[error("resource already owned by the caller")]
    SelfDeadlock,
    /// Non-blocking seize of an owned resource.
    #[error("resource unavailable")]
    Unavailable,
    #[error("timed out waiting for ownership")]
    Timeout,
    /// Waiting would close a cycle of owners and waiters.
    #[error("deadlock detected")]
    Deadlock,
    #[error("caller does not own the resource")]
    NotOwner,
    /// The resource is not the most recently obtained one of the caller.
    #[error("resources must be released in reverse order of acquisition")]
    UnlockOrder,
    #[error("resource in use")]
    ResourceInUse,
    #[error("invalid scheduling domain")]
    InvalidDomain,
    #[error("out of memory")]
    NoMemory,
    /// Priority bookkeeping of a task disagreed with the resource state.
    #[error("priority bookkeeping failed: {0}")]
    Priority(PriorityError),
}

impl From<PriorityError> for MrspError {
    fn from(err: PriorityError) -> Self {
        match err {
            PriorityError::CeilingViolated { .. } => Self::CeilingViolation,
            PriorityError::UnknownDomain(_) => Self::InvalidDomain,
            other => Self::Priority(other),
        }
    }
}

impl From<EnqueueError> for MrspError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Deadlock => Self::Deadlock,
            EnqueueError::NoWaitPriority(_) => Self::InvalidDomain,
        }
    }
}

pub type Result<T> = core::result::Result<T, MrspError>;
