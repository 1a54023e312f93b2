// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Error taxonomy of the scheduler collaborators
//! OWNERS: @kernel-sched-team
//! PUBLIC API: DomainError, PriorityError, EnqueueError

use thiserror::Error;

use crate::domain::{DomainId, Priority};
use crate::priority::NodeId;

/// Rejected scheduling-domain configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomainError {
    /// No domain was configured.
    #[error("domain table is empty")]
    Empty,
    /// A domain declared a zero maximum priority.
    #[error("domain {name} has an invalid maximum priority")]
    InvalidMaximum { name: &'static str },
    /// Two domains share one name.
    #[error("domain {name} is configured twice")]
    Duplicate { name: &'static str },
}

/// Failures of the per-task priority aggregation.
#[must_use = "priority errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PriorityError {
    /// The task has no aggregate for this domain.
    #[error("task has no priority in domain {0:?}")]
    UnknownDomain(DomainId),
    /// The contribution is already attached to this aggregate.
    #[error("priority node {0:?} is already attached")]
    AlreadyAttached(NodeId),
    /// The contribution is not attached to this aggregate.
    #[error("priority node {0:?} is not attached")]
    NotAttached(NodeId),
    /// The ceiling is less important than the task's current wait priority.
    #[error("ceiling {ceiling} is below current priority {current}")]
    CeilingViolated { ceiling: Priority, current: Priority },
}

/// Failures of a sticky enqueue.
#[must_use = "enqueue errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// Blocking would close a cycle of owners and waiters.
    #[error("enqueue would deadlock")]
    Deadlock,
    /// The enqueuing task has no wait priority in its home domain.
    #[error("task has no wait priority in domain {0:?}")]
    NoWaitPriority(DomainId),
}
