// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Task capability consumed by locking protocols
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 2 unit tests (implementations are covered in thread.rs and tests/)
//! PUBLIC API: TaskControl, TaskId, ResourceId, WaitFlags, WaitOutcome
//! INVARIANTS: TaskId and ResourceId values are never reused within one boot;
//!             the resource stack of a task is strictly LIFO

use alloc::sync::Arc;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use crate::deadline::Deadline;
use crate::domain::{DomainId, Priority};
use crate::error::PriorityError;
use crate::priority::{NodeId, PriorityNode};
use crate::tq::OwnerLink;

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);
static NEXT_RESOURCE: AtomicU64 = AtomicU64::new(1);

/// Identity of a schedulable task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    pub fn allocate() -> Self {
        let raw = NEXT_TASK.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub const fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Identity of a lockable resource, used for the per-task LIFO release check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn allocate() -> Self {
        Self(NEXT_RESOURCE.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Handshake between a sticky waiter and the task that hands it ownership.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u32 {
        /// Enqueued, not yet spinning.
        const INTEND_TO_BLOCK = 1 << 0;
        /// Spinning in `block_sticky`.
        const BLOCKED = 1 << 1;
        /// Ownership was handed over.
        const READY_AGAIN = 1 << 2;
    }
}

/// Result of a sticky block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// READY_AGAIN was observed.
    Granted,
    /// The deadline passed first. The caller must resolve the race under the resource lock.
    Expired,
}

/// Per-task state a locking protocol manipulates.
///
/// Implementations serialize each method internally; callers hold the owning resource's lock
/// around sequences that must appear atomic to other claimants.
pub trait TaskControl: Send + Sync + Sized {
    fn id(&self) -> TaskId;

    /// Domain the task is scheduled in.
    fn home_domain(&self) -> DomainId;

    /// Effective priority in `domain`, or `None` when the task has no priority there.
    fn wait_priority(&self, domain: DomainId) -> Option<Priority>;

    /// Attaches `node` only if its priority is at least as important as the current wait priority.
    /// Check and attach are one step with respect to other priority changes of this task.
    fn attach_priority_ceiling(
        &self,
        domain: DomainId,
        node: PriorityNode,
    ) -> Result<(), PriorityError>;

    fn detach_priority(&self, domain: DomainId, id: NodeId) -> Result<PriorityNode, PriorityError>;

    /// See [`crate::PriorityAggregation::replace`].
    fn replace_priority(
        &self,
        domain: DomainId,
        victim: NodeId,
        replacement: NodeId,
    ) -> Result<PriorityNode, PriorityError>;

    fn contribution_count(&self, domain: DomainId) -> usize;

    /// Number of reasons the task must stay on its processor.
    fn sticky_level(&self) -> i32;

    fn adjust_sticky(&self, delta: i32);

    fn wait_flags(&self) -> WaitFlags;

    fn set_wait_flags(&self, flags: WaitFlags);

    /// Busy waits until ownership is handed over or `deadline` passes.
    fn block_sticky(&self, deadline: Option<Deadline>) -> WaitOutcome;

    /// Queue the task is currently enqueued on.
    fn waiting_for(&self) -> Option<Arc<OwnerLink<Self>>>;

    fn set_waiting_for(&self, link: Option<Arc<OwnerLink<Self>>>);

    fn push_resource(&self, id: ResourceId);

    fn top_resource(&self) -> Option<ResourceId>;

    fn pop_resource(&self) -> Option<ResourceId>;
}
