// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: MrsP resource control block and its lifecycle
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 5 unit tests + tests/lifecycle.rs
//! PUBLIC API: MrspControl (initialize/can_destroy/destroy/ceiling/set_ceiling/owner/waiter_count/id)
//!
//! DEPENDS_ON: nexus-sync::IsrLock, nexus-sched::{ThreadQueue, TaskControl, DomainRegistry}
//! INVARIANTS:
//!   - All state is mutated under `state`; the section never suspends
//!   - The owner is the owner of the wait queue; a non-empty queue implies an owner
//!   - The owner slot is written under `state` and read through its own lock
//!   - The ceiling node is attached to at most one task, the owner

use alloc::sync::Arc;

use log::trace;
use nexus_sched::{
    DomainId, DomainRegistry, NodeId, OwnerLink, Priority, ResourceId, TaskControl, TaskId,
    ThreadQueue,
};
use nexus_sync::IsrLock;

use crate::ceiling::CeilingTable;
use crate::error::{MrspError, Result};

pub(crate) struct MrspState<T: TaskControl> {
    pub(crate) ceilings: CeilingTable,
    /// Contribution attached to the owner while it holds the resource.
    pub(crate) ceiling_node: NodeId,
    pub(crate) queue: ThreadQueue<T>,
}

/// Multiprocessor Resource Sharing Protocol lock.
pub struct MrspControl<T: TaskControl> {
    pub(crate) id: ResourceId,
    /// Shared with `state.queue`.
    owner: Arc<OwnerLink<T>>,
    pub(crate) state: IsrLock<MrspState<T>>,
}

impl<T: TaskControl> MrspControl<T> {
    /// Builds the resource. `home` gets `ceiling`, every other domain its lowest priority value.
    ///
    /// With `initially_locked` the executing task claims the resource right away; if that claim
    /// violates the ceiling the resource is never constructed.
    pub fn initialize<R: DomainRegistry + ?Sized>(
        registry: &R,
        home: DomainId,
        ceiling: Priority,
        initially_locked: bool,
        executing: &Arc<T>,
    ) -> Result<Self> {
        let ceilings = CeilingTable::new(registry, home, ceiling)?;
        let queue = ThreadQueue::new();
        let control = Self {
            id: ResourceId::allocate(),
            owner: queue.link().clone(),
            state: IsrLock::new(MrspState { ceilings, ceiling_node: NodeId::allocate(), queue }),
        };
        if initially_locked {
            let mut state = control.state.lock();
            let claimed = state.claim(control.id, executing);
            drop(state);
            claimed?;
        }
        trace!("mrsp {}: initialized, home {:?} ceiling {}", control.id.raw(), home, ceiling);
        Ok(control)
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Succeeds iff the resource has no owner.
    pub fn can_destroy(&self) -> Result<()> {
        match self.owner.owner_id() {
            None => Ok(()),
            Some(_) => Err(MrspError::ResourceInUse),
        }
    }

    /// Releases the resource. Callers confirm [`MrspControl::can_destroy`] first.
    pub fn destroy(self) {
        let state = self.state.into_inner();
        debug_assert!(state.queue.owner_id().is_none() && state.queue.is_empty());
        state.queue.destroy();
        trace!("mrsp {}: destroyed", self.id.raw());
    }

    pub fn ceiling(&self, domain: DomainId) -> Result<Priority> {
        self.state.lock().ceilings.get(domain)
    }

    /// Stores a new ceiling for `domain` and returns the old one. A current owner keeps its
    /// priority; the value applies from the next claim on.
    pub fn set_ceiling(&self, domain: DomainId, ceiling: Priority) -> Result<Priority> {
        self.state.lock().ceilings.set(domain, ceiling)
    }

    pub fn owner(&self) -> Option<Arc<T>> {
        self.owner.owner()
    }

    pub fn owner_id(&self) -> Option<TaskId> {
        self.owner.owner_id()
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl<T: TaskControl> core::fmt::Debug for MrspControl<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MrspControl")
            .field("id", &self.id)
            .field("owner", &self.owner_id())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
