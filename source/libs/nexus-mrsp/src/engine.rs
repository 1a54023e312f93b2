// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: MrsP ownership and priority engine (seize, claim, wait, surrender)
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 6 unit tests + tests/{seize_surrender,contention,props}.rs
//!
//! PUBLIC API:
//!   - Wait: blocking mode of a seize
//!   - MrspControl::{seize, surrender}
//!   - raise_priority/remove_priority/replace_priority
//!
//! DEPENDS_ON: nexus-sched::{TaskControl, ThreadQueue}
//! INVARIANTS:
//!   - At most one task is recorded as owner
//!   - A failed seize leaves the caller's priority aggregate and sticky level as before
//!   - The ceiling check is: ceiling <= current wait priority (numerically)
//!   - Sticky level: +1 on claim and enqueue, -1 on surrender and on timeout, 0 on deadlock

use alloc::sync::Arc;

use log::{debug, trace, warn};
use nexus_sched::{Deadline, DomainId, NodeId, PriorityNode, ResourceId, TaskControl, WaitOutcome};
use nexus_sync::IsrLockGuard;

use crate::control::{MrspControl, MrspState};
use crate::error::{MrspError, Result};

/// How long a seize may wait for an owned resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Fail with [`MrspError::Unavailable`] instead of waiting.
    NonBlocking,
    /// Wait without a timeout.
    Blocking,
    /// Wait until the deadline passes.
    Until(Deadline),
}

impl Wait {
    fn deadline(self) -> Option<Deadline> {
        match self {
            Self::Until(deadline) => Some(deadline),
            Self::NonBlocking | Self::Blocking => None,
        }
    }
}

/// Attaches `node` to `task` unless the task already runs above `node`'s priority.
pub fn raise_priority<T: TaskControl>(task: &T, domain: DomainId, node: PriorityNode) -> Result<()> {
    task.attach_priority_ceiling(domain, node).map_err(|err| {
        debug!("mrsp: task {} raise to {} refused: {}", task.id().raw(), node.priority(), err);
        MrspError::from(err)
    })
}

/// Detaches a contribution previously attached by [`raise_priority`].
pub fn remove_priority<T: TaskControl>(task: &T, domain: DomainId, node: NodeId) -> Result<()> {
    task.detach_priority(domain, node)?;
    Ok(())
}

/// Swaps the attached `victim` for `replacement` without a gap in priority coverage.
pub fn replace_priority<T: TaskControl>(
    task: &T,
    domain: DomainId,
    victim: NodeId,
    replacement: NodeId,
) -> Result<()> {
    task.replace_priority(domain, victim, replacement)?;
    Ok(())
}

impl<T: TaskControl> MrspState<T> {
    /// Makes `executing` the owner at the ceiling of its home domain.
    pub(crate) fn claim(&mut self, resource: ResourceId, executing: &Arc<T>) -> Result<()> {
        let domain = executing.home_domain();
        let ceiling = self.ceilings.get(domain)?;
        raise_priority(&**executing, domain, PriorityNode::with_id(self.ceiling_node, ceiling))?;
        self.queue.set_owner(Some(executing));
        executing.adjust_sticky(1);
        executing.push_resource(resource);
        trace!("mrsp {}: claimed by {} at {}", resource.raw(), executing.id().raw(), ceiling);
        Ok(())
    }
}

impl<T: TaskControl> MrspControl<T> {
    /// Obtains the resource for `executing`.
    ///
    /// Only a [`Wait::Blocking`] or [`Wait::Until`] seize of an owned resource suspends the caller.
    pub fn seize(&self, executing: &Arc<T>, wait: Wait) -> Result<()> {
        let mut state = self.state.lock();
        match state.queue.owner_id() {
            None => state.claim(self.id, executing),
            Some(owner) if owner == executing.id() => {
                debug!("mrsp {}: recursive seize by {}", self.id.raw(), owner.raw());
                Err(MrspError::SelfDeadlock)
            }
            Some(_) if wait == Wait::NonBlocking => Err(MrspError::Unavailable),
            Some(_) => self.wait_for_ownership(state, executing, wait.deadline()),
        }
    }

    fn wait_for_ownership(
        &self,
        mut state: IsrLockGuard<'_, MrspState<T>>,
        executing: &Arc<T>,
        deadline: Option<Deadline>,
    ) -> Result<()> {
        let domain = executing.home_domain();
        let ceiling = state.ceilings.get(domain)?;
        let temporary = PriorityNode::new(ceiling);
        raise_priority(&**executing, domain, temporary)?;

        if let Err(err) = state.queue.enqueue_sticky(executing) {
            remove_priority(&**executing, domain, temporary.id())?;
            debug!("mrsp {}: task {} cannot wait: {}", self.id.raw(), executing.id().raw(), err);
            return Err(err.into());
        }
        drop(state);

        let outcome = executing.block_sticky(deadline);

        let mut state = self.state.lock();
        if outcome == WaitOutcome::Expired && state.queue.extract(&**executing) {
            remove_priority(&**executing, domain, temporary.id())?;
            debug!("mrsp {}: task {} timed out", self.id.raw(), executing.id().raw());
            return Err(MrspError::Timeout);
        }

        // Ownership was handed over, possibly racing with the deadline.
        replace_priority(&**executing, domain, temporary.id(), state.ceiling_node).map_err(|err| {
            warn!(
                "mrsp {}: new owner {} lost its wait priority: {}",
                self.id.raw(),
                executing.id().raw(),
                err
            );
            err
        })?;
        executing.push_resource(self.id);
        trace!("mrsp {}: task {} took over after waiting", self.id.raw(), executing.id().raw());
        Ok(())
    }

    /// Releases the resource and hands it to the first waiter, if any.
    pub fn surrender(&self, executing: &T) -> Result<()> {
        let mut state = self.state.lock();
        if state.queue.owner_id() != Some(executing.id()) {
            debug!("mrsp {}: surrender by non-owner {}", self.id.raw(), executing.id().raw());
            return Err(MrspError::NotOwner);
        }
        if executing.top_resource() != Some(self.id) {
            debug!("mrsp {}: surrender out of order by {}", self.id.raw(), executing.id().raw());
            return Err(MrspError::UnlockOrder);
        }

        remove_priority(executing, executing.home_domain(), state.ceiling_node)?;
        let released = executing.pop_resource();
        debug_assert_eq!(released, Some(self.id));

        match state.queue.surrender_sticky(executing) {
            Some(next) => {
                trace!("mrsp {}: handed over to {}", self.id.raw(), next.id().raw());
            }
            None => {
                state.queue.set_owner(None);
                executing.adjust_sticky(-1);
                trace!("mrsp {}: released by {}", self.id.raw(), executing.id().raw());
            }
        }
        Ok(())
    }
}
