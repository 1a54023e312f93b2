// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host task backed by an OS thread (std only)
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 4 unit tests + nexus-mrsp contention tests
//! PUBLIC API: Thread
//!
//! Each OS thread stands in for one task pinned to one CPU. Sticky blocking is a real busy wait:
//! spin for a while, then yield to the host scheduler between polls.
//!
//! INVARIANTS: block_sticky() is entered without any IsrLock held

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use log::trace;
use nexus_sync::{isr, IsrLock};

use crate::deadline::Deadline;
use crate::domain::{DomainId, DomainRegistry, Priority};
use crate::error::PriorityError;
use crate::priority::{NodeId, PriorityAggregation, PriorityNode};
use crate::task::{ResourceId, TaskControl, TaskId, WaitFlags, WaitOutcome};
use crate::tq::OwnerLink;

/// Polls before the waiter starts yielding its OS thread.
const SPIN_POLLS: u32 = 128;

struct ThreadState {
    priorities: Vec<Option<PriorityAggregation>>,
    waiting_for: Option<Arc<OwnerLink<Thread>>>,
    resources: Vec<ResourceId>,
}

pub struct Thread {
    id: TaskId,
    name: &'static str,
    home: DomainId,
    state: IsrLock<ThreadState>,
    sticky_level: AtomicI32,
    wait_flags: AtomicU32,
}

static_assertions::assert_impl_all!(Thread: Send, Sync);
static_assertions::assert_impl_all!(OwnerLink<Thread>: Send, Sync);

impl Thread {
    /// Creates a task scheduled in `home` with the given base priority.
    pub fn new<R: DomainRegistry + ?Sized>(
        registry: &R,
        name: &'static str,
        home: DomainId,
        base: Priority,
    ) -> Result<Arc<Self>, PriorityError> {
        if !registry.contains(home) {
            return Err(PriorityError::UnknownDomain(home));
        }
        let mut priorities = vec![None; registry.count()];
        priorities[home.raw()] = Some(PriorityAggregation::new(base));
        Ok(Arc::new(Self {
            id: TaskId::allocate(),
            name,
            home,
            state: IsrLock::new(ThreadState {
                priorities,
                waiting_for: None,
                resources: Vec::new(),
            }),
            sticky_level: AtomicI32::new(0),
            wait_flags: AtomicU32::new(0),
        }))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Effective priority in the home domain.
    pub fn current_priority(&self) -> Priority {
        self.wait_priority(self.home).unwrap_or_default()
    }

    pub fn base_priority(&self) -> Priority {
        self.with_home(|agg| agg.base())
    }

    pub fn set_base_priority(&self, base: Priority) {
        self.with_home(|agg| agg.set_base(base));
    }

    /// Number of resources currently held.
    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    fn with_home<R>(&self, f: impl FnOnce(&mut PriorityAggregation) -> R) -> R {
        self.with_domain(self.home, f).unwrap_or_else(|_| unreachable!("home aggregate exists"))
    }

    fn with_domain<R>(
        &self,
        domain: DomainId,
        f: impl FnOnce(&mut PriorityAggregation) -> R,
    ) -> Result<R, PriorityError> {
        let mut state = self.state.lock();
        let agg = state
            .priorities
            .get_mut(domain.raw())
            .and_then(Option::as_mut)
            .ok_or(PriorityError::UnknownDomain(domain))?;
        Ok(f(agg))
    }
}

impl TaskControl for Thread {
    fn id(&self) -> TaskId {
        self.id
    }

    fn home_domain(&self) -> DomainId {
        self.home
    }

    fn wait_priority(&self, domain: DomainId) -> Option<Priority> {
        self.with_domain(domain, |agg| agg.effective()).ok()
    }

    fn attach_priority_ceiling(
        &self,
        domain: DomainId,
        node: PriorityNode,
    ) -> Result<(), PriorityError> {
        self.with_domain(domain, |agg| {
            let current = agg.effective();
            if current.is_higher_than(node.priority()) {
                return Err(PriorityError::CeilingViolated { ceiling: node.priority(), current });
            }
            agg.attach(node)
        })?
    }

    fn detach_priority(&self, domain: DomainId, id: NodeId) -> Result<PriorityNode, PriorityError> {
        self.with_domain(domain, |agg| agg.detach(id))?
    }

    fn replace_priority(
        &self,
        domain: DomainId,
        victim: NodeId,
        replacement: NodeId,
    ) -> Result<PriorityNode, PriorityError> {
        self.with_domain(domain, |agg| agg.replace(victim, replacement))?
    }

    fn contribution_count(&self, domain: DomainId) -> usize {
        self.with_domain(domain, |agg| agg.contribution_count()).unwrap_or(0)
    }

    fn sticky_level(&self) -> i32 {
        self.sticky_level.load(Ordering::Acquire)
    }

    fn adjust_sticky(&self, delta: i32) {
        let previous = self.sticky_level.fetch_add(delta, Ordering::AcqRel);
        debug_assert!(previous + delta >= 0, "sticky level of {} went negative", self.name);
    }

    fn wait_flags(&self) -> WaitFlags {
        WaitFlags::from_bits_truncate(self.wait_flags.load(Ordering::Acquire))
    }

    fn set_wait_flags(&self, flags: WaitFlags) {
        self.wait_flags.store(flags.bits(), Ordering::Release);
    }

    fn block_sticky(&self, deadline: Option<Deadline>) -> WaitOutcome {
        debug_assert!(isr::is_enabled(), "block_sticky entered inside a critical section");
        // A hand-over that raced ahead already left READY_AGAIN behind.
        let _ = self.wait_flags.compare_exchange(
            WaitFlags::INTEND_TO_BLOCK.bits(),
            WaitFlags::BLOCKED.bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let mut polls = 0_u32;
        loop {
            if self.wait_flags().contains(WaitFlags::READY_AGAIN) {
                return WaitOutcome::Granted;
            }
            if deadline.is_some_and(|deadline| deadline.has_passed()) {
                trace!("thread {}: sticky wait expired", self.name);
                return WaitOutcome::Expired;
            }
            if polls < SPIN_POLLS {
                polls += 1;
                core::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    fn waiting_for(&self) -> Option<Arc<OwnerLink<Self>>> {
        self.state.lock().waiting_for.clone()
    }

    fn set_waiting_for(&self, link: Option<Arc<OwnerLink<Self>>>) {
        self.state.lock().waiting_for = link;
    }

    fn push_resource(&self, id: ResourceId) {
        self.state.lock().resources.push(id);
    }

    fn top_resource(&self) -> Option<ResourceId> {
        self.state.lock().resources.last().copied()
    }

    fn pop_resource(&self) -> Option<ResourceId> {
        self.state.lock().resources.pop()
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("home", &self.home)
            .field("sticky_level", &self.sticky_level())
            .finish()
    }
}
