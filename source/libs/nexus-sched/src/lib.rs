// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Scheduler-side collaborators of kernel locking protocols
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + tests/{deadline,thread_queue,aggregation_prop}.rs
//!
//! PUBLIC API:
//!   - domain: Priority, DomainId, DomainConfig, DomainRegistry, DomainTable
//!   - priority: NodeId, PriorityNode, PriorityAggregation
//!   - deadline: Deadline (+ clock::now_ticks on `std`)
//!   - task: TaskControl capability, TaskId, ResourceId, WaitFlags, WaitOutcome
//!   - tq: ThreadQueue (sticky enqueue/surrender, deadlock-path detection), OwnerLink
//!   - thread: Thread host task (`std`)
//!
//! DEPENDS_ON: nexus-sync::IsrLock, bitflags, log, thiserror
//! INVARIANTS: A task sits in at most one thread queue; sticky level changes are paired 1:1 with
//!             claim/enqueue/surrender events; priority contributions are attached to one aggregate at a time

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

extern crate alloc;

pub mod deadline;
pub mod domain;
pub mod error;
pub mod priority;
pub mod task;
pub mod tq;

#[cfg(feature = "std")]
pub mod thread;

pub use deadline::Deadline;
pub use domain::{DomainConfig, DomainId, DomainRegistry, DomainTable, Priority};
pub use error::{DomainError, EnqueueError, PriorityError};
pub use priority::{NodeId, PriorityAggregation, PriorityNode};
pub use task::{ResourceId, TaskControl, TaskId, WaitFlags, WaitOutcome};
pub use tq::{OwnerLink, ThreadQueue};

#[cfg(feature = "std")]
pub use deadline::clock;
#[cfg(feature = "std")]
pub use thread::Thread;
