// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Multiprocessor Resource Sharing Protocol (MrsP) lock
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + tests/{lifecycle,seize_surrender,contention,props,semaphore}.rs
//!
//! PUBLIC API:
//!   - ceiling: CeilingTable
//!   - control: MrspControl (lifecycle, ceilings, owner queries)
//!   - engine: MrspControl::{seize, surrender}, Wait, raise/remove/replace_priority
//!   - sem: Semaphore directives, Status, ObtainOption, CURRENT_PRIORITY
//!   - error: MrspError, Result
//!
//! DEPENDS_ON: nexus-sync::IsrLock, nexus-sched (domains, priorities, TaskControl, ThreadQueue)
//! INVARIANTS: No two tasks are ever recorded as owner; an owner runs at least at the
//!             ceiling of its home domain; failed calls leave no priority or sticky residue

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

extern crate alloc;

pub mod ceiling;
pub mod control;
pub mod engine;
pub mod error;
pub mod sem;

pub use ceiling::CeilingTable;
pub use control::MrspControl;
pub use engine::{raise_priority, remove_priority, replace_priority, Wait};
pub use error::{MrspError, Result};
pub use sem::{ObtainOption, Semaphore, Status, CURRENT_PRIORITY};

#[cfg(feature = "std")]
pub use nexus_sched::Thread;

#[cfg(feature = "std")]
static_assertions::assert_impl_all!(MrspControl<Thread>: Send, Sync);
