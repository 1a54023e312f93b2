// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integration tests for the MrsP seize/surrender state machine on one CPU
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 8 integration tests
//!
//! TEST_SCOPE:
//!   - Ceiling check on claim and on wait
//!   - Priority raise and decay across nested resources
//!   - Reverse-order release discipline
//!   - Timeout rollback without a second CPU
//!
//! TEST_SCENARIOS:
//!   - high_priority_task_violates_ceiling(): priority 5 vs ceiling 10
//!   - low_priority_task_runs_at_ceiling(): priority 15 -> 10 -> 15
//!   - nested_resources_raise_step_by_step(): 4 -> 3 -> 2 -> 1 and back
//!   - out_of_order_release_is_rejected(): releasing an outer resource first
//!   - blocking_seize_with_ceiling_violation_does_not_enqueue(): no waiter left behind
//!   - timeout_rolls_back_wait(): priority, sticky level and queue restored
//!   - round_trip_restores_contribution_count(): seize + surrender is neutral
//!   - base_change_while_owning_is_covered_by_ceiling(): base moves under the ceiling node
//!
//! DEPENDENCIES:
//!   - nexus_mrsp::{MrspControl, Wait}
//!   - nexus_sched::{Deadline, Thread}
use std::sync::Arc;

use nexus_mrsp::{MrspControl, MrspError, Thread, Wait};
use nexus_sched::{Deadline, DomainConfig, DomainId, DomainTable, Priority, TaskControl};

const HOME: DomainId = DomainId::from_raw(0);

fn table() -> DomainTable {
    DomainTable::new(&[DomainConfig::new("A", 255)]).unwrap()
}

fn task(t: &DomainTable, prio: u64) -> Arc<Thread> {
    Thread::new(t, "task", HOME, Priority::new(prio)).unwrap()
}

fn resource(t: &DomainTable, ceiling: u64, creator: &Arc<Thread>) -> MrspControl<Thread> {
    MrspControl::initialize(t, HOME, Priority::new(ceiling), false, creator).unwrap()
}

#[test]
fn high_priority_task_violates_ceiling() {
    let t = table();
    let high = task(&t, 5);
    let mrsp = resource(&t, 10, &high);
    assert_eq!(mrsp.seize(&high, Wait::Blocking), Err(MrspError::CeilingViolation));
    assert!(mrsp.owner().is_none());
    assert_eq!(high.current_priority(), Priority::new(5));
    assert_eq!(high.sticky_level(), 0);
}

#[test]
fn low_priority_task_runs_at_ceiling() {
    let t = table();
    let low = task(&t, 15);
    let mrsp = resource(&t, 10, &low);
    mrsp.seize(&low, Wait::NonBlocking).unwrap();
    assert_eq!(low.current_priority(), Priority::new(10));
    assert_eq!(mrsp.owner_id(), Some(low.id()));
    mrsp.surrender(&*low).unwrap();
    assert_eq!(low.current_priority(), Priority::new(15));
}

#[test]
fn nested_resources_raise_step_by_step() {
    let t = table();
    let runner = task(&t, 4);
    let resources: Vec<_> = [3, 2, 1].iter().map(|c| resource(&t, *c, &runner)).collect();

    for (mrsp, expected) in resources.iter().zip([3, 2, 1]) {
        mrsp.seize(&runner, Wait::Blocking).unwrap();
        assert_eq!(runner.current_priority(), Priority::new(expected));
    }
    assert_eq!(runner.sticky_level(), 3);
    assert_eq!(runner.resource_count(), 3);

    for (mrsp, expected) in resources.iter().rev().zip([2, 3, 4]) {
        mrsp.surrender(&*runner).unwrap();
        assert_eq!(runner.current_priority(), Priority::new(expected));
    }
    assert_eq!(runner.sticky_level(), 0);
}

#[test]
fn out_of_order_release_is_rejected() {
    let t = table();
    let runner = task(&t, 4);
    let outer = resource(&t, 3, &runner);
    let inner = resource(&t, 2, &runner);
    outer.seize(&runner, Wait::NonBlocking).unwrap();
    inner.seize(&runner, Wait::NonBlocking).unwrap();

    assert_eq!(outer.surrender(&*runner), Err(MrspError::UnlockOrder));
    assert_eq!(outer.owner_id(), Some(runner.id()));
    assert_eq!(runner.current_priority(), Priority::new(2));
    assert_eq!(runner.sticky_level(), 2);

    inner.surrender(&*runner).unwrap();
    outer.surrender(&*runner).unwrap();
    assert_eq!(runner.current_priority(), Priority::new(4));
}

#[test]
fn blocking_seize_with_ceiling_violation_does_not_enqueue() {
    let t = table();
    let owner = task(&t, 12);
    let high = task(&t, 3);
    let mrsp = resource(&t, 10, &owner);
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();
    assert_eq!(mrsp.seize(&high, Wait::Blocking), Err(MrspError::CeilingViolation));
    assert_eq!(mrsp.waiter_count(), 0);
    assert_eq!(high.contribution_count(HOME), 0);
    assert_eq!(high.sticky_level(), 0);
}

#[test]
fn timeout_rolls_back_wait() {
    let t = table();
    let owner = task(&t, 12);
    let waiter = task(&t, 11);
    let mrsp = resource(&t, 10, &owner);
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();

    let result = mrsp.seize(&waiter, Wait::Until(Deadline::in_ms(5)));
    assert_eq!(result, Err(MrspError::Timeout));
    assert_eq!(waiter.current_priority(), Priority::new(11));
    assert_eq!(waiter.contribution_count(HOME), 0);
    assert_eq!(waiter.sticky_level(), 0);
    assert!(waiter.waiting_for().is_none());
    assert_eq!(mrsp.waiter_count(), 0);
    assert_eq!(mrsp.owner_id(), Some(owner.id()));
}

#[test]
fn round_trip_restores_contribution_count() {
    let t = table();
    let runner = task(&t, 20);
    let first = resource(&t, 15, &runner);
    let second = resource(&t, 10, &runner);
    first.seize(&runner, Wait::NonBlocking).unwrap();
    let before = runner.contribution_count(HOME);

    second.seize(&runner, Wait::NonBlocking).unwrap();
    assert_eq!(runner.contribution_count(HOME), before + 1);
    second.surrender(&*runner).unwrap();
    assert_eq!(runner.contribution_count(HOME), before);

    first.surrender(&*runner).unwrap();
    assert_eq!(runner.contribution_count(HOME), 0);
}

#[test]
fn base_change_while_owning_is_covered_by_ceiling() {
    let t = table();
    let owner = task(&t, 15);
    let mrsp = resource(&t, 10, &owner);
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();

    owner.set_base_priority(Priority::new(12));
    assert_eq!(owner.current_priority(), Priority::new(10));
    owner.set_base_priority(Priority::new(7));
    assert_eq!(owner.current_priority(), Priority::new(7));

    mrsp.surrender(&*owner).unwrap();
    assert_eq!(owner.current_priority(), Priority::new(7));
    assert_eq!(owner.base_priority(), Priority::new(7));
    assert_eq!(mrsp.seize(&owner, Wait::NonBlocking), Err(MrspError::CeilingViolation));
}
