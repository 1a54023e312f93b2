// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integration tests for MrsP resource lifecycle and ceiling configuration
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 5 integration tests
//!
//! TEST_SCOPE:
//!   - Initialization of per-domain ceilings
//!   - Destroy-safety check before and after ownership
//!   - Ceiling updates while owned
//!
//! TEST_SCENARIOS:
//!   - never_locked_resource_is_destroyable(): can_destroy holds repeatedly
//!   - destroyable_again_after_release(): seize, can_destroy fails, surrender, can_destroy holds
//!   - non_home_domains_default_to_lowest_value(): three domains, one home
//!   - set_ceiling_applies_from_next_claim(): owner keeps its priority until it re-seizes
//!   - initially_locked_resource_is_owned_by_creator(): count-0 style creation
//!
//! DEPENDENCIES:
//!   - nexus_mrsp::MrspControl
//!   - nexus_sched::{DomainTable, Thread}
use std::sync::Arc;

use nexus_mrsp::{MrspControl, MrspError, Thread, Wait};
use nexus_sched::{DomainConfig, DomainId, DomainTable, Priority, TaskControl};

const A: DomainId = DomainId::from_raw(0);
const B: DomainId = DomainId::from_raw(1);
const C: DomainId = DomainId::from_raw(2);

fn table() -> DomainTable {
    DomainTable::new(&[
        DomainConfig::new("A", 255),
        DomainConfig::new("B", 255),
        DomainConfig::new("C", 31),
    ])
    .unwrap()
}

fn task(t: &DomainTable, home: DomainId, prio: u64) -> Arc<Thread> {
    Thread::new(t, "task", home, Priority::new(prio)).unwrap()
}

#[test]
fn never_locked_resource_is_destroyable() {
    let t = table();
    let creator = task(&t, A, 5);
    let mrsp = MrspControl::initialize(&t, A, Priority::new(2), false, &creator).unwrap();
    for _ in 0..3 {
        assert_eq!(mrsp.can_destroy(), Ok(()));
    }
    mrsp.destroy();
}

#[test]
fn destroyable_again_after_release() {
    let t = table();
    let owner = task(&t, A, 5);
    let mrsp = MrspControl::initialize(&t, A, Priority::new(2), false, &owner).unwrap();
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();
    assert_eq!(mrsp.can_destroy(), Err(MrspError::ResourceInUse));
    mrsp.surrender(&*owner).unwrap();
    assert_eq!(mrsp.can_destroy(), Ok(()));
    mrsp.destroy();
}

#[test]
fn non_home_domains_default_to_lowest_value() {
    let t = table();
    let creator = task(&t, B, 5);
    let mrsp = MrspControl::initialize(&t, B, Priority::new(4), false, &creator).unwrap();
    assert_eq!(mrsp.ceiling(A), Ok(Priority::HIGHEST));
    assert_eq!(mrsp.ceiling(B), Ok(Priority::new(4)));
    assert_eq!(mrsp.ceiling(C), Ok(Priority::HIGHEST));
    assert_eq!(mrsp.ceiling(DomainId::from_raw(3)), Err(MrspError::InvalidDomain));

    // A task of another domain runs at that domain's lowest value while it owns the resource.
    let foreign = task(&t, A, 9);
    mrsp.seize(&foreign, Wait::NonBlocking).unwrap();
    assert_eq!(foreign.current_priority(), Priority::HIGHEST);
    mrsp.surrender(&*foreign).unwrap();
    assert_eq!(foreign.current_priority(), Priority::new(9));
}

#[test]
fn set_ceiling_applies_from_next_claim() {
    let t = table();
    let owner = task(&t, A, 8);
    let mrsp = MrspControl::initialize(&t, A, Priority::new(6), false, &owner).unwrap();
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();
    assert_eq!(owner.current_priority(), Priority::new(6));

    assert_eq!(mrsp.set_ceiling(A, Priority::new(3)), Ok(Priority::new(6)));
    assert_eq!(owner.current_priority(), Priority::new(6));

    mrsp.surrender(&*owner).unwrap();
    mrsp.seize(&owner, Wait::NonBlocking).unwrap();
    assert_eq!(owner.current_priority(), Priority::new(3));
    mrsp.surrender(&*owner).unwrap();
    assert_eq!(owner.current_priority(), Priority::new(8));
}

#[test]
fn initially_locked_resource_is_owned_by_creator() {
    let t = table();
    let creator = task(&t, A, 5);
    let other = task(&t, A, 7);
    let mrsp = MrspControl::initialize(&t, A, Priority::new(1), true, &creator).unwrap();
    assert_eq!(mrsp.owner_id(), Some(creator.id()));
    assert_eq!(mrsp.seize(&other, Wait::NonBlocking), Err(MrspError::Unavailable));
    mrsp.surrender(&*creator).unwrap();
    assert_eq!(creator.sticky_level(), 0);
    assert_eq!(creator.current_priority(), Priority::new(5));
}
