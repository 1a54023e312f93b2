// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-task, per-domain priority aggregation
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 6 unit tests + tests/aggregation_prop.rs
//! PUBLIC API: NodeId, PriorityNode, PriorityAggregation
//! INVARIANTS: effective() = min(base, contributions); a node id appears at most once per aggregate;
//!             replace() keeps the victim's priority value and slot

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::domain::Priority;
use crate::error::PriorityError;

static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

/// Identity of a priority contribution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocates a fresh node identity.
    pub fn allocate() -> Self {
        Self(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A priority contribution that can be attached to one aggregate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PriorityNode {
    id: NodeId,
    priority: Priority,
}

impl PriorityNode {
    pub fn new(priority: Priority) -> Self {
        Self { id: NodeId::allocate(), priority }
    }

    pub const fn with_id(id: NodeId, priority: Priority) -> Self {
        Self { id, priority }
    }

    pub const fn id(&self) -> NodeId {
        self.id
    }

    pub const fn priority(&self) -> Priority {
        self.priority
    }
}

/// Base priority plus the contributions currently attached in one domain.
#[derive(Clone, Debug)]
pub struct PriorityAggregation {
    base: Priority,
    contributions: Vec<PriorityNode>,
}

impl PriorityAggregation {
    pub const fn new(base: Priority) -> Self {
        Self { base, contributions: Vec::new() }
    }

    pub const fn base(&self) -> Priority {
        self.base
    }

    pub fn set_base(&mut self, base: Priority) {
        self.base = base;
    }

    /// Most important value among the base and all contributions.
    pub fn effective(&self) -> Priority {
        self.contributions.iter().map(PriorityNode::priority).fold(self.base, core::cmp::min)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.position(id).is_some()
    }

    pub fn contribution_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn attach(&mut self, node: PriorityNode) -> Result<(), PriorityError> {
        if self.contains(node.id()) {
            return Err(PriorityError::AlreadyAttached(node.id()));
        }
        self.contributions.push(node);
        Ok(())
    }

    /// Removes the contribution and hands it back.
    pub fn detach(&mut self, id: NodeId) -> Result<PriorityNode, PriorityError> {
        let index = self.position(id).ok_or(PriorityError::NotAttached(id))?;
        Ok(self.contributions.remove(index))
    }

    /// Swaps `victim` for `replacement` in place. The replacement takes over the victim's priority
    /// value so the effective priority does not change. Returns the detached victim.
    pub fn replace(
        &mut self,
        victim: NodeId,
        replacement: NodeId,
    ) -> Result<PriorityNode, PriorityError> {
        if victim != replacement && self.contains(replacement) {
            return Err(PriorityError::AlreadyAttached(replacement));
        }
        let index = self.position(victim).ok_or(PriorityError::NotAttached(victim))?;
        let old = self.contributions[index];
        self.contributions[index] = PriorityNode::with_id(replacement, old.priority());
        Ok(old)
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.contributions.iter().position(|node| node.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: u64) -> Priority {
        Priority::new(raw)
    }

    #[test]
    fn effective_is_base_without_contributions() {
        let agg = PriorityAggregation::new(p(15));
        assert_eq!(agg.effective(), p(15));
        assert_eq!(agg.contribution_count(), 0);
    }

    #[test]
    fn attach_raises_and_detach_restores() {
        let mut agg = PriorityAggregation::new(p(15));
        let node = PriorityNode::new(p(10));
        agg.attach(node).unwrap();
        assert_eq!(agg.effective(), p(10));
        assert_eq!(agg.detach(node.id()).unwrap(), node);
        assert_eq!(agg.effective(), p(15));
    }

    #[test]
    fn less_important_contribution_does_not_lower() {
        let mut agg = PriorityAggregation::new(p(5));
        agg.attach(PriorityNode::new(p(10))).unwrap();
        assert_eq!(agg.effective(), p(5));
    }

    #[test]
    fn double_attach_and_missing_detach_fail() {
        let mut agg = PriorityAggregation::new(p(5));
        let node = PriorityNode::new(p(3));
        agg.attach(node).unwrap();
        assert_eq!(agg.attach(node), Err(PriorityError::AlreadyAttached(node.id())));
        let stray = NodeId::allocate();
        assert_eq!(agg.detach(stray), Err(PriorityError::NotAttached(stray)));
    }

    #[test]
    fn replace_keeps_victim_priority() {
        let mut agg = PriorityAggregation::new(p(15));
        let temp = PriorityNode::new(p(10));
        agg.attach(temp).unwrap();
        let ceiling = NodeId::allocate();
        let old = agg.replace(temp.id(), ceiling).unwrap();
        assert_eq!(old.id(), temp.id());
        assert!(agg.contains(ceiling));
        assert!(!agg.contains(temp.id()));
        assert_eq!(agg.effective(), p(10));
        assert_eq!(agg.contribution_count(), 1);
    }

    #[test]
    fn set_base_changes_effective_when_uncovered() {
        let mut agg = PriorityAggregation::new(p(15));
        agg.attach(PriorityNode::new(p(10))).unwrap();
        agg.set_base(p(4));
        assert_eq!(agg.effective(), p(4));
        agg.set_base(p(20));
        assert_eq!(agg.effective(), p(10));
    }
}
