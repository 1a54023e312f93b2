// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Scheduling domains (clusters of CPUs under one scheduler instance) and their priority spaces
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 5 unit tests
//! PUBLIC API: Priority, DomainId, DomainConfig, DomainRegistry, DomainTable
//! INVARIANTS: DomainId values are dense indices; lower Priority value = more important;
//!             a raw priority is valid in a domain iff it does not exceed the domain maximum
//!
//! The table is configured once at boot from a static description, like the other bounded kernel
//! tables. Lookups never allocate.

use alloc::vec::Vec;
use core::fmt;

use crate::error::DomainError;

/// Domain-scoped priority value. Numerically lower values are more important.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Priority(u64);

impl Priority {
    /// The most important priority of every domain.
    pub const HIGHEST: Self = Self(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if `self` is strictly more important than `other`.
    pub const fn is_higher_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a scheduling domain in the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DomainId(usize);

impl DomainId {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Static description of one scheduling domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DomainConfig {
    pub name: &'static str,
    pub maximum_priority: u64,
}

impl DomainConfig {
    pub const fn new(name: &'static str, maximum_priority: u64) -> Self {
        Self { name, maximum_priority }
    }
}

/// Registry of scheduling domains as seen by locking protocols.
pub trait DomainRegistry {
    /// Number of configured domains.
    fn count(&self) -> usize;

    /// Least important raw priority of the domain.
    fn maximum_priority(&self, domain: DomainId) -> Option<u64>;

    /// Maps a raw (user visible) priority into the domain's priority space.
    fn map_priority(&self, domain: DomainId, raw: u64) -> Option<Priority>;

    /// Inverse of [`DomainRegistry::map_priority`].
    fn unmap_priority(&self, domain: DomainId, priority: Priority) -> Option<u64>;

    fn contains(&self, domain: DomainId) -> bool {
        domain.raw() < self.count()
    }

    /// Numerically lowest value of the domain's priority space (the mapping of raw priority 0).
    fn lowest_priority_value(&self, domain: DomainId) -> Option<Priority> {
        self.map_priority(domain, 0)
    }

    fn is_valid_priority(&self, domain: DomainId, raw: u64) -> bool {
        self.map_priority(domain, raw).is_some()
    }
}

/// Fixed-priority domain table. The mapping between raw and core priorities is the identity.
#[derive(Clone, Debug)]
pub struct DomainTable {
    domains: Vec<DomainConfig>,
}

impl DomainTable {
    pub fn new(config: &[DomainConfig]) -> Result<Self, DomainError> {
        if config.is_empty() {
            return Err(DomainError::Empty);
        }
        for (index, domain) in config.iter().enumerate() {
            if domain.maximum_priority == 0 {
                return Err(DomainError::InvalidMaximum { name: domain.name });
            }
            if config[..index].iter().any(|other| other.name == domain.name) {
                return Err(DomainError::Duplicate { name: domain.name });
            }
        }
        Ok(Self { domains: config.to_vec() })
    }

    /// Looks a domain up by name.
    pub fn ident(&self, name: &str) -> Option<DomainId> {
        self.domains.iter().position(|domain| domain.name == name).map(DomainId::from_raw)
    }

    pub fn name(&self, domain: DomainId) -> Option<&'static str> {
        self.domains.get(domain.raw()).map(|domain| domain.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = DomainId> + '_ {
        (0..self.domains.len()).map(DomainId::from_raw)
    }
}

impl DomainRegistry for DomainTable {
    fn count(&self) -> usize {
        self.domains.len()
    }

    fn maximum_priority(&self, domain: DomainId) -> Option<u64> {
        self.domains.get(domain.raw()).map(|domain| domain.maximum_priority)
    }

    fn map_priority(&self, domain: DomainId, raw: u64) -> Option<Priority> {
        let maximum = self.maximum_priority(domain)?;
        (raw <= maximum).then_some(Priority::new(raw))
    }

    fn unmap_priority(&self, domain: DomainId, priority: Priority) -> Option<u64> {
        let maximum = self.maximum_priority(domain)?;
        (priority.raw() <= maximum).then_some(priority.raw())
    }
}
