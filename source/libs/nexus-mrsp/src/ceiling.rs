// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-domain ceiling priorities of one MrsP resource
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 3 unit tests
//! PUBLIC API: CeilingTable
//! INVARIANTS: One entry per configured domain, sized once at construction

use alloc::vec::Vec;

use nexus_sched::{DomainId, DomainRegistry, Priority};

use crate::error::{MrspError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CeilingTable {
    ceilings: Vec<Priority>,
}

impl CeilingTable {
    /// `home` gets `ceiling`, every other domain its lowest priority value.
    pub fn new<R: DomainRegistry + ?Sized>(
        registry: &R,
        home: DomainId,
        ceiling: Priority,
    ) -> Result<Self> {
        if !registry.contains(home) {
            return Err(MrspError::InvalidDomain);
        }
        let count = registry.count();
        let mut ceilings = Vec::new();
        ceilings.try_reserve_exact(count).map_err(|_| MrspError::NoMemory)?;
        for raw in 0..count {
            let domain = DomainId::from_raw(raw);
            let value = if domain == home {
                ceiling
            } else {
                registry.lowest_priority_value(domain).ok_or(MrspError::InvalidDomain)?
            };
            ceilings.push(value);
        }
        Ok(Self { ceilings })
    }

    pub fn get(&self, domain: DomainId) -> Result<Priority> {
        self.ceilings.get(domain.raw()).copied().ok_or(MrspError::InvalidDomain)
    }

    /// Stores a new ceiling and returns the previous one.
    pub fn set(&mut self, domain: DomainId, ceiling: Priority) -> Result<Priority> {
        let slot = self.ceilings.get_mut(domain.raw()).ok_or(MrspError::InvalidDomain)?;
        Ok(core::mem::replace(slot, ceiling))
    }

    pub fn len(&self) -> usize {
        self.ceilings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ceilings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_sched::{DomainConfig, DomainTable};

    fn table() -> DomainTable {
        DomainTable::new(&[
            DomainConfig::new("A", 255),
            DomainConfig::new("B", 255),
            DomainConfig::new("C", 63),
        ])
        .unwrap()
    }

    #[test]
    fn home_gets_ceiling_others_lowest_value() {
        let t = table();
        let ceilings = CeilingTable::new(&t, DomainId::from_raw(1), Priority::new(10)).unwrap();
        assert_eq!(ceilings.len(), 3);
        assert_eq!(ceilings.get(DomainId::from_raw(0)), Ok(Priority::HIGHEST));
        assert_eq!(ceilings.get(DomainId::from_raw(1)), Ok(Priority::new(10)));
        assert_eq!(ceilings.get(DomainId::from_raw(2)), Ok(Priority::HIGHEST));
    }

    #[test]
    fn set_returns_previous_value() {
        let t = table();
        let mut ceilings = CeilingTable::new(&t, DomainId::from_raw(0), Priority::new(4)).unwrap();
        assert_eq!(ceilings.set(DomainId::from_raw(0), Priority::new(2)), Ok(Priority::new(4)));
        assert_eq!(ceilings.get(DomainId::from_raw(0)), Ok(Priority::new(2)));
    }

    #[test]
    fn unknown_domains_are_rejected() {
        let t = table();
        assert_eq!(
            CeilingTable::new(&t, DomainId::from_raw(3), Priority::new(1)),
            Err(MrspError::InvalidDomain)
        );
        let mut ceilings = CeilingTable::new(&t, DomainId::from_raw(0), Priority::new(1)).unwrap();
        assert_eq!(ceilings.get(DomainId::from_raw(7)), Err(MrspError::InvalidDomain));
        assert_eq!(
            ceilings.set(DomainId::from_raw(7), Priority::new(1)),
            Err(MrspError::InvalidDomain)
        );
    }
}
