//! Treasury and debt issuance.
//!
//! Treasurers are registered with a reserve limit; allocations issue
//! debt-only tokens against a treasurer's limit and against the global
//! debt reserve. Invariant: `debt_supply <= debt_reserve`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CapKind, Error, Result};
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURER
// ═══════════════════════════════════════════════════════════════════════════════

/// Treasurer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreasurerStatus {
    /// May allocate
    Enabled,
    /// Registered but blocked from allocating
    Disabled,
}

/// Registered debt issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasurer {
    /// Outstanding debt issued through this treasurer
    pub balance_allocated: u64,
    /// Maximum outstanding debt
    pub reserve_limit: u64,
    /// Current status
    pub status: TreasurerStatus,
}

impl Treasurer {
    /// Enabled treasurer with nothing allocated
    pub fn new(reserve_limit: u64) -> Self {
        Self {
            balance_allocated: 0,
            reserve_limit,
            status: TreasurerStatus::Enabled,
        }
    }

    /// Check if enabled
    pub fn is_enabled(&self) -> bool {
        self.status == TreasurerStatus::Enabled
    }

    /// Room left under the reserve limit
    pub fn headroom(&self) -> u64 {
        self.reserve_limit.saturating_sub(self.balance_allocated)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt reserve, outstanding debt and the treasurer registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Treasury {
    debt_reserve: u64,
    debt_supply: u64,
    treasurers: HashMap<Address, Treasurer>,
}

impl Treasury {
    /// Treasury with an initial debt reserve
    pub fn new(debt_reserve: u64) -> Self {
        Self {
            debt_reserve,
            ..Default::default()
        }
    }

    /// Ceiling on outstanding debt
    pub fn debt_reserve(&self) -> u64 {
        self.debt_reserve
    }

    /// Outstanding debt
    pub fn debt_supply(&self) -> u64 {
        self.debt_supply
    }

    /// Look up a treasurer
    pub fn treasurer(&self, address: &Address) -> Option<&Treasurer> {
        self.treasurers.get(address)
    }

    /// Number of registered treasurers
    pub fn treasurer_count(&self) -> usize {
        self.treasurers.len()
    }

    /// Register (or replace the limit of) a treasurer
    pub fn register(&mut self, address: Address, reserve_limit: u64) -> Result<()> {
        if address.is_zero() {
            return Err(Error::ZeroAddress);
        }
        self.treasurers
            .entry(address)
            .and_modify(|t| t.reserve_limit = reserve_limit)
            .or_insert_with(|| Treasurer::new(reserve_limit));
        Ok(())
    }

    /// Enable or disable a treasurer
    pub fn set_status(&mut self, address: &Address, status: TreasurerStatus) -> Result<()> {
        let treasurer = self
            .treasurers
            .get_mut(address)
            .ok_or_else(|| Error::UnknownTreasurer(address.to_hex()))?;
        treasurer.status = status;
        Ok(())
    }

    /// Set the debt reserve directly; cannot drop below outstanding debt
    pub fn set_debt_reserve(&mut self, amount: u64) -> Result<()> {
        if amount < self.debt_supply {
            return Err(Error::InvalidParameter {
                name: "debt_reserve".into(),
                reason: format!("{} below outstanding debt {}", amount, self.debt_supply),
            });
        }
        self.debt_reserve = amount;
        Ok(())
    }

    /// Grow the debt reserve
    pub fn increase_reserve(&mut self, amount: u64) -> Result<()> {
        self.debt_reserve = safe_add(self.debt_reserve, amount)?;
        Ok(())
    }

    /// Enabled treasurer, or the matching gate error
    pub fn active_treasurer(&self, address: &Address) -> Result<&Treasurer> {
        let treasurer = self
            .treasurers
            .get(address)
            .ok_or_else(|| Error::UnknownTreasurer(address.to_hex()))?;
        if !treasurer.is_enabled() {
            return Err(Error::TreasurerDisabled(address.to_hex()));
        }
        Ok(treasurer)
    }

    /// Check that issuing `amount` through `treasurer` stays under both caps
    pub fn check_allocation(&self, treasurer: &Address, amount: u64) -> Result<()> {
        let entry = self.active_treasurer(treasurer)?;

        let allocated = safe_add(entry.balance_allocated, amount)?;
        if allocated > entry.reserve_limit {
            return Err(Error::CapExceeded {
                cap: CapKind::TreasurerLimit,
                requested: allocated,
                limit: entry.reserve_limit,
            });
        }

        let supply = safe_add(self.debt_supply, amount)?;
        if supply > self.debt_reserve {
            return Err(Error::CapExceeded {
                cap: CapKind::DebtReserve,
                requested: supply,
                limit: self.debt_reserve,
            });
        }
        Ok(())
    }

    /// Record debt issued through `treasurer` after [`Treasury::check_allocation`]
    pub fn record_allocation(&mut self, treasurer: &Address, amount: u64) -> Result<()> {
        self.check_allocation(treasurer, amount)?;
        let supply = safe_add(self.debt_supply, amount)?;
        let entry = self
            .treasurers
            .get_mut(treasurer)
            .ok_or_else(|| Error::UnknownTreasurer(treasurer.to_hex()))?;
        entry.balance_allocated += amount;
        self.debt_supply = supply;
        Ok(())
    }

    /// Retire `amount` of outstanding debt, crediting `treasurer`'s limit
    /// when it is known
    pub fn record_release(&mut self, treasurer: Option<&Address>, amount: u64) -> Result<()> {
        self.debt_supply = safe_sub(self.debt_supply, amount)?;
        if let Some(entry) = treasurer.and_then(|t| self.treasurers.get_mut(t)) {
            entry.balance_allocated = entry.balance_allocated.saturating_sub(amount);
        }
        Ok(())
    }

    /// Outstanding debt within the reserve
    pub fn verify_invariant(&self) -> bool {
        self.debt_supply <= self.debt_reserve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn treasurer() -> Address {
        Address::repeat(0x7e)
    }

    #[test]
    fn test_register_and_gate() {
        let mut treasury = Treasury::new(1_000);
        assert!(matches!(
            treasury.check_allocation(&treasurer(), 1),
            Err(Error::UnknownTreasurer(_))
        ));

        treasury.register(treasurer(), 500).unwrap();
        treasury
            .set_status(&treasurer(), TreasurerStatus::Disabled)
            .unwrap();
        assert!(matches!(
            treasury.check_allocation(&treasurer(), 1),
            Err(Error::TreasurerDisabled(_))
        ));

        assert!(treasury.register(Address::ZERO, 1).is_err());
    }

    #[test]
    fn test_caps() {
        let mut treasury = Treasury::new(800);
        treasury.register(treasurer(), 500).unwrap();

        treasury.record_allocation(&treasurer(), 400).unwrap();
        let err = treasury.check_allocation(&treasurer(), 101).unwrap_err();
        assert!(matches!(
            err,
            Error::CapExceeded {
                cap: CapKind::TreasurerLimit,
                requested: 501,
                limit: 500
            }
        ));

        let second = Address::repeat(0x7f);
        treasury.register(second, 1_000).unwrap();
        let err = treasury.check_allocation(&second, 401).unwrap_err();
        assert!(matches!(
            err,
            Error::CapExceeded {
                cap: CapKind::DebtReserve,
                ..
            }
        ));
        assert_eq!(treasury.debt_supply(), 400);
        assert!(treasury.verify_invariant());
    }

    #[test]
    fn test_release_and_reserve() {
        let mut treasury = Treasury::new(1_000);
        treasury.register(treasurer(), 1_000).unwrap();
        treasury.record_allocation(&treasurer(), 600).unwrap();

        treasury.record_release(Some(&treasurer()), 250).unwrap();
        assert_eq!(treasury.debt_supply(), 350);
        assert_eq!(treasury.treasurer(&treasurer()).unwrap().headroom(), 650);

        assert!(treasury.set_debt_reserve(300).is_err());
        treasury.increase_reserve(500).unwrap();
        assert_eq!(treasury.debt_reserve(), 1_500);
        assert!(treasury.record_release(None, 351).is_err());
    }
}
