//! Claim sessions.
//!
//! Every wrap (and allocation) credits an entitlement to the current
//! session. Operational income accumulates into the session's reserve, and
//! each claimant may take their proportional share of it once. Resetting
//! opens a fresh session; entitlements left in the old one are forfeited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;
use crate::utils::math::*;

/// Per-session claim ledger and reserves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimsBook {
    session: u64,
    entitlements: HashMap<u64, HashMap<Address, u64>>,
    claim_supply: HashMap<u64, u64>,
    operational_reserve: HashMap<u64, u64>,
}

/// Result of a settled claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledClaim {
    /// Session the claim was paid from
    pub session: u64,
    /// Entitlement consumed
    pub entitlement: u64,
    /// Reserve paid out
    pub share: u64,
}

impl ClaimsBook {
    /// Empty book at session zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session counter
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Entitlement of `account` in `session`
    pub fn entitlement(&self, session: u64, account: &Address) -> u64 {
        self.entitlements
            .get(&session)
            .and_then(|entries| entries.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of entitlements in `session`
    pub fn claim_supply(&self, session: u64) -> u64 {
        self.claim_supply.get(&session).copied().unwrap_or(0)
    }

    /// Operational reserve accumulated in `session`
    pub fn operational_reserve(&self, session: u64) -> u64 {
        self.operational_reserve.get(&session).copied().unwrap_or(0)
    }

    /// Reserve `account` could claim right now (zero if nothing to claim)
    pub fn claimable(&self, account: &Address) -> Result<u64> {
        let entitlement = self.entitlement(self.session, account);
        let supply = self.claim_supply(self.session);
        if entitlement == 0 || supply == 0 {
            return Ok(0);
        }
        safe_mul_div(entitlement, self.operational_reserve(self.session), supply)
    }

    /// Credit `amount` of entitlement to `account` in the current session
    pub fn update_claims(&mut self, account: Address, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let supply = safe_add(self.claim_supply(self.session), amount)?;
        let current = self.entitlement(self.session, &account);
        let updated = safe_add(current, amount)?;

        self.entitlements
            .entry(self.session)
            .or_default()
            .insert(account, updated);
        self.claim_supply.insert(self.session, supply);
        Ok(())
    }

    /// Add operational income to the current session's reserve
    pub fn add_operational_income(&mut self, amount: u64) -> Result<()> {
        let reserve = safe_add(self.operational_reserve(self.session), amount)?;
        self.operational_reserve.insert(self.session, reserve);
        Ok(())
    }

    /// Pay out `account`'s proportional share and clear its entitlement.
    ///
    /// Fails with `InsufficientEntitlement` when the share rounds to zero.
    pub fn settle(&mut self, account: &Address) -> Result<SettledClaim> {
        let session = self.session;
        let share = self.claimable(account)?;
        if share == 0 {
            return Err(Error::InsufficientEntitlement(account.to_hex()));
        }

        let entitlement = self.entitlement(session, account);
        let supply = safe_sub(self.claim_supply(session), entitlement)?;
        let reserve = safe_sub(self.operational_reserve(session), share)?;

        if let Some(entries) = self.entitlements.get_mut(&session) {
            entries.remove(account);
        }
        self.claim_supply.insert(session, supply);
        self.operational_reserve.insert(session, reserve);

        Ok(SettledClaim {
            session,
            entitlement,
            share,
        })
    }

    /// Open a new session and return its number
    pub fn reset(&mut self) -> u64 {
        self.session += 1;
        self.session
    }

    /// Entitlements in `session` sum to its claim supply
    pub fn verify_session(&self, session: u64) -> bool {
        let sum: u128 = self
            .entitlements
            .get(&session)
            .map(|entries| entries.values().map(|v| *v as u128).sum())
            .unwrap_or(0);
        sum == self.claim_supply(session) as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::repeat(0x0a)
    }

    fn bob() -> Address {
        Address::repeat(0x0b)
    }

    #[test]
    fn test_proportional_claims() {
        let mut book = ClaimsBook::new();
        book.update_claims(alice(), 300).unwrap();
        book.update_claims(bob(), 100).unwrap();
        book.add_operational_income(40).unwrap();

        assert_eq!(book.claimable(&alice()).unwrap(), 30);

        let settled = book.settle(&alice()).unwrap();
        assert_eq!(settled.share, 30);
        assert_eq!(settled.entitlement, 300);
        assert_eq!(book.claim_supply(0), 100);
        assert_eq!(book.operational_reserve(0), 10);

        // Remaining claimant takes the rest
        assert_eq!(book.settle(&bob()).unwrap().share, 10);
        assert_eq!(book.operational_reserve(0), 0);
        assert!(book.verify_session(0));
    }

    #[test]
    fn test_zero_share_fails() {
        let mut book = ClaimsBook::new();
        book.update_claims(alice(), 100).unwrap();

        // Nothing in the reserve yet
        assert!(matches!(
            book.settle(&alice()),
            Err(Error::InsufficientEntitlement(_))
        ));
        // Unknown claimant
        book.add_operational_income(10).unwrap();
        assert!(book.settle(&bob()).is_err());
    }

    #[test]
    fn test_reset_forfeits_old_session() {
        let mut book = ClaimsBook::new();
        book.update_claims(alice(), 100).unwrap();
        book.add_operational_income(50).unwrap();

        assert_eq!(book.reset(), 1);
        assert_eq!(book.claimable(&alice()).unwrap(), 0);
        assert_eq!(book.claim_supply(1), 0);
        // Old session data remains readable
        assert_eq!(book.entitlement(0, &alice()), 100);
        assert_eq!(book.operational_reserve(0), 50);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let mut book = ClaimsBook::new();
        book.update_claims(alice(), u64::MAX / 2).unwrap();
        book.add_operational_income(u64::MAX / 4).unwrap();
        assert_eq!(book.claimable(&alice()).unwrap(), u64::MAX / 4);
    }
}
