//! In-memory collaborators for tests and simulation.

use std::collections::HashMap;

use crate::core::rates::Rate;
use crate::error::{Error, Result};
use crate::external::{
    AssetSource, LiquidityManager, PoolReserves, PositionId, RateOracle, TokenPair,
};
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET
// ═══════════════════════════════════════════════════════════════════════════════

/// External asset with plain balances and a custody account
#[derive(Debug, Default, Clone)]
pub struct InMemoryAsset {
    balances: HashMap<Address, u64>,
    custody: u64,
}

impl InMemoryAsset {
    /// Create an empty asset
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a holder out of thin air
    pub fn fund(&mut self, holder: Address, amount: u64) {
        *self.balances.entry(holder).or_insert(0) += amount;
    }

    /// Builder form of [`InMemoryAsset::fund`]
    pub fn with_balance(mut self, holder: Address, amount: u64) -> Self {
        self.fund(holder, amount);
        self
    }

    /// Move custody funds elsewhere (simulates an external drain)
    pub fn drain_custody(&mut self, amount: u64) {
        self.custody = self.custody.saturating_sub(amount);
    }
}

impl AssetSource for InMemoryAsset {
    fn transfer_from(&mut self, from: &Address, amount: u64) -> Result<()> {
        let balance = self.balances.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(Error::External(format!(
                "asset transfer_from {}: balance {} < {}",
                from.short(),
                balance,
                amount
            )));
        }
        self.balances.insert(*from, balance - amount);
        self.custody += amount;
        Ok(())
    }

    fn transfer_to(&mut self, to: &Address, amount: u64) -> Result<()> {
        if self.custody < amount {
            return Err(Error::External(format!(
                "asset custody {} < {}",
                self.custody, amount
            )));
        }
        self.custody -= amount;
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn custody_balance(&self) -> u64 {
        self.custody
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Pool with fixed reserves
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPool {
    /// Reserve of token 0
    pub reserve0: u128,
    /// Reserve of token 1
    pub reserve1: u128,
}

impl StaticPool {
    /// Pool with the given reserves
    pub fn new(reserve0: u128, reserve1: u128) -> Self {
        Self { reserve0, reserve1 }
    }

    /// Pool that has never been seeded
    pub fn empty() -> Self {
        Self::default()
    }
}

impl PoolReserves for StaticPool {
    fn get_reserves(&self) -> Result<(u128, u128)> {
        Ok((self.reserve0, self.reserve1))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Oracle returning one rate for everyone
#[derive(Debug, Clone, Copy)]
pub struct FixedRateOracle {
    rate: Rate,
}

impl FixedRateOracle {
    /// Oracle answering `rate`
    pub fn new(rate: Rate) -> Self {
        Self { rate }
    }
}

impl RateOracle for FixedRateOracle {
    fn easing_rate(&self, _account: &Address, _source: &str, _target: &str) -> Result<Rate> {
        Ok(self.rate)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Position manager that records every mint
#[derive(Debug, Default, Clone)]
pub struct RecordingLiquidityManager {
    /// Every `(pair, amount)` minted so far
    pub minted: Vec<(TokenPair, u64)>,
}

impl LiquidityManager for RecordingLiquidityManager {
    fn mint_liquidity_position(&mut self, pair: &TokenPair, amount: u64) -> Result<PositionId> {
        self.minted.push((pair.clone(), amount));
        Ok(PositionId(self.minted.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_pull_and_pay() {
        let alice = Address::from_label("alice");
        let mut asset = InMemoryAsset::new().with_balance(alice, 100);

        asset.transfer_from(&alice, 60).unwrap();
        assert_eq!(asset.balance_of(&alice), 40);
        assert_eq!(asset.custody_balance(), 60);

        assert!(asset.transfer_from(&alice, 41).is_err());

        asset.transfer_to(&alice, 10).unwrap();
        assert_eq!(asset.balance_of(&alice), 50);
        assert!(asset.transfer_to(&alice, 51).is_err());
    }

    #[test]
    fn test_recording_liquidity_manager() {
        let mut manager = RecordingLiquidityManager::default();
        let pair = TokenPair::new("ASSET", "WRAPPED");
        assert_eq!(manager.mint_liquidity_position(&pair, 5).unwrap(), PositionId(1));
        assert_eq!(manager.minted.len(), 1);
    }
}
