//! External collaborators consumed by the ledger.
//!
//! The ledger never implements custody, pools or oracles itself. It talks to
//! them through these narrow capabilities:
//! - [`AssetSource`]: pulls and pays out the deposited external asset
//! - [`PoolReserves`]: read-only pool reserve query
//! - [`RateOracle`]: optional easing-rate oracle
//! - [`LiquidityManager`]: mints the pair liquidity position once
//!
//! All calls are synchronous and resolve before an operation commits.

pub mod memory;

pub use memory::*;

use serde::{Deserialize, Serialize};

use crate::core::rates::Rate;
use crate::error::Result;
use crate::utils::crypto::Address;

/// Custody of the external asset backing wrapped balances
pub trait AssetSource: Send {
    /// Pull `amount` from `from` into custody
    fn transfer_from(&mut self, from: &Address, amount: u64) -> Result<()>;

    /// Pay `amount` out of custody to `to`
    fn transfer_to(&mut self, to: &Address, amount: u64) -> Result<()>;

    /// External balance of a holder
    fn balance_of(&self, holder: &Address) -> u64;

    /// Amount currently held in custody
    fn custody_balance(&self) -> u64;
}

/// Read-only reserve query for the ledger's AMM pool
pub trait PoolReserves: Send {
    /// Current `(reserve0, reserve1)`; either side may read as zero
    fn get_reserves(&self) -> Result<(u128, u128)>;
}

/// Optional oracle supplying per-account yield rates
pub trait RateOracle: Send {
    /// Easing rate for `account` converting `source_asset` into `target_asset`
    fn easing_rate(&self, account: &Address, source_asset: &str, target_asset: &str) -> Result<Rate>;
}

/// Pair of asset identifiers for a liquidity position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    /// First asset
    pub token0: String,
    /// Second asset
    pub token1: String,
}

impl TokenPair {
    /// Create a pair
    pub fn new(token0: impl Into<String>, token1: impl Into<String>) -> Self {
        Self {
            token0: token0.into(),
            token1: token1.into(),
        }
    }
}

/// Identifier returned by the position manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

/// Concentrated-liquidity position manager
pub trait LiquidityManager: Send {
    /// Mint a new position for `pair` seeded with `amount`
    fn mint_liquidity_position(&mut self, pair: &TokenPair, amount: u64) -> Result<PositionId>;
}
