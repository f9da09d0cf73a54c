//! Rate registry.
//!
//! Holds the global default rate for each of the eight rate types plus
//! optional per-account overrides, and resolves the effective rate for an
//! `(account, type)` pair.
//!
//! Rates use [`BASE_UNIT`] as one percent, so applying a rate to an amount is
//! `amount * rate / 100 / BASE_UNIT`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::config::FeatureFlags;
use crate::error::{Error, Result};
use crate::external::PoolReserves;
use crate::utils::constants::*;
use crate::utils::crypto::Address;
use crate::utils::math::{apply_rate, safe_mul_div_u128};

// ═══════════════════════════════════════════════════════════════════════════════
// RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Percentage scaled so that `BASE_UNIT` is one percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u64);

impl Rate {
    /// 0%
    pub const ZERO: Self = Self(0);

    /// 100%
    pub const FULL: Self = Self(FULL_RATE);

    /// Create from the raw scaled value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Create from whole percent (3 = 3%)
    pub const fn from_percent(pct: u64) -> Self {
        Self(pct * BASE_UNIT)
    }

    /// Create from basis points (333 = 3.33%)
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps * BASE_UNIT / 100)
    }

    /// Raw scaled value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Tax on `amount` at this rate (floored)
    pub fn apply(&self, amount: u64) -> Result<u64> {
        apply_rate(amount, self.0)
    }

    /// Percentage as a decimal (3.33 for 3.33%)
    pub fn as_percent(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(BASE_UNIT)
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.as_percent().normalize())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// The eight rate kinds the registry resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RateType {
    /// Share of every tax routed to the claims session
    Operational,
    /// Wrap tax; also the standard daily yield rate
    Network,
    /// Unwrap tax
    Unwrap,
    /// Yield withdrawal tax
    Withdrawal,
    /// Transfer tax
    Transfer,
    /// Share of the wrap tax returned to the wrapper
    Rebate,
    /// Treasury allocation tax
    Allocation,
    /// Credit allotment per deposited unit
    Credit,
}

impl RateType {
    /// All rate types
    pub const ALL: [RateType; 8] = [
        RateType::Operational,
        RateType::Network,
        RateType::Unwrap,
        RateType::Withdrawal,
        RateType::Transfer,
        RateType::Rebate,
        RateType::Allocation,
        RateType::Credit,
    ];
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// One rate per [`RateType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateTable {
    /// Operational share
    pub operational: Rate,
    /// Network rate
    pub network: Rate,
    /// Unwrap tax
    pub unwrap: Rate,
    /// Withdrawal tax
    pub withdrawal: Rate,
    /// Transfer tax
    pub transfer: Rate,
    /// Rebate share
    pub rebate: Rate,
    /// Allocation tax
    pub allocation: Rate,
    /// Credit rate
    pub credit: Rate,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            operational: Rate::from_raw(DEFAULT_OPERATIONAL_RATE),
            network: Rate::from_raw(DEFAULT_NETWORK_RATE),
            unwrap: Rate::from_raw(DEFAULT_UNWRAP_RATE),
            withdrawal: Rate::from_raw(DEFAULT_WITHDRAWAL_RATE),
            transfer: Rate::from_raw(DEFAULT_TRANSFER_RATE),
            rebate: Rate::from_raw(DEFAULT_REBATE_RATE),
            allocation: Rate::from_raw(DEFAULT_ALLOCATION_RATE),
            credit: Rate::from_raw(DEFAULT_CREDIT_RATE),
        }
    }
}

impl RateTable {
    /// Table with every rate at zero
    pub fn zero() -> Self {
        Self {
            operational: Rate::ZERO,
            network: Rate::ZERO,
            unwrap: Rate::ZERO,
            withdrawal: Rate::ZERO,
            transfer: Rate::ZERO,
            rebate: Rate::ZERO,
            allocation: Rate::ZERO,
            credit: Rate::ZERO,
        }
    }

    /// Read one rate
    pub fn get(&self, rate_type: RateType) -> Rate {
        match rate_type {
            RateType::Operational => self.operational,
            RateType::Network => self.network,
            RateType::Unwrap => self.unwrap,
            RateType::Withdrawal => self.withdrawal,
            RateType::Transfer => self.transfer,
            RateType::Rebate => self.rebate,
            RateType::Allocation => self.allocation,
            RateType::Credit => self.credit,
        }
    }

    /// Replace one rate
    pub fn set(&mut self, rate_type: RateType, rate: Rate) {
        let slot = match rate_type {
            RateType::Operational => &mut self.operational,
            RateType::Network => &mut self.network,
            RateType::Unwrap => &mut self.unwrap,
            RateType::Withdrawal => &mut self.withdrawal,
            RateType::Transfer => &mut self.transfer,
            RateType::Rebate => &mut self.rebate,
            RateType::Allocation => &mut self.allocation,
            RateType::Credit => &mut self.credit,
        };
        *slot = rate;
    }

    /// Tax rates cannot exceed 100%
    pub fn validate(&self) -> Result<()> {
        for rate_type in RateType::ALL {
            validate_rate(rate_type, self.get(rate_type))?;
        }
        Ok(())
    }
}

fn validate_rate(rate_type: RateType, rate: Rate) -> Result<()> {
    if rate > Rate::FULL {
        return Err(Error::InvalidParameter {
            name: format!("{:?} rate", rate_type),
            reason: format!("{} exceeds 100%", rate),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// System rates plus per-account overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateRegistry {
    system_rates: RateTable,
    user_rates: HashMap<Address, BTreeMap<RateType, Rate>>,
    liquidity_rate_limit: Rate,
}

impl RateRegistry {
    /// Create a registry from the default table
    pub fn new(system_rates: RateTable, liquidity_rate_limit: Rate) -> Self {
        Self {
            system_rates,
            user_rates: HashMap::new(),
            liquidity_rate_limit,
        }
    }

    /// Global default for a rate type
    pub fn system_rate(&self, rate_type: RateType) -> Rate {
        self.system_rates.get(rate_type)
    }

    /// Account override, if one was set
    pub fn user_rate(&self, account: &Address, rate_type: RateType) -> Option<Rate> {
        self.user_rates
            .get(account)
            .and_then(|rates| rates.get(&rate_type))
            .copied()
    }

    /// Cap on the liquidity-derived network rate
    pub fn liquidity_rate_limit(&self) -> Rate {
        self.liquidity_rate_limit
    }

    /// Update a global default
    pub fn set_system_rate(&mut self, rate_type: RateType, rate: Rate) -> Result<()> {
        validate_rate(rate_type, rate)?;
        self.system_rates.set(rate_type, rate);
        Ok(())
    }

    /// Set or replace an account override
    pub fn set_user_rate(&mut self, account: Address, rate_type: RateType, rate: Rate) -> Result<()> {
        validate_rate(rate_type, rate)?;
        self.user_rates.entry(account).or_default().insert(rate_type, rate);
        Ok(())
    }

    /// Drop an account override
    pub fn clear_user_rate(&mut self, account: &Address, rate_type: RateType) {
        if let Some(rates) = self.user_rates.get_mut(account) {
            rates.remove(&rate_type);
            if rates.is_empty() {
                self.user_rates.remove(account);
            }
        }
    }

    /// Update the liquidity-derived rate cap
    pub fn set_liquidity_rate_limit(&mut self, limit: Rate) {
        self.liquidity_rate_limit = limit;
    }

    /// Resolve the rate that applies to `account` for `rate_type`.
    ///
    /// AMM mode overrides the network rate with the pool reserve ratio,
    /// capped at the liquidity rate limit. A pool reading zero on either
    /// side falls through to the registry. Account overrides apply only
    /// when account rates are enabled; accounts without an override get
    /// the system rate.
    pub fn effective_rate(
        &self,
        account: &Address,
        rate_type: RateType,
        flags: &FeatureFlags,
        pool: &dyn PoolReserves,
    ) -> Result<Rate> {
        if flags.amm_rates && rate_type == RateType::Network {
            if let Some(rate) = self.liquidity_rate(pool)? {
                return Ok(rate);
            }
        }

        if flags.account_rates {
            if let Some(rate) = self.user_rate(account, rate_type) {
                return Ok(rate);
            }
        }

        Ok(self.system_rate(rate_type))
    }

    fn liquidity_rate(&self, pool: &dyn PoolReserves) -> Result<Option<Rate>> {
        let (reserve0, reserve1) = pool.get_reserves()?;
        if reserve0 == 0 || reserve1 == 0 {
            tracing::warn!("pool reserves read zero, using registry network rate");
            return Ok(None);
        }
        let ratio = safe_mul_div_u128(reserve0, FULL_RATE as u128, reserve1)?;
        let limit = self.liquidity_rate_limit.raw() as u128;
        Ok(Some(Rate::from_raw(ratio.min(limit) as u64)))
    }
}
