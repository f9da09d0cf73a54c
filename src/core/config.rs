//! Ledger configuration: feature flags and tunable parameters.
//!
//! Parameters are divided into:
//! - Feature flags: fifteen named switches gating optional behavior
//! - Ledger parameters: accrual timing, yield-rate floors, debt limits
//! - System rates: the default rate table (see [`crate::core::rates`])

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::rates::{Rate, RateTable};
use crate::core::token::TokenAmount;
use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURES
// ═══════════════════════════════════════════════════════════════════════════════

/// Behavior switches, numbered by their administrative code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Taxes and accrual feed the yield pool
    YieldPool = 1,
    /// Taxes and accrual feed the debt reserve
    DebtReserve = 2,
    /// Holder-to-holder transfers
    Transfers = 3,
    /// Deposits of the external asset
    Wraps = 4,
    /// Redemptions back to the external asset
    Unwraps = 5,
    /// Explicit yield withdrawals
    Withdrawals = 6,
    /// Claim-session payouts
    Claims = 7,
    /// Treasury debt allocations
    Allocations = 8,
    /// Per-account rate overrides
    AccountRates = 9,
    /// Custody reconciliation notices on unwrap
    Reconciliation = 10,
    /// External rate oracle for yield rates
    RateOracle = 11,
    /// Network rate derived from pool reserves
    AmmRates = 12,
    /// Credit allotments computed from lifetime deposits
    CreditGuarantees = 13,
    /// Taxes rescaled by the pool reserve ratio
    ReserveMinting = 14,
    /// Pair liquidity position has been initialised
    PairLiquidity = 15,
}

impl Feature {
    /// All features in code order
    pub const ALL: [Feature; 15] = [
        Feature::YieldPool,
        Feature::DebtReserve,
        Feature::Transfers,
        Feature::Wraps,
        Feature::Unwraps,
        Feature::Withdrawals,
        Feature::Claims,
        Feature::Allocations,
        Feature::AccountRates,
        Feature::Reconciliation,
        Feature::RateOracle,
        Feature::AmmRates,
        Feature::CreditGuarantees,
        Feature::ReserveMinting,
        Feature::PairLiquidity,
    ];

    /// Administrative code (1-15)
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Look a feature up by its administrative code
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.code() == code)
            .ok_or_else(|| Error::InvalidParameter {
                name: "feature".into(),
                reason: format!("unknown feature code {}", code),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURE FLAGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Flag table with one explicit field per [`Feature`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// See [`Feature::YieldPool`]
    pub yield_pool: bool,
    /// See [`Feature::DebtReserve`]
    pub debt_reserve: bool,
    /// See [`Feature::Transfers`]
    pub transfers: bool,
    /// See [`Feature::Wraps`]
    pub wraps: bool,
    /// See [`Feature::Unwraps`]
    pub unwraps: bool,
    /// See [`Feature::Withdrawals`]
    pub withdrawals: bool,
    /// See [`Feature::Claims`]
    pub claims: bool,
    /// See [`Feature::Allocations`]
    pub allocations: bool,
    /// See [`Feature::AccountRates`]
    pub account_rates: bool,
    /// See [`Feature::Reconciliation`]
    pub reconciliation: bool,
    /// See [`Feature::RateOracle`]
    pub rate_oracle: bool,
    /// See [`Feature::AmmRates`]
    pub amm_rates: bool,
    /// See [`Feature::CreditGuarantees`]
    pub credit_guarantees: bool,
    /// See [`Feature::ReserveMinting`]
    pub reserve_minting: bool,
    /// See [`Feature::PairLiquidity`]
    pub pair_liquidity: bool,
}

impl FeatureFlags {
    /// Typical operating set: yield pool primary, every holder operation open
    pub fn standard() -> Self {
        Self {
            yield_pool: true,
            transfers: true,
            wraps: true,
            unwraps: true,
            withdrawals: true,
            claims: true,
            allocations: true,
            ..Default::default()
        }
    }

    /// Read a flag
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::YieldPool => self.yield_pool,
            Feature::DebtReserve => self.debt_reserve,
            Feature::Transfers => self.transfers,
            Feature::Wraps => self.wraps,
            Feature::Unwraps => self.unwraps,
            Feature::Withdrawals => self.withdrawals,
            Feature::Claims => self.claims,
            Feature::Allocations => self.allocations,
            Feature::AccountRates => self.account_rates,
            Feature::Reconciliation => self.reconciliation,
            Feature::RateOracle => self.rate_oracle,
            Feature::AmmRates => self.amm_rates,
            Feature::CreditGuarantees => self.credit_guarantees,
            Feature::ReserveMinting => self.reserve_minting,
            Feature::PairLiquidity => self.pair_liquidity,
        }
    }

    /// Fail with [`Error::FeatureDisabled`] unless the flag is on
    pub fn require(&self, feature: Feature) -> Result<()> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(Error::FeatureDisabled(feature))
        }
    }

    /// Toggle a flag.
    ///
    /// Yield pool and debt reserve accrual are exclusive: switching one on
    /// switches the other off.
    pub fn set(&mut self, feature: Feature, enabled: bool) {
        let slot = match feature {
            Feature::YieldPool => &mut self.yield_pool,
            Feature::DebtReserve => &mut self.debt_reserve,
            Feature::Transfers => &mut self.transfers,
            Feature::Wraps => &mut self.wraps,
            Feature::Unwraps => &mut self.unwraps,
            Feature::Withdrawals => &mut self.withdrawals,
            Feature::Claims => &mut self.claims,
            Feature::Allocations => &mut self.allocations,
            Feature::AccountRates => &mut self.account_rates,
            Feature::Reconciliation => &mut self.reconciliation,
            Feature::RateOracle => &mut self.rate_oracle,
            Feature::AmmRates => &mut self.amm_rates,
            Feature::CreditGuarantees => &mut self.credit_guarantees,
            Feature::ReserveMinting => &mut self.reserve_minting,
            Feature::PairLiquidity => &mut self.pair_liquidity,
        };
        *slot = enabled;

        if enabled {
            match feature {
                Feature::YieldPool => self.debt_reserve = false,
                Feature::DebtReserve => self.yield_pool = false,
                _ => {}
            }
        }
    }

    /// Validate flag consistency
    pub fn validate(&self) -> Result<()> {
        if self.yield_pool && self.debt_reserve {
            return Err(Error::MutuallyExclusiveFeatures);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunable ledger parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerParams {
    /// Minimum seconds between accruals
    pub yield_iteration: u64,
    /// Daily yield rate once an account's allotment is used up
    pub min_yield_rate: Rate,
    /// Cap on the network rate derived from pool reserves
    pub liquidity_rate_limit: Rate,
    /// Debt reserve at genesis
    pub initial_debt_reserve: TokenAmount,
    /// External asset identifier (oracle source, pair token 0)
    pub source_asset: String,
    /// Ledger token identifier (oracle target, pair token 1)
    pub target_asset: String,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            yield_iteration: DEFAULT_YIELD_ITERATION_SECS,
            min_yield_rate: Rate::from_raw(DEFAULT_MIN_YIELD_RATE),
            liquidity_rate_limit: Rate::from_raw(DEFAULT_LIQUIDITY_RATE_LIMIT),
            initial_debt_reserve: TokenAmount::ZERO,
            source_asset: "ASSET".to_string(),
            target_asset: "WRAPPED".to_string(),
        }
    }
}

impl LedgerParams {
    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_yield_rate > Rate::FULL {
            return Err(Error::InvalidParameter {
                name: "min_yield_rate".into(),
                reason: "exceeds 100%".into(),
            });
        }
        if self.source_asset == self.target_asset {
            return Err(Error::InvalidParameter {
                name: "target_asset".into(),
                reason: "must differ from source_asset".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete configuration used to build a ledger
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Tunable parameters
    pub params: LedgerParams,
    /// Initial flag table
    pub flags: FeatureFlags,
    /// Default rate per rate type
    pub system_rates: RateTable,
}

impl LedgerConfig {
    /// Configuration with the standard flag set and default rates
    pub fn standard() -> Self {
        Self {
            flags: FeatureFlags::standard(),
            ..Default::default()
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.flags.validate()?;
        self.system_rates.validate()
    }

    /// Parse from JSON and validate
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_feature_codes() {
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.code() as usize, i + 1);
            assert_eq!(Feature::from_code(feature.code()).unwrap(), *feature);
        }
        assert!(Feature::from_code(0).is_err());
        assert!(Feature::from_code(16).is_err());
    }

    #[test]
    fn test_accrual_flags_exclusive_on_toggle() {
        let mut flags = FeatureFlags::default();
        flags.set(Feature::YieldPool, true);
        assert!(flags.yield_pool);

        flags.set(Feature::DebtReserve, true);
        assert!(flags.debt_reserve);
        assert!(!flags.yield_pool);

        // Switching off never touches the other flag
        flags.set(Feature::DebtReserve, false);
        assert!(!flags.debt_reserve);
        assert!(!flags.yield_pool);
    }

    #[test]
    fn test_require() {
        let flags = FeatureFlags::default();
        assert_eq!(
            flags.require(Feature::Transfers),
            Err(Error::FeatureDisabled(Feature::Transfers))
        );
        assert!(FeatureFlags::standard().require(Feature::Transfers).is_ok());
    }

    #[test]
    fn test_validate_rejects_both_accruals() {
        let flags = FeatureFlags {
            yield_pool: true,
            debt_reserve: true,
            ..Default::default()
        };
        assert_eq!(flags.validate(), Err(Error::MutuallyExclusiveFeatures));
    }

    #[test]
    fn test_config_json_defaults() {
        let config = LedgerConfig::from_json_str(r#"{"flags": {"wraps": true}}"#).unwrap();
        assert!(config.flags.wraps);
        assert!(!config.flags.transfers);
        assert_eq!(config.params.yield_iteration, DEFAULT_YIELD_ITERATION_SECS);
    }

    #[test]
    fn test_config_from_file() {
        let config = LedgerConfig::standard();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let loaded = LedgerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_missing_file() {
        let result = LedgerConfig::from_json_file("/nonexistent/ledger.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
