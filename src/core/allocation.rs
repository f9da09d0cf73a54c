//! Rate allocation pipeline.
//!
//! Every tax collected by the ledger passes through [`allocate_rates`]:
//! the operational share is split off into the current claim session's
//! reserve, and the (optionally reserve-rescaled) tax is credited to the
//! yield pool and/or the debt reserve depending on which accrual branches
//! are enabled.

use crate::core::config::FeatureFlags;
use crate::core::rates::Rate;
use crate::core::treasury::Treasury;
use crate::distribution::{ClaimsBook, YieldPool};
use crate::error::Result;
use crate::external::PoolReserves;
use crate::utils::math::rescale_by_ratio;

/// State touched by the pipeline
pub struct AllocationTargets<'a> {
    /// Receives operational income
    pub claims: &'a mut ClaimsBook,
    /// Receives the tax when the yield-pool branch is on
    pub yield_pool: &'a mut YieldPool,
    /// Receives the tax when the debt-reserve branch is on
    pub treasury: &'a mut Treasury,
}

/// Where one tax ended up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// Tax as collected
    pub incoming: u64,
    /// Share credited to the claim session's operational reserve
    pub operational_income: u64,
    /// Tax after reserve-ratio rescaling
    pub routed: u64,
    /// Debt reserve increase, when that branch fired
    pub reserve_increase: Option<u64>,
    /// Yield supply after the allocation
    pub yield_supply_after: u64,
}

/// Route `incoming_tax` through the pipeline.
///
/// `operational_rate` is the caller's effective OPERATIONAL rate. A pool
/// reading zero on either side leaves the tax unscaled.
pub fn allocate_rates(
    incoming_tax: u64,
    operational_rate: Rate,
    flags: &FeatureFlags,
    pool: &dyn PoolReserves,
    targets: AllocationTargets<'_>,
) -> Result<AllocationOutcome> {
    let operational_income = operational_rate.apply(incoming_tax)?;

    let routed = if flags.reserve_minting {
        let (reserve0, reserve1) = pool.get_reserves()?;
        rescale_by_ratio(incoming_tax, reserve0, reserve1)?
    } else {
        incoming_tax
    };

    targets.claims.add_operational_income(operational_income)?;

    if flags.yield_pool {
        targets.yield_pool.add_tax(routed, operational_income)?;
    }

    let mut reserve_increase = None;
    if flags.debt_reserve {
        targets.treasury.increase_reserve(routed)?;
        reserve_increase = Some(routed);
    }

    Ok(AllocationOutcome {
        incoming: incoming_tax,
        operational_income,
        routed,
        reserve_increase,
        yield_supply_after: targets.yield_pool.yield_supply(),
    })
}
