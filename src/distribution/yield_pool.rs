//! Yield distribution engine.
//!
//! Taxes and time-based accrual flow into `yield_supply` (the value backing
//! payouts) and `yield_return` (the amount spread over shares). Returns are
//! folded into a per-share accumulator scaled by [`MAGNITUDE`], so any
//! account's claim is `shares * yield_per_share / MAGNITUDE` minus what it
//! has already settled, without iterating accounts.

use serde::{Deserialize, Serialize};

use crate::core::config::FeatureFlags;
use crate::core::rates::Rate;
use crate::core::token::{Account, Statement};
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD RATE SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Inputs for choosing an account's daily yield rate
#[derive(Debug, Clone, Copy)]
pub struct YieldRateInputs {
    /// Standard rate (the account's network rate)
    pub standard: Rate,
    /// Rate once the allotment is used up
    pub minimum: Rate,
    /// Account's credit rate, used when credit guarantees are on
    pub credit: Rate,
}

/// Choose between the standard and the minimum rate.
///
/// The allotment is the credit rate times lifetime deposits when credit
/// guarantees are on, otherwise the account's `guaranteed` counter. Once
/// lifetime withdrawals reach the allotment the minimum rate applies.
pub fn select_yield_rate(
    statement: &Statement,
    flags: &FeatureFlags,
    inputs: YieldRateInputs,
) -> Result<Rate> {
    let allotment = if flags.credit_guarantees {
        inputs.credit.apply(statement.deposited.units())?
    } else {
        statement.guaranteed.units()
    };

    if statement.withdrawn.units() >= allotment {
        Ok(inputs.minimum)
    } else {
        Ok(inputs.standard)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one accrual tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// Seconds since the previous tick
    pub elapsed: u64,
    /// Value accrued over the interval
    pub amount: u64,
}

/// Accrued yield and the per-share accumulator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YieldPool {
    yield_supply: u64,
    yield_return: u64,
    /// Part of `yield_return` already folded into the accumulator
    folded_return: u64,
    yield_per_share: u128,
    yield_timestamp: u64,
    yield_iteration: u64,
}

impl YieldPool {
    /// Create an empty pool whose first accrual window opens at `genesis`
    pub fn new(yield_iteration: u64, genesis: u64) -> Self {
        Self {
            yield_iteration,
            yield_timestamp: genesis,
            ..Default::default()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Value awaiting distribution
    pub fn yield_supply(&self) -> u64 {
        self.yield_supply
    }

    /// Return spread (or to be spread) over shares
    pub fn yield_return(&self) -> u64 {
        self.yield_return
    }

    /// Accumulator, scaled by `MAGNITUDE`
    pub fn yield_per_share(&self) -> u128 {
        self.yield_per_share
    }

    /// Time of the last accrual
    pub fn yield_timestamp(&self) -> u64 {
        self.yield_timestamp
    }

    /// Minimum seconds between accruals
    pub fn yield_iteration(&self) -> u64 {
        self.yield_iteration
    }

    /// Update the accrual gate
    pub fn set_yield_iteration(&mut self, seconds: u64) {
        self.yield_iteration = seconds;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INFLOWS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a routed tax: the tax backs payouts, the operational income
    /// is what gets spread over shares
    pub fn add_tax(&mut self, tax: u64, operational_income: u64) -> Result<()> {
        self.yield_supply = safe_add(self.yield_supply, tax)?;
        self.yield_return = safe_add(self.yield_return, operational_income)?;
        Ok(())
    }

    /// Record accrued yield on both sides
    pub fn add_accrual(&mut self, amount: u64) -> Result<()> {
        self.yield_supply = safe_add(self.yield_supply, amount)?;
        self.yield_return = safe_add(self.yield_return, amount)?;
        Ok(())
    }

    /// Remove a payout from the backing supply
    pub fn take(&mut self, amount: u64) -> Result<()> {
        self.yield_supply = safe_sub(self.yield_supply, amount)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCRUAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Elapsed seconds if an accrual may run at `now`
    pub fn accrual_due(&self, now: u64, token_supply: u64) -> Option<u64> {
        let elapsed = now.saturating_sub(self.yield_timestamp);
        if elapsed > self.yield_iteration && token_supply > 0 {
            Some(elapsed)
        } else {
            None
        }
    }

    /// Value accrued over `elapsed` seconds at a daily `rate`.
    ///
    /// The per-second excess is floored before scaling by time.
    pub fn accrued_over(&self, elapsed: u64, rate: Rate) -> Result<Accrual> {
        let excess = rate.apply(self.yield_supply)? / SECONDS_PER_DAY;
        let amount = safe_mul(excess, elapsed)?;
        Ok(Accrual { elapsed, amount })
    }

    /// Close the accrual window at `now`
    pub fn advance(&mut self, now: u64) {
        self.yield_timestamp = now;
    }

    /// Fold unspread return into the accumulator.
    ///
    /// With no shares outstanding the accumulator is left unchanged and the
    /// return waits for the next fold. Division dust also waits, so the
    /// accumulator only ever grows.
    pub fn fold(&mut self, share_supply: u64) -> Result<()> {
        let pending = safe_sub(self.yield_return, self.folded_return)?;
        let Some(increment) = per_share_increment(pending, share_supply) else {
            return Ok(());
        };
        if increment == 0 {
            return Ok(());
        }

        let consumed = value_of_shares(increment, share_supply)?;
        self.yield_per_share =
            self.yield_per_share
                .checked_add(increment)
                .ok_or_else(|| Error::Overflow {
                    operation: "yield_per_share".into(),
                })?;
        self.folded_return = safe_add(self.folded_return, consumed)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PER-ACCOUNT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Accumulated value of `shares`
    pub fn raw_yield(&self, shares: u64) -> Result<u64> {
        value_of_shares(self.yield_per_share, shares)
    }

    /// Unshaped yield not yet settled by `account`
    pub fn pending_yield(&self, account: &Account) -> Result<u64> {
        let raw = self.raw_yield(account.shares)?;
        if raw <= account.yield_debt {
            return Ok(0);
        }
        Ok(raw - account.yield_debt)
    }

    /// Claimable yield after credit-limit shaping.
    ///
    /// Above the account's guaranteed floor only the minimum rate of the
    /// excess is paid.
    pub fn yield_of(&self, account: &Account, min_yield_rate: Rate) -> Result<u64> {
        let net = self.pending_yield(account)?;
        let floor = account.statement.guaranteed.units();
        if net <= floor {
            return Ok(net);
        }
        let shaped_excess = min_yield_rate.apply(net - floor)?;
        safe_add(floor, shaped_excess)
    }

    /// Re-anchor `account` after its shares changed so that
    /// `pending_before` stays claimable and nothing earlier is
    pub fn rebase(&self, account: &mut Account, pending_before: u64) -> Result<()> {
        let raw = self.raw_yield(account.shares)?;
        account.yield_debt = raw.saturating_sub(pending_before);
        Ok(())
    }

    /// Settle `paid` out of the account's pending yield.
    ///
    /// Whatever shaping held back stays pending and is shaped again on the
    /// next withdrawal.
    pub fn settle(&self, account: &mut Account, paid: u64) -> Result<()> {
        let pending = self.pending_yield(account)?;
        self.rebase(account, safe_sub(pending, paid)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::TokenAmount;

    fn account_with_shares(shares: u64) -> Account {
        Account {
            balance: shares,
            shares,
            ..Default::default()
        }
    }

    #[test]
    fn test_accrual_gate() {
        let pool = YieldPool::new(3600, 1_000);
        assert_eq!(pool.accrual_due(4_600, 10), None); // exactly one iteration
        assert_eq!(pool.accrual_due(4_601, 10), Some(3_601));
        assert_eq!(pool.accrual_due(10_000, 0), None); // no supply
        assert_eq!(pool.accrual_due(500, 10), None); // clock behind
    }

    #[test]
    fn test_accrued_over_one_day() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_tax(864_000_000, 0).unwrap();

        // 1% per day of 864_000_000 is 8_640_000, or 100 per second
        let accrual = pool.accrued_over(SECONDS_PER_DAY, Rate::from_percent(1)).unwrap();
        assert_eq!(accrual.amount, 8_640_000);
    }

    #[test]
    fn test_fold_spreads_return() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_tax(1_000, 300).unwrap();
        pool.fold(1_000).unwrap();

        let holder = account_with_shares(250);
        assert_eq!(pool.pending_yield(&holder).unwrap(), 75);
    }

    #[test]
    fn test_fold_without_shares_keeps_accumulator() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_accrual(500).unwrap();
        pool.fold(0).unwrap();
        assert_eq!(pool.yield_per_share(), 0);

        // Return waits and is spread once shares exist
        pool.fold(100).unwrap();
        assert_eq!(pool.raw_yield(100).unwrap(), 500);
    }

    #[test]
    fn test_fold_is_monotonic_across_supply_changes() {
        let mut pool = YieldPool::new(0, 0);
        let mut last = 0;
        for (ret, shares) in [(10, 100), (0, 5_000), (7, 3), (1_000, 1_000_000), (3, 1)] {
            pool.add_accrual(ret).unwrap();
            pool.fold(shares).unwrap();
            assert!(pool.yield_per_share() >= last);
            last = pool.yield_per_share();
        }
    }

    #[test]
    fn test_rebase_preserves_pending() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_accrual(100).unwrap();
        pool.fold(100).unwrap();

        let mut holder = account_with_shares(100);
        let pending = pool.pending_yield(&holder).unwrap();
        assert_eq!(pending, 100);

        // Holder doubles their shares; new shares must not see old yield
        holder.shares = 200;
        holder.balance = 200;
        pool.rebase(&mut holder, pending).unwrap();
        assert_eq!(pool.pending_yield(&holder).unwrap(), 100);

        pool.settle(&mut holder, 100).unwrap();
        assert_eq!(pool.pending_yield(&holder).unwrap(), 0);
    }

    #[test]
    fn test_settle_keeps_shaped_remainder() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_accrual(1_000).unwrap();
        pool.fold(1_000).unwrap();

        let mut holder = account_with_shares(1_000);
        let paid = pool.yield_of(&holder, Rate::from_percent(10)).unwrap();
        assert_eq!(paid, 100);

        pool.settle(&mut holder, paid).unwrap();
        assert_eq!(pool.pending_yield(&holder).unwrap(), 900);
        assert_eq!(pool.yield_of(&holder, Rate::from_percent(10)).unwrap(), 90);

        // Paying more than is pending is rejected
        assert!(pool.settle(&mut holder, 901).is_err());
    }

    #[test]
    fn test_yield_of_shaping_above_floor() {
        let mut pool = YieldPool::new(0, 0);
        pool.add_accrual(1_000).unwrap();
        pool.fold(1_000).unwrap();

        let mut holder = account_with_shares(1_000);
        holder.statement.guaranteed = TokenAmount::from_units(400);

        // 400 floor + 10% of the 600 excess
        let shaped = pool.yield_of(&holder, Rate::from_percent(10)).unwrap();
        assert_eq!(shaped, 460);

        holder.statement.guaranteed = TokenAmount::from_units(2_000);
        assert_eq!(pool.yield_of(&holder, Rate::from_percent(10)).unwrap(), 1_000);
    }

    #[test]
    fn test_select_yield_rate() {
        let inputs = YieldRateInputs {
            standard: Rate::from_percent(2),
            minimum: Rate::from_bps(10),
            credit: Rate::from_percent(5),
        };
        let mut flags = FeatureFlags::default();
        let mut statement = Statement {
            guaranteed: TokenAmount::from_units(50),
            withdrawn: TokenAmount::from_units(10),
            ..Default::default()
        };

        assert_eq!(select_yield_rate(&statement, &flags, inputs).unwrap(), inputs.standard);

        statement.withdrawn = TokenAmount::from_units(50);
        assert_eq!(select_yield_rate(&statement, &flags, inputs).unwrap(), inputs.minimum);

        // Credit mode: allotment is 5% of 10_000 deposited
        flags.credit_guarantees = true;
        statement.deposited = TokenAmount::from_units(10_000);
        assert_eq!(select_yield_rate(&statement, &flags, inputs).unwrap(), inputs.standard);
        statement.withdrawn = TokenAmount::from_units(500);
        assert_eq!(select_yield_rate(&statement, &flags, inputs).unwrap(), inputs.minimum);
    }
}
