//! Ledger engine - core orchestration.
//!
//! The engine owns the whole ledger state and is the only way to mutate it.
//! Every mutating entry point runs inside [`LedgerEngine::atomic`]: the
//! state and the event log length are captured first and restored if any
//! step fails, so a rejected operation leaves no trace. Calls into the
//! external asset are ordered last (or pre-validated) so they never need
//! undoing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::allocation::{allocate_rates, AllocationOutcome, AllocationTargets};
use crate::core::config::{Feature, FeatureFlags, LedgerConfig, LedgerParams};
use crate::core::rates::{Rate, RateRegistry, RateType};
use crate::core::token::{Account, Ledger, ShareMode, Statement, TokenAmount};
use crate::core::treasury::{Treasurer, TreasurerStatus, Treasury};
use crate::distribution::{select_yield_rate, Accrual, ClaimsBook, YieldPool, YieldRateInputs};
use crate::error::{Error, Result};
use crate::external::{
    AssetSource, LiquidityManager, PoolReserves, PositionId, RateOracle, TokenPair,
};
use crate::protocol::events::*;
use crate::protocol::operations::*;
use crate::protocol::roles::{Role, RoleTable};
use crate::utils::constants::MAX_EVENTS;
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything an operation can change, snapshotted as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Balances, shares and statements
    pub ledger: Ledger,
    /// System and account rates
    pub rates: RateRegistry,
    /// Yield accumulator
    pub yield_pool: YieldPool,
    /// Claim sessions
    pub claims: ClaimsBook,
    /// Debt reserve and treasurers
    pub treasury: Treasury,
    /// Behaviour switches
    pub flags: FeatureFlags,
    /// Tunable parameters
    pub params: LedgerParams,
    /// Role grants
    pub roles: RoleTable,
    /// owner -> spender -> allowance
    pub allowances: HashMap<Address, HashMap<Address, u64>>,
    /// Pair liquidity position, once minted
    pub pair_position: Option<PositionId>,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp (seconds)
    pub timestamp: u64,
}

impl LedgerState {
    /// Fresh state from a validated configuration
    pub fn new(config: LedgerConfig, admin: Address) -> Result<Self> {
        config.validate()?;
        if admin.is_zero() {
            return Err(Error::ZeroAddress);
        }

        let params = config.params;
        Ok(Self {
            ledger: Ledger::new(),
            rates: RateRegistry::new(config.system_rates, params.liquidity_rate_limit),
            yield_pool: YieldPool::new(params.yield_iteration, 0),
            claims: ClaimsBook::new(),
            treasury: Treasury::new(params.initial_debt_reserve.units()),
            flags: config.flags,
            roles: RoleTable::with_admin(admin),
            allowances: HashMap::new(),
            pair_position: None,
            block_height: 0,
            timestamp: 0,
            params,
        })
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledger engine - orchestrates all operations
pub struct LedgerEngine<A: AssetSource, P: PoolReserves> {
    state: LedgerState,
    asset: A,
    pool: P,
    oracle: Option<Box<dyn RateOracle>>,
    liquidity: Option<Box<dyn LiquidityManager>>,
    event_log: EventLog,
}

impl<A: AssetSource, P: PoolReserves> LedgerEngine<A, P> {
    /// Create an engine; `admin` receives every role
    pub fn new(config: LedgerConfig, admin: Address, asset: A, pool: P) -> Result<Self> {
        let state = LedgerState::new(config, admin)?;
        tracing::info!("ledger created with admin {}", admin.short());
        Ok(Self::from_state(state, asset, pool))
    }

    /// Resume from a saved state
    pub fn from_state(state: LedgerState, asset: A, pool: P) -> Self {
        Self {
            state,
            asset,
            pool,
            oracle: None,
            liquidity: None,
            event_log: EventLog::new(),
        }
    }

    /// Start the clock (and the first accrual window) at `timestamp`
    pub fn start_at(mut self, timestamp: u64) -> Self {
        self.state.timestamp = timestamp;
        self.state.yield_pool.advance(timestamp);
        self
    }

    /// Attach a rate oracle
    pub fn with_oracle(mut self, oracle: Box<dyn RateOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Attach a liquidity position manager
    pub fn with_liquidity_manager(mut self, manager: Box<dyn LiquidityManager>) -> Self {
        self.liquidity = Some(manager);
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new block; the clock never moves backwards
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if timestamp < self.state.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: format!("{} is before {}", timestamp, self.state.timestamp),
            });
        }
        self.state.block_height = height;
        self.state.timestamp = timestamp;
        self.event_log.retain_latest(MAX_EVENTS);
        Ok(())
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        self.event_log.drain()
    }

    /// Pending events
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Execute a ledger operation
    pub fn execute(&mut self, op: LedgerOperation) -> Result<OperationResult> {
        match op {
            LedgerOperation::Wrap {
                account,
                amount,
                referrer,
            } => self.wrap(account, amount, referrer).map(OperationResult::Wrap),
            LedgerOperation::Unwrap { account, amount } => {
                self.unwrap(account, amount).map(OperationResult::Unwrap)
            }
            LedgerOperation::Withdraw { account } => {
                self.withdraw(account).map(OperationResult::Withdraw)
            }
            LedgerOperation::Exit { account } => self
                .exit(account)
                .map(|(withdrawn, unwrapped)| OperationResult::Exit { withdrawn, unwrapped }),
            LedgerOperation::Transfer { from, to, amount } => {
                self.transfer(from, to, amount).map(OperationResult::Transfer)
            }
            LedgerOperation::Approve {
                owner,
                spender,
                amount,
            } => self
                .approve(owner, spender, amount)
                .map(|_| OperationResult::Approve),
            LedgerOperation::TransferFrom {
                spender,
                owner,
                to,
                amount,
            } => self
                .transfer_from(spender, owner, to, amount)
                .map(OperationResult::Transfer),
            LedgerOperation::Claim { account } => self.claim(account).map(OperationResult::Claim),
            LedgerOperation::Distribute { caller } => {
                self.distribute(caller).map(OperationResult::Distribute)
            }
            LedgerOperation::Allocate {
                treasurer,
                borrower,
                amount,
            } => self
                .allocate(treasurer, borrower, amount)
                .map(OperationResult::Allocate),
            LedgerOperation::Deallocate {
                treasurer,
                borrower,
                amount,
            } => self
                .deallocate(treasurer, borrower, amount)
                .map(|_| OperationResult::Deallocate),
            LedgerOperation::Liquidate {
                treasurer,
                borrower,
                amount,
            } => self
                .liquidate(treasurer, borrower, amount)
                .map(OperationResult::Liquidate),
            LedgerOperation::ResetClaimants { caller } => self
                .reset_claimants(caller)
                .map(OperationResult::ResetClaimants),
        }
    }

    /// Run `f` with all-or-nothing semantics
    fn atomic<T>(&mut self, operation: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.state.clone();
        let mark = self.event_log.len();

        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!("{} rolled back: {}", operation, e);
                self.state = snapshot;
                self.event_log.truncate(mark);
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WRAP / UNWRAP
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount` of the external asset for tokens.
    ///
    /// The claim entitlement goes to `referrer` when given.
    pub fn wrap(
        &mut self,
        account: Address,
        amount: u64,
        referrer: Option<Address>,
    ) -> Result<WrapReceipt> {
        self.atomic("wrap", |engine| {
            engine.state.flags.require(Feature::Wraps)?;
            require_nonzero(&account, amount)?;
            if referrer.is_some_and(|r| r.is_zero()) {
                return Err(Error::ZeroAddress);
            }
            engine.require_external_balance(&account, amount)?;

            let receipt = engine.wrap_ledger(account, amount, referrer)?;
            engine.distribute_inner(&account)?;
            engine.asset.transfer_from(&account, amount)?;
            Ok(receipt)
        })
    }

    /// Redeem `amount` tokens for the external asset
    pub fn unwrap(&mut self, account: Address, amount: u64) -> Result<UnwrapReceipt> {
        self.atomic("unwrap", |engine| {
            engine.state.flags.require(Feature::Unwraps)?;
            require_nonzero(&account, amount)?;
            engine.unwrap_inner(account, amount)
        })
    }

    /// Withdraw claimable yield (when enabled) then unwrap the whole balance
    pub fn exit(&mut self, account: Address) -> Result<(Option<WithdrawReceipt>, UnwrapReceipt)> {
        self.atomic("exit", |engine| {
            engine.state.flags.require(Feature::Unwraps)?;

            let withdrawn = if engine.state.flags.withdrawals && engine.withdrawable(&account)? > 0 {
                Some(engine.withdraw_inner(account)?)
            } else {
                None
            };

            let balance = engine.state.ledger.balance_of(&account).units();
            require_nonzero(&account, balance)?;
            let unwrapped = engine.unwrap_inner(account, balance)?;
            Ok((withdrawn, unwrapped))
        })
    }

    fn wrap_ledger(
        &mut self,
        account: Address,
        amount: u64,
        referrer: Option<Address>,
    ) -> Result<WrapReceipt> {
        let tax = self.rate(&account, RateType::Network)?.apply(amount)?;
        let rebate = self.rate(&account, RateType::Rebate)?.apply(tax)?;
        let routed = safe_sub(tax, rebate)?;
        let minted = safe_add(safe_sub(amount, tax)?, rebate)?;

        self.mint_tokens(account, minted, ShareMode::Eligible)?;
        self.route_tax(&account, routed)?;

        let statement = &mut self.state.ledger.account_mut(account).statement;
        credit(&mut statement.deposited, amount)?;
        credit(&mut statement.wrapped, minted)?;
        credit(&mut statement.rebated, rebate)?;
        credit(&mut statement.paid, routed)?;
        statement.wraps += 1;

        if self.state.flags.claims {
            self.state
                .claims
                .update_claims(referrer.unwrap_or(account), minted)?;
        }

        self.emit(|height, timestamp| {
            LedgerEvent::Wrap(WrapEvent {
                account,
                amount: amount.into(),
                minted: minted.into(),
                tax: tax.into(),
                rebate: rebate.into(),
                block_height: height,
                timestamp,
            })
        });
        tracing::debug!("wrap {} by {}: minted {}, tax {}", amount, account.short(), minted, tax);

        Ok(WrapReceipt {
            minted,
            tax,
            rebate,
        })
    }

    fn unwrap_inner(&mut self, account: Address, amount: u64) -> Result<UnwrapReceipt> {
        let before = self.state.ledger.account(&account);
        if before.balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: before.balance,
            });
        }

        let tax = self.rate(&account, RateType::Unwrap)?.apply(amount)?;
        let payout = safe_sub(amount, tax)?;
        let custody = self.asset.custody_balance();
        if custody < payout {
            return Err(Error::InsufficientReserves {
                required: payout,
                available: custody,
            });
        }

        let rebate_used = pro_rata(before.statement.rebated.units(), amount, before.balance)?;
        self.burn_tokens(&account, amount)?;
        let statement = &mut self.state.ledger.account_mut(account).statement;
        statement.rebated = statement.rebated.saturating_sub(rebate_used.into());

        self.route_tax(&account, tax)?;

        self.emit(|height, timestamp| {
            LedgerEvent::Unwrap(UnwrapEvent {
                account,
                amount: amount.into(),
                payout: payout.into(),
                tax: tax.into(),
                block_height: height,
                timestamp,
            })
        });
        tracing::debug!("unwrap {} by {}: payout {}", amount, account.short(), payout);

        self.asset.transfer_to(&account, payout)?;

        if self.state.flags.reconciliation {
            let custody = self.asset.custody_balance();
            let supply = self.state.ledger.total_supply();
            self.emit(|height, timestamp| {
                LedgerEvent::Reconciliation(ReconciliationEvent {
                    account,
                    custody: custody.into(),
                    token_supply: supply,
                    block_height: height,
                    timestamp,
                })
            });
        }

        Ok(UnwrapReceipt { payout, tax })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // YIELD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Withdraw claimable yield as tokens
    pub fn withdraw(&mut self, account: Address) -> Result<WithdrawReceipt> {
        self.atomic("withdraw", |engine| {
            engine.state.flags.require(Feature::Withdrawals)?;
            engine.withdraw_inner(account)
        })
    }

    /// Run the accrual tick if due; returns what accrued
    pub fn distribute(&mut self, caller: Address) -> Result<Option<Accrual>> {
        self.atomic("distribute", |engine| engine.distribute_inner(&caller))
    }

    fn withdraw_inner(&mut self, account: Address) -> Result<WithdrawReceipt> {
        let gross = self.withdrawable(&account)?;
        if gross == 0 {
            return Err(Error::ZeroAmount);
        }
        let tax = self.rate(&account, RateType::Withdrawal)?.apply(gross)?;
        let net = safe_sub(gross, tax)?;

        self.state.yield_pool.take(gross)?;
        {
            let pool = &self.state.yield_pool;
            pool.settle(self.state.ledger.account_mut(account), gross)?;
        }
        self.mint_tokens(account, net, ShareMode::Eligible)?;
        self.route_tax(&account, tax)?;

        let statement = &mut self.state.ledger.account_mut(account).statement;
        credit(&mut statement.withdrawn, gross)?;
        statement.withdrawals += 1;

        self.emit(|height, timestamp| {
            LedgerEvent::Withdrawal(WithdrawalEvent {
                account,
                gross: gross.into(),
                tax: tax.into(),
                net: net.into(),
                block_height: height,
                timestamp,
            })
        });
        tracing::debug!("withdraw by {}: gross {}, net {}", account.short(), gross, net);

        Ok(WithdrawReceipt { gross, tax, net })
    }

    fn distribute_inner(&mut self, caller: &Address) -> Result<Option<Accrual>> {
        let supply = self.state.ledger.total_supply().units();
        let now = self.state.timestamp;
        let Some(elapsed) = self.state.yield_pool.accrual_due(now, supply) else {
            return Ok(None);
        };

        let rate = self.yield_rate(caller)?;
        let accrual = self.state.yield_pool.accrued_over(elapsed, rate)?;

        if self.state.flags.yield_pool {
            self.state.yield_pool.add_accrual(accrual.amount)?;
        }
        if self.state.flags.debt_reserve && accrual.amount > 0 {
            self.state.treasury.increase_reserve(accrual.amount)?;
            self.emit_reserve_increase(*caller, accrual.amount);
        }

        self.state.yield_pool.advance(now);
        let shares = self.state.ledger.share_supply();
        self.state.yield_pool.fold(shares)?;

        let yield_per_share = self.state.yield_pool.yield_per_share();
        let account = *caller;
        self.emit(|height, timestamp| {
            LedgerEvent::Transact(TransactEvent {
                account,
                elapsed,
                accrued: accrual.amount.into(),
                yield_per_share,
                block_height: height,
                timestamp,
            })
        });
        tracing::debug!("accrued {} over {}s at {}", accrual.amount, elapsed, rate);

        Ok(Some(accrual))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSFERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transfer `amount` from `from` to `to`.
    ///
    /// The sender's claimable yield is withdrawn first so it is not diluted
    /// by the share movement. The transfer tax is burned from the sender.
    pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<TransferReceipt> {
        self.atomic("transfer", |engine| engine.transfer_inner(from, to, amount))
    }

    /// Set `spender`'s allowance over `owner`'s tokens
    pub fn approve(&mut self, owner: Address, spender: Address, amount: u64) -> Result<()> {
        if spender.is_zero() {
            return Err(Error::ZeroAddress);
        }
        self.state
            .allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);
        tracing::debug!("{} approved {} for {}", owner.short(), spender.short(), amount);
        Ok(())
    }

    /// Transfer on behalf of `owner`, spending `spender`'s allowance
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u64,
    ) -> Result<TransferReceipt> {
        self.atomic("transfer_from", |engine| {
            let allowance = engine.allowance(&owner, &spender);
            if allowance < amount {
                return Err(Error::InsufficientAllowance {
                    required: amount,
                    available: allowance,
                });
            }
            engine
                .state
                .allowances
                .entry(owner)
                .or_default()
                .insert(spender, allowance - amount);
            engine.transfer_inner(owner, to, amount)
        })
    }

    fn transfer_inner(&mut self, from: Address, to: Address, amount: u64) -> Result<TransferReceipt> {
        self.state.flags.require(Feature::Transfers)?;
        require_nonzero(&to, amount)?;

        let withdrawn = if self.withdrawable(&from)? > 0 {
            Some(self.withdraw_inner(from)?)
        } else {
            None
        };

        let balance = self.state.ledger.balance_of(&from).units();
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let tax = self.rate(&from, RateType::Transfer)?.apply(amount)?;
        let received = safe_sub(amount, tax)?;

        self.burn_tokens(&from, tax)?;
        self.route_tax(&from, tax)?;
        self.move_tokens(&from, &to, received)?;

        let sender = &mut self.state.ledger.account_mut(from).statement;
        credit(&mut sender.transferred, amount)?;
        sender.transfers += 1;
        let recipient = &mut self.state.ledger.account_mut(to).statement;
        credit(&mut recipient.received, received)?;
        recipient.receipts += 1;

        self.emit(|height, timestamp| {
            LedgerEvent::Transfer(TransferEvent {
                from,
                to,
                amount: amount.into(),
                tax: tax.into(),
                block_height: height,
                timestamp,
            })
        });
        tracing::debug!("transfer {} from {} to {}: tax {}", amount, from.short(), to.short(), tax);

        Ok(TransferReceipt {
            received,
            tax,
            withdrawn,
        })
    }

    /// Mint share-eligible tokens directly (minter role)
    pub fn mint_to(&mut self, caller: Address, to: Address, amount: u64) -> Result<()> {
        self.atomic("mint_to", |engine| {
            engine.state.roles.require(&caller, Role::Minter)?;
            engine.mint_tokens(to, amount, ShareMode::Eligible)?;
            tracing::debug!("minter {} minted {} to {}", caller.short(), amount, to.short());
            Ok(())
        })
    }

    /// Burn tokens directly (minter role)
    pub fn burn_from(&mut self, caller: Address, from: Address, amount: u64) -> Result<()> {
        self.atomic("burn_from", |engine| {
            engine.state.roles.require(&caller, Role::Minter)?;
            engine.burn_tokens(&from, amount)?;
            tracing::debug!("minter {} burned {} from {}", caller.short(), amount, from.short());
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLAIMS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Claim `account`'s share of the current session's operational reserve
    pub fn claim(&mut self, account: Address) -> Result<ClaimReceipt> {
        self.atomic("claim", |engine| {
            engine.state.flags.require(Feature::Claims)?;

            let settled = engine.state.claims.settle(&account)?;
            engine.mint_tokens(account, settled.share, ShareMode::Eligible)?;

            let statement = &mut engine.state.ledger.account_mut(account).statement;
            credit(&mut statement.claimed, settled.share)?;
            statement.claims += 1;

            engine.emit(|height, timestamp| {
                LedgerEvent::Claim(ClaimEvent {
                    account,
                    session: settled.session,
                    entitlement: settled.entitlement.into(),
                    amount: settled.share.into(),
                    block_height: height,
                    timestamp,
                })
            });
            tracing::debug!(
                "claim by {} in session {}: {}",
                account.short(),
                settled.session,
                settled.share
            );

            engine.distribute_inner(&account)?;
            Ok(ClaimReceipt {
                session: settled.session,
                amount: settled.share,
            })
        })
    }

    /// Open a new claim session. Unclaimed entitlements of the old session
    /// are forfeited.
    pub fn reset_claimants(&mut self, caller: Address) -> Result<u64> {
        self.atomic("reset_claimants", |engine| {
            engine.state.roles.require(&caller, Role::ClaimManager)?;
            let session = engine.state.claims.reset();
            engine.emit_config_changed(caller, "claim_session", session.to_string());
            tracing::info!("claim session reset to {} by {}", session, caller.short());
            Ok(session)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TREASURY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Issue debt-only tokens to `borrower` through `treasurer`
    pub fn allocate(
        &mut self,
        treasurer: Address,
        borrower: Address,
        amount: u64,
    ) -> Result<AllocationReceipt> {
        self.atomic("allocate", |engine| {
            engine.state.flags.require(Feature::Allocations)?;
            require_nonzero(&borrower, amount)?;
            engine.state.treasury.active_treasurer(&treasurer)?;

            let tax = engine.rate(&treasurer, RateType::Allocation)?.apply(amount)?;
            let issued = safe_sub(amount, tax)?;
            engine.route_tax(&treasurer, tax)?;

            engine.state.treasury.record_allocation(&treasurer, issued)?;
            engine.mint_tokens(borrower, issued, ShareMode::DebtOnly)?;

            let entry = engine.state.ledger.account_mut(borrower);
            entry.allocated_debt = safe_add(entry.allocated_debt, issued)?;
            credit(&mut entry.statement.allocated, issued)?;
            entry.statement.allocations += 1;

            if engine.state.flags.claims {
                engine.state.claims.update_claims(treasurer, issued)?;
            }

            engine.distribute_inner(&treasurer)?;

            engine.emit(|height, timestamp| {
                LedgerEvent::Allocation(AllocationEvent {
                    treasurer,
                    borrower,
                    amount: amount.into(),
                    tax: tax.into(),
                    issued: issued.into(),
                    block_height: height,
                    timestamp,
                })
            });
            tracing::debug!(
                "allocation of {} to {} by {}",
                issued,
                borrower.short(),
                treasurer.short()
            );

            Ok(AllocationReceipt { tax, issued })
        })
    }

    /// Repay `amount` of `borrower`'s debt by burning from the treasurer
    pub fn deallocate(&mut self, treasurer: Address, borrower: Address, amount: u64) -> Result<()> {
        self.atomic("deallocate", |engine| {
            engine.state.flags.require(Feature::Allocations)?;
            require_nonzero(&borrower, amount)?;
            engine.require_treasurer(&treasurer)?;

            let debt = engine.state.ledger.account(&borrower).allocated_debt;
            if amount > debt {
                return Err(Error::InsufficientBalance {
                    required: amount,
                    available: debt,
                });
            }

            engine.burn_tokens(&treasurer, amount)?;
            engine.state.ledger.account_mut(borrower).allocated_debt = debt - amount;
            engine.state.treasury.record_release(Some(&treasurer), amount)?;

            engine.emit(|height, timestamp| {
                LedgerEvent::Conversion(ConversionEvent {
                    treasurer,
                    borrower,
                    amount: amount.into(),
                    block_height: height,
                    timestamp,
                })
            });
            tracing::debug!("deallocation of {} for {}", amount, borrower.short());
            Ok(())
        })
    }

    /// Burn `amount` from `borrower`, wrapping any shortfall over their
    /// allocated debt from their external holdings first
    pub fn liquidate(
        &mut self,
        treasurer: Address,
        borrower: Address,
        amount: u64,
    ) -> Result<LiquidationReceipt> {
        self.atomic("liquidate", |engine| {
            engine.state.flags.require(Feature::Allocations)?;
            require_nonzero(&borrower, amount)?;
            engine.require_treasurer(&treasurer)?;

            let debt = engine.state.ledger.account(&borrower).allocated_debt;
            let wrapped = amount.saturating_sub(debt);
            if wrapped > 0 {
                engine.require_external_balance(&borrower, wrapped)?;
                engine.wrap_ledger(borrower, wrapped, None)?;
            }

            engine.burn_tokens(&borrower, amount)?;
            let debt_retired = amount.min(debt);
            let entry = engine.state.ledger.account_mut(borrower);
            entry.allocated_debt = debt - debt_retired;
            credit(&mut entry.statement.liquidated, amount)?;
            entry.statement.liquidations += 1;
            engine
                .state
                .treasury
                .record_release(Some(&treasurer), debt_retired)?;

            engine.emit(|height, timestamp| {
                LedgerEvent::Liquidation(LiquidationEvent {
                    treasurer,
                    borrower,
                    amount: amount.into(),
                    debt_retired: debt_retired.into(),
                    wrapped: wrapped.into(),
                    block_height: height,
                    timestamp,
                })
            });
            tracing::debug!(
                "liquidation of {} from {}: debt retired {}, wrapped {}",
                amount,
                borrower.short(),
                debt_retired,
                wrapped
            );

            if wrapped > 0 {
                engine.asset.transfer_from(&borrower, wrapped)?;
            }

            Ok(LiquidationReceipt {
                burned: amount,
                debt_retired,
                wrapped,
            })
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Grant a role (admin)
    pub fn grant_role(&mut self, caller: Address, account: Address, role: Role) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        if account.is_zero() {
            return Err(Error::ZeroAddress);
        }
        self.state.roles.grant(account, role);
        tracing::info!("{} granted {} to {}", caller.short(), role, account.short());
        Ok(())
    }

    /// Revoke a role (admin)
    pub fn revoke_role(&mut self, caller: Address, account: Address, role: Role) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.roles.revoke(&account, role);
        tracing::info!("{} revoked {} from {}", caller.short(), role, account.short());
        Ok(())
    }

    /// Toggle a feature (admin). Enabling one accrual branch disables the other.
    pub fn set_feature(&mut self, caller: Address, feature: Feature, enabled: bool) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.flags.set(feature, enabled);
        self.emit(|height, timestamp| {
            LedgerEvent::FeatureToggled(FeatureToggledEvent {
                account: caller,
                feature,
                enabled,
                block_height: height,
                timestamp,
            })
        });
        tracing::info!("feature {:?} set to {}", feature, enabled);
        Ok(())
    }

    /// Update a system rate (rate manager)
    pub fn set_system_rate(&mut self, caller: Address, rate_type: RateType, rate: Rate) -> Result<()> {
        self.state.roles.require(&caller, Role::RateManager)?;
        self.state.rates.set_system_rate(rate_type, rate)?;
        self.emit_config_changed(caller, &format!("rate.{:?}", rate_type), rate.to_string());
        tracing::info!("system {:?} rate set to {}", rate_type, rate);
        Ok(())
    }

    /// Set an account rate override (rate manager)
    pub fn set_account_rate(
        &mut self,
        caller: Address,
        account: Address,
        rate_type: RateType,
        rate: Rate,
    ) -> Result<()> {
        self.state.roles.require(&caller, Role::RateManager)?;
        self.state.rates.set_user_rate(account, rate_type, rate)?;
        self.emit_config_changed(
            caller,
            &format!("rate.{:?}.{}", rate_type, account.to_hex()),
            rate.to_string(),
        );
        tracing::info!("{:?} rate for {} set to {}", rate_type, account.short(), rate);
        Ok(())
    }

    /// Drop an account rate override (rate manager)
    pub fn clear_account_rate(
        &mut self,
        caller: Address,
        account: Address,
        rate_type: RateType,
    ) -> Result<()> {
        self.state.roles.require(&caller, Role::RateManager)?;
        self.state.rates.clear_user_rate(&account, rate_type);
        self.emit_config_changed(
            caller,
            &format!("rate.{:?}.{}", rate_type, account.to_hex()),
            "cleared".to_string(),
        );
        tracing::info!("{:?} rate for {} cleared", rate_type, account.short());
        Ok(())
    }

    /// Update the cap on the liquidity-derived rate (rate manager)
    pub fn set_liquidity_rate_limit(&mut self, caller: Address, limit: Rate) -> Result<()> {
        self.state.roles.require(&caller, Role::RateManager)?;
        require_rate(limit, "liquidity_rate_limit")?;
        self.state.rates.set_liquidity_rate_limit(limit);
        self.state.params.liquidity_rate_limit = limit;
        self.emit_config_changed(caller, "liquidity_rate_limit", limit.to_string());
        Ok(())
    }

    /// Update the accrual gate (admin)
    pub fn set_yield_iteration(&mut self, caller: Address, seconds: u64) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.yield_pool.set_yield_iteration(seconds);
        self.state.params.yield_iteration = seconds;
        self.emit_config_changed(caller, "yield_iteration", seconds.to_string());
        Ok(())
    }

    /// Update the minimum yield rate (admin)
    pub fn set_min_yield_rate(&mut self, caller: Address, rate: Rate) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        require_rate(rate, "min_yield_rate")?;
        self.state.params.min_yield_rate = rate;
        self.emit_config_changed(caller, "min_yield_rate", rate.to_string());
        Ok(())
    }

    /// Set the debt reserve (admin)
    pub fn set_debt_reserve(&mut self, caller: Address, amount: u64) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.treasury.set_debt_reserve(amount)?;
        self.emit_config_changed(caller, "debt_reserve", amount.to_string());
        Ok(())
    }

    /// Set an account's guaranteed yield floor (admin)
    pub fn set_guarantee(&mut self, caller: Address, account: Address, amount: u64) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.ledger.account_mut(account).statement.guaranteed = amount.into();
        self.emit_config_changed(
            caller,
            &format!("guarantee.{}", account.to_hex()),
            amount.to_string(),
        );
        tracing::info!("guarantee for {} set to {}", account.short(), amount);
        Ok(())
    }

    /// Register a treasurer or replace its limit (admin)
    pub fn add_treasurer(&mut self, caller: Address, treasurer: Address, limit: u64) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.treasury.register(treasurer, limit)?;
        tracing::info!("treasurer {} registered with limit {}", treasurer.short(), limit);
        Ok(())
    }

    /// Enable or disable a treasurer (admin)
    pub fn set_treasurer_status(
        &mut self,
        caller: Address,
        treasurer: Address,
        status: TreasurerStatus,
    ) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.state.treasury.set_status(&treasurer, status)?;
        tracing::info!("treasurer {} now {:?}", treasurer.short(), status);
        Ok(())
    }

    /// Change an existing treasurer's limit (admin)
    pub fn set_treasurer_limit(&mut self, caller: Address, treasurer: Address, limit: u64) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        self.require_treasurer(&treasurer)?;
        self.state.treasury.register(treasurer, limit)?;
        tracing::info!("treasurer {} limit set to {}", treasurer.short(), limit);
        Ok(())
    }

    /// Attach or detach the rate oracle (admin)
    pub fn set_rate_oracle(&mut self, caller: Address, oracle: Option<Box<dyn RateOracle>>) -> Result<()> {
        self.state.roles.require(&caller, Role::Admin)?;
        let attached = oracle.is_some();
        self.oracle = oracle;
        self.emit(|height, timestamp| {
            LedgerEvent::OracleUpdate(OracleUpdateEvent {
                account: caller,
                attached,
                block_height: height,
                timestamp,
            })
        });
        tracing::info!("rate oracle attached: {}", attached);
        Ok(())
    }

    /// Mint the pair liquidity position once (admin); later calls return
    /// the recorded position
    pub fn init_pair_liquidity(&mut self, caller: Address, amount: u64) -> Result<PositionId> {
        self.state.roles.require(&caller, Role::Admin)?;
        if self.state.flags.pair_liquidity {
            return self.state.pair_position.ok_or_else(|| Error::InvalidParameter {
                name: "pair_liquidity".into(),
                reason: "flag set without a recorded position".into(),
            });
        }

        let manager = self
            .liquidity
            .as_mut()
            .ok_or_else(|| Error::External("no liquidity manager attached".into()))?;
        let pair = TokenPair::new(
            self.state.params.source_asset.clone(),
            self.state.params.target_asset.clone(),
        );
        let position = manager.mint_liquidity_position(&pair, amount)?;

        self.state.pair_position = Some(position);
        self.state.flags.set(Feature::PairLiquidity, true);
        tracing::info!("pair liquidity initialised as position {}", position.0);
        Ok(position)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Balance of an account
    pub fn balance_of(&self, account: &Address) -> TokenAmount {
        self.state.ledger.balance_of(account)
    }

    /// Total token supply
    pub fn total_supply(&self) -> TokenAmount {
        self.state.ledger.total_supply()
    }

    /// Yield-eligible supply
    pub fn share_supply(&self) -> u64 {
        self.state.ledger.share_supply()
    }

    /// Account entry
    pub fn account(&self, account: &Address) -> Account {
        self.state.ledger.account(account)
    }

    /// Lifetime counters of an account
    pub fn statement(&self, account: &Address) -> Statement {
        self.state.ledger.statement(account)
    }

    /// Remaining allowance
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.state
            .allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Shaped claimable yield
    pub fn yield_of(&self, account: &Address) -> Result<u64> {
        let entry = self.state.ledger.account(account);
        self.state
            .yield_pool
            .yield_of(&entry, self.state.params.min_yield_rate)
    }

    /// Daily yield rate applying to `account`
    pub fn yield_rate(&self, account: &Address) -> Result<Rate> {
        if self.state.flags.rate_oracle {
            if let Some(oracle) = &self.oracle {
                return oracle.easing_rate(
                    account,
                    &self.state.params.source_asset,
                    &self.state.params.target_asset,
                );
            }
        }

        let statement = self.state.ledger.statement(account);
        let inputs = YieldRateInputs {
            standard: self.rate(account, RateType::Network)?,
            minimum: self.state.params.min_yield_rate,
            credit: self.rate(account, RateType::Credit)?,
        };
        select_yield_rate(&statement, &self.state.flags, inputs)
    }

    /// Effective rate of a type for an account
    pub fn rate(&self, account: &Address, rate_type: RateType) -> Result<Rate> {
        self.state
            .rates
            .effective_rate(account, rate_type, &self.state.flags, &self.pool)
    }

    /// Operational reserve `account` could claim now
    pub fn claimable(&self, account: &Address) -> Result<u64> {
        self.state.claims.claimable(account)
    }

    /// Claim sessions
    pub fn claims(&self) -> &ClaimsBook {
        &self.state.claims
    }

    /// Yield accumulator
    pub fn yield_pool(&self) -> &YieldPool {
        &self.state.yield_pool
    }

    /// Debt reserve and treasurers
    pub fn treasury(&self) -> &Treasury {
        &self.state.treasury
    }

    /// Treasurer record
    pub fn treasurer(&self, treasurer: &Address) -> Option<&Treasurer> {
        self.state.treasury.treasurer(treasurer)
    }

    /// Rate registry
    pub fn rates(&self) -> &RateRegistry {
        &self.state.rates
    }

    /// Current flags
    pub fn flags(&self) -> &FeatureFlags {
        &self.state.flags
    }

    /// Current parameters
    pub fn params(&self) -> &LedgerParams {
        &self.state.params
    }

    /// Role grants
    pub fn roles(&self) -> &RoleTable {
        &self.state.roles
    }

    /// Recorded pair liquidity position
    pub fn pair_position(&self) -> Option<PositionId> {
        self.state.pair_position
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.state.block_height
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    /// Full state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// External asset
    pub fn asset(&self) -> &A {
        &self.asset
    }

    /// External asset, mutably (funding test holders)
    pub fn asset_mut(&mut self) -> &mut A {
        &mut self.asset
    }

    /// Pool reserve reader, mutably
    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    /// SHA256 fingerprint of balances and supply counters
    pub fn state_hash(&self) -> Hash {
        self.state.ledger.state_hash()
    }

    /// Serialized state snapshot
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.state.to_bytes()
    }

    /// Check every cross-module invariant
    pub fn verify_invariants(&self) -> Result<()> {
        if !self.state.ledger.verify_supply_invariant() {
            return Err(Error::InvariantViolation(
                "token supply differs from sum of balances".into(),
            ));
        }
        if !self.state.ledger.verify_share_invariant() {
            return Err(Error::InvariantViolation(
                "share supply differs from sum of shares".into(),
            ));
        }
        if !self.state.treasury.verify_invariant() {
            return Err(Error::InvariantViolation(format!(
                "debt supply {} above reserve {}",
                self.state.treasury.debt_supply(),
                self.state.treasury.debt_reserve()
            )));
        }
        let session = self.state.claims.session();
        if !self.state.claims.verify_session(session) {
            return Err(Error::InvariantViolation(
                "claim supply differs from sum of entitlements".into(),
            ));
        }
        self.state.flags.validate()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Shaped yield capped by what the pool holds
    fn withdrawable(&self, account: &Address) -> Result<u64> {
        Ok(self.yield_of(account)?.min(self.state.yield_pool.yield_supply()))
    }

    fn pending_of(&self, account: &Address) -> Result<u64> {
        self.state
            .yield_pool
            .pending_yield(&self.state.ledger.account(account))
    }

    fn rebase(&mut self, account: Address, pending: u64) -> Result<()> {
        let pool = &self.state.yield_pool;
        pool.rebase(self.state.ledger.account_mut(account), pending)
    }

    fn mint_tokens(&mut self, to: Address, amount: u64, mode: ShareMode) -> Result<()> {
        let pending = self.pending_of(&to)?;
        self.state.ledger.mint(to, amount, mode)?;
        self.rebase(to, pending)
    }

    fn burn_tokens(&mut self, from: &Address, amount: u64) -> Result<()> {
        let pending = self.pending_of(from)?;
        self.state.ledger.burn(from, amount)?;
        self.rebase(*from, pending)
    }

    fn move_tokens(&mut self, from: &Address, to: &Address, amount: u64) -> Result<()> {
        let pending_from = self.pending_of(from)?;
        let pending_to = self.pending_of(to)?;
        self.state.ledger.move_balance(from, to, amount)?;
        self.rebase(*from, pending_from)?;
        self.rebase(*to, pending_to)
    }

    fn route_tax(&mut self, caller: &Address, tax: u64) -> Result<AllocationOutcome> {
        if tax == 0 {
            return Ok(AllocationOutcome::default());
        }
        let operational = self.rate(caller, RateType::Operational)?;
        let outcome = allocate_rates(
            tax,
            operational,
            &self.state.flags,
            &self.pool,
            AllocationTargets {
                claims: &mut self.state.claims,
                yield_pool: &mut self.state.yield_pool,
                treasury: &mut self.state.treasury,
            },
        )?;
        if let Some(increase) = outcome.reserve_increase {
            self.emit_reserve_increase(*caller, increase);
        }
        Ok(outcome)
    }

    fn require_treasurer(&self, treasurer: &Address) -> Result<()> {
        self.state
            .treasury
            .treasurer(treasurer)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownTreasurer(treasurer.to_hex()))
    }

    fn require_external_balance(&self, holder: &Address, amount: u64) -> Result<()> {
        let available = self.asset.balance_of(holder);
        if available < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    fn emit(&mut self, build: impl FnOnce(u64, u64) -> LedgerEvent) {
        let event = build(self.state.block_height, self.state.timestamp);
        self.event_log.push(event);
    }

    fn emit_reserve_increase(&mut self, account: Address, amount: u64) {
        let debt_reserve = self.state.treasury.debt_reserve();
        self.emit(|height, timestamp| {
            LedgerEvent::ReserveIncrease(ReserveIncreaseEvent {
                account,
                amount: amount.into(),
                debt_reserve: debt_reserve.into(),
                block_height: height,
                timestamp,
            })
        });
    }

    fn emit_config_changed(&mut self, account: Address, parameter: &str, value: String) {
        let parameter = parameter.to_string();
        self.emit(|height, timestamp| {
            LedgerEvent::ConfigChanged(ConfigChangedEvent {
                account,
                parameter,
                value,
                block_height: height,
                timestamp,
            })
        });
    }
}

fn require_nonzero(target: &Address, amount: u64) -> Result<()> {
    if target.is_zero() {
        return Err(Error::ZeroAddress);
    }
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

fn require_rate(rate: Rate, name: &str) -> Result<()> {
    if rate > Rate::FULL {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} exceeds 100%", rate),
        });
    }
    Ok(())
}

fn credit(counter: &mut TokenAmount, amount: u64) -> Result<()> {
    *counter = TokenAmount::from_units(safe_add(counter.units(), amount)?);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
