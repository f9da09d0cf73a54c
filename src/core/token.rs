//! Ledger core.
//!
//! Per-account balances, the total and share supplies, and each account's
//! lifetime statement:
//! - Mint and burn primitives
//! - Untaxed balance moves (the taxed transfer algorithm lives in the engine)
//! - Supply and share conservation checks

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed token amount in raw units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from raw units
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Create from whole tokens
    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens * BASE_UNIT)
    }

    /// Raw units
    pub fn units(&self) -> u64 {
        self.0
    }

    /// Whole tokens (truncated)
    pub fn tokens(&self) -> u64 {
        self.0 / BASE_UNIT
    }

    /// Decimal string with every fractional digit
    pub fn to_string_formatted(&self) -> String {
        format!(
            "{}.{:0width$}",
            self.0 / BASE_UNIT,
            self.0 % BASE_UNIT,
            width = TOKEN_DECIMALS as usize
        )
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_formatted())
    }
}

impl From<u64> for TokenAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl From<TokenAmount> for u64 {
    fn from(amount: TokenAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifetime counters for an account.
///
/// Monotonic except `rebated`, which is consumed pro rata on unwrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statement {
    /// External asset deposited through wraps
    pub deposited: TokenAmount,
    /// Tokens minted by wraps
    pub wrapped: TokenAmount,
    /// Number of wraps
    pub wraps: u64,
    /// Gross yield withdrawn
    pub withdrawn: TokenAmount,
    /// Number of yield withdrawals
    pub withdrawals: u64,
    /// Tokens sent (before tax)
    pub transferred: TokenAmount,
    /// Number of transfers sent
    pub transfers: u64,
    /// Tokens received
    pub received: TokenAmount,
    /// Number of transfers received
    pub receipts: u64,
    /// Claim-session payouts
    pub claimed: TokenAmount,
    /// Number of claims
    pub claims: u64,
    /// Treasury debt issued to this account
    pub allocated: TokenAmount,
    /// Number of allocations
    pub allocations: u64,
    /// Tokens burned by treasury liquidation
    pub liquidated: TokenAmount,
    /// Number of liquidations
    pub liquidations: u64,
    /// Taxes paid into the pipeline
    pub paid: TokenAmount,
    /// Outstanding wrap rebates
    pub rebated: TokenAmount,
    /// Yield floor granted to this account
    pub guaranteed: TokenAmount,
}

/// Per-account ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    /// Tokens held
    pub balance: u64,
    /// Yield-eligible part of the balance (`shares <= balance`)
    pub shares: u64,
    /// Outstanding treasury-issued debt attributed to this account
    pub allocated_debt: u64,
    /// Accumulator value already settled against this account's shares
    pub yield_debt: u64,
    /// Lifetime counters
    pub statement: Statement,
}

/// Whether minted tokens earn yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Minted tokens join the share supply
    Eligible,
    /// Debt-only issuance, excluded from the share supply
    DebtOnly,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances and supply counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    accounts: HashMap<Address, Account>,
    token_supply: u64,
    share_supply: u64,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Sum of all balances
    pub fn total_supply(&self) -> TokenAmount {
        TokenAmount(self.token_supply)
    }

    /// Sum of all yield-eligible shares
    pub fn share_supply(&self) -> u64 {
        self.share_supply
    }

    /// Balance of an account
    pub fn balance_of(&self, owner: &Address) -> TokenAmount {
        TokenAmount(self.accounts.get(owner).map(|a| a.balance).unwrap_or(0))
    }

    /// Yield-eligible shares of an account
    pub fn shares_of(&self, owner: &Address) -> u64 {
        self.accounts.get(owner).map(|a| a.shares).unwrap_or(0)
    }

    /// Account entry (default entry for unknown accounts)
    pub fn account(&self, owner: &Address) -> Account {
        self.accounts.get(owner).copied().unwrap_or_default()
    }

    /// Statement of an account
    pub fn statement(&self, owner: &Address) -> Statement {
        self.account(owner).statement
    }

    /// Number of known accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of accounts with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.accounts.values().filter(|a| a.balance > 0).count()
    }

    /// Iterate all accounts
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mutable account entry, created on first touch
    pub fn account_mut(&mut self, owner: Address) -> &mut Account {
        self.accounts.entry(owner).or_default()
    }

    /// Mint `amount` to `to`. Zero amounts are a no-op.
    pub fn mint(&mut self, to: Address, amount: u64, mode: ShareMode) -> Result<()> {
        if to.is_zero() {
            return Err(Error::ZeroAddress);
        }
        if amount == 0 {
            return Ok(());
        }

        let new_supply = safe_add(self.token_supply, amount)?;
        let new_shares = match mode {
            ShareMode::Eligible => safe_add(self.share_supply, amount)?,
            ShareMode::DebtOnly => self.share_supply,
        };

        let account = self.accounts.entry(to).or_default();
        account.balance = safe_add(account.balance, amount)?;
        if mode == ShareMode::Eligible {
            account.shares += amount;
        }

        self.token_supply = new_supply;
        self.share_supply = new_shares;
        Ok(())
    }

    /// Burn `amount` from `from`, removing shares pro rata.
    ///
    /// Returns the number of shares removed.
    pub fn burn(&mut self, from: &Address, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Ok(0);
        }
        let account = self.account(from);
        if account.balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: account.balance,
            });
        }

        let shares_out = pro_rata(account.shares, amount, account.balance)?;
        let entry = self.account_mut(*from);
        entry.balance -= amount;
        entry.shares -= shares_out;

        self.token_supply = safe_sub(self.token_supply, amount)?;
        self.share_supply = safe_sub(self.share_supply, shares_out)?;
        Ok(shares_out)
    }

    /// Move `amount` from `from` to `to`, carrying shares pro rata.
    ///
    /// Returns the number of shares moved.
    pub fn move_balance(&mut self, from: &Address, to: &Address, amount: u64) -> Result<u64> {
        if to.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let sender = self.account(from);
        if sender.balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: sender.balance,
            });
        }
        if amount == 0 || from == to {
            return Ok(0);
        }

        let shares_moved = pro_rata(sender.shares, amount, sender.balance)?;
        let recipient = self.account(to);
        let new_to_balance = safe_add(recipient.balance, amount)?;

        let entry = self.account_mut(*from);
        entry.balance -= amount;
        entry.shares -= shares_moved;

        let entry = self.account_mut(*to);
        entry.balance = new_to_balance;
        entry.shares += shares_moved;
        Ok(shares_moved)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// total supply == sum of all balances
    pub fn verify_supply_invariant(&self) -> bool {
        let sum: u128 = self.accounts.values().map(|a| a.balance as u128).sum();
        sum == self.token_supply as u128
    }

    /// share supply == sum of all shares, and no account holds more shares than tokens
    pub fn verify_share_invariant(&self) -> bool {
        let sum: u128 = self.accounts.values().map(|a| a.shares as u128).sum();
        sum == self.share_supply as u128 && self.accounts.values().all(|a| a.shares <= a.balance)
    }

    /// SHA256 fingerprint of supply counters and sorted balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.token_supply.to_be_bytes());
        data.extend_from_slice(&self.share_supply.to_be_bytes());

        let mut sorted: Vec<_> = self.accounts.iter().collect();
        sorted.sort_by_key(|(k, _)| **k);

        for (address, account) in sorted {
            data.extend_from_slice(address.as_bytes());
            data.extend_from_slice(&account.balance.to_be_bytes());
            data.extend_from_slice(&account.shares.to_be_bytes());
        }

        Hash::sha256(&data)
    }
}
