//! Ledger events for state change notifications.
//!
//! Every committed operation appends one or more events to the engine's
//! [`EventLog`]. Each event carries the acting account, the amounts
//! involved, and the block height and timestamp it was emitted at.

use serde::{Deserialize, Serialize};

use crate::core::config::Feature;
use crate::core::token::TokenAmount;
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All ledger event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // Token Events
    /// External asset wrapped into tokens
    Wrap(WrapEvent),
    /// Tokens redeemed for the external asset
    Unwrap(UnwrapEvent),
    /// Tokens moved between holders
    Transfer(TransferEvent),
    /// Accrued yield withdrawn
    Withdrawal(WithdrawalEvent),

    // Distribution Events
    /// Operational reserve claimed
    Claim(ClaimEvent),
    /// Periodic accrual ran
    Transact(TransactEvent),
    /// Debt reserve grew
    ReserveIncrease(ReserveIncreaseEvent),
    /// Custody and supply after a payout
    Reconciliation(ReconciliationEvent),

    // Treasury Events
    /// Debt issued to a borrower
    Allocation(AllocationEvent),
    /// Debt repaid and burned
    Conversion(ConversionEvent),
    /// Debt forcibly retired
    Liquidation(LiquidationEvent),

    // Admin Events
    /// Rate oracle attached or detached
    OracleUpdate(OracleUpdateEvent),
    /// Feature flag toggled
    FeatureToggled(FeatureToggledEvent),
    /// Parameter changed
    ConfigChanged(ConfigChangedEvent),
}

impl LedgerEvent {
    /// Get event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Wrap(_) => "Wrap",
            Self::Unwrap(_) => "Unwrap",
            Self::Transfer(_) => "Transfer",
            Self::Withdrawal(_) => "Withdrawal",
            Self::Claim(_) => "Claim",
            Self::Transact(_) => "Transact",
            Self::ReserveIncrease(_) => "ReserveIncrease",
            Self::Reconciliation(_) => "Reconciliation",
            Self::Allocation(_) => "Allocation",
            Self::Conversion(_) => "Conversion",
            Self::Liquidation(_) => "Liquidation",
            Self::OracleUpdate(_) => "OracleUpdate",
            Self::FeatureToggled(_) => "FeatureToggled",
            Self::ConfigChanged(_) => "ConfigChanged",
        }
    }

    /// Account that triggered the event
    pub fn account(&self) -> Address {
        match self {
            Self::Wrap(e) => e.account,
            Self::Unwrap(e) => e.account,
            Self::Transfer(e) => e.from,
            Self::Withdrawal(e) => e.account,
            Self::Claim(e) => e.account,
            Self::Transact(e) => e.account,
            Self::ReserveIncrease(e) => e.account,
            Self::Reconciliation(e) => e.account,
            Self::Allocation(e) => e.treasurer,
            Self::Conversion(e) => e.treasurer,
            Self::Liquidation(e) => e.treasurer,
            Self::OracleUpdate(e) => e.account,
            Self::FeatureToggled(e) => e.account,
            Self::ConfigChanged(e) => e.account,
        }
    }

    /// Get event timestamp
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Wrap(e) => e.timestamp,
            Self::Unwrap(e) => e.timestamp,
            Self::Transfer(e) => e.timestamp,
            Self::Withdrawal(e) => e.timestamp,
            Self::Claim(e) => e.timestamp,
            Self::Transact(e) => e.timestamp,
            Self::ReserveIncrease(e) => e.timestamp,
            Self::Reconciliation(e) => e.timestamp,
            Self::Allocation(e) => e.timestamp,
            Self::Conversion(e) => e.timestamp,
            Self::Liquidation(e) => e.timestamp,
            Self::OracleUpdate(e) => e.timestamp,
            Self::FeatureToggled(e) => e.timestamp,
            Self::ConfigChanged(e) => e.timestamp,
        }
    }

    /// Get event block height
    pub fn block_height(&self) -> u64 {
        match self {
            Self::Wrap(e) => e.block_height,
            Self::Unwrap(e) => e.block_height,
            Self::Transfer(e) => e.block_height,
            Self::Withdrawal(e) => e.block_height,
            Self::Claim(e) => e.block_height,
            Self::Transact(e) => e.block_height,
            Self::ReserveIncrease(e) => e.block_height,
            Self::Reconciliation(e) => e.block_height,
            Self::Allocation(e) => e.block_height,
            Self::Conversion(e) => e.block_height,
            Self::Liquidation(e) => e.block_height,
            Self::OracleUpdate(e) => e.block_height,
            Self::FeatureToggled(e) => e.block_height,
            Self::ConfigChanged(e) => e.block_height,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when the external asset is wrapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapEvent {
    /// Depositor
    pub account: Address,
    /// Amount pulled from the external asset
    pub amount: TokenAmount,
    /// Tokens minted
    pub minted: TokenAmount,
    /// Network tax charged
    pub tax: TokenAmount,
    /// Part of the tax returned to the depositor
    pub rebate: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when tokens are unwrapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrapEvent {
    /// Redeemer
    pub account: Address,
    /// Tokens burned
    pub amount: TokenAmount,
    /// External asset paid out
    pub payout: TokenAmount,
    /// Unwrap tax charged
    pub tax: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted on a token transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Amount debited from the sender
    pub amount: TokenAmount,
    /// Transfer tax charged
    pub tax: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when accrued yield is withdrawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    /// Holder
    pub account: Address,
    /// Yield taken from the pool
    pub gross: TokenAmount,
    /// Withdrawal tax charged
    pub tax: TokenAmount,
    /// Tokens minted to the holder
    pub net: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISTRIBUTION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when an operational reserve share is claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    /// Claimant
    pub account: Address,
    /// Session paid from
    pub session: u64,
    /// Entitlement consumed
    pub entitlement: TokenAmount,
    /// Tokens minted
    pub amount: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when an accrual tick runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactEvent {
    /// Account whose call triggered the tick
    pub account: Address,
    /// Seconds covered
    pub elapsed: u64,
    /// Value accrued
    pub accrued: TokenAmount,
    /// Accumulator after the tick
    pub yield_per_share: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the debt reserve grows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveIncreaseEvent {
    /// Account whose call funded the increase
    pub account: Address,
    /// Increase
    pub amount: TokenAmount,
    /// Reserve afterwards
    pub debt_reserve: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted after an unwrap payout when reconciliation is on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEvent {
    /// Account that was paid
    pub account: Address,
    /// External asset left in custody
    pub custody: TokenAmount,
    /// Token supply afterwards
    pub token_supply: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a treasurer issues debt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEvent {
    /// Issuing treasurer
    pub treasurer: Address,
    /// Receiving borrower
    pub borrower: Address,
    /// Requested amount
    pub amount: TokenAmount,
    /// Allocation tax charged
    pub tax: TokenAmount,
    /// Debt minted to the borrower
    pub issued: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when debt is repaid (deallocation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionEvent {
    /// Treasurer burning the tokens
    pub treasurer: Address,
    /// Borrower whose debt fell
    pub borrower: Address,
    /// Amount retired
    pub amount: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a borrower's debt is liquidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    /// Treasurer performing the liquidation
    pub treasurer: Address,
    /// Borrower liquidated
    pub borrower: Address,
    /// Tokens burned from the borrower
    pub amount: TokenAmount,
    /// Debt retired
    pub debt_retired: TokenAmount,
    /// Shortfall wrapped from the borrower's external holdings
    pub wrapped: TokenAmount,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when the rate oracle changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleUpdateEvent {
    /// Admin
    pub account: Address,
    /// Whether an oracle is now attached
    pub attached: bool,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a feature flag changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggledEvent {
    /// Admin
    pub account: Address,
    /// Feature toggled
    pub feature: Feature,
    /// New state
    pub enabled: bool,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a parameter changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangedEvent {
    /// Admin
    pub account: Address,
    /// Parameter name
    pub parameter: String,
    /// New value, rendered
    pub value: String,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Event log for tracking events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&LedgerEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events triggered by an account
    pub fn filter_by_account(&self, account: &Address) -> Vec<&LedgerEvent> {
        self.events
            .iter()
            .filter(|e| e.account() == *account)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop events past `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Keep only the newest `max` events
    pub fn retain_latest(&mut self, max: usize) {
        if self.events.len() > max {
            let excess = self.events.len() - max;
            self.events.drain(..excess);
        }
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Chained digest of every event in order
    pub fn digest(&self) -> Hash {
        let mut acc = Hash::zero();
        for event in &self.events {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(acc.as_bytes());
            data.extend_from_slice(event.hash().as_bytes());
            acc = Hash::sha256(&data);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wrap(block_height: u64) -> LedgerEvent {
        LedgerEvent::Wrap(WrapEvent {
            account: Address::repeat(0x0a),
            amount: TokenAmount::from_tokens(10),
            minted: TokenAmount::from_tokens(9),
            tax: TokenAmount::from_tokens(1),
            rebate: TokenAmount::ZERO,
            block_height,
            timestamp: 1_700_000_000,
        })
    }

    #[test]
    fn test_event_accessors() {
        let event = sample_wrap(7);
        assert_eq!(event.event_type(), "Wrap");
        assert_eq!(event.block_height(), 7);
        assert_eq!(event.timestamp(), 1_700_000_000);
        assert_eq!(event.account(), Address::repeat(0x0a));
    }

    #[test]
    fn test_event_hash_differs() {
        assert_ne!(sample_wrap(1).hash(), sample_wrap(2).hash());
        assert_eq!(sample_wrap(1).hash(), sample_wrap(1).hash());
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.digest(), Hash::zero());

        log.push(sample_wrap(1));
        log.push(LedgerEvent::OracleUpdate(OracleUpdateEvent {
            account: Address::repeat(0x01),
            attached: true,
            block_height: 1,
            timestamp: 0,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("Wrap").len(), 1);
        assert_eq!(log.filter_by_account(&Address::repeat(0x0a)).len(), 1);

        let digest = log.digest();
        log.retain_latest(2);
        assert_eq!(log.digest(), digest);
        log.truncate(1);
        assert_ne!(log.digest(), digest);

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
    }
}
