//! Ledger operations and their receipts.
//!
//! Operations are plain data so they can be scripted, logged and replayed.
//! [`crate::protocol::LedgerEngine::execute`] dispatches them to the
//! matching engine method.

use serde::{Deserialize, Serialize};

use crate::distribution::Accrual;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All user-facing ledger operations. Amounts are raw units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOperation {
    /// Deposit the external asset for tokens
    Wrap {
        /// Depositor
        account: Address,
        /// Amount of external asset
        amount: u64,
        /// Account credited with the claim entitlement instead of the depositor
        #[serde(default)]
        referrer: Option<Address>,
    },
    /// Redeem tokens for the external asset
    Unwrap {
        /// Redeemer
        account: Address,
        /// Tokens to burn
        amount: u64,
    },
    /// Withdraw accrued yield
    Withdraw {
        /// Holder
        account: Address,
    },
    /// Withdraw yield then unwrap the whole balance
    Exit {
        /// Holder
        account: Address,
    },
    /// Move tokens
    Transfer {
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Amount debited
        amount: u64,
    },
    /// Set a spending allowance
    Approve {
        /// Token owner
        owner: Address,
        /// Approved spender
        spender: Address,
        /// Allowance
        amount: u64,
    },
    /// Move tokens on an owner's behalf
    TransferFrom {
        /// Spender using the allowance
        spender: Address,
        /// Token owner
        owner: Address,
        /// Recipient
        to: Address,
        /// Amount debited
        amount: u64,
    },
    /// Claim the operational reserve share
    Claim {
        /// Claimant
        account: Address,
    },
    /// Run the accrual tick if due
    Distribute {
        /// Account whose yield rate drives the tick
        caller: Address,
    },
    /// Issue debt to a borrower
    Allocate {
        /// Issuing treasurer
        treasurer: Address,
        /// Receiving borrower
        borrower: Address,
        /// Requested amount
        amount: u64,
    },
    /// Repay a borrower's debt from the treasurer's balance
    Deallocate {
        /// Treasurer burning tokens
        treasurer: Address,
        /// Borrower whose debt falls
        borrower: Address,
        /// Amount
        amount: u64,
    },
    /// Retire a borrower's debt from their own balance
    Liquidate {
        /// Treasurer performing the liquidation
        treasurer: Address,
        /// Borrower
        borrower: Address,
        /// Amount to burn
        amount: u64,
    },
    /// Open a new claim session
    ResetClaimants {
        /// Claim manager
        caller: Address,
    },
}

impl LedgerOperation {
    /// Get operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Wrap { .. } => "wrap",
            Self::Unwrap { .. } => "unwrap",
            Self::Withdraw { .. } => "withdraw",
            Self::Exit { .. } => "exit",
            Self::Transfer { .. } => "transfer",
            Self::Approve { .. } => "approve",
            Self::TransferFrom { .. } => "transfer_from",
            Self::Claim { .. } => "claim",
            Self::Distribute { .. } => "distribute",
            Self::Allocate { .. } => "allocate",
            Self::Deallocate { .. } => "deallocate",
            Self::Liquidate { .. } => "liquidate",
            Self::ResetClaimants { .. } => "reset_claimants",
        }
    }

    /// Account executing the operation
    pub fn caller(&self) -> &Address {
        match self {
            Self::Wrap { account, .. }
            | Self::Unwrap { account, .. }
            | Self::Withdraw { account }
            | Self::Exit { account }
            | Self::Claim { account } => account,
            Self::Transfer { from, .. } => from,
            Self::Approve { owner, .. } => owner,
            Self::TransferFrom { spender, .. } => spender,
            Self::Distribute { caller } | Self::ResetClaimants { caller } => caller,
            Self::Allocate { treasurer, .. }
            | Self::Deallocate { treasurer, .. }
            | Self::Liquidate { treasurer, .. } => treasurer,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECEIPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapReceipt {
    /// Tokens minted
    pub minted: u64,
    /// Network tax
    pub tax: u64,
    /// Part of the tax returned
    pub rebate: u64,
}

/// Unwrap outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwrapReceipt {
    /// External asset paid out
    pub payout: u64,
    /// Unwrap tax
    pub tax: u64,
}

/// Yield withdrawal outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawReceipt {
    /// Yield taken from the pool
    pub gross: u64,
    /// Withdrawal tax
    pub tax: u64,
    /// Tokens minted
    pub net: u64,
}

/// Transfer outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Tokens credited to the recipient
    pub received: u64,
    /// Transfer tax
    pub tax: u64,
    /// Sender's yield withdrawn before the transfer
    pub withdrawn: Option<WithdrawReceipt>,
}

/// Claim outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    /// Session paid from
    pub session: u64,
    /// Tokens minted
    pub amount: u64,
}

/// Allocation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationReceipt {
    /// Allocation tax
    pub tax: u64,
    /// Debt minted to the borrower
    pub issued: u64,
}

/// Liquidation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationReceipt {
    /// Tokens burned from the borrower
    pub burned: u64,
    /// Debt retired
    pub debt_retired: u64,
    /// Shortfall wrapped from the borrower's external holdings
    pub wrapped: u64,
}

/// Result of any ledger operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Wrap result
    Wrap(WrapReceipt),
    /// Unwrap result
    Unwrap(UnwrapReceipt),
    /// Withdraw result
    Withdraw(WithdrawReceipt),
    /// Exit result
    Exit {
        /// Yield withdrawn first, if any
        withdrawn: Option<WithdrawReceipt>,
        /// Final unwrap
        unwrapped: UnwrapReceipt,
    },
    /// Transfer result
    Transfer(TransferReceipt),
    /// Allowance set
    Approve,
    /// Claim result
    Claim(ClaimReceipt),
    /// Accrual tick, if one ran
    Distribute(Option<Accrual>),
    /// Allocation result
    Allocate(AllocationReceipt),
    /// Deallocation done
    Deallocate,
    /// Liquidation result
    Liquidate(LiquidationReceipt),
    /// New claim session
    ResetClaimants(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_json() {
        let alice = Address::repeat(0x0a);
        let json = format!(r#"{{"op":"wrap","account":"{}","amount":500}}"#, alice.to_hex());
        let op: LedgerOperation = serde_json::from_str(&json).unwrap();

        assert_eq!(
            op,
            LedgerOperation::Wrap {
                account: alice,
                amount: 500,
                referrer: None
            }
        );
        assert_eq!(op.operation_type(), "wrap");
        assert_eq!(op.caller(), &alice);
    }

    #[test]
    fn test_caller_for_treasury_ops() {
        let treasurer = Address::repeat(0x7e);
        let op = LedgerOperation::Liquidate {
            treasurer,
            borrower: Address::repeat(0x0b),
            amount: 1,
        };
        assert_eq!(op.caller(), &treasurer);
        assert_eq!(op.operation_type(), "liquidate");
    }
}
