//! Error types for the accrual ledger.
//!
//! Every mutating entry point either commits in full or fails with one of
//! these errors, leaving ledger state untouched.

use thiserror::Error;

use crate::core::config::Feature;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which cap an allocation ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    /// The issuing treasurer's personal reserve limit
    TreasurerLimit,
    /// The global debt reserve
    DebtReserve,
}

impl std::fmt::Display for CapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapKind::TreasurerLimit => write!(f, "treasurer limit"),
            CapKind::DebtReserve => write!(f, "debt reserve"),
        }
    }
}

/// Main error type for the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Gate Errors
    // ═══════════════════════════════════════════════════════════════════

    /// A feature flag guarding this operation is off
    #[error("Feature disabled: {0:?}")]
    FeatureDisabled(Feature),

    /// Yield pool and debt reserve accrual cannot both be primary
    #[error("Yield pool and debt reserve accrual are mutually exclusive")]
    MutuallyExclusiveFeatures,

    /// Role check failed
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Caller is not a registered treasurer
    #[error("Unknown treasurer: {0}")]
    UnknownTreasurer(String),

    /// Treasurer exists but is disabled
    #[error("Treasurer disabled: {0}")]
    TreasurerDisabled(String),

    // ═══════════════════════════════════════════════════════════════════
    // Balance Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Account balance too small
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u64,
        /// Available amount
        available: u64,
    },

    /// No claimable entitlement in the active session
    #[error("Insufficient entitlement for {0}")]
    InsufficientEntitlement(String),

    /// Allowance too small for a delegated transfer
    #[error("Insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance {
        /// Required amount
        required: u64,
        /// Approved amount
        available: u64,
    },

    /// External custody cannot cover a payout
    #[error("Insufficient reserves: required {required}, available {available}")]
    InsufficientReserves {
        /// Payout amount
        required: u64,
        /// Custody holdings
        available: u64,
    },

    /// Allocation would breach a debt cap
    #[error("Cap exceeded ({cap}): requested {requested}, limit {limit}")]
    CapExceeded {
        /// Which cap was hit
        cap: CapKind,
        /// Total after the allocation
        requested: u64,
        /// Configured cap
        limit: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Target is the zero address
    #[error("Zero address is not a valid target")]
    ZeroAddress,

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Collaborator / Infrastructure Errors
    // ═══════════════════════════════════════════════════════════════════

    /// External collaborator call failed
    #[error("External call failed: {0}")]
    External(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the caller can retry after changing inputs or state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::InsufficientAllowance { .. }
                | Error::InsufficientEntitlement(_)
                | Error::InsufficientReserves { .. }
                | Error::CapExceeded { .. }
                | Error::FeatureDisabled(_)
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Gate errors: 1xxx
            Error::FeatureDisabled(_) => 1001,
            Error::MutuallyExclusiveFeatures => 1002,
            Error::Unauthorized(_) => 1003,
            Error::UnknownTreasurer(_) => 1004,
            Error::TreasurerDisabled(_) => 1005,

            // Balance errors: 2xxx
            Error::InsufficientBalance { .. } => 2001,
            Error::InsufficientEntitlement(_) => 2002,
            Error::InsufficientAllowance { .. } => 2003,
            Error::InsufficientReserves { .. } => 2004,
            Error::CapExceeded { cap: CapKind::TreasurerLimit, .. } => 2005,
            Error::CapExceeded { cap: CapKind::DebtReserve, .. } => 2006,

            // Validation errors: 5xxx
            Error::ZeroAmount => 5001,
            Error::ZeroAddress => 5002,
            Error::InvalidParameter { .. } => 5003,
            Error::Overflow { .. } => 5004,
            Error::Underflow { .. } => 5005,

            // Collaborator / infrastructure errors: 9xxx
            Error::External(_) => 9001,
            Error::Config(_) => 9002,
            Error::Serialization(_) => 9003,
            Error::Deserialization(_) => 9004,
            Error::InvariantViolation(_) => 9005,
            Error::Lock => 9006,
            Error::Internal(_) => 9007,
        }
    }
}
