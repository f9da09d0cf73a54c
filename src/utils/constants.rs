//! Ledger constants.
//!
//! All ledger-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Token decimals
pub const TOKEN_DECIMALS: u8 = 8;

/// Raw units per whole token; also the scale of one percentage point
pub const BASE_UNIT: u64 = 100_000_000;

/// Percent divisor applied after a rate multiplication
pub const PERCENT: u64 = 100;

/// One hundred percent expressed as a raw rate
pub const FULL_RATE: u64 = PERCENT * BASE_UNIT;

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Scale of the yield-per-share accumulator
pub const MAGNITUDE: u128 = 1_000_000_000_000_000_000; // 10^18

/// Seconds in a day; accrual rates are per day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default minimum time between accruals - 1 hour
pub const DEFAULT_YIELD_ITERATION_SECS: u64 = 3_600;

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT RATES (BASE_UNIT = 1%)
// ═══════════════════════════════════════════════════════════════════════════════

/// Operational share of every tax - 3.33%
pub const DEFAULT_OPERATIONAL_RATE: u64 = 333 * BASE_UNIT / 100;

/// Wrap tax and standard daily yield rate - 1%
pub const DEFAULT_NETWORK_RATE: u64 = BASE_UNIT;

/// Unwrap tax - 1%
pub const DEFAULT_UNWRAP_RATE: u64 = BASE_UNIT;

/// Yield withdrawal tax - 0.5%
pub const DEFAULT_WITHDRAWAL_RATE: u64 = BASE_UNIT / 2;

/// Transfer tax - 0.25%
pub const DEFAULT_TRANSFER_RATE: u64 = BASE_UNIT / 4;

/// Share of the wrap tax returned to the wrapper - 10%
pub const DEFAULT_REBATE_RATE: u64 = 10 * BASE_UNIT;

/// Allocation tax - 1%
pub const DEFAULT_ALLOCATION_RATE: u64 = BASE_UNIT;

/// Credit allotment per deposited unit - 5%
pub const DEFAULT_CREDIT_RATE: u64 = 5 * BASE_UNIT;

/// Daily yield rate once an account's allotment is used up - 0.1%
pub const DEFAULT_MIN_YIELD_RATE: u64 = BASE_UNIT / 10;

/// Cap on the liquidity-derived network rate - 5%
pub const DEFAULT_LIQUIDITY_RATE_LIMIT: u64 = 5 * BASE_UNIT;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Length of a hash in bytes (SHA256)
pub const HASH_LENGTH: usize = 32;

/// Maximum events kept in memory before the oldest are pruned
pub const MAX_EVENTS: usize = 10_000;
