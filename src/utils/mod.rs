//! Utility modules for the accrual ledger.
//!
//! - Constants
//! - Overflow-checked fixed-point arithmetic
//! - Account identifiers and hashing

pub mod constants;
pub mod crypto;
pub mod math;

pub use constants::*;
pub use crypto::*;
pub use math::*;
