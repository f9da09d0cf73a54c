//! Core modules for the accrual ledger.
//!
//! This module contains the fundamental building blocks:
//! - Configuration, parameters and feature flags
//! - Token ledger with balances, shares and statements
//! - Rate registry
//! - Rate allocation pipeline
//! - Treasury and debt issuance

pub mod allocation;
pub mod config;
pub mod rates;
pub mod token;
pub mod treasury;

pub use allocation::*;
pub use config::*;
pub use rates::*;
pub use token::*;
pub use treasury::*;
