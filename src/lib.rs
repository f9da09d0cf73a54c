//! # Accrual Ledger
//!
//! A fee-taxed, yield-bearing token ledger. Holders wrap an external asset
//! into tokens, every movement is taxed, and taxes feed a yield pool that
//! accrues to holders through a per-share accumulator, an operational
//! reserve claimable per session, and a debt reserve backing
//! treasurer-issued allocations.
//!
//! ## Architecture
//!
//! - **Core**: configuration, the token ledger, rates, the allocation
//!   pipeline and the treasury
//! - **Distribution**: the yield pool and claim sessions
//! - **External**: asset custody, pool reserves, rate oracle and liquidity
//!   manager capabilities
//! - **Protocol**: the orchestrating engine, events, roles and a shared
//!   handle
//!
//! ## Example
//!
//! ```rust,ignore
//! use accrual_ledger::prelude::*;
//!
//! let asset = InMemoryAsset::new().with_balance(alice, 1_000);
//! let mut engine = LedgerEngine::new(LedgerConfig::standard(), admin, asset, StaticPool::empty())?;
//!
//! let receipt = engine.wrap(alice, 1_000, None)?;
//! engine.transfer(alice, bob, receipt.minted / 2)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod distribution;
pub mod error;
pub mod external;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::{Feature, FeatureFlags, LedgerConfig, LedgerParams},
        rates::{Rate, RateRegistry, RateTable, RateType},
        token::{Account, Ledger, Statement, TokenAmount},
        treasury::{Treasurer, TreasurerStatus, Treasury},
    };
    pub use crate::distribution::{ClaimsBook, YieldPool};
    pub use crate::error::{Error, Result};
    pub use crate::external::{
        AssetSource, InMemoryAsset, LiquidityManager, PoolReserves, RateOracle, StaticPool,
    };
    pub use crate::protocol::{
        engine::{LedgerEngine, LedgerState},
        events::{EventLog, LedgerEvent},
        operations::{LedgerOperation, OperationResult},
        roles::Role,
        shared::SharedLedger,
    };
    pub use crate::utils::crypto::{Address, Hash};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ledger name
pub const LEDGER_NAME: &str = "Accrual Ledger";
