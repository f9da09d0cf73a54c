//! Thread-safe handle to a ledger engine.
//!
//! Every call takes the whole-ledger lock, so operations from different
//! threads are serialized and each one observes and commits a complete
//! state.

use std::sync::{Arc, Mutex};

use crate::core::token::TokenAmount;
use crate::error::{Error, Result};
use crate::external::{AssetSource, PoolReserves};
use crate::protocol::engine::LedgerEngine;
use crate::protocol::events::LedgerEvent;
use crate::protocol::operations::{LedgerOperation, OperationResult};
use crate::utils::crypto::Address;

/// Cloneable, lock-guarded ledger engine
pub struct SharedLedger<A: AssetSource, P: PoolReserves> {
    inner: Arc<Mutex<LedgerEngine<A, P>>>,
}

impl<A: AssetSource, P: PoolReserves> Clone for SharedLedger<A, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AssetSource, P: PoolReserves> SharedLedger<A, P> {
    /// Wrap an engine
    pub fn new(engine: LedgerEngine<A, P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine
    pub fn with<T>(&self, f: impl FnOnce(&mut LedgerEngine<A, P>) -> Result<T>) -> Result<T> {
        let mut engine = self.inner.lock().map_err(|_| Error::Lock)?;
        f(&mut engine)
    }

    /// Execute one operation under the lock
    pub fn execute(&self, op: LedgerOperation) -> Result<OperationResult> {
        self.with(|engine| engine.execute(op))
    }

    /// Begin a new block under the lock
    pub fn begin_block(&self, height: u64, timestamp: u64) -> Result<()> {
        self.with(|engine| engine.begin_block(height, timestamp))
    }

    /// Drain pending events
    pub fn take_events(&self) -> Result<Vec<LedgerEvent>> {
        self.with(|engine| Ok(engine.take_events()))
    }

    /// Balance of an account
    pub fn balance_of(&self, account: &Address) -> Result<TokenAmount> {
        self.with(|engine| Ok(engine.balance_of(account)))
    }

    /// Total token supply
    pub fn total_supply(&self) -> Result<TokenAmount> {
        self.with(|engine| Ok(engine.total_supply()))
    }

    /// Check every cross-module invariant
    pub fn verify_invariants(&self) -> Result<()> {
        self.with(|engine| engine.verify_invariants())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LedgerConfig;
    use crate::external::{InMemoryAsset, StaticPool};
    use std::thread;

    #[test]
    fn test_concurrent_wraps_are_serialized() {
        let admin = Address::repeat(0x01);
        let mut asset = InMemoryAsset::new();
        let holders: Vec<Address> = (1..=8u8).map(|i| Address::repeat(0x10 + i)).collect();
        for holder in &holders {
            asset.fund(*holder, 10_000);
        }

        let engine = LedgerEngine::new(LedgerConfig::standard(), admin, asset, StaticPool::empty())
            .unwrap();
        let shared = SharedLedger::new(engine);

        let handles: Vec<_> = holders
            .iter()
            .map(|holder| {
                let shared = shared.clone();
                let holder = *holder;
                thread::spawn(move || {
                    for _ in 0..5 {
                        shared
                            .execute(LedgerOperation::Wrap {
                                account: holder,
                                amount: 1_000,
                                referrer: None,
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        shared.verify_invariants().unwrap();
        let wrapped: u64 = shared
            .with(|engine| Ok(engine.asset().custody_balance()))
            .unwrap();
        assert_eq!(wrapped, 8 * 5 * 1_000);
        assert_eq!(shared.take_events().unwrap().len(), 40);
    }
}
