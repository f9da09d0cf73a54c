//! Ledger protocol layer.
//!
//! This module wires the core ledger, rate registry, distribution and
//! treasury together:
//! - Ledger operations and receipts
//! - The orchestrating engine with all-or-nothing execution
//! - Events for state change notifications
//! - Role-gated administration
//! - A lock-guarded shared handle

pub mod engine;
pub mod events;
pub mod operations;
pub mod roles;
pub mod shared;

pub use engine::*;
pub use events::*;
pub use operations::*;
pub use roles::*;
pub use shared::*;
