//! Value distribution: the yield pool and claim sessions.

pub mod claims;
pub mod yield_pool;

pub use claims::*;
pub use yield_pool::*;
