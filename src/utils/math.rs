//! Fixed-point arithmetic and rate helpers.
//!
//! Every helper is overflow-checked and floors on division. Share and yield
//! rounding compounds across operations, so truncation direction is always
//! toward zero and any dust stays with the pool it was taken from.

use crate::error::{Error, Result};
use crate::utils::constants::{BASE_UNIT, MAGNITUDE, PERCENT};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: u64, b: u64) -> Result<u64> {
    if b == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    Ok(a / b)
}

/// Computes floor((a * b) / c) with a u128 intermediate
pub fn safe_mul_div(a: u64, b: u64, c: u64) -> Result<u64> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    let result = (a as u128) * (b as u128) / (c as u128);
    if result > u64::MAX as u128 {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, c),
        });
    }
    Ok(result as u64)
}

/// Computes floor((a * b) / c) entirely in u128.
///
/// Falls back to splitting `a` by `c` when the direct product overflows.
pub fn safe_mul_div_u128(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let overflow = || Error::Overflow {
        operation: format!("({} * {}) / {}", a, b, c),
    };
    let whole = (a / c).checked_mul(b).ok_or_else(overflow)?;
    let part = (a % c).checked_mul(b).ok_or_else(overflow)? / c;
    whole.checked_add(part).ok_or_else(overflow)
}

/// Narrow a u128 result back to u64
pub fn to_u64(value: u128, operation: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Overflow {
        operation: operation.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Apply a percentage rate: `amount * rate / 100 / BASE_UNIT`
pub fn apply_rate(amount: u64, rate: u64) -> Result<u64> {
    let scaled = (amount as u128) * (rate as u128) / (PERCENT as u128) / (BASE_UNIT as u128);
    to_u64(scaled, "apply_rate")
}

/// Amount left after deducting a rate
pub fn amount_after_rate(amount: u64, rate: u64) -> Result<u64> {
    let tax = apply_rate(amount, rate)?;
    safe_sub(amount, tax)
}

/// Rescale by a reserve ratio, `amount * numerator / denominator`.
///
/// Returns `amount` unchanged when either side of the ratio is zero.
pub fn rescale_by_ratio(amount: u64, numerator: u128, denominator: u128) -> Result<u64> {
    if numerator == 0 || denominator == 0 {
        return Ok(amount);
    }
    let scaled = safe_mul_div_u128(amount as u128, numerator, denominator)?;
    to_u64(scaled, "rescale_by_ratio")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-SHARE ACCUMULATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Accumulator increment for spreading `amount` over `shares`.
///
/// Returns `None` when there are no shares to spread over.
pub fn per_share_increment(amount: u64, shares: u64) -> Option<u128> {
    if shares == 0 {
        return None;
    }
    Some((amount as u128) * MAGNITUDE / (shares as u128))
}

/// Token value of `shares` at accumulator value `per_share`
pub fn value_of_shares(per_share: u128, shares: u64) -> Result<u64> {
    let value = safe_mul_div_u128(per_share, shares as u128, MAGNITUDE)?;
    to_u64(value, "value_of_shares")
}

/// Portion of `part` that moves when `amount` of `total` moves (floor)
pub fn pro_rata(part: u64, amount: u64, total: u64) -> Result<u64> {
    if total == 0 {
        return Ok(0);
    }
    safe_mul_div(part, amount, total)
}
