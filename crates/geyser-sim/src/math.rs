//! Wide integer helpers for reward arithmetic
//!
//! Reward splits multiply 18-decimal token amounts by share-second
//! accumulators, which overflows u128. All such products go through a
//! 256-bit intermediate and truncate toward zero on division.

use crate::error::GeyserError;
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer for large intermediate values
    pub struct U256(4);
}

impl U256 {
    /// Create U256 from u128
    pub const fn from_u128(val: u128) -> Self {
        U256([val as u64, (val >> 64) as u64, 0, 0])
    }

    /// Convert to u128, returning None if overflow
    pub fn to_u128(&self) -> Option<u128> {
        if self.0[2] != 0 || self.0[3] != 0 {
            return None;
        }
        Some((self.0[1] as u128) << 64 | self.0[0] as u128)
    }
}

/// Compute `floor(a * b / d)` with a 256-bit intermediate.
///
/// Fails with `MathOverflow` if `d == 0` or the quotient does not fit u128.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128, GeyserError> {
    if d == 0 {
        return Err(GeyserError::MathOverflow);
    }
    let result = U256::from_u128(a)
        .checked_mul(U256::from_u128(b))
        .ok_or(GeyserError::MathOverflow)?
        / U256::from_u128(d);
    result.to_u128().ok_or(GeyserError::MathOverflow)
}
