//! Conversion of purchase amounts into loyalty points.

use thiserror::Error;

use crate::Amount;
use crate::tier::Tier;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccrualError {
    #[error("purchase amount must be positive, got {0}")]
    InvalidAmount(Amount),
}

/// Points earned for a purchase of `amount` at `tier`.
///
/// Fractional points are truncated so a customer is never over-credited.
pub fn compute_points_earned(amount: Amount, tier: &Tier) -> Result<u64, AccrualError> {
    if !amount.is_positive() {
        return Err(AccrualError::InvalidAmount(amount));
    }
    Ok(amount.mul_floor(tier.multiplier))
}
