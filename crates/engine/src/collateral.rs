//! Collateral deposits and withdrawals. The sign convention is the venue's:
//! positive delta deposits, negative withdraws. Callers convert the
//! user-supplied magnitude into a signed delta before calling in.

use crate::submission::SubmissionGuard;
use anyhow::{bail, Context, Result};
use ethers::providers::Middleware;
use ethers::types::{TxHash, I256};
use perp_pilot_polynomial::venue::PolynomialVenue;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// fxUSD is the venue's sole collateral token.
pub const FXUSD_COLLATERAL_ID: u128 = 0;

/// Converts a positive user-supplied magnitude into the signed delta the
/// venue expects: `+X` for a deposit, `-X` for a withdrawal.
///
/// # Errors
/// Rejects non-positive magnitudes and amounts finer than 18 decimals.
pub fn signed_collateral_delta(magnitude: Decimal, withdraw: bool) -> Result<I256> {
    if magnitude <= Decimal::ZERO {
        bail!("collateral amount must be positive, got {magnitude}");
    }
    let fixed = perp_pilot_core::scale::to_fixed(magnitude, perp_pilot_core::scale::SIZE_DECIMALS)
        .context("collateral amount does not fit the venue's fixed-point scale")?;
    Ok(if withdraw { -fixed } else { fixed })
}

pub struct CollateralManager {
    guard: Arc<SubmissionGuard>,
}

impl CollateralManager {
    #[must_use]
    pub fn new(guard: Arc<SubmissionGuard>) -> Self {
        Self { guard }
    }

    /// Submits one collateral modification, awaited to confirmation. No
    /// retry: failures surface verbatim to the caller.
    ///
    /// # Errors
    /// Returns an error for a zero delta, a reused submission token, or a
    /// failed venue call.
    pub async fn modify<M: Middleware + 'static>(
        &self,
        venue: &PolynomialVenue<M>,
        account_id: u128,
        delta: I256,
        submission: Uuid,
    ) -> Result<TxHash> {
        self.guard.claim(submission)?;

        if delta.is_zero() {
            // Never reached the venue, the token may be reused.
            self.guard.release(submission);
            bail!("collateral delta must be non-zero");
        }

        info!(account_id, %delta, %submission, "Submitting collateral modification");
        let tx_hash = venue
            .modify_collateral(account_id, FXUSD_COLLATERAL_ID, delta)
            .await
            .context("Failed to modify collateral")?;

        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deposit_keeps_positive_sign() {
        let delta = signed_collateral_delta(dec!(25), false).unwrap();
        assert!(delta > I256::zero());
        assert_eq!(delta, I256::from(25i64) * I256::exp10(18));
    }

    #[test]
    fn withdraw_flips_the_sign() {
        let delta = signed_collateral_delta(dec!(25), true).unwrap();
        assert!(delta < I256::zero());
        assert_eq!(delta, I256::from(-25i64) * I256::exp10(18));
    }

    #[test]
    fn zero_and_negative_magnitudes_are_rejected() {
        assert!(signed_collateral_delta(dec!(0), false).is_err());
        assert!(signed_collateral_delta(dec!(-5), true).is_err());
    }
}
