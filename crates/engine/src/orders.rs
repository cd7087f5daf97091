//! Turns a terse trade intent into a fully-specified order payload and
//! submits it. Sizing, slippage bounds, and tracking metadata all live here.

use crate::submission::SubmissionGuard;
use anyhow::{Context, Result};
use ethers::providers::Middleware;
use ethers::types::{Address, TxHash, U256};
use perp_pilot_core::scale::{self, ScaleError, SIZE_DECIMALS};
use perp_pilot_core::types::{Direction, OrderIntent};
use perp_pilot_polynomial::venue::{OrderPayload, PolynomialVenue};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Slippage tolerance: 2 USD at the 8-decimal price scale. The acceptable
/// price is offset by this in the direction that protects the trader.
pub const SLIPPAGE_TOLERANCE: u64 = 200_000_000;

/// The venue's default immediate-settlement strategy.
pub const SETTLEMENT_STRATEGY_ID: u128 = 0;

/// Chat market codes are hundredths of the venue's market id (`2` -> 200).
pub const MARKET_ID_FACTOR: u128 = 100;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("notional size must be positive, got {0}")]
    InvalidSize(Decimal),

    #[error("market code must be non-zero")]
    InvalidMarket,

    #[error(transparent)]
    Scale(#[from] ScaleError),
}

/// 32-byte tag identifying orders originated by this bot.
#[must_use]
pub fn tracking_code() -> [u8; 32] {
    let mut code = [0u8; 32];
    code[..9].copy_from_slice(b"PERPPILOT");
    code
}

/// Builds the order payload from an intent and the current price sample.
///
/// The acceptable price must come from the sample fetched for this request,
/// never a cached one.
///
/// # Errors
/// Rejects non-positive notional size, a zero market code, and sizes finer
/// than the venue's 18-decimal scale, all before any external call.
pub fn build_order(
    intent: &OrderIntent,
    account_id: u128,
    current_price: U256,
    referrer: Address,
) -> Result<OrderPayload, OrderError> {
    if intent.notional_size <= Decimal::ZERO {
        return Err(OrderError::InvalidSize(intent.notional_size));
    }
    if intent.market_code == 0 {
        return Err(OrderError::InvalidMarket);
    }

    let magnitude = scale::to_fixed(intent.notional_size, SIZE_DECIMALS)?;
    let tolerance = U256::from(SLIPPAGE_TOLERANCE);
    let (size_delta, acceptable_price) = match intent.direction {
        Direction::Long => (magnitude, current_price.saturating_sub(tolerance)),
        Direction::Short => (-magnitude, current_price.saturating_add(tolerance)),
    };

    Ok(OrderPayload {
        market_id: u128::from(intent.market_code) * MARKET_ID_FACTOR,
        account_id,
        size_delta,
        settlement_strategy_id: SETTLEMENT_STRATEGY_ID,
        acceptable_price,
        tracking_code: tracking_code(),
        referrer,
    })
}

pub struct OrderDesk {
    guard: Arc<SubmissionGuard>,
}

impl OrderDesk {
    #[must_use]
    pub fn new(guard: Arc<SubmissionGuard>) -> Self {
        Self { guard }
    }

    /// Commits one order, awaited to confirmation. No retry and no
    /// automatic resubmission: the submission token makes an accidental
    /// repeat a hard error instead of a duplicate order.
    ///
    /// # Errors
    /// Returns an error for a reused token, an oversized payload, or a
    /// failed venue call.
    pub async fn submit<M: Middleware + 'static>(
        &self,
        venue: &PolynomialVenue<M>,
        payload: &OrderPayload,
        submission: Uuid,
    ) -> Result<TxHash> {
        self.guard.claim(submission)?;

        if i128::try_from(payload.size_delta).is_err() {
            // Rejected locally, never reached the venue.
            self.guard.release(submission);
            anyhow::bail!("order size {} exceeds the venue's int128 range", payload.size_delta);
        }

        info!(
            market_id = payload.market_id,
            account_id = payload.account_id,
            size_delta = %payload.size_delta,
            acceptable_price = %payload.acceptable_price,
            %submission,
            "Committing order"
        );

        let tx_hash = venue
            .commit_order(payload)
            .await
            .context("Failed to commit order")?;

        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::I256;
    use rust_decimal_macros::dec;

    fn referrer() -> Address {
        "0xCdC9D1569233F0503fc6EEB6A1A64E7a34F2D669"
            .parse()
            .unwrap()
    }

    fn price8(usd: u64) -> U256 {
        U256::from(usd) * U256::exp10(8)
    }

    fn intent(direction: Direction, notional: Decimal) -> OrderIntent {
        OrderIntent {
            direction,
            market_code: 2,
            notional_size: notional,
        }
    }

    #[test]
    fn long_order_is_positive_with_price_floor() {
        let payload = build_order(
            &intent(Direction::Long, dec!(10)),
            7,
            price8(3000),
            referrer(),
        )
        .unwrap();

        assert!(payload.size_delta > I256::zero());
        assert_eq!(payload.size_delta, I256::from(10i64) * I256::exp10(18));
        // currentPrice - 2 USD
        assert_eq!(payload.acceptable_price, price8(2998));
        assert_eq!(payload.market_id, 200);
        assert_eq!(payload.account_id, 7);
        assert_eq!(payload.settlement_strategy_id, SETTLEMENT_STRATEGY_ID);
    }

    #[test]
    fn short_order_is_negative_with_price_ceiling() {
        let payload = build_order(
            &intent(Direction::Short, dec!(10)),
            7,
            price8(3000),
            referrer(),
        )
        .unwrap();

        assert!(payload.size_delta < I256::zero());
        assert_eq!(payload.size_delta, I256::from(-10i64) * I256::exp10(18));
        // currentPrice + 2 USD
        assert_eq!(payload.acceptable_price, price8(3002));
    }

    #[test]
    fn long_floor_saturates_at_zero() {
        let payload = build_order(
            &intent(Direction::Long, dec!(1)),
            7,
            U256::from(50_000_000u64), // 0.50 USD, below the tolerance
            referrer(),
        )
        .unwrap();
        assert_eq!(payload.acceptable_price, U256::zero());
    }

    #[test]
    fn non_positive_size_rejected_before_submission() {
        let err = build_order(&intent(Direction::Long, dec!(0)), 7, price8(3000), referrer())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidSize(_)));

        let err = build_order(&intent(Direction::Long, dec!(-3)), 7, price8(3000), referrer())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidSize(_)));
    }

    #[test]
    fn zero_market_code_rejected() {
        let bad = OrderIntent {
            direction: Direction::Long,
            market_code: 0,
            notional_size: dec!(10),
        };
        assert!(matches!(
            build_order(&bad, 7, price8(3000), referrer()),
            Err(OrderError::InvalidMarket)
        ));
    }

    #[test]
    fn fractional_notional_scales_exactly() {
        let payload = build_order(
            &intent(Direction::Long, dec!(0.5)),
            7,
            price8(3000),
            referrer(),
        )
        .unwrap();
        assert_eq!(payload.size_delta, I256::from(5i64) * I256::exp10(17));
    }

    #[test]
    fn tracking_code_is_padded_tag() {
        let code = tracking_code();
        assert_eq!(&code[..9], b"PERPPILOT");
        assert!(code[9..].iter().all(|b| *b == 0));
    }
}
