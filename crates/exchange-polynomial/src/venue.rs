//! Thin adapter over the perps market contract. One awaited call per
//! operation, no retries; failures carry enough context for the chat layer
//! to surface a useful message.

use crate::contract::{AccountCreatedFilter, FxUsd, OrderCommitmentData, PerpsMarket};
use anyhow::{anyhow, Context, Result};
use ethers::contract::parse_log;
use ethers::providers::Middleware;
use ethers::types::{Address, TxHash, I256, U256};
use std::sync::Arc;
use tracing::{info, warn};

/// A fully-specified order, ready for `commitOrder`.
///
/// `size_delta` is at 18 decimals and signed (long positive, short
/// negative); `acceptable_price` is at 8 decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPayload {
    pub market_id: u128,
    pub account_id: u128,
    pub size_delta: I256,
    pub settlement_strategy_id: u128,
    pub acceptable_price: U256,
    pub tracking_code: [u8; 32],
    pub referrer: Address,
}

/// An open position as reported by the venue.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub market_id: u128,
    pub total_pnl: I256,
    pub accrued_funding: I256,
    pub position_size: i128,
    pub owed_interest: U256,
}

/// The pending order slot for an account.
#[derive(Debug, Clone)]
pub struct OrderCommitment {
    pub market_id: u128,
    pub account_id: u128,
    pub size_delta: i128,
    pub settlement_strategy_id: u128,
    pub acceptable_price: U256,
}

pub struct PolynomialVenue<M> {
    market: PerpsMarket<M>,
    fxusd: FxUsd<M>,
}

impl<M: Middleware + 'static> PolynomialVenue<M> {
    pub fn new(perps_market: Address, fxusd: Address, client: Arc<M>) -> Self {
        Self {
            market: PerpsMarket::new(perps_market, client.clone()),
            fxusd: FxUsd::new(fxusd, client),
        }
    }

    /// Creates a trading account owned by the signing wallet.
    ///
    /// Returns the new account id when the `AccountCreated` log is present
    /// in the receipt; callers fall back to the lookup service otherwise.
    ///
    /// # Errors
    /// Returns an error if the transaction fails or is dropped.
    pub async fn create_account(&self) -> Result<Option<u128>> {
        let receipt = self
            .market
            .create_account()
            .send()
            .await
            .context("createAccount submission failed")?
            .await
            .context("createAccount confirmation failed")?
            .ok_or_else(|| anyhow!("createAccount transaction dropped"))?;

        for log in receipt.logs {
            if let Ok(event) = parse_log::<AccountCreatedFilter>(log) {
                info!(account_id = event.account_id, "Trading account created");
                return Ok(Some(event.account_id));
            }
        }

        warn!("createAccount confirmed without an AccountCreated log");
        Ok(None)
    }

    /// Applies a signed collateral delta. Positive deposits, negative
    /// withdraws; the sign is the caller's responsibility.
    ///
    /// # Errors
    /// Returns an error if the transaction fails or is dropped.
    pub async fn modify_collateral(
        &self,
        account_id: u128,
        collateral_id: u128,
        delta: I256,
    ) -> Result<TxHash> {
        let receipt = self
            .market
            .modify_collateral(account_id, collateral_id, delta)
            .send()
            .await
            .context("modifyCollateral submission failed")?
            .await
            .context("modifyCollateral confirmation failed")?
            .ok_or_else(|| anyhow!("modifyCollateral transaction dropped"))?;

        Ok(receipt.transaction_hash)
    }

    /// Margin currently available for trading, at 18 decimals.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn available_margin(&self, account_id: u128) -> Result<I256> {
        self.market
            .get_available_margin(account_id)
            .call()
            .await
            .context("getAvailableMargin call failed")
    }

    /// Market ids with an open position for the account.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn open_position_ids(&self, account_id: u128) -> Result<Vec<U256>> {
        self.market
            .get_account_open_positions(account_id)
            .call()
            .await
            .context("getAccountOpenPositions call failed")
    }

    /// Position detail for one market.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn open_position(&self, account_id: u128, market_id: u128) -> Result<PositionInfo> {
        let (total_pnl, accrued_funding, position_size, owed_interest) = self
            .market
            .get_open_position(account_id, market_id)
            .call()
            .await
            .context("getOpenPosition call failed")?;

        Ok(PositionInfo {
            market_id,
            total_pnl,
            accrued_funding,
            position_size,
            owed_interest,
        })
    }

    /// The account's pending order slot.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn pending_order(&self, account_id: u128) -> Result<OrderCommitment> {
        let order = self
            .market
            .get_order(account_id)
            .call()
            .await
            .context("getOrder call failed")?;

        let (market_id, account_id, size_delta, settlement_strategy_id, acceptable_price, _, _) =
            order;

        Ok(OrderCommitment {
            market_id,
            account_id,
            size_delta,
            settlement_strategy_id,
            acceptable_price,
        })
    }

    /// All market ids listed on the venue.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn markets(&self) -> Result<Vec<U256>> {
        self.market
            .get_markets()
            .call()
            .await
            .context("getMarkets call failed")
    }

    /// Name and symbol for a market.
    ///
    /// # Errors
    /// Returns an error if the read call fails.
    pub async fn market_metadata(&self, market_id: u128) -> Result<(String, String)> {
        self.market
            .metadata(market_id)
            .call()
            .await
            .context("metadata call failed")
    }

    /// Commits an order, awaited to confirmation. Not retried: a
    /// resubmission would risk a duplicate order.
    ///
    /// # Errors
    /// Returns an error if the size does not fit int128 or the transaction
    /// fails or is dropped.
    pub async fn commit_order(&self, payload: &OrderPayload) -> Result<TxHash> {
        let commitment = commitment_for(payload)?;

        let receipt = self
            .market
            .commit_order(commitment)
            .send()
            .await
            .context("commitOrder submission failed")?
            .await
            .context("commitOrder confirmation failed")?
            .ok_or_else(|| anyhow!("commitOrder transaction dropped"))?;

        Ok(receipt.transaction_hash)
    }

    /// Approves the perps market to spend the wallet's fxUSD balance.
    ///
    /// # Errors
    /// Returns an error if the transaction fails or is dropped.
    pub async fn approve_spending(&self, spender: Address) -> Result<TxHash> {
        let receipt = self
            .fxusd
            .approve(spender, U256::MAX)
            .send()
            .await
            .context("fxUSD approve submission failed")?
            .await
            .context("fxUSD approve confirmation failed")?
            .ok_or_else(|| anyhow!("fxUSD approve transaction dropped"))?;

        Ok(receipt.transaction_hash)
    }
}

/// Maps an [`OrderPayload`] onto the contract's commitment struct. The size
/// delta is narrowed to the venue's int128 here.
fn commitment_for(payload: &OrderPayload) -> Result<OrderCommitmentData> {
    let size_delta = i128::try_from(payload.size_delta)
        .map_err(|_| anyhow!("size delta {} exceeds int128", payload.size_delta))?;

    Ok(OrderCommitmentData {
        market_id: payload.market_id,
        account_id: payload.account_id,
        size_delta,
        settlement_strategy_id: payload.settlement_strategy_id,
        acceptable_price: payload.acceptable_price,
        tracking_code: payload.tracking_code,
        referrer: payload.referrer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(size_delta: I256) -> OrderPayload {
        OrderPayload {
            market_id: 200,
            account_id: 7,
            size_delta,
            settlement_strategy_id: 0,
            acceptable_price: U256::from(300_200_000_000u64),
            tracking_code: [1u8; 32],
            referrer: Address::zero(),
        }
    }

    #[test]
    fn commitment_carries_every_field() {
        let size = I256::from(-15i64) * I256::exp10(18);
        let commitment = commitment_for(&payload(size)).unwrap();

        assert_eq!(commitment.market_id, 200);
        assert_eq!(commitment.account_id, 7);
        assert_eq!(commitment.size_delta, -15_000_000_000_000_000_000i128);
        assert_eq!(commitment.settlement_strategy_id, 0);
        assert_eq!(commitment.acceptable_price, U256::from(300_200_000_000u64));
        assert_eq!(commitment.tracking_code, [1u8; 32]);
        assert_eq!(commitment.referrer, Address::zero());
    }

    #[test]
    fn oversized_size_delta_is_rejected() {
        let too_big = I256::exp10(40);
        assert!(commitment_for(&payload(too_big)).is_err());
        assert!(commitment_for(&payload(-too_big)).is_err());
    }
}
