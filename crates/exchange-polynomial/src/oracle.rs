//! Pyth Hermes client for the monitored instrument's latest price.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::U256;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use perp_pilot_core::scale::PRICE_DECIMALS;
use perp_pilot_core::traits::PriceOracle;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct LatestPriceResponse {
    parsed: Vec<ParsedFeed>,
}

#[derive(Debug, Deserialize)]
struct ParsedFeed {
    price: FeedPrice,
}

#[derive(Debug, Deserialize)]
struct FeedPrice {
    price: String,
    expo: i32,
}

pub struct HermesOracle {
    http_client: Client,
    base_url: String,
    feed_id: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl HermesOracle {
    #[must_use]
    pub fn new(base_url: String, feed_id: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(5).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Self {
            http_client: Client::new(),
            base_url,
            feed_id,
            rate_limiter,
        }
    }

    async fn fetch_latest(&self) -> Result<FeedPrice> {
        self.rate_limiter.until_ready().await;
        let url = format!(
            "{}/v2/updates/price/latest?ids[]={}",
            self.base_url, self.feed_id
        );

        let response: LatestPriceResponse = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Hermes request failed")?
            .error_for_status()
            .context("Hermes returned an error status")?
            .json()
            .await
            .context("Failed to decode Hermes response")?;

        response
            .parsed
            .into_iter()
            .next()
            .map(|feed| feed.price)
            .ok_or_else(|| anyhow!("Hermes response carried no parsed feed"))
    }
}

#[async_trait]
impl PriceOracle for HermesOracle {
    async fn latest_price(&self) -> Result<U256> {
        let feed = self.fetch_latest().await?;
        normalize_price(&feed.price, feed.expo)
    }
}

/// Largest exponent distance from the price scale still treated as data. No
/// real feed comes close; anything beyond is a corrupt response.
const MAX_EXPO_SHIFT: i64 = 30;

/// Rescales a Pyth `price` + `expo` pair to [`PRICE_DECIMALS`].
///
/// The ETH/USD feed publishes at expo -8 so this is usually a no-op, but the
/// exponent is taken from the response rather than assumed. Out-of-range
/// exponents are an error, not a panic: the monitor must survive a bad tick.
fn normalize_price(raw: &str, expo: i32) -> Result<U256> {
    let value: u128 = raw
        .parse()
        .with_context(|| format!("non-positive or malformed feed price: {raw}"))?;
    let value = U256::from(value);

    let target = -(i64::from(PRICE_DECIMALS));
    let shift = i64::from(expo) - target;
    if shift.abs() > MAX_EXPO_SHIFT {
        return Err(anyhow!("feed exponent {expo} is out of range"));
    }

    let scaled = if shift >= 0 {
        value
            .checked_mul(U256::exp10(shift as usize))
            .ok_or_else(|| anyhow!("price overflow rescaling from expo {expo}"))?
    } else {
        value / U256::exp10(shift.unsigned_abs() as usize)
    };

    Ok(scaled)
}
