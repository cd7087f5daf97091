use crate::types::ChatUserId;
use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;

/// Latest-price source for the monitored instrument.
///
/// Implementations return the price at [`crate::scale::PRICE_DECIMALS`].
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn latest_price(&self) -> Result<U256>;
}

/// Outbound plain-text delivery to a chat user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: ChatUserId, text: &str) -> Result<()>;
}
