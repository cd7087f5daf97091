//! HTTP client for the venue's account-lookup service.
//!
//! One query per binding attempt. An empty result is a distinct outcome from
//! a transport failure: callers need to tell "no account created yet" apart
//! from "the lookup service is down".

use ethers::types::Address;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    /// The owner has no account on the venue yet.
    #[error("no trading account found for {0}")]
    NotFound(Address),

    /// The lookup service was unreachable or the request failed in transit.
    #[error("account lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The lookup service answered with a non-success status.
    #[error("account lookup returned HTTP {0}")]
    Status(u16),

    /// The response body did not have the expected shape.
    #[error("malformed account lookup response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    account_id: String,
}

pub struct AccountsApi {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl AccountsApi {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(5).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Self {
            http_client: Client::new(),
            base_url,
            rate_limiter,
        }
    }

    /// Resolves the first directly-owned trading account for `owner`.
    ///
    /// # Errors
    /// [`LookupError::NotFound`] when the service has no account for the
    /// address; transport and decoding failures keep their own variants.
    pub async fn owner_account(&self, owner: Address) -> Result<u128, LookupError> {
        self.rate_limiter.until_ready().await;
        let url = format!(
            "{}/accounts?owner={:?}&ownershipType=Direct",
            self.base_url, owner
        );

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_owner_account(&body, owner)
    }
}

fn parse_owner_account(body: &str, owner: Address) -> Result<u128, LookupError> {
    let records: Vec<AccountRecord> =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;

    let first = records.into_iter().next().ok_or(LookupError::NotFound(owner))?;
    first
        .account_id
        .parse::<u128>()
        .map_err(|_| LookupError::Malformed(format!("accountId: {}", first.account_id)))
}
