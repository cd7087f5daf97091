//! Dispatches parsed chat commands against the per-user session, the venue,
//! and the alert registry, and renders the reply text.
//!
//! Expected outcomes (no session yet, no account yet, lookup service down)
//! become friendly replies here; unexpected failures propagate to the
//! gateway, which answers with a generic apology.

use crate::alerts::AlertRegistry;
use crate::collateral::{signed_collateral_delta, CollateralManager};
use crate::commands::ChatCommand;
use crate::orders::{build_order, OrderDesk};
use crate::session::{Session, SessionError, SessionStore};
use anyhow::{Context, Result};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::Address;
use perp_pilot_core::config::VenueConfig;
use perp_pilot_core::scale::{
    from_fixed, from_fixed_unsigned, to_fixed_unsigned, PRICE_DECIMALS, SIZE_DECIMALS,
};
use perp_pilot_core::traits::PriceOracle;
use perp_pilot_core::types::ChatUserId;
use perp_pilot_polynomial::accounts_api::{AccountsApi, LookupError};
use perp_pilot_polynomial::venue::PolynomialVenue;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type SessionClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

pub struct CommandHandler {
    store: SessionStore,
    alerts: AlertRegistry,
    accounts_api: AccountsApi,
    oracle: Arc<dyn PriceOracle>,
    collateral: CollateralManager,
    desk: OrderDesk,
    provider: Arc<Provider<Http>>,
    perps_market: Address,
    fxusd: Address,
    referrer: Address,
}

impl CommandHandler {
    /// # Errors
    /// Returns an error if a configured contract address does not parse.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue_config: &VenueConfig,
        provider: Arc<Provider<Http>>,
        store: SessionStore,
        alerts: AlertRegistry,
        accounts_api: AccountsApi,
        oracle: Arc<dyn PriceOracle>,
        collateral: CollateralManager,
        desk: OrderDesk,
    ) -> Result<Self> {
        let perps_market = venue_config
            .perps_market_address
            .parse()
            .context("invalid perps market address")?;
        let fxusd = venue_config
            .fxusd_address
            .parse()
            .context("invalid fxUSD address")?;
        let referrer = venue_config
            .referrer_address
            .parse()
            .context("invalid referrer address")?;

        Ok(Self {
            store,
            alerts,
            accounts_api,
            oracle,
            collateral,
            desk,
            provider,
            perps_market,
            fxusd,
            referrer,
        })
    }

    /// Builds the venue adapter signing with this session's wallet. Each
    /// session gets its own signer; nothing is shared across users.
    fn venue_for(&self, session: &Session) -> PolynomialVenue<SessionClient> {
        let client = Arc::new(SignerMiddleware::new(
            self.provider.clone(),
            session.wallet.clone(),
        ));
        PolynomialVenue::new(self.perps_market, self.fxusd, client)
    }

    /// Handles one command and returns the reply text.
    ///
    /// `submission` is the idempotency token for any state-changing venue
    /// call this command makes. The gateway derives it from the update id,
    /// so a redelivered update cannot double-submit.
    ///
    /// # Errors
    /// Returns an error only for unexpected failures (RPC calls, transaction
    /// submission). Precondition misses come back as `Ok` reply text.
    pub async fn handle(
        &self,
        chat_user_id: ChatUserId,
        command: ChatCommand,
        submission: Uuid,
    ) -> Result<String> {
        match command {
            ChatCommand::Start => self.start(chat_user_id).await,
            ChatCommand::CreateAccount => self.create_account(chat_user_id).await,
            ChatCommand::GetPositions => self.get_positions(chat_user_id).await,
            ChatCommand::GetOrders => self.get_orders(chat_user_id).await,
            ChatCommand::GetBalance => self.get_balance(chat_user_id).await,
            ChatCommand::ApproveSpending => self.approve_spending(chat_user_id).await,
            ChatCommand::SetAlert(target) => self.set_alert(chat_user_id, target).await,
            ChatCommand::AddCollateral(amount) => {
                self.modify_collateral(chat_user_id, amount, false, submission)
                    .await
            }
            ChatCommand::WithdrawCollateral(amount) => {
                self.modify_collateral(chat_user_id, amount, true, submission)
                    .await
            }
            ChatCommand::PlaceOrder(intent) => {
                self.place_order(chat_user_id, intent, submission).await
            }
        }
    }

    async fn start(&self, chat_user_id: ChatUserId) -> Result<String> {
        let session = self.store.bind(chat_user_id).await?;

        if let Some(account_id) = session.account_id {
            return Ok(format!(
                "Welcome back! Your wallet address is {:?} and your trading account {account_id} is ready. Use /place_order to trade.",
                session.address
            ));
        }

        // Rediscover an account created in an earlier run; the wallet is
        // deterministic so the lookup matches across restarts.
        match self.accounts_api.owner_account(session.address).await {
            Ok(account_id) => {
                self.store.set_account(chat_user_id, account_id).await?;
                return Ok(format!(
                    "Welcome back! Your wallet address is {:?} and your trading account {account_id} is ready. Use /place_order to trade.",
                    session.address
                ));
            }
            Err(LookupError::NotFound(_)) => {}
            Err(e) => warn!(user = %chat_user_id, "Account rediscovery skipped: {e}"),
        }

        Ok(format!(
            "Welcome! Your wallet address is {:?}. Fund it with gas and fxUSD, then run /create_account to open a trading account.",
            session.address
        ))
    }

    async fn create_account(&self, chat_user_id: ChatUserId) -> Result<String> {
        let session = match self.session(chat_user_id).await {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };
        if let Some(account_id) = session.account_id {
            return Ok(format!(
                "You already have trading account {account_id}. Use /add_collateral to fund it."
            ));
        }

        let venue = self.venue_for(&session);
        let account_id = match venue.create_account().await? {
            Some(account_id) => account_id,
            // Receipt carried no AccountCreated log; the lookup service is
            // the fallback source of truth.
            None => match self.accounts_api.owner_account(session.address).await {
                Ok(account_id) => account_id,
                Err(LookupError::NotFound(address)) => {
                    return Ok(format!(
                        "Account creation confirmed but the account is not indexed yet for {address:?}. Run /start in a minute to pick it up."
                    ));
                }
                Err(e) => {
                    warn!(user = %chat_user_id, "Account lookup failed after creation: {e}");
                    return Ok(
                        "Your account was created but the lookup service is unavailable. Run /start later to bind it.".to_string(),
                    );
                }
            },
        };

        self.store.set_account(chat_user_id, account_id).await?;
        Ok(format!(
            "Trading account {account_id} created. Run /approve then /add_collateral to start trading."
        ))
    }

    async fn get_positions(&self, chat_user_id: ChatUserId) -> Result<String> {
        let (session, account_id) = match self.session_with_account(chat_user_id).await? {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };
        let venue = self.venue_for(&session);

        let market_ids = venue.open_position_ids(account_id).await?;
        if market_ids.is_empty() {
            return Ok("You have no open positions.".to_string());
        }

        let mut reply = String::from("Open positions:");
        for raw_id in market_ids {
            let Some(market_id) = narrow_market_id(raw_id) else {
                warn!(market_id = %raw_id, "Skipping position with an out-of-range market id");
                continue;
            };
            let position = venue.open_position(account_id, market_id).await?;
            let size = from_fixed(position.position_size.into(), SIZE_DECIMALS)
                .unwrap_or_default();
            let pnl = from_fixed(position.total_pnl, SIZE_DECIMALS).unwrap_or_default();
            let funding =
                from_fixed(position.accrued_funding, SIZE_DECIMALS).unwrap_or_default();
            let _ = write!(
                reply,
                "\nMarket {market_id}: size {size}, PnL {pnl} USD, funding {funding} USD"
            );
        }
        Ok(reply)
    }

    async fn get_orders(&self, chat_user_id: ChatUserId) -> Result<String> {
        let (session, account_id) = match self.session_with_account(chat_user_id).await? {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };
        let venue = self.venue_for(&session);

        let order = venue.pending_order(account_id).await?;
        if order.size_delta == 0 {
            return Ok("You have no pending order.".to_string());
        }

        let size = from_fixed(order.size_delta.into(), SIZE_DECIMALS).unwrap_or_default();
        let acceptable =
            from_fixed_unsigned(order.acceptable_price, PRICE_DECIMALS).unwrap_or_default();
        Ok(format!(
            "Pending order on market {}: size {size}, acceptable price {acceptable} USD.",
            order.market_id
        ))
    }

    async fn get_balance(&self, chat_user_id: ChatUserId) -> Result<String> {
        let (session, account_id) = match self.session_with_account(chat_user_id).await? {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };
        let venue = self.venue_for(&session);

        let margin = venue.available_margin(account_id).await?;
        let margin_usd = from_fixed(margin, SIZE_DECIMALS).unwrap_or_default();
        Ok(format!("Available margin: {margin_usd} USD."))
    }

    async fn approve_spending(&self, chat_user_id: ChatUserId) -> Result<String> {
        let session = match self.session(chat_user_id).await {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };
        let venue = self.venue_for(&session);

        let tx_hash = venue.approve_spending(self.perps_market).await?;
        Ok(format!(
            "fxUSD spending approved for the perps market. Transaction: {tx_hash:?}"
        ))
    }

    async fn set_alert(&self, chat_user_id: ChatUserId, target: Decimal) -> Result<String> {
        if let Err(reply) = self.session(chat_user_id).await {
            return Ok(reply);
        }

        let fixed = match to_fixed_unsigned(target, PRICE_DECIMALS) {
            Ok(fixed) => fixed,
            Err(e) => return Ok(format!("That target price will not work: {e}")),
        };

        let previous = self.alerts.set(chat_user_id, fixed).await;
        info!(user = %chat_user_id, target = %target, "Alert set");
        Ok(match previous {
            Some(old) => {
                let old_usd = from_fixed_unsigned(old, PRICE_DECIMALS).unwrap_or_default();
                format!(
                    "Alert updated: you will be notified when ETH crosses {target} USD (replaces {old_usd} USD)."
                )
            }
            None => format!("Alert set: you will be notified when ETH crosses {target} USD."),
        })
    }

    async fn modify_collateral(
        &self,
        chat_user_id: ChatUserId,
        amount: Decimal,
        withdraw: bool,
        submission: Uuid,
    ) -> Result<String> {
        let (session, account_id) = match self.session_with_account(chat_user_id).await? {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };

        let delta = match signed_collateral_delta(amount, withdraw) {
            Ok(delta) => delta,
            Err(e) => return Ok(format!("That amount will not work: {e}")),
        };

        let venue = self.venue_for(&session);
        let tx_hash = self
            .collateral
            .modify(&venue, account_id, delta, submission)
            .await?;

        let verb = if withdraw { "withdrawn from" } else { "deposited to" };
        Ok(format!(
            "{amount} fxUSD {verb} account {account_id}. Transaction: {tx_hash:?}"
        ))
    }

    async fn place_order(
        &self,
        chat_user_id: ChatUserId,
        intent: perp_pilot_core::types::OrderIntent,
        submission: Uuid,
    ) -> Result<String> {
        let (session, account_id) = match self.session_with_account(chat_user_id).await? {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };

        // Fresh sample per order; the acceptable price is never built from a
        // cached one.
        let current_price = self
            .oracle
            .latest_price()
            .await
            .context("Failed to fetch the current price")?;

        let payload = match build_order(&intent, account_id, current_price, self.referrer) {
            Ok(payload) => payload,
            Err(e) => return Ok(format!("That order will not work: {e}")),
        };

        let venue = self.venue_for(&session);
        let tx_hash = self.desk.submit(&venue, &payload, submission).await?;

        let price_usd =
            from_fixed_unsigned(current_price, PRICE_DECIMALS).unwrap_or_default();
        Ok(format!(
            "Order committed on market {} at a reference price of {price_usd} USD. Transaction: {tx_hash:?}",
            payload.market_id
        ))
    }

    /// The bound session, or the reply text prompting the user to bind one.
    async fn session(&self, chat_user_id: ChatUserId) -> Result<Session, String> {
        match self.store.get(chat_user_id).await {
            Ok(session) => Ok(session),
            Err(SessionError::NoSession(_)) => {
                Err("You don't have a session yet. Send /start first.".to_string())
            }
            Err(e) => Err(format!("Session error: {e}")),
        }
    }

    /// Session plus a bound account id, rediscovering the account through
    /// the lookup service when the session does not carry one yet.
    async fn session_with_account(
        &self,
        chat_user_id: ChatUserId,
    ) -> Result<Result<(Session, u128), String>> {
        let session = match self.session(chat_user_id).await {
            Ok(session) => session,
            Err(reply) => return Ok(Err(reply)),
        };
        if let Some(account_id) = session.account_id {
            return Ok(Ok((session, account_id)));
        }

        match self.accounts_api.owner_account(session.address).await {
            Ok(account_id) => {
                self.store.set_account(chat_user_id, account_id).await?;
                Ok(Ok((session, account_id)))
            }
            Err(LookupError::NotFound(_)) => Ok(Err(
                "You don't have a trading account yet. Run /create_account first.".to_string(),
            )),
            Err(e) => {
                warn!(user = %chat_user_id, "Account lookup failed: {e}");
                Ok(Err(
                    "The account lookup service is unavailable right now. Please try again later."
                        .to_string(),
                ))
            }
        }
    }
}

/// Narrows a venue-reported `uint256` market id to the `uint128` the rest of
/// the call surface takes. `None` for values that do not fit.
fn narrow_market_id(raw: ethers::types::U256) -> Option<u128> {
    u128::try_from(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderDesk;
    use crate::submission::{token_for_update, SubmissionGuard};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use ethers::types::U256;
    use rust_decimal_macros::dec;

    struct UnusedOracle;

    #[async_trait]
    impl PriceOracle for UnusedOracle {
        async fn latest_price(&self) -> Result<U256> {
            Err(anyhow!("not wired in this test"))
        }
    }

    fn handler() -> CommandHandler {
        let config = VenueConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 80_008,
            perps_market_address: "0x52Fdc981472485232587E334c5Ca27F241CbA9AA".to_string(),
            fxusd_address: "0xE814499181A80B0E4b88FF6af5D12eA2D4d23688".to_string(),
            accounts_api_url: "http://localhost:1".to_string(),
            referrer_address: "0xCdC9D1569233F0503fc6EEB6A1A64E7a34F2D669".to_string(),
        };
        let provider = Arc::new(Provider::<Http>::try_from(config.rpc_url.clone()).unwrap());
        let guard = Arc::new(SubmissionGuard::new());

        CommandHandler::new(
            &config,
            provider,
            SessionStore::new(config.chain_id),
            AlertRegistry::new(),
            AccountsApi::new(config.accounts_api_url.clone()),
            Arc::new(UnusedOracle),
            CollateralManager::new(guard.clone()),
            OrderDesk::new(guard),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn commands_before_start_prompt_for_binding() {
        let handler = handler();
        let reply = handler
            .handle(ChatUserId(9), ChatCommand::SetAlert(dec!(2950)), token_for_update(1))
            .await
            .unwrap();
        assert!(reply.contains("/start"));
        assert!(handler.alerts.is_empty().await);
    }

    #[tokio::test]
    async fn set_alert_stores_the_scaled_target() {
        let handler = handler();
        handler.store.bind(ChatUserId(9)).await.unwrap();

        let reply = handler
            .handle(ChatUserId(9), ChatCommand::SetAlert(dec!(2950)), token_for_update(1))
            .await
            .unwrap();
        assert!(reply.contains("2950"));
        assert_eq!(
            handler.alerts.snapshot().await,
            vec![(ChatUserId(9), U256::from(295_000_000_000u64))]
        );
    }

    #[tokio::test]
    async fn replacing_an_alert_reports_the_old_target() {
        let handler = handler();
        handler.store.bind(ChatUserId(9)).await.unwrap();

        handler
            .handle(ChatUserId(9), ChatCommand::SetAlert(dec!(2950)), token_for_update(1))
            .await
            .unwrap();
        let reply = handler
            .handle(ChatUserId(9), ChatCommand::SetAlert(dec!(3100)), token_for_update(2))
            .await
            .unwrap();
        assert!(reply.contains("replaces 2950"));
        assert_eq!(handler.alerts.len().await, 1);
    }

    #[tokio::test]
    async fn alert_target_with_too_much_precision_is_refused() {
        let handler = handler();
        handler.store.bind(ChatUserId(9)).await.unwrap();

        let reply = handler
            .handle(ChatUserId(9), ChatCommand::SetAlert(dec!(2950.000000001)), token_for_update(3))
            .await
            .unwrap();
        assert!(reply.contains("will not work"));
        assert!(handler.alerts.is_empty().await);
    }

    #[tokio::test]
    async fn start_with_a_bound_account_confirms_it() {
        let handler = handler();
        handler.store.bind(ChatUserId(9)).await.unwrap();
        handler.store.set_account(ChatUserId(9), 42).await.unwrap();

        let reply = handler
            .handle(ChatUserId(9), ChatCommand::Start, token_for_update(1))
            .await
            .unwrap();
        assert!(reply.contains("account 42"));
        assert!(!reply.contains("/create_account"));
    }

    #[tokio::test]
    async fn reused_submission_token_is_refused() {
        let handler = handler();
        handler.store.bind(ChatUserId(9)).await.unwrap();
        handler.store.set_account(ChatUserId(9), 42).await.unwrap();

        let token = token_for_update(700);

        // First attempt consumes the token whether or not the venue call
        // succeeds (there is no node behind the test RPC URL).
        let _ = handler
            .handle(ChatUserId(9), ChatCommand::AddCollateral(dec!(10)), token)
            .await;

        let err = handler
            .handle(ChatUserId(9), ChatCommand::AddCollateral(dec!(10)), token)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already sent"));
    }

    #[test]
    fn market_ids_beyond_u128_are_rejected() {
        assert_eq!(narrow_market_id(U256::from(200u64)), Some(200));
        assert_eq!(narrow_market_id(U256::from(u128::MAX)), Some(u128::MAX));
        assert_eq!(narrow_market_id(U256::from(u128::MAX) + U256::one()), None);
        assert_eq!(narrow_market_id(U256::MAX), None);
    }
}
