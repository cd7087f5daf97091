use clap::{Parser, Subcommand};
use ethers::providers::{Http, Provider};
use perp_pilot_core::types::ChatUserId;
use perp_pilot_core::ConfigLoader;
use perp_pilot_engine::{
    AlertRegistry, CollateralManager, CommandHandler, OrderDesk, PriceMonitor, SessionStore,
    SubmissionGuard,
};
use perp_pilot_polynomial::accounts_api::AccountsApi;
use perp_pilot_polynomial::oracle::HermesOracle;
use perp_pilot_polynomial::wallet::derived_address;
use perp_pilot_telegram::{TelegramClient, TelegramGateway};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "perp-pilot")]
#[command(about = "Chat-driven perps trading bot for Polynomial", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: Telegram gateway plus the price monitor
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the wallet address derived for a chat user id
    DeriveAddress {
        /// Numeric chat user id
        chat_user_id: i64,
        /// Config file path (for the chain id)
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config } => {
            run_bot(&config).await?;
        }
        Commands::DeriveAddress {
            chat_user_id,
            config,
        } => {
            let config = ConfigLoader::load_from(&config)?;
            let address = derived_address(ChatUserId(chat_user_id), config.venue.chain_id)?;
            println!("{address:?}");
        }
    }

    Ok(())
}

async fn run_bot(config_path: &str) -> anyhow::Result<()> {
    tracing::info!("Starting perp-pilot with config: {}", config_path);

    let config = ConfigLoader::load_from(config_path)?;
    if config.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "No Telegram bot token configured. Set telegram.bot_token or PERP_PILOT_TELEGRAM__BOT_TOKEN."
        );
    }

    let provider = Arc::new(Provider::<Http>::try_from(config.venue.rpc_url.as_str())?);
    let telegram = Arc::new(TelegramClient::new(
        &config.telegram.bot_token,
        config.telegram.poll_timeout_secs,
    )?);
    let oracle = Arc::new(HermesOracle::new(
        config.oracle.hermes_url.clone(),
        config.oracle.price_feed_id.clone(),
    ));

    let alerts = AlertRegistry::new();
    let guard = Arc::new(SubmissionGuard::new());
    let handler = Arc::new(CommandHandler::new(
        &config.venue,
        provider,
        SessionStore::new(config.venue.chain_id),
        alerts.clone(),
        AccountsApi::new(config.venue.accounts_api_url.clone()),
        oracle.clone(),
        CollateralManager::new(guard.clone()),
        OrderDesk::new(guard),
    )?);

    let monitor = PriceMonitor::new(
        oracle,
        alerts,
        telegram.clone(),
        Duration::from_millis(config.monitor.poll_interval_ms),
    );
    let monitor_stop = monitor.stop_handle();

    let gateway = TelegramGateway::new(telegram, handler);
    let gateway_stop = gateway.stop_handle();

    let monitor_handle = tokio::spawn(monitor.run());
    let gateway_handle = tokio::spawn(gateway.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");

    monitor_stop.store(true, Ordering::SeqCst);
    gateway_stop.store(true, Ordering::SeqCst);

    // The gateway notices the flag on its next poll cycle; don't hold the
    // process open for a full long-poll timeout.
    gateway_handle.abort();
    let _ = monitor_handle.await;

    tracing::info!("perp-pilot stopped");
    Ok(())
}
