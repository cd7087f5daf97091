use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub venue: VenueConfig,
    pub oracle: OracleConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Long-poll timeout passed to getUpdates.
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub perps_market_address: String,
    pub fxusd_address: String,
    pub accounts_api_url: String,
    pub referrer_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub hermes_url: String,
    /// Pyth price feed id for the monitored instrument (hex, 0x-prefixed).
    pub price_feed_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new(),
                poll_timeout_secs: 30,
            },
            venue: VenueConfig {
                rpc_url: "https://rpc-polynomial-network-testnet-x0tryg8u1c.t.conduit.xyz"
                    .to_string(),
                chain_id: 80_008,
                perps_market_address: "0x52Fdc981472485232587E334c5Ca27F241CbA9AA".to_string(),
                fxusd_address: "0xE814499181A80B0E4b88FF6af5D12eA2D4d23688".to_string(),
                accounts_api_url: "https://perps-api-testnet.polynomial.finance".to_string(),
                referrer_address: "0xCdC9D1569233F0503fc6EEB6A1A64E7a34F2D669".to_string(),
            },
            oracle: OracleConfig {
                hermes_url: "https://hermes.pyth.network".to_string(),
                price_feed_id:
                    "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace"
                        .to_string(),
            },
            monitor: MonitorConfig {
                poll_interval_ms: 2000,
            },
        }
    }
}
